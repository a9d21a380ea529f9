//! Ordered, duplicate-free file sets

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::spec::{flatten_outputs, Spec, SpecError};

/// An ordered set of file paths.
///
/// Members keep first-insertion order; inserting a path that is already
/// present is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSet {
    files: IndexSet<PathBuf>,
}

impl FileSet {
    /// Create an empty file set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a file set from a nested specification.
    ///
    /// The specification is flattened the same way an output declaration is,
    /// so producers are invoked and mappings contribute their values.
    pub fn from_spec(spec: &Spec) -> Result<Self, SpecError> {
        Ok(flatten_outputs(spec)?.into_iter().collect())
    }

    /// Insert a path, returning `false` if it was already present
    pub fn insert(&mut self, path: impl Into<PathBuf>) -> bool {
        self.files.insert(path.into())
    }

    /// Whether the set contains `path`
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.files.contains(path.as_ref())
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate members in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.iter()
    }
}

impl<P: Into<PathBuf>> FromIterator<P> for FileSet {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<P: Into<PathBuf>> Extend<P> for FileSet {
    fn extend<I: IntoIterator<Item = P>>(&mut self, iter: I) {
        for path in iter {
            self.insert(path);
        }
    }
}

impl IntoIterator for FileSet {
    type Item = PathBuf;
    type IntoIter = indexmap::set::IntoIter<PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

impl<'a> IntoIterator for &'a FileSet {
    type Item = &'a PathBuf;
    type IntoIter = indexmap::set::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

impl fmt::Display for FileSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members: Vec<String> = self.files.iter().map(|p| p.display().to_string()).collect();
        write!(f, "Files({})", members.join(", "))
    }
}
