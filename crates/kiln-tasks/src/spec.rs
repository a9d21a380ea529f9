//! Input/output specifications and their flattening
//!
//! A task declares what it reads and writes as a [`Spec`], an arbitrarily
//! nested tree of paths, file sets, keyed mappings, sequences, producers and
//! plain values. Before a task is considered for skipping, its specs are
//! flattened into concrete file lists and, for inputs, a [`Snapshot`] that
//! is compared against the one recorded on the previous run.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::files::FileSet;

/// Signature of a zero-argument producer
pub type ProducerFn = dyn Fn() -> anyhow::Result<Spec> + Send + Sync;

/// A deferred specification, evaluated each time the owning task is visited
#[derive(Clone)]
pub struct Producer(Arc<ProducerFn>);

impl Producer {
    /// Wrap a closure as a producer
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> anyhow::Result<Spec> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invoke the producer
    pub fn produce(&self) -> anyhow::Result<Spec> {
        (self.0)()
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Producer(..)")
    }
}

/// A nested input or output declaration
#[derive(Debug, Clone)]
pub enum Spec {
    /// A single file
    Path(PathBuf),
    /// An ordered set of files
    Files(FileSet),
    /// A mapping whose values are specs; keys are discarded
    Keyed(BTreeMap<String, Spec>),
    /// A sequence of specs
    Sequence(Vec<Spec>),
    /// A spec computed when the task is visited
    Producer(Producer),
    /// Non-file content; only meaningful in inputs
    Value(serde_json::Value),
}

impl Spec {
    /// A single file
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// An ordered, duplicate-free set of files
    pub fn files<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::Files(paths.into_iter().collect())
    }

    /// A keyed mapping of specs
    pub fn keyed<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Spec)>,
        K: Into<String>,
    {
        Self::Keyed(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// A sequence of specs
    pub fn sequence<I: IntoIterator<Item = Spec>>(items: I) -> Self {
        Self::Sequence(items.into_iter().collect())
    }

    /// A spec computed lazily
    pub fn producer<F>(f: F) -> Self
    where
        F: Fn() -> anyhow::Result<Spec> + Send + Sync + 'static,
    {
        Self::Producer(Producer::new(f))
    }

    /// A non-file value that still invalidates the task when it changes
    pub fn value(value: impl Into<serde_json::Value>) -> Self {
        Self::Value(value.into())
    }

    /// Files matching a glob pattern, expanded when the task is visited.
    ///
    /// Matches are returned in the sorted order the `glob` crate yields.
    pub fn glob(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        Self::producer(move || {
            let mut files = FileSet::new();
            for entry in glob::glob(&pattern)? {
                files.insert(entry?);
            }
            trace!(pattern = %pattern, matches = files.len(), "expanded glob");
            Ok(Self::Files(files))
        })
    }
}

impl From<&str> for Spec {
    fn from(path: &str) -> Self {
        Self::path(path)
    }
}

impl From<String> for Spec {
    fn from(path: String) -> Self {
        Self::path(path)
    }
}

impl From<PathBuf> for Spec {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<FileSet> for Spec {
    fn from(files: FileSet) -> Self {
        Self::Files(files)
    }
}

impl From<Producer> for Spec {
    fn from(producer: Producer) -> Self {
        Self::Producer(producer)
    }
}

impl From<BTreeMap<String, Spec>> for Spec {
    fn from(map: BTreeMap<String, Spec>) -> Self {
        Self::Keyed(map)
    }
}

impl<T: Into<Spec>> From<Vec<T>> for Spec {
    fn from(items: Vec<T>) -> Self {
        Self::Sequence(items.into_iter().map(Into::into).collect())
    }
}

/// One leaf of a flattened input specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotEntry {
    /// A concrete file path
    File(PathBuf),
    /// A non-file value
    Value(serde_json::Value),
}

/// Canonical, comparable form of a flattened input specification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(Vec<SnapshotEntry>);

impl Snapshot {
    /// Leaves in declaration order
    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.0
    }

    /// Whether the declaration reduced to nothing
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Result of flattening an input specification
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatInputs {
    /// Input files, in declaration order
    pub files: Vec<PathBuf>,
    /// Everything the declaration reduced to, files included
    pub snapshot: Snapshot,
}

/// Errors raised while flattening a specification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    /// A non-file value appeared where only files are allowed
    #[error("{value} is not a file (a path, a collection of paths, or a producer)")]
    NotAFile { value: String },

    /// A producer returned an error
    #[error("producer failed: {message}")]
    Producer { message: String },
}

/// Flatten an input specification into its files and snapshot
pub fn flatten_inputs(spec: &Spec) -> Result<FlatInputs, SpecError> {
    let mut flat = FlatInputs::default();
    walk(spec, &mut |leaf| {
        if let SnapshotEntry::File(path) = &leaf {
            flat.files.push(path.clone());
        }
        flat.snapshot.0.push(leaf);
        Ok(())
    })?;
    Ok(flat)
}

/// Flatten an output specification into its files
pub fn flatten_outputs(spec: &Spec) -> Result<Vec<PathBuf>, SpecError> {
    let mut files = Vec::new();
    walk(spec, &mut |leaf| match leaf {
        SnapshotEntry::File(path) => {
            files.push(path);
            Ok(())
        }
        SnapshotEntry::Value(value) => Err(SpecError::NotAFile {
            value: value.to_string(),
        }),
    })?;
    Ok(files)
}

fn walk<F>(spec: &Spec, visit: &mut F) -> Result<(), SpecError>
where
    F: FnMut(SnapshotEntry) -> Result<(), SpecError>,
{
    match spec {
        Spec::Path(path) => visit(SnapshotEntry::File(path.clone())),
        Spec::Files(files) => files
            .iter()
            .try_for_each(|path| visit(SnapshotEntry::File(path.clone()))),
        Spec::Keyed(map) => map.values().try_for_each(|value| walk(value, visit)),
        Spec::Sequence(items) => items.iter().try_for_each(|item| walk(item, visit)),
        Spec::Producer(producer) => {
            let produced = producer.produce().map_err(|e| SpecError::Producer {
                message: format!("{:#}", e),
            })?;
            walk(&produced, visit)
        }
        Spec::Value(value) => visit(SnapshotEntry::Value(value.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn paths(files: &[PathBuf]) -> Vec<&str> {
        files.iter().map(|p| p.to_str().unwrap()).collect()
    }

    #[test]
    fn test_literal_path() {
        let flat = flatten_inputs(&Spec::from("a.txt")).unwrap();
        assert_eq!(paths(&flat.files), vec!["a.txt"]);
        assert_eq!(
            flat.snapshot.entries(),
            &[SnapshotEntry::File(PathBuf::from("a.txt"))]
        );
    }

    #[test]
    fn test_keyed_values_in_key_order() {
        let spec = Spec::keyed([("z", Spec::path("z.c")), ("a", Spec::path("a.c"))]);
        assert_eq!(paths(&flatten_outputs(&spec).unwrap()), vec!["a.c", "z.c"]);
    }

    #[test]
    fn test_values_stay_out_of_file_list() {
        let spec = Spec::sequence([
            Spec::path("main.c"),
            Spec::value("-O2"),
            Spec::value(json!({ "debug": false })),
        ]);
        let flat = flatten_inputs(&spec).unwrap();
        assert_eq!(paths(&flat.files), vec!["main.c"]);
        assert_eq!(flat.snapshot.entries().len(), 3);
    }

    #[test]
    fn test_value_changes_snapshot() {
        let a = flatten_inputs(&Spec::sequence([Spec::path("main.c"), Spec::value("-O2")])).unwrap();
        let b = flatten_inputs(&Spec::sequence([Spec::path("main.c"), Spec::value("-O3")])).unwrap();
        assert_eq!(a.files, b.files);
        assert_ne!(a.snapshot, b.snapshot);
    }

    #[test]
    fn test_output_rejects_value() {
        let err = flatten_outputs(&Spec::sequence([Spec::path("a.out"), Spec::value(42)])).unwrap_err();
        assert_eq!(
            err,
            SpecError::NotAFile {
                value: "42".to_string()
            }
        );
    }

    #[test]
    fn test_producer_error_is_reported() {
        let spec = Spec::producer(|| anyhow::bail!("directory vanished"));
        let err = flatten_inputs(&spec).unwrap_err();
        assert!(err.to_string().contains("directory vanished"));
    }

    #[test]
    fn test_nested_producers_match_preflattened_list() {
        let nested = Spec::keyed([
            (
                "sources",
                Spec::producer(|| Ok(Spec::from(vec!["a.c", "b.c"]))),
            ),
            (
                "tables",
                Spec::producer(|| {
                    Ok(Spec::keyed([(
                        "gen",
                        Spec::producer(|| Ok(Spec::from(vec!["t.c"]))),
                    )]))
                }),
            ),
        ]);
        let flat = Spec::from(vec!["a.c", "b.c", "t.c"]);

        assert_eq!(flatten_inputs(&nested).unwrap(), flatten_inputs(&flat).unwrap());
    }

    #[test]
    fn test_glob_expands_sorted_matches() {
        let temp = tempfile::TempDir::new().unwrap();
        for name in ["b.rs", "a.rs", "notes.md"] {
            std::fs::write(temp.path().join(name), "").unwrap();
        }
        let pattern = temp.path().join("*.rs").to_string_lossy().to_string();

        let files = flatten_outputs(&Spec::glob(pattern)).unwrap();
        assert_eq!(
            files,
            vec![temp.path().join("a.rs"), temp.path().join("b.rs")]
        );
    }

    #[test]
    fn test_invalid_glob_is_producer_error() {
        let err = flatten_outputs(&Spec::glob("src/[")).unwrap_err();
        assert!(matches!(err, SpecError::Producer { .. }));
    }

    #[test]
    fn test_snapshot_serializes_canonically() {
        let flat = flatten_inputs(&Spec::sequence([Spec::path("a.c"), Spec::value(1)])).unwrap();
        let encoded = serde_json::to_value(&flat.snapshot).unwrap();
        assert_eq!(encoded, json!([{ "file": "a.c" }, { "value": 1 }]));
    }

    fn leaf_strategy() -> impl Strategy<Value = Spec> {
        prop_oneof![
            "[a-z]{1,6}\\.c".prop_map(Spec::path),
            any::<i64>().prop_map(Spec::value),
        ]
    }

    fn nested_strategy() -> impl Strategy<Value = Spec> {
        leaf_strategy().prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Spec::Sequence),
                prop::collection::btree_map("[a-z]{1,3}", inner.clone(), 0..4)
                    .prop_map(Spec::Keyed),
                inner.prop_map(|spec| Spec::producer(move || Ok(spec.clone()))),
            ]
        })
    }

    fn flatten_by_hand(spec: &Spec, out: &mut Vec<Spec>) {
        match spec {
            Spec::Sequence(items) => items.iter().for_each(|s| flatten_by_hand(s, out)),
            Spec::Keyed(map) => map.values().for_each(|s| flatten_by_hand(s, out)),
            Spec::Producer(p) => flatten_by_hand(&p.produce().unwrap(), out),
            leaf => out.push(leaf.clone()),
        }
    }

    proptest! {
        #[test]
        fn prop_nesting_does_not_change_flattening(spec in nested_strategy()) {
            let mut leaves = Vec::new();
            flatten_by_hand(&spec, &mut leaves);
            let expected = flatten_inputs(&Spec::Sequence(leaves)).unwrap();
            prop_assert_eq!(flatten_inputs(&spec).unwrap(), expected);
        }
    }
}
