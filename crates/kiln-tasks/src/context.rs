//! What a task action sees when it runs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// `key=value` parameters supplied on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters(BTreeMap<String, String>);

impl Parameters {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Split a `key=value` argument on its first `=`.
    ///
    /// Returns `None` when the argument has no `=` or an empty key.
    pub fn parse_assignment(arg: &str) -> Option<(String, String)> {
        let (key, value) = arg.split_once('=')?;
        if key.is_empty() {
            return None;
        }
        Some((key.to_string(), value.to_string()))
    }

    /// Set a parameter, replacing any earlier value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a parameter
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Look up a parameter, falling back to `default`
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Look up a parameter that must be set to a non-empty value
    pub fn require(&self, key: &str) -> Result<&str, ParameterError> {
        match self.get(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ParameterError::Missing(key.to_string())),
        }
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no parameters were given
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate parameters in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// Parameter lookup errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParameterError {
    /// A required parameter was not supplied
    #[error("Parameter \"{0}\" must be set")]
    Missing(String),
}

/// Context passed to a task action
#[derive(Debug, Clone, Copy)]
pub struct TaskContext<'a> {
    /// Name of the running task
    pub name: &'a str,
    /// Trailing command-line arguments; empty unless this task was the last
    /// one selected on the command line
    pub args: &'a [String],
    /// Resolved input files
    pub inputs: &'a [PathBuf],
    /// Resolved output files
    pub outputs: &'a [PathBuf],
    /// Command-line parameters
    pub params: &'a Parameters,
}
