//! Configuration types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Main configuration for Kiln
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fingerprint cache configuration
    pub cache: CacheConfig,

    /// Run behaviour
    pub run: RunConfig,
}

/// Fingerprint cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether fingerprints are loaded and persisted
    pub enabled: bool,

    /// Cache file, relative to the working directory
    pub file: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: PathBuf::from(super::defaults::DEFAULT_CACHE_FILE),
        }
    }
}

/// Run configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// How far the bare global force marker reaches
    pub force_scope: ForceScope,
}

/// Reach of the global force marker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForceScope {
    /// Only the initial tasks of the run are forced
    #[default]
    Initial,
    /// Every task visited during the run is forced
    All,
}

impl fmt::Display for ForceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::All => write!(f, "all"),
        }
    }
}
