//! Fingerprint cache persisted between runs

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::spec::{FlatInputs, Snapshot};

/// On-disk format version
pub const CACHE_VERSION: u32 = 1;

/// A file modification time, relative to the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Mtime {
    pub secs: u64,
    pub nanos: u32,
}

impl Mtime {
    /// Read the modification time of `path`
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let modified = fs::metadata(path)?.modified()?;
        Ok(Self::from(modified))
    }
}

impl From<SystemTime> for Mtime {
    fn from(time: SystemTime) -> Self {
        let since = time.duration_since(UNIX_EPOCH).unwrap_or_default();
        Self {
            secs: since.as_secs(),
            nanos: since.subsec_nanos(),
        }
    }
}

/// What a task's inputs looked like when it last ran
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Flattened input declaration
    pub snapshot: Snapshot,
    /// Modification time of every input file, in declaration order
    pub timestamps: Vec<Mtime>,
}

impl Fingerprint {
    /// Compute a fingerprint from flattened inputs.
    ///
    /// Every input file must exist.
    pub fn compute(inputs: &FlatInputs) -> Result<Self, CacheError> {
        let timestamps = inputs
            .files
            .iter()
            .map(|path| Mtime::of(path))
            .collect::<std::io::Result<Vec<_>>>()?;
        Ok(Self {
            snapshot: inputs.snapshot.clone(),
            timestamps,
        })
    }

    /// Latest input modification time, if any input file was declared
    pub fn newest_input(&self) -> Option<Mtime> {
        self.timestamps.iter().max().copied()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    #[serde(default)]
    saved_at: Option<String>,
    fingerprints: BTreeMap<String, Fingerprint>,
}

/// Fingerprints of every task that completed, keyed by task name
#[derive(Debug, Clone)]
pub struct FingerprintCache {
    path: PathBuf,
    entries: BTreeMap<String, Fingerprint>,
}

impl FingerprintCache {
    /// Create an empty cache backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the cache stored at `path`.
    ///
    /// A missing file yields an empty cache. An unreadable or corrupt file is
    /// reported and also yields an empty cache, so every task will run.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let mut cache = Self::new(path);

        if !cache.path.exists() {
            debug!(path = %cache.path.display(), "no fingerprint cache yet");
            return cache;
        }

        let contents = match fs::read_to_string(&cache.path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %cache.path.display(), error = %e, "fingerprint cache is unreadable");
                return cache;
            }
        };

        match serde_json::from_str::<CacheDocument>(&contents) {
            Ok(doc) if doc.version == CACHE_VERSION => {
                debug!(path = %cache.path.display(), entries = doc.fingerprints.len(), "fingerprint cache loaded");
                cache.entries = doc.fingerprints;
            }
            Ok(doc) => {
                warn!(
                    path = %cache.path.display(),
                    version = doc.version,
                    expected = CACHE_VERSION,
                    "fingerprint cache has an unknown version, ignoring it"
                );
            }
            Err(e) => {
                warn!(path = %cache.path.display(), error = %e, "fingerprint cache is corrupt, ignoring it");
            }
        }

        cache
    }

    /// Fingerprint recorded for `name`
    pub fn get(&self, name: &str) -> Option<&Fingerprint> {
        self.entries.get(name)
    }

    /// Record the fingerprint of a task that ran
    pub fn record(&mut self, name: impl Into<String>, fingerprint: Fingerprint) {
        self.entries.insert(name.into(), fingerprint);
    }

    /// Persist the cache, replacing the previous file.
    ///
    /// The document is written to a sibling temporary file and renamed over
    /// the old one, so an interrupted write leaves the previous store intact.
    pub fn save(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let doc = CacheDocument {
            version: CACHE_VERSION,
            saved_at: Some(chrono::Utc::now().to_rfc3339()),
            fingerprints: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&doc)?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;

        info!(path = %self.path.display(), entries = self.entries.len(), "fingerprint cache saved");
        Ok(())
    }

    /// Delete the store at `path`, returning whether a file was removed
    pub fn clear(path: &Path) -> Result<bool, CacheError> {
        match fs::remove_file(path) {
            Ok(()) => {
                info!(path = %path.display(), "fingerprint cache removed");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of recorded fingerprints
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// IO error
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{flatten_inputs, Spec};
    use std::time::Duration;
    use tempfile::TempDir;

    fn fingerprint_of(spec: &Spec) -> Fingerprint {
        Fingerprint::compute(&flatten_inputs(spec).unwrap()).unwrap()
    }

    #[test]
    fn test_fingerprint_tracks_mtime() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.txt");
        fs::write(&source, "one").unwrap();
        let spec = Spec::path(&source);

        let before = fingerprint_of(&spec);
        assert_eq!(before, fingerprint_of(&spec));

        let file = fs::File::options().write(true).open(&source).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(10))
            .unwrap();

        assert_ne!(before, fingerprint_of(&spec));
    }

    #[test]
    fn test_fingerprint_requires_existing_files() {
        let temp = TempDir::new().unwrap();
        let spec = Spec::path(temp.path().join("missing.txt"));
        let flat = flatten_inputs(&spec).unwrap();
        assert!(matches!(Fingerprint::compute(&flat), Err(CacheError::Io(_))));
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".kiln");

        let mut cache = FingerprintCache::new(&path);
        cache.record("compile", fingerprint_of(&Spec::value("-O2")));
        cache.save().unwrap();

        let loaded = FingerprintCache::load(&path);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("compile"), cache.get("compile"));
        assert!(!temp.path().join(".kiln.tmp").exists());
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("build").join("fingerprints.json");

        FingerprintCache::new(&path).save().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let cache = FingerprintCache::load(temp.path().join(".kiln"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".kiln");
        fs::write(&path, "[1, 2, 3]").unwrap();

        assert!(FingerprintCache::load(&path).is_empty());

        fs::write(&path, "not json at all").unwrap();
        assert!(FingerprintCache::load(&path).is_empty());
    }

    #[test]
    fn test_unknown_version_is_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".kiln");
        fs::write(
            &path,
            r#"{"version": 99, "fingerprints": {"a": {"snapshot": [], "timestamps": []}}}"#,
        )
        .unwrap();

        assert!(FingerprintCache::load(&path).is_empty());
    }

    #[test]
    fn test_clear() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".kiln");
        FingerprintCache::new(&path).save().unwrap();

        assert!(FingerprintCache::clear(&path).unwrap());
        assert!(!FingerprintCache::clear(&path).unwrap());
    }

    #[test]
    fn test_newest_input() {
        let fingerprint = Fingerprint {
            snapshot: Snapshot::default(),
            timestamps: vec![
                Mtime { secs: 5, nanos: 0 },
                Mtime { secs: 9, nanos: 1 },
                Mtime { secs: 9, nanos: 0 },
            ],
        };
        assert_eq!(fingerprint.newest_input(), Some(Mtime { secs: 9, nanos: 1 }));
        assert_eq!(Fingerprint::default().newest_input(), None);
    }
}
