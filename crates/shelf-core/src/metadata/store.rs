//! Persisted string-to-string maps (`versions` and `usage`).

use crate::config::PathsConfig;
use crate::metadata::atomic::{atomic_read_json, atomic_write_json};
use crate::metadata::lock::FileLock;
use crate::Result;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Version tag → value (executable path or RFC 3339 timestamp).
pub type VersionMap = BTreeMap<String, String>;

/// Storage backend for a persisted map.
///
/// `update` is a full read-modify-write cycle: implementations must re-read
/// the current contents before applying the mutation so unrelated keys
/// written by other parties survive.
pub trait MapStore: Send + Sync {
    /// Load the current map. A missing file is an empty map.
    fn load(&self) -> Result<VersionMap>;

    /// Apply `mutate` to the freshly loaded map and persist the result.
    fn update(&self, mutate: &mut dyn FnMut(&mut VersionMap)) -> Result<VersionMap>;
}

/// A map stored as a JSON object in a single file.
///
/// Mutations hold an exclusive advisory lock on `<file>.lock` and replace
/// the file by atomic rename, so concurrent writers in other processes
/// cannot interleave their cycles.
#[derive(Debug, Clone)]
pub struct JsonMapStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonMapStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("map"));
        lock_name.push(format!(".{}", PathsConfig::LOCK_SUFFIX));
        let lock_path = path.with_file_name(lock_name);
        Self { path, lock_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MapStore for JsonMapStore {
    fn load(&self) -> Result<VersionMap> {
        Ok(atomic_read_json(&self.path)?.unwrap_or_default())
    }

    fn update(&self, mutate: &mut dyn FnMut(&mut VersionMap)) -> Result<VersionMap> {
        let _lock = FileLock::acquire(&self.lock_path)?;

        let mut map = match self.load() {
            Ok(map) => map,
            Err(e) => {
                warn!(
                    "Discarding unreadable map {}: {}",
                    self.path.display(),
                    e
                );
                VersionMap::new()
            }
        };

        mutate(&mut map);
        atomic_write_json(&self.path, &map)?;
        debug!("Persisted {} entries to {}", map.len(), self.path.display());
        Ok(map)
    }
}
