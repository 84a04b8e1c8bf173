//! Live processes keyed by target file.

use super::handle::RuntimeProcess;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// At most one live [`RuntimeProcess`] per target file.
#[derive(Debug, Default)]
pub struct ProcessCache {
    processes: Mutex<HashMap<PathBuf, Arc<RuntimeProcess>>>,
}

impl ProcessCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live process for `file`, if any.
    pub fn get(&self, file: &Path) -> Option<Arc<RuntimeProcess>> {
        self.lock()
            .get(file)
            .filter(|process| process.is_running())
            .cloned()
    }

    /// Store `process` under its file. Returns the entry it replaced.
    pub fn insert(&self, process: Arc<RuntimeProcess>) -> Option<Arc<RuntimeProcess>> {
        self.lock().insert(process.file().to_path_buf(), process)
    }

    /// Remove the entry for `process.file()` only if it is this very handle.
    pub fn remove_if_same(&self, process: &Arc<RuntimeProcess>) -> bool {
        let mut processes = self.lock();
        match processes.get(process.file()) {
            Some(current) if Arc::ptr_eq(current, process) => {
                processes.remove(process.file());
                true
            }
            _ => false,
        }
    }

    /// Snapshot of live processes.
    pub fn running(&self) -> Vec<Arc<RuntimeProcess>> {
        self.lock()
            .values()
            .filter(|process| process.is_running())
            .cloned()
            .collect()
    }

    /// Versions with at least one live process.
    pub fn versions_in_use(&self) -> HashSet<String> {
        self.lock()
            .values()
            .filter(|process| process.is_running())
            .map(|process| process.version().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<RuntimeProcess>>> {
        self.processes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
