//! Usage ledger: last-used timestamps per version.
//!
//! Writes are funnelled through a queue drained by at most one worker task
//! at a time, so read-modify-write cycles on the `usage` file never
//! overlap inside this process. The file lock in [`crate::metadata`] covers
//! other processes.

use crate::metadata::{MapStore, VersionMap};
use crate::{run_blocking, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Persisted version → last-used map with a single-flight write queue.
#[derive(Clone)]
pub struct UsageLedger {
    inner: Arc<LedgerInner>,
}

struct LedgerInner {
    store: Arc<dyn MapStore>,
    queue: Mutex<QueueState>,
    idle: Notify,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<String>,
    draining: bool,
    /// Versions queued or written during this process lifetime.
    recorded: HashSet<String>,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn MapStore>) -> Self {
        Self {
            inner: Arc::new(LedgerInner {
                store,
                queue: Mutex::new(QueueState::default()),
                idle: Notify::new(),
            }),
        }
    }

    /// Stamp `version` as used now.
    ///
    /// Only the first call per version and process lifetime queues a write.
    /// Must be called from within a tokio runtime.
    pub fn record_use(&self, version: &str) {
        let start_worker = {
            let mut queue = lock(&self.inner.queue);
            if !queue.recorded.insert(version.to_string()) {
                return;
            }
            queue.pending.push_back(version.to_string());
            !std::mem::replace(&mut queue.draining, true)
        };

        if start_worker {
            let inner = self.inner.clone();
            tokio::spawn(inner.drain());
        }
    }

    /// Wait until every queued write has been attempted.
    pub async fn flush(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !lock(&self.inner.queue).draining {
                return;
            }
            notified.await;
        }
    }

    /// Persisted usage entries. Unreadable data yields an empty map.
    pub async fn entries(&self) -> VersionMap {
        let store = self.inner.store.clone();
        match run_blocking(move || store.load()).await {
            Ok(map) => map,
            Err(e) => {
                warn!("Could not read usage data: {}", e);
                VersionMap::new()
            }
        }
    }

    /// Versions whose last use is older than `now - retention`.
    ///
    /// Never fails: unreadable data yields an empty set and entries with an
    /// unparseable timestamp are skipped.
    pub async fn find_unused_versions(&self, retention: Duration) -> BTreeSet<String> {
        let entries = self.entries().await;
        let unused = unused_at(&entries, Utc::now(), retention);
        info!("Unused versions: {:?}", unused);
        unused
    }

    /// Remove `versions` from the persisted map. Returns whether the write
    /// succeeded.
    pub async fn evict(&self, versions: &[String]) -> bool {
        {
            let mut queue = lock(&self.inner.queue);
            for version in versions {
                queue.recorded.remove(version);
            }
        }

        let store = self.inner.store.clone();
        let keys = versions.to_vec();
        let result = run_blocking(move || {
            store.update(&mut |map| {
                for key in &keys {
                    map.remove(key);
                }
            })
        })
        .await;

        match result {
            Ok(_) => true,
            Err(e) => {
                warn!("Failed to evict {:?} from usage data: {}", versions, e);
                false
            }
        }
    }
}

impl LedgerInner {
    async fn drain(self: Arc<Self>) {
        loop {
            let version = {
                let mut queue = lock(&self.queue);
                match queue.pending.pop_front() {
                    Some(version) => version,
                    None => {
                        queue.draining = false;
                        break;
                    }
                }
            };

            if let Err(e) = self.write(&version).await {
                warn!("Failed to record usage of {}: {}", version, e);
                // Forget it so a later run retries the write.
                lock(&self.queue).recorded.remove(&version);
            }
        }
        self.idle.notify_waiters();
    }

    async fn write(&self, version: &str) -> Result<()> {
        let store = self.store.clone();
        let key = version.to_string();
        let stamp = Utc::now().to_rfc3339();
        debug!("Recording usage of {} at {}", key, stamp);

        run_blocking(move || {
            store.update(&mut |map| {
                map.insert(key.clone(), stamp.clone());
            })
        })
        .await
        .map(|_| ())
    }
}

/// Versions in `entries` last used before `now - retention`.
fn unused_at(entries: &VersionMap, now: DateTime<Utc>, retention: Duration) -> BTreeSet<String> {
    let cutoff = chrono::Duration::from_std(retention)
        .ok()
        .and_then(|window| now.checked_sub_signed(window));
    let Some(cutoff) = cutoff else {
        return BTreeSet::new();
    };

    entries
        .iter()
        .filter_map(|(version, stamp)| match DateTime::parse_from_rfc3339(stamp) {
            Ok(used) if used.with_timezone(&Utc) < cutoff => Some(version.clone()),
            Ok(_) => None,
            Err(e) => {
                warn!("Ignoring bad usage timestamp {:?} for {}: {}", stamp, version, e);
                None
            }
        })
        .collect()
}

fn lock(queue: &Mutex<QueueState>) -> MutexGuard<'_, QueueState> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::JsonMapStore;
    use crate::ShelfError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    /// Counts writes and tracks how many overlap.
    struct CountingStore {
        inner: JsonMapStore,
        writes: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fail: bool,
    }

    impl CountingStore {
        fn new(path: std::path::PathBuf) -> Self {
            Self {
                inner: JsonMapStore::new(path),
                writes: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                fail: false,
            }
        }
    }

    impl MapStore for CountingStore {
        fn load(&self) -> Result<VersionMap> {
            self.inner.load()
        }

        fn update(&self, mutate: &mut dyn FnMut(&mut VersionMap)) -> Result<VersionMap> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.writes.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(25));
            let result = if self.fail {
                Err(ShelfError::Other("disk full".into()))
            } else {
                self.inner.update(mutate)
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn stamp(ago: Duration) -> String {
        (Utc::now() - chrono::Duration::from_std(ago).unwrap()).to_rfc3339()
    }

    #[tokio::test]
    async fn test_rapid_calls_write_once() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(CountingStore::new(temp_dir.path().join("usage")));
        let ledger = UsageLedger::new(store.clone());

        for _ in 0..10 {
            ledger.record_use("11.1.0");
        }
        ledger.flush().await;

        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert!(ledger.entries().await.contains_key("11.1.0"));

        // Still a no-op later in the same process lifetime.
        ledger.record_use("11.1.0");
        ledger.flush().await;
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_writes_never_overlap() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(CountingStore::new(temp_dir.path().join("usage")));
        let ledger = UsageLedger::new(store.clone());

        let callers: Vec<_> = (0..8)
            .map(|i| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.record_use(&format!("{i}.0.0")) })
            })
            .collect();
        for caller in callers {
            caller.await.unwrap();
        }
        ledger.flush().await;

        assert_eq!(store.writes.load(Ordering::SeqCst), 8);
        assert_eq!(store.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.entries().await.len(), 8);
    }

    #[tokio::test]
    async fn test_failed_write_is_retried_later() {
        let temp_dir = TempDir::new().unwrap();
        let mut counting = CountingStore::new(temp_dir.path().join("usage"));
        counting.fail = true;
        let store = Arc::new(counting);
        let ledger = UsageLedger::new(store.clone());

        ledger.record_use("1.0.0");
        ledger.flush().await;
        ledger.record_use("1.0.0");
        ledger.flush().await;

        assert_eq!(store.writes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_find_unused_uses_retention_window() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(JsonMapStore::new(temp_dir.path().join("usage")));
        store
            .update(&mut |map| {
                map.insert("9.0.0".into(), stamp(30 * DAY));
                map.insert("11.1.0".into(), stamp(DAY));
            })
            .unwrap();
        let ledger = UsageLedger::new(store);

        let unused = ledger.find_unused_versions(14 * DAY).await;
        assert_eq!(unused, BTreeSet::from(["9.0.0".to_string()]));
    }

    #[tokio::test]
    async fn test_find_unused_tolerates_bad_data() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("usage");
        std::fs::write(&path, "not json").unwrap();
        let ledger = UsageLedger::new(Arc::new(JsonMapStore::new(&path)));
        assert!(ledger.find_unused_versions(DAY).await.is_empty());

        let store = JsonMapStore::new(&path);
        store
            .update(&mut |map| {
                map.insert("1.0.0".into(), "yesterday".into());
                map.insert("2.0.0".into(), stamp(3 * DAY));
            })
            .unwrap();
        let unused = ledger.find_unused_versions(DAY).await;
        assert_eq!(unused, BTreeSet::from(["2.0.0".to_string()]));
    }

    #[tokio::test]
    async fn test_evict_leaves_other_entries() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(JsonMapStore::new(temp_dir.path().join("usage")));
        let recent = stamp(DAY);
        store
            .update(&mut |map| {
                map.insert("9.0.0".into(), stamp(30 * DAY));
                map.insert("11.1.0".into(), recent.clone());
            })
            .unwrap();
        let ledger = UsageLedger::new(store);

        assert!(ledger.evict(&["9.0.0".to_string()]).await);
        let entries = ledger.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.get("11.1.0"), Some(&recent));
    }

    #[test]
    fn test_unused_at_boundary() {
        let now = Utc::now();
        let mut entries = VersionMap::new();
        entries.insert("old".into(), (now - chrono::Duration::days(15)).to_rfc3339());
        entries.insert("fresh".into(), (now - chrono::Duration::days(13)).to_rfc3339());

        let unused = unused_at(&entries, now, 14 * DAY);
        assert_eq!(unused, BTreeSet::from(["old".to_string()]));
        assert!(unused_at(&entries, now, Duration::MAX).is_empty());
    }
}
