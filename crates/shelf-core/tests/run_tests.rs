//! Integration tests for running files and pruning unused versions.
//!
//! `/bin/sh` is registered as the runtime executable, so each target file
//! is an ordinary shell script.

#![cfg(unix)]

use async_trait::async_trait;
use chrono::Utc;
use shelf_core::{
    JsonMapStore, MapStore, ReleaseFeed, Result, Shelf, ShelfConfig, VersionMap, LATEST,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const SHELL: &str = "/bin/sh";
const WAIT: Duration = Duration::from_secs(10);

struct FixedFeed(&'static str);

#[async_trait]
impl ReleaseFeed for FixedFeed {
    async fn latest_tag(&self) -> Result<String> {
        Ok(self.0.to_string())
    }
}

struct TestEnv {
    _temp_dir: TempDir,
    root: PathBuf,
    work: PathBuf,
    shelf: Shelf,
}

async fn create_test_env(configure: impl FnOnce(ShelfConfig) -> ShelfConfig) -> TestEnv {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("root");
    let work = temp_dir.path().join("work");
    std::fs::create_dir_all(&work).unwrap();

    let config = ShelfConfig::new(&root)
        .with_platform("linux")
        .with_global_command(None);
    let shelf = Shelf::builder(configure(config))
        .with_release_feed(Arc::new(FixedFeed("1.0.0")))
        .build()
        .await
        .unwrap();
    shelf
        .registry()
        .add("1.0.0", Path::new(SHELL))
        .await
        .unwrap();

    TestEnv {
        _temp_dir: temp_dir,
        root,
        work,
        shelf,
    }
}

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

fn days_ago(days: i64) -> String {
    (Utc::now() - chrono::Duration::days(days)).to_rfc3339()
}

#[tokio::test]
async fn test_live_process_is_reused() {
    let env = create_test_env(|config| config).await;
    let app = script(&env.work, "app.sh", "exec sleep 30\n");

    let first = env.shelf.run(&app, "1.0.0", &[]).await.unwrap().unwrap();
    let second = env.shelf.run(&app, LATEST, &[]).await.unwrap().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(first.is_running());
    assert!(first.pid().is_some());
    assert_eq!(first.version(), "1.0.0");
    assert_eq!(env.shelf.running().len(), 1);

    first.kill();
    let exit = tokio::time::timeout(WAIT, first.wait()).await.unwrap();
    assert!(!exit.success());
    assert!(!first.is_running());
    assert!(env.shelf.running().is_empty());

    // A new handle after the old one exited.
    let third = env.shelf.run(&app, "1.0.0", &[]).await.unwrap().unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    third.kill();
    tokio::time::timeout(WAIT, third.wait()).await.unwrap();
}

#[tokio::test]
async fn test_different_files_get_different_processes() {
    let env = create_test_env(|config| config).await;
    let a = script(&env.work, "a.sh", "exec sleep 30\n");
    let b = script(&env.work, "b.sh", "exec sleep 30\n");

    let pa = env.shelf.run(&a, "1.0.0", &[]).await.unwrap().unwrap();
    let pb = env.shelf.run(&b, "1.0.0", &[]).await.unwrap().unwrap();
    assert!(!Arc::ptr_eq(&pa, &pb));
    assert_eq!(env.shelf.running().len(), 2);

    pa.kill();
    pb.kill();
    tokio::time::timeout(WAIT, pa.wait()).await.unwrap();
    tokio::time::timeout(WAIT, pb.wait()).await.unwrap();
}

#[tokio::test]
async fn test_exit_code_args_and_log_file() {
    let logs = TempDir::new().unwrap();
    let log_dir = logs.path().to_path_buf();
    let env = create_test_env(|config| {
        config
            .with_log_dir(&log_dir)
            .with_env("SHELF_TEST_VALUE", "42")
    })
    .await;
    let app = script(
        &env.work,
        "app.sh",
        "echo \"args: $*\"\necho \"value: $SHELF_TEST_VALUE\"\nexit 3\n",
    );

    let process = env
        .shelf
        .run(&app, "1.0.0", &["--flag".to_string(), "value".to_string()])
        .await
        .unwrap()
        .unwrap();
    let exit = tokio::time::timeout(WAIT, process.wait()).await.unwrap();
    assert_eq!(exit.code, Some(3));

    let log = std::fs::read_to_string(log_dir.join("app.log")).unwrap();
    assert!(log.contains("args: --flag value"));
    assert!(log.contains("value: 42"));
}

#[tokio::test]
async fn test_run_records_usage() {
    let env = create_test_env(|config| config).await;
    let app = script(&env.work, "app.sh", "exit 0\n");

    let process = env.shelf.run(&app, "1.0.0", &[]).await.unwrap().unwrap();
    tokio::time::timeout(WAIT, process.wait()).await.unwrap();
    env.shelf.flush_usage().await;

    let entries = env.shelf.usage().entries().await;
    assert!(entries.contains_key("1.0.0"));
}

#[tokio::test]
async fn test_spawn_failure_is_launch_error() {
    let env = create_test_env(|config| config).await;
    env.shelf
        .registry()
        .add("4.0.0", &env.root.join("missing/electron"))
        .await
        .unwrap();
    let app = script(&env.work, "app.sh", "exit 0\n");

    let err = env.shelf.run(&app, "4.0.0", &[]).await.unwrap_err();
    assert_eq!(err.kind(), shelf_core::ErrorKind::Launch);
    assert!(env.shelf.running().is_empty());
}

/// Versions store whose only entry disappears after the first read, as if
/// another process pruned it between validation and lookup.
struct VanishingStore {
    loads: AtomicUsize,
}

impl MapStore for VanishingStore {
    fn load(&self) -> Result<VersionMap> {
        let mut map = VersionMap::new();
        if self.loads.fetch_add(1, Ordering::SeqCst) == 0 {
            map.insert("1.0.0".to_string(), SHELL.to_string());
        }
        Ok(map)
    }

    fn update(&self, mutate: &mut dyn FnMut(&mut VersionMap)) -> Result<VersionMap> {
        let mut map = VersionMap::new();
        mutate(&mut map);
        Ok(map)
    }
}

#[tokio::test]
async fn test_run_without_registered_executable_returns_none() {
    let temp_dir = TempDir::new().unwrap();
    let config = ShelfConfig::new(temp_dir.path().join("root"))
        .with_platform("linux")
        .with_global_command(None);
    let shelf = Shelf::builder(config)
        .with_release_feed(Arc::new(FixedFeed("1.0.0")))
        .with_versions_store(Arc::new(VanishingStore {
            loads: AtomicUsize::new(0),
        }))
        .build()
        .await
        .unwrap();
    let app = script(temp_dir.path(), "app.sh", "exit 0\n");

    assert!(shelf.run(&app, "1.0.0", &[]).await.unwrap().is_none());
    assert!(shelf.running().is_empty());

    shelf.flush_usage().await;
    assert!(shelf.usage().entries().await.is_empty());
}

#[tokio::test]
async fn test_remove_unused_versions() {
    let env = create_test_env(|config| config).await;
    let old_dir = env.root.join("electron_9.0.0");
    std::fs::create_dir_all(&old_dir).unwrap();
    std::fs::write(old_dir.join("electron"), b"").unwrap();
    env.shelf
        .registry()
        .add("9.0.0", &old_dir.join("electron"))
        .await
        .unwrap();

    let recent = days_ago(1);
    let usage = JsonMapStore::new(env.shelf.config().usage_path());
    usage
        .update(&mut |map| {
            map.insert("9.0.0".into(), days_ago(30));
            map.insert("1.0.0".into(), recent.clone());
        })
        .unwrap();

    let removed = env.shelf.remove_unused_versions().await;
    assert_eq!(removed, vec!["9.0.0"]);
    assert!(!old_dir.exists());
    assert_eq!(env.shelf.installed_versions().await, vec!["1.0.0"]);

    let entries = env.shelf.usage().entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries.get("1.0.0"), Some(&recent));
}

#[tokio::test]
async fn test_running_version_is_not_removed() {
    let env = create_test_env(|config| config).await;
    let dir = env.root.join("electron_1.0.0");
    std::fs::create_dir_all(&dir).unwrap();
    let app = script(&env.work, "app.sh", "exec sleep 30\n");

    let process = env.shelf.run(&app, "1.0.0", &[]).await.unwrap().unwrap();
    env.shelf.flush_usage().await;
    JsonMapStore::new(env.shelf.config().usage_path())
        .update(&mut |map| {
            map.insert("1.0.0".into(), days_ago(60));
        })
        .unwrap();

    assert!(env.shelf.remove_unused_versions().await.is_empty());
    assert!(dir.exists());

    process.kill();
    tokio::time::timeout(WAIT, process.wait()).await.unwrap();
    assert_eq!(env.shelf.remove_unused_versions().await, vec!["1.0.0"]);
    assert!(!dir.exists());
}
