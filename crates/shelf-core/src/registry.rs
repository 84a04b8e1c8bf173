//! Installed-version registry.
//!
//! Knows two sources of installed runtimes:
//! - the persisted `versions` map written by the installer, and
//! - a global install, found by asking a system-wide binary for its version
//!   (checked once per process lifetime).

use crate::config::ShelfConfig;
use crate::environment::{host_runtime_environment, ChildEnvironment};
use crate::metadata::{MapStore, VersionMap};
use crate::platform;
use crate::{run_blocking, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// A runtime installed outside the Shelf root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalInstall {
    pub version: String,
    pub executable: PathBuf,
}

/// Persisted version → executable-path map plus global-install discovery.
pub struct VersionRegistry {
    store: Arc<dyn MapStore>,
    platform: String,
    global_command: Option<String>,
    version_check_timeout: Duration,
    env: ChildEnvironment,
    global: OnceCell<Option<GlobalInstall>>,
}

impl VersionRegistry {
    pub fn new(store: Arc<dyn MapStore>, config: &ShelfConfig) -> Self {
        Self {
            store,
            platform: config.platform(),
            global_command: config.global_command.clone(),
            version_check_timeout: config.version_check_timeout,
            env: host_runtime_environment(&config.env_overrides),
            global: OnceCell::new(),
        }
    }

    /// Host platform identifier this registry resolves paths for.
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Relative path of the executable inside an unpacked archive.
    pub fn executable_relative_path(&self) -> Result<&'static str> {
        platform::executable_relative_path(&self.platform)
    }

    /// All installed versions, global install included. Sorted, no duplicates.
    pub async fn list(&self) -> Vec<String> {
        let mut versions: BTreeSet<String> = self.load_lenient().await.into_keys().collect();
        if let Some(global) = self.global_install().await {
            versions.insert(global.version.clone());
        }
        versions.into_iter().collect()
    }

    /// Executable registered for `version`, if any.
    pub async fn resolve(&self, version: &str) -> Option<PathBuf> {
        if let Some(path) = self.load_lenient().await.remove(version) {
            return Some(PathBuf::from(path));
        }
        self.global_install()
            .await
            .filter(|global| global.version == version)
            .map(|global| global.executable.clone())
    }

    /// Register `executable` for `version`.
    pub async fn add(&self, version: &str, executable: &Path) -> Result<()> {
        let store = self.store.clone();
        let key = version.to_string();
        let value = executable.to_string_lossy().into_owned();
        info!("Write to versions: {} -> {}", key, value);

        run_blocking(move || {
            store.update(&mut |map| {
                map.insert(key.clone(), value.clone());
            })
        })
        .await?;
        Ok(())
    }

    /// Drop the given versions from the persisted map.
    pub async fn remove(&self, versions: &[String]) -> Result<()> {
        if versions.is_empty() {
            return Ok(());
        }
        let store = self.store.clone();
        let keys = versions.to_vec();

        run_blocking(move || {
            store.update(&mut |map| {
                for key in &keys {
                    map.remove(key);
                }
            })
        })
        .await?;
        debug!("Removed {:?} from versions", versions);
        Ok(())
    }

    /// The global install, detected on first use.
    pub async fn global_install(&self) -> Option<&GlobalInstall> {
        self.global
            .get_or_init(|| self.detect_global())
            .await
            .as_ref()
    }

    async fn load_lenient(&self) -> VersionMap {
        let store = self.store.clone();
        match run_blocking(move || store.load()).await {
            Ok(map) => map,
            Err(e) => {
                warn!("Could not read installed versions, treating as empty: {}", e);
                VersionMap::new()
            }
        }
    }

    async fn detect_global(&self) -> Option<GlobalInstall> {
        let command = self.global_command.as_deref()?;

        if let Some(version) = self.query_version(Path::new(command)).await {
            info!("Found global runtime {} ({})", version, command);
            return Some(GlobalInstall {
                version,
                executable: PathBuf::from(command),
            });
        }

        let bundle = platform::application_bundle_executable(&self.platform)?;
        if !bundle.is_file() {
            return None;
        }
        let version = self.query_version(&bundle).await?;
        info!("Found runtime app bundle {} ({})", version, bundle.display());
        Some(GlobalInstall {
            version,
            executable: bundle,
        })
    }

    async fn query_version(&self, command: &Path) -> Option<String> {
        let mut cmd = Command::new(command);
        cmd.arg("--version")
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let checked = tokio::time::timeout(self.version_check_timeout, cmd.output()).await;
        let output = match checked {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!("No runtime at {}: {}", command.display(), e);
                return None;
            }
            Err(_) => {
                warn!(
                    "{} --version timed out after {:?}",
                    command.display(),
                    self.version_check_timeout
                );
                return None;
            }
        };

        if !output.status.success() {
            debug!("{} --version exited with {}", command.display(), output.status);
            return None;
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!version.is_empty()).then_some(version)
    }
}
