//! Starting runtime processes and sweeping unused versions.

use super::cache::ProcessCache;
use super::handle::{ProcessExit, RuntimeProcess};
use crate::config::ShelfConfig;
use crate::environment::{host_runtime_environment, ChildEnvironment};
use crate::installer::{check_version_tag, BinaryInstaller};
use crate::network::RemoteVersionResolver;
use crate::registry::VersionRegistry;
use crate::usage::UsageLedger;
use crate::{Result, ShelfError};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Version selector meaning "whatever the release feed reports".
pub const LATEST: &str = "latest";

/// Ensures a version is installed, then starts or reuses a runtime for a file.
pub struct RunCoordinator {
    config: Arc<ShelfConfig>,
    resolver: Arc<RemoteVersionResolver>,
    installer: Arc<BinaryInstaller>,
    registry: Arc<VersionRegistry>,
    usage: UsageLedger,
    cache: Arc<ProcessCache>,
    env: ChildEnvironment,
}

impl RunCoordinator {
    pub fn new(
        config: Arc<ShelfConfig>,
        resolver: Arc<RemoteVersionResolver>,
        installer: Arc<BinaryInstaller>,
        registry: Arc<VersionRegistry>,
        usage: UsageLedger,
    ) -> Self {
        let env = host_runtime_environment(&config.env_overrides);
        Self {
            config,
            resolver,
            installer,
            registry,
            usage,
            cache: Arc::new(ProcessCache::new()),
            env,
        }
    }

    /// Run `file` with `version` (or [`LATEST`]), installing it first when
    /// needed.
    ///
    /// Returns the already-running process for `file` if there is one.
    /// `Ok(None)` means the version ended up installed but no executable is
    /// registered for it.
    pub async fn run(
        &self,
        file: impl AsRef<Path>,
        version: &str,
        args: &[String],
    ) -> Result<Option<Arc<RuntimeProcess>>> {
        let file = file.as_ref();
        let version = if version.is_empty() || version == LATEST {
            self.resolver.latest().await?
        } else {
            version.to_string()
        };

        let version = if self.installer.validate(Some(&version)).await? {
            version
        } else {
            info!("Version {} is not installed, installing", version);
            self.installer.install(Some(&version)).await?
        };

        if let Some(process) = self.cache.get(file) {
            debug!(
                "Reusing process {:?} for {}",
                process.pid(),
                file.display()
            );
            return Ok(Some(process));
        }

        let Some(executable) = self.registry.resolve(&version).await else {
            warn!("No executable registered for {}", version);
            return Ok(None);
        };

        self.usage.record_use(&version);
        self.spawn(file, &version, executable, args).map(Some)
    }

    /// Live processes started by this coordinator.
    pub fn running(&self) -> Vec<Arc<RuntimeProcess>> {
        self.cache.running()
    }

    /// Delete install directories of versions idle for longer than the
    /// retention window. Returns the versions that were removed.
    ///
    /// Versions with a live process are kept. Failures are logged, never
    /// returned.
    pub async fn remove_unused_versions(&self) -> Vec<String> {
        let unused = self
            .usage
            .find_unused_versions(self.config.retention_window)
            .await;
        let in_use = self.cache.versions_in_use();

        let mut removed = Vec::new();
        for version in unused {
            if in_use.contains(&version) {
                info!("Keeping {}: a process is still running on it", version);
                continue;
            }
            if let Err(e) = check_version_tag(&version) {
                warn!("Skipping usage entry: {}", e);
                continue;
            }

            let dir = self.config.install_dir(&version);
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {
                    info!("Removed {}", dir.display());
                    removed.push(version);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("{} already gone", dir.display());
                    removed.push(version);
                }
                Err(e) => warn!("Failed to remove {}: {}", dir.display(), e),
            }
        }

        if !removed.is_empty() {
            if let Err(e) = self.registry.remove(&removed).await {
                warn!("Failed to drop {:?} from versions: {}", removed, e);
            }
            self.usage.evict(&removed).await;
        }
        removed
    }

    fn spawn(
        &self,
        file: &Path,
        version: &str,
        executable: PathBuf,
        args: &[String],
    ) -> Result<Arc<RuntimeProcess>> {
        let mut cmd = Command::new(&executable);
        cmd.arg(file)
            .args(args)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null());

        match self.log_path(file) {
            Some(log_path) => {
                let (stdout, stderr) = open_log(&log_path)?;
                cmd.stdout(stdout).stderr(stderr);
            }
            None => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        info!(
            "Launching {} with {} ({})",
            file.display(),
            version,
            executable.display()
        );
        let child = cmd.spawn().map_err(|e| {
            error!("Failed to spawn process: {}", e);
            ShelfError::LaunchFailed {
                file: file.display().to_string(),
                message: format!("{}: {}", executable.display(), e),
            }
        })?;

        let (exit_tx, exit_rx) = watch::channel(None);
        let process = Arc::new(RuntimeProcess::new(
            file.to_path_buf(),
            version.to_string(),
            executable,
            child.id(),
            exit_rx,
        ));
        info!("Launched process with PID {:?}", process.pid());

        if let Some(previous) = self.cache.insert(process.clone()) {
            debug!("Replaced exited process {:?}", previous.pid());
        }
        tokio::spawn(observe(child, process.clone(), self.cache.clone(), exit_tx));
        Ok(process)
    }

    fn log_path(&self, file: &Path) -> Option<PathBuf> {
        let dir = self.config.log_dir.as_ref()?;
        let stem = file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "runtime".to_string());
        Some(dir.join(format!("{}.log", stem)))
    }
}

fn open_log(path: &Path) -> Result<(Stdio, Stdio)> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ShelfError::io_with_path(e, parent))?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ShelfError::Io {
            message: "open log file".to_string(),
            path: Some(path.to_path_buf()),
            source: Some(e),
        })?;
    let stdout = file.try_clone().map_err(|e| ShelfError::Io {
        message: "clone log file handle".to_string(),
        path: Some(path.to_path_buf()),
        source: Some(e),
    })?;
    Ok((Stdio::from(stdout), Stdio::from(file)))
}

/// Waits for the child, honours kill requests, then evicts and publishes.
async fn observe(
    mut child: Child,
    process: Arc<RuntimeProcess>,
    cache: Arc<ProcessCache>,
    exit_tx: watch::Sender<Option<ProcessExit>>,
) {
    let finished = tokio::select! {
        status = child.wait() => Some(status),
        _ = process.kill_requested() => None,
    };
    let status = match finished {
        Some(status) => status,
        None => {
            info!("Stopping process {:?}", process.pid());
            if let Err(e) = child.start_kill() {
                warn!("Failed to kill process {:?}: {}", process.pid(), e);
            }
            child.wait().await
        }
    };

    let exit = match status {
        Ok(status) => ProcessExit {
            code: status.code(),
        },
        Err(e) => {
            warn!("Failed waiting on process {:?}: {}", process.pid(), e);
            ProcessExit { code: None }
        }
    };

    // Evict before publishing so a caller woken by the exit sees a free slot.
    cache.remove_if_same(&process);
    info!(
        "Process {:?} for {} exited with {:?}",
        process.pid(),
        process.file().display(),
        exit.code
    );
    let _ = exit_tx.send(Some(exit));
}
