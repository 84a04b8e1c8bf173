//! Runtime installation.
//!
//! Installs one version into `<root>/<prefix>_<version>`:
//! download the archive, unpack it with `tar`, register the executable,
//! delete the archive. The archive is deleted on failure too.

use crate::config::{InstallationConfig, ShelfConfig};
use crate::environment::{host_runtime_environment, ChildEnvironment};
use crate::network::{download_to_file, HttpClient, RemoteVersionResolver};
use crate::registry::VersionRegistry;
use crate::{Result, ShelfError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Downloads, unpacks and registers runtime versions.
pub struct BinaryInstaller {
    config: Arc<ShelfConfig>,
    registry: Arc<VersionRegistry>,
    resolver: Arc<RemoteVersionResolver>,
    http: Arc<HttpClient>,
    env: ChildEnvironment,
    /// Serializes installs started from this process.
    install_lock: Mutex<()>,
}

impl BinaryInstaller {
    pub fn new(
        config: Arc<ShelfConfig>,
        registry: Arc<VersionRegistry>,
        resolver: Arc<RemoteVersionResolver>,
        http: Arc<HttpClient>,
    ) -> Self {
        let env = host_runtime_environment(&config.env_overrides);
        Self {
            config,
            registry,
            resolver,
            http,
            env,
            install_lock: Mutex::new(()),
        }
    }

    /// Install `version` (latest when `None`) unless it is already installed.
    ///
    /// Returns the installed tag.
    pub async fn install(&self, version: Option<&str>) -> Result<String> {
        let version = self.required_version(version).await?;
        check_version_tag(&version)?;
        info!("required version {}", version);

        let _guard = self.install_lock.lock().await;

        if self.registry.list().await.contains(&version) {
            debug!("Version {} already installed", version);
            return Ok(version);
        }

        // Resolved before touching the disk so unsupported hosts leave no trace.
        let relative = self.registry.executable_relative_path()?;

        let install_dir = absolute(&self.config.install_dir(&version))?;
        info!("install directory {}", install_dir.display());
        prepare_install_dir(&install_dir).await?;

        let archive = install_dir.join(format!("{}.zip", self.config.runtime_name));
        let url = self.download_url(&version);

        let result = self
            .download_and_register(&version, &url, &archive, &install_dir, relative)
            .await;

        info!("Finalize installation: remove file {}", archive.display());
        match tokio::fs::remove_file(&archive).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove archive {}: {}", archive.display(), e),
        }

        result?;
        info!("installation completed");
        Ok(version)
    }

    /// Whether `version` (latest when `None`) is installed.
    pub async fn validate(&self, version: Option<&str>) -> Result<bool> {
        let version = self.required_version(version).await?;
        Ok(self.registry.list().await.contains(&version))
    }

    /// Archive URL for `version` on this host.
    pub fn download_url(&self, version: &str) -> String {
        format!(
            "{base}/{version}/{name}-{version}-{platform}-{arch}.zip",
            base = self.config.download_base_url,
            version = version,
            name = self.config.runtime_name,
            platform = self.registry.platform(),
            arch = self.config.arch,
        )
    }

    async fn required_version(&self, version: Option<&str>) -> Result<String> {
        match version {
            Some(v) if !v.is_empty() => Ok(v.to_string()),
            _ => self.resolver.latest().await,
        }
    }

    async fn download_and_register(
        &self,
        version: &str,
        url: &str,
        archive: &Path,
        install_dir: &Path,
        relative: &str,
    ) -> Result<()> {
        download_to_file(&self.http, url, archive, self.config.download_stall_timeout).await?;
        self.extract(archive, install_dir).await?;

        let executable = install_dir.join(relative);
        if !executable.is_file() {
            return Err(ShelfError::ExtractionFailed {
                archive: archive.to_path_buf(),
                message: format!("archive did not contain {}", relative),
            });
        }
        make_executable(&executable)?;

        self.registry.add(version, &executable).await
    }

    async fn extract(&self, archive: &Path, out_dir: &Path) -> Result<()> {
        info!(
            "extract file: {} to {}",
            archive.display(),
            out_dir.display()
        );

        let failed = |message: String| ShelfError::ExtractionFailed {
            archive: archive.to_path_buf(),
            message,
        };

        let child = Command::new(InstallationConfig::EXTRACT_COMMAND)
            .arg("-zxvf")
            .arg(archive)
            .arg("-C")
            .arg(out_dir)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| failed(format!("could not start tar: {}", e)))?;

        // Dropping the child on timeout kills it.
        let output = tokio::time::timeout(self.config.extract_timeout, child.wait_with_output())
            .await
            .map_err(|_| failed(format!("timed out after {:?}", self.config.extract_timeout)))?
            .map_err(|e| failed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.lines().last().unwrap_or_default().trim();
            return Err(failed(format!("tar exited with {}: {}", output.status, detail)));
        }
        Ok(())
    }
}

/// Reject tags that cannot safely name an install directory.
pub fn check_version_tag(tag: &str) -> Result<()> {
    let invalid = tag.is_empty()
        || tag == "."
        || tag == ".."
        || tag.contains(['/', '\\'])
        || tag.chars().any(char::is_control);
    if invalid {
        return Err(ShelfError::InvalidVersionTag {
            tag: tag.to_string(),
        });
    }
    Ok(())
}

/// Create the install directory, or reuse it when it exists and is empty.
async fn prepare_install_dir(dir: &Path) -> Result<()> {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => {
            let occupied = entries
                .next_entry()
                .await
                .map_err(|e| ShelfError::io_with_path(e, dir))?
                .is_some();
            if occupied {
                return Err(ShelfError::DirectoryNotEmpty(dir.to_path_buf()));
            }
            debug!("Reusing empty install directory {}", dir.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| ShelfError::io_with_path(e, dir)),
        Err(e) => Err(ShelfError::io_with_path(e, dir)),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| ShelfError::io_with_path(e, path))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)
        .map_err(|e| ShelfError::io_with_path(e, path))?
        .permissions();
    if perms.mode() & 0o111 == 0 {
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms).map_err(|e| ShelfError::io_with_path(e, path))?;
        debug!("Set executable permissions on {}", path.display());
    }
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
