//! Centralized configuration for Shelf.
//!
//! Fixed constants live on the unit structs ([`NetworkConfig`],
//! [`InstallationConfig`], [`PathsConfig`]); everything a host may want to
//! change is on [`ShelfConfig`], which is passed once at construction time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
    /// Longest gap between two archive chunks before a download is abandoned.
    pub const DOWNLOAD_STALL_TIMEOUT: Duration = Duration::from_secs(60);
    pub const USER_AGENT: &'static str = "shelf/0.3";
    pub const RELEASE_FEED_URL: &'static str =
        "https://api.github.com/repos/electron/electron/releases/latest";
    pub const DOWNLOAD_BASE_URL: &'static str =
        "https://github.com/electron/electron/releases/download";
}

/// Configuration for the installation process.
pub struct InstallationConfig;

impl InstallationConfig {
    pub const RUNTIME_NAME: &'static str = "electron";
    pub const ARCH: &'static str = "x64";
    pub const EXTRACT_COMMAND: &'static str = "tar";
    pub const EXTRACT_TIMEOUT: Duration = Duration::from_secs(300);
    pub const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_RETENTION: Duration = Duration::from_secs(14 * 24 * 60 * 60);
}

/// Names of files and directories inside the installation root.
pub struct PathsConfig;

impl PathsConfig {
    pub const VERSIONS_FILE_NAME: &'static str = "versions";
    pub const USAGE_FILE_NAME: &'static str = "usage";
    pub const INSTALL_DIR_PREFIX: &'static str = "electron";
    pub const ROOT_DIR_NAME: &'static str = "shelf";
    pub const LOCK_SUFFIX: &'static str = "lock";
}

/// Runtime configuration for a [`crate::Shelf`] instance.
#[derive(Debug, Clone)]
pub struct ShelfConfig {
    /// Directory holding the persisted maps and the unpacked runtimes.
    pub install_root: PathBuf,
    /// Endpoint returning the latest release document.
    pub release_feed_url: String,
    /// Base URL that archives are downloaded from.
    pub download_base_url: String,
    /// Runtime name used in archive names (`electron`).
    pub runtime_name: String,
    /// Architecture used in archive names.
    pub arch: String,
    /// Host platform identifier override (`linux`, `darwin`, `win32`, ...).
    pub platform: Option<String>,
    /// Prefix of per-version install directories.
    pub install_dir_prefix: String,
    /// System-wide command checked for a global install. `None` disables the check.
    pub global_command: Option<String>,
    /// Extra variables applied on top of the stripped host environment.
    pub env_overrides: HashMap<String, String>,
    /// Where child stdout/stderr are written. `None` discards them.
    pub log_dir: Option<PathBuf>,
    pub request_timeout: Duration,
    pub download_stall_timeout: Duration,
    pub extract_timeout: Duration,
    pub version_check_timeout: Duration,
    /// Versions idle for longer than this are eligible for removal.
    pub retention_window: Duration,
}

impl Default for ShelfConfig {
    fn default() -> Self {
        let install_root = dirs::data_dir()
            .map(|dir| dir.join(PathsConfig::ROOT_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(".").join(PathsConfig::ROOT_DIR_NAME));
        Self::new(install_root)
    }
}

impl ShelfConfig {
    /// Create a configuration rooted at `install_root` with default settings.
    pub fn new(install_root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
            release_feed_url: NetworkConfig::RELEASE_FEED_URL.to_string(),
            download_base_url: NetworkConfig::DOWNLOAD_BASE_URL.to_string(),
            runtime_name: InstallationConfig::RUNTIME_NAME.to_string(),
            arch: InstallationConfig::ARCH.to_string(),
            platform: None,
            install_dir_prefix: PathsConfig::INSTALL_DIR_PREFIX.to_string(),
            global_command: Some(default_global_command().to_string()),
            env_overrides: HashMap::new(),
            log_dir: None,
            request_timeout: NetworkConfig::REQUEST_TIMEOUT,
            download_stall_timeout: NetworkConfig::DOWNLOAD_STALL_TIMEOUT,
            extract_timeout: InstallationConfig::EXTRACT_TIMEOUT,
            version_check_timeout: InstallationConfig::VERSION_CHECK_TIMEOUT,
            retention_window: InstallationConfig::DEFAULT_RETENTION,
        }
    }

    /// Set the release feed URL.
    pub fn with_release_feed_url(mut self, url: impl Into<String>) -> Self {
        self.release_feed_url = url.into();
        self
    }

    /// Set the archive download base URL.
    pub fn with_download_base_url(mut self, url: impl Into<String>) -> Self {
        self.download_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the host platform identifier.
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Set (or disable with `None`) the command checked for a global install.
    pub fn with_global_command(mut self, command: Option<String>) -> Self {
        self.global_command = command;
        self
    }

    /// Add an environment variable for spawned processes.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_overrides.insert(key.into(), value.into());
        self
    }

    /// Set the directory child output is logged to.
    pub fn with_log_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.log_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set the retention window used by the unused-version sweep.
    pub fn with_retention_window(mut self, window: Duration) -> Self {
        self.retention_window = window;
        self
    }

    /// Set the extraction timeout.
    pub fn with_extract_timeout(mut self, timeout: Duration) -> Self {
        self.extract_timeout = timeout;
        self
    }

    /// Set the feed request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Give up on a download when no bytes arrive for `timeout`.
    pub fn with_download_stall_timeout(mut self, timeout: Duration) -> Self {
        self.download_stall_timeout = timeout;
        self
    }

    pub fn with_version_check_timeout(mut self, timeout: Duration) -> Self {
        self.version_check_timeout = timeout;
        self
    }

    /// The effective host platform identifier.
    pub fn platform(&self) -> String {
        self.platform
            .clone()
            .unwrap_or_else(|| crate::platform::host_platform().to_string())
    }

    pub fn versions_path(&self) -> PathBuf {
        self.install_root.join(PathsConfig::VERSIONS_FILE_NAME)
    }

    pub fn usage_path(&self) -> PathBuf {
        self.install_root.join(PathsConfig::USAGE_FILE_NAME)
    }

    /// Directory a given version is unpacked into.
    pub fn install_dir(&self, version: &str) -> PathBuf {
        self.install_root
            .join(format!("{}_{}", self.install_dir_prefix, version))
    }
}

fn default_global_command() -> &'static str {
    if cfg!(windows) {
        "electron.cmd"
    } else {
        "electron"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_live_under_root() {
        let config = ShelfConfig::new("/opt/shelf");
        assert_eq!(config.versions_path(), PathBuf::from("/opt/shelf/versions"));
        assert_eq!(config.usage_path(), PathBuf::from("/opt/shelf/usage"));
        assert_eq!(
            config.install_dir("11.1.0"),
            PathBuf::from("/opt/shelf/electron_11.1.0")
        );
    }

    #[test]
    fn test_download_base_is_normalized() {
        let config = ShelfConfig::new("/opt/shelf").with_download_base_url("http://mirror/dl/");
        assert_eq!(config.download_base_url, "http://mirror/dl");
    }

    #[test]
    fn test_timeouts_are_reasonable() {
        assert!(InstallationConfig::EXTRACT_TIMEOUT > Duration::from_secs(60));
        assert!(NetworkConfig::REQUEST_TIMEOUT > Duration::ZERO);
        assert_eq!(
            InstallationConfig::DEFAULT_RETENTION,
            Duration::from_secs(1_209_600)
        );
    }

    #[test]
    fn test_timeout_builders() {
        let config = ShelfConfig::new("/opt/shelf")
            .with_request_timeout(Duration::from_millis(100))
            .with_download_stall_timeout(Duration::from_millis(200))
            .with_extract_timeout(Duration::from_millis(300))
            .with_version_check_timeout(Duration::from_millis(400));
        assert_eq!(config.request_timeout, Duration::from_millis(100));
        assert_eq!(config.download_stall_timeout, Duration::from_millis(200));
        assert_eq!(config.extract_timeout, Duration::from_millis(300));
        assert_eq!(config.version_check_timeout, Duration::from_millis(400));
    }

    #[test]
    fn test_platform_override() {
        let config = ShelfConfig::new("/opt/shelf").with_platform("win32");
        assert_eq!(config.platform(), "win32");
    }
}
