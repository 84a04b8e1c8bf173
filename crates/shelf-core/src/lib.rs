//! Shelf Core - versioned runtime binary cache.
//!
//! Downloads Electron releases on demand into a local installation root,
//! keeps track of which versions are installed and when each was last used,
//! launches processes against a chosen version and prunes versions nobody
//! has used for a while.
//!
//! # Example
//!
//! ```rust,ignore
//! use shelf_core::{Shelf, ShelfConfig};
//!
//! #[tokio::main]
//! async fn main() -> shelf_core::Result<()> {
//!     let shelf = Shelf::new(ShelfConfig::default()).await?;
//!
//!     let version = shelf.install(None).await?;
//!     if let Some(process) = shelf.run("main.js", &version, &[]).await? {
//!         process.wait().await;
//!     }
//!     shelf.flush_usage().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod environment;
pub mod error;
pub mod installer;
pub mod metadata;
pub mod network;
pub mod platform;
pub mod process;
pub mod registry;
pub mod usage;

mod api;

pub use api::ShelfBuilder;
pub use config::ShelfConfig;
pub use error::{ErrorKind, Result, ShelfError};
pub use installer::BinaryInstaller;
pub use metadata::{JsonMapStore, MapStore, VersionMap};
pub use network::{ReleaseFeed, RemoteVersionResolver};
pub use process::{ProcessExit, RunCoordinator, RuntimeProcess, LATEST};
pub use registry::{GlobalInstall, VersionRegistry};
pub use usage::UsageLedger;

use std::sync::Arc;

/// Main entry point for Shelf operations.
///
/// Owns one instance of each component for the lifetime of the host.
pub struct Shelf {
    config: Arc<ShelfConfig>,
    resolver: Arc<RemoteVersionResolver>,
    registry: Arc<VersionRegistry>,
    installer: Arc<BinaryInstaller>,
    usage: UsageLedger,
    coordinator: RunCoordinator,
}

impl Shelf {
    /// Create a builder for Shelf.
    pub fn builder(config: ShelfConfig) -> ShelfBuilder {
        ShelfBuilder::new(config)
    }

    /// Create a Shelf with the default collaborators.
    pub async fn new(config: ShelfConfig) -> Result<Self> {
        ShelfBuilder::new(config).build().await
    }

    pub fn config(&self) -> &ShelfConfig {
        &self.config
    }

    // ========================================
    // Versions
    // ========================================

    /// Install `version` (latest when `None`). Returns the installed tag.
    pub async fn install(&self, version: Option<&str>) -> Result<String> {
        self.installer.install(version).await
    }

    /// Whether `version` (latest when `None`) is installed.
    pub async fn validate(&self, version: Option<&str>) -> Result<bool> {
        self.installer.validate(version).await
    }

    /// Installed versions, the global install included.
    pub async fn installed_versions(&self) -> Vec<String> {
        self.registry.list().await
    }

    /// Latest tag published on the release feed.
    pub async fn latest(&self) -> Result<String> {
        self.resolver.latest().await
    }

    pub fn registry(&self) -> &VersionRegistry {
        &self.registry
    }

    // ========================================
    // Processes
    // ========================================

    /// Run `file` on `version` (see [`RunCoordinator::run`]).
    pub async fn run(
        &self,
        file: impl AsRef<std::path::Path>,
        version: &str,
        args: &[String],
    ) -> Result<Option<Arc<RuntimeProcess>>> {
        self.coordinator.run(file, version, args).await
    }

    /// Live processes started by this instance.
    pub fn running(&self) -> Vec<Arc<RuntimeProcess>> {
        self.coordinator.running()
    }

    // ========================================
    // Usage
    // ========================================

    /// Remove versions idle for longer than the retention window.
    pub async fn remove_unused_versions(&self) -> Vec<String> {
        self.coordinator.remove_unused_versions().await
    }

    /// Wait for pending usage writes. Call before the host exits.
    pub async fn flush_usage(&self) {
        self.usage.flush().await
    }

    pub fn usage(&self) -> &UsageLedger {
        &self.usage
    }
}

/// Run blocking file work off the async executor.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ShelfError::Other(format!("blocking task failed: {}", e)))?
}
