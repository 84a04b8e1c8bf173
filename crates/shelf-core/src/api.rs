//! Builder for configuring Shelf initialization.

use crate::config::ShelfConfig;
use crate::error::{Result, ShelfError};
use crate::installer::BinaryInstaller;
use crate::metadata::{JsonMapStore, MapStore};
use crate::network::{GitHubReleaseFeed, HttpClient, ReleaseFeed, RemoteVersionResolver};
use crate::process::RunCoordinator;
use crate::registry::VersionRegistry;
use crate::usage::UsageLedger;
use crate::Shelf;
use std::sync::Arc;
use tracing::debug;

/// Builder for [`Shelf`].
///
/// Every collaborator defaults to the production implementation derived from
/// the [`ShelfConfig`]; tests and embedders can swap in their own.
///
/// # Example
///
/// ```rust,ignore
/// use shelf_core::{Shelf, ShelfConfig};
///
/// let shelf = Shelf::builder(ShelfConfig::new("/var/cache/shelf"))
///     .auto_create_dirs(true)
///     .build()
///     .await?;
/// ```
pub struct ShelfBuilder {
    config: ShelfConfig,
    auto_create_dirs: bool,
    release_feed: Option<Arc<dyn ReleaseFeed>>,
    versions_store: Option<Arc<dyn MapStore>>,
    usage_store: Option<Arc<dyn MapStore>>,
}

impl ShelfBuilder {
    pub fn new(config: ShelfConfig) -> Self {
        Self {
            config,
            auto_create_dirs: true,
            release_feed: None,
            versions_store: None,
            usage_store: None,
        }
    }

    /// Create the installation root if it does not exist.
    ///
    /// Default: `true`
    pub fn auto_create_dirs(mut self, enable: bool) -> Self {
        self.auto_create_dirs = enable;
        self
    }

    /// Use `feed` instead of the configured release endpoint.
    pub fn with_release_feed(mut self, feed: Arc<dyn ReleaseFeed>) -> Self {
        self.release_feed = Some(feed);
        self
    }

    /// Use `store` for the version → executable map.
    pub fn with_versions_store(mut self, store: Arc<dyn MapStore>) -> Self {
        self.versions_store = Some(store);
        self
    }

    /// Use `store` for the version → last-used map.
    pub fn with_usage_store(mut self, store: Arc<dyn MapStore>) -> Self {
        self.usage_store = Some(store);
        self
    }

    /// Assemble the components.
    pub async fn build(self) -> Result<Shelf> {
        let config = Arc::new(self.config);

        if self.auto_create_dirs {
            tokio::fs::create_dir_all(&config.install_root)
                .await
                .map_err(|e| ShelfError::io_with_path(e, &config.install_root))?;
        } else if !config.install_root.is_dir() {
            return Err(ShelfError::Config {
                message: format!(
                    "installation root {} does not exist",
                    config.install_root.display()
                ),
            });
        }

        let http = Arc::new(HttpClient::new()?);
        let feed: Arc<dyn ReleaseFeed> = match self.release_feed {
            Some(feed) => feed,
            None => Arc::new(GitHubReleaseFeed::new(
                http.clone(),
                config.release_feed_url.clone(),
                config.request_timeout,
            )),
        };
        let versions_store: Arc<dyn MapStore> = match self.versions_store {
            Some(store) => store,
            None => Arc::new(JsonMapStore::new(config.versions_path())),
        };
        let usage_store: Arc<dyn MapStore> = match self.usage_store {
            Some(store) => store,
            None => Arc::new(JsonMapStore::new(config.usage_path())),
        };

        let resolver = Arc::new(RemoteVersionResolver::new(feed));
        let registry = Arc::new(VersionRegistry::new(versions_store, &config));
        let installer = Arc::new(BinaryInstaller::new(
            config.clone(),
            registry.clone(),
            resolver.clone(),
            http,
        ));
        let usage = UsageLedger::new(usage_store);
        let coordinator = RunCoordinator::new(
            config.clone(),
            resolver.clone(),
            installer.clone(),
            registry.clone(),
            usage.clone(),
        );

        debug!(
            "Shelf ready at {} for {}",
            config.install_root.display(),
            registry.platform()
        );

        Ok(Shelf {
            config,
            resolver,
            registry,
            installer,
            usage,
            coordinator,
        })
    }
}
