//! Latest-release lookup.
//!
//! The latest tag is fetched at most once per process lifetime; a failed
//! fetch is not cached and surfaces to the caller as-is.

use crate::network::client::{network_error, HttpClient};
use crate::{Result, ShelfError};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Source of the "latest release" pointer.
#[async_trait]
pub trait ReleaseFeed: Send + Sync {
    /// Fetch the tag of the newest published release.
    async fn latest_tag(&self) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: String,
}

/// Release feed backed by the GitHub "latest release" endpoint.
pub struct GitHubReleaseFeed {
    http: Arc<HttpClient>,
    url: String,
    timeout: Duration,
}

impl GitHubReleaseFeed {
    pub fn new(http: Arc<HttpClient>, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ReleaseFeed for GitHubReleaseFeed {
    async fn latest_tag(&self) -> Result<String> {
        debug!("Fetching latest release from {}", self.url);

        let response = self
            .http
            .inner()
            .get(&self.url)
            .header(ACCEPT, "application/vnd.github+json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| network_error("Release feed request failed", e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ShelfError::Network {
                message: format!("Release feed returned HTTP {}", status),
                cause: Some(self.url.clone()),
            });
        }

        let release: LatestRelease = response
            .json()
            .await
            .map_err(|e| network_error("Malformed release document", e, self.timeout))?;

        let tag = release.tag_name.trim().to_string();
        if tag.is_empty() {
            return Err(ShelfError::Network {
                message: "Release document has an empty tag_name".to_string(),
                cause: Some(self.url.clone()),
            });
        }
        Ok(tag)
    }
}

/// Resolves and caches the latest version tag.
pub struct RemoteVersionResolver {
    feed: Arc<dyn ReleaseFeed>,
    latest: OnceCell<String>,
}

impl RemoteVersionResolver {
    pub fn new(feed: Arc<dyn ReleaseFeed>) -> Self {
        Self {
            feed,
            latest: OnceCell::new(),
        }
    }

    /// The latest tag, fetched on first use.
    pub async fn latest(&self) -> Result<String> {
        self.latest
            .get_or_try_init(|| async {
                let tag = self.feed.latest_tag().await?;
                info!("Latest release is {}", tag);
                Ok::<_, ShelfError>(tag)
            })
            .await
            .cloned()
    }

    /// The cached tag, without touching the network.
    pub fn cached(&self) -> Option<&str> {
        self.latest.get().map(String::as_str)
    }
}
