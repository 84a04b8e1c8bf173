//! Shared HTTP client.
//!
//! Wraps reqwest with the connect timeout and user agent every Shelf
//! request uses. No overall request timeout is set on the client itself:
//! archives can take minutes, so callers apply per-request or per-chunk
//! timeouts instead.

use crate::config::NetworkConfig;
use crate::{Result, ShelfError};
use reqwest::Client;
use std::time::Duration;

/// HTTP client shared by the release feed and the installer.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_connect_timeout(NetworkConfig::CONNECT_TIMEOUT)
    }

    /// Create a new HTTP client with a custom connect timeout.
    pub fn with_connect_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| ShelfError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: Some(e.to_string()),
            })?;

        Ok(Self { client })
    }

    /// Get a reference to the underlying reqwest client.
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// Convert a reqwest failure into a network error with context.
pub(crate) fn network_error(context: &str, err: reqwest::Error, timeout: Duration) -> ShelfError {
    if err.is_timeout() {
        ShelfError::Timeout(timeout)
    } else {
        ShelfError::Network {
            message: format!("{}: {}", context, err),
            cause: err.url().map(|u| u.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builds() {
        assert!(HttpClient::new().is_ok());
        assert!(HttpClient::with_connect_timeout(Duration::from_millis(250)).is_ok());
    }
}
