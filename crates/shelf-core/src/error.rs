//! Error types for Shelf.
//!
//! Every fallible operation in the library returns [`ShelfError`]. Hosts that
//! only care about the broad failure category can match on
//! [`ShelfError::kind`].

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Shelf library.
#[derive(Debug, Error)]
pub enum ShelfError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Install directory already exists and is not empty: {0}")]
    DirectoryNotEmpty(PathBuf),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to acquire lock on {path}: {message}")]
    Lock { path: PathBuf, message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Installation errors
    #[error("Extraction of {archive} failed: {message}")]
    ExtractionFailed { archive: PathBuf, message: String },

    #[error("Runtime builds are not available on platform: {platform}")]
    UnsupportedPlatform { platform: String },

    #[error("Invalid version tag: {tag:?}")]
    InvalidVersionTag { tag: String },

    // Process errors
    #[error("Process launch failed for {file}: {message}")]
    LaunchFailed { file: String, message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Shelf operations.
pub type Result<T> = std::result::Result<T, ShelfError>;

/// Broad failure categories callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Download,
    Filesystem,
    Extraction,
    UnsupportedPlatform,
    Launch,
    InvalidInput,
    Other,
}

impl From<std::io::Error> for ShelfError {
    fn from(err: std::io::Error) -> Self {
        ShelfError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for ShelfError {
    fn from(err: serde_json::Error) -> Self {
        ShelfError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for ShelfError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ShelfError::Timeout(std::time::Duration::from_secs(0))
        } else {
            ShelfError::Network {
                message: err.to_string(),
                cause: err.url().map(|u| u.to_string()),
            }
        }
    }
}

impl ShelfError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ShelfError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Map this error onto its failure category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShelfError::Network { .. } | ShelfError::Timeout(_) => ErrorKind::Network,

            ShelfError::DownloadFailed { .. } => ErrorKind::Download,

            ShelfError::Io { .. }
            | ShelfError::DirectoryNotEmpty(_)
            | ShelfError::FileNotFound(_)
            | ShelfError::Lock { .. }
            | ShelfError::Json { .. } => ErrorKind::Filesystem,

            ShelfError::ExtractionFailed { .. } => ErrorKind::Extraction,

            ShelfError::UnsupportedPlatform { .. } => ErrorKind::UnsupportedPlatform,

            ShelfError::LaunchFailed { .. } => ErrorKind::Launch,

            ShelfError::InvalidVersionTag { .. } | ShelfError::Config { .. } => {
                ErrorKind::InvalidInput
            }

            ShelfError::Other(_) => ErrorKind::Other,
        }
    }
}
