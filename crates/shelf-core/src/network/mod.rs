//! Network access: HTTP client, latest-release lookup, archive downloads.

mod client;
mod download;
mod release;

pub use client::HttpClient;
pub use download::download_to_file;
pub use release::{GitHubReleaseFeed, ReleaseFeed, RemoteVersionResolver};
