//! Streaming archive download.

use crate::network::client::HttpClient;
use crate::{Result, ShelfError};
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Stream `url` into a newly created file at `dest`.
///
/// The destination must not exist. Every wait on the network (response
/// headers and each body chunk) is bounded by `stall_timeout`. Returns the
/// number of bytes written.
pub async fn download_to_file(
    http: &HttpClient,
    url: &str,
    dest: &Path,
    stall_timeout: Duration,
) -> Result<u64> {
    info!("Download from: {} ...", url);

    let failed = |message: String| ShelfError::DownloadFailed {
        url: url.to_string(),
        message,
    };

    let response = tokio::time::timeout(stall_timeout, http.inner().get(url).send())
        .await
        .map_err(|_| failed(format!("no response within {:?}", stall_timeout)))?
        .map_err(|e| failed(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(failed(format!("server returned HTTP {}", status)));
    }
    let total = response.content_length();

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)
        .await
        .map_err(|e| ShelfError::io_with_path(e, dest))?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    loop {
        let next = tokio::time::timeout(stall_timeout, stream.next())
            .await
            .map_err(|_| failed(format!("stalled for {:?}", stall_timeout)))?;
        let Some(chunk) = next else { break };
        let chunk = chunk.map_err(|e| failed(format!("error reading body: {}", e)))?;

        file.write_all(&chunk)
            .await
            .map_err(|e| ShelfError::io_with_path(e, dest))?;
        downloaded += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| ShelfError::io_with_path(e, dest))?;
    file.sync_all()
        .await
        .map_err(|e| ShelfError::io_with_path(e, dest))?;

    if let Some(total) = total {
        if total != downloaded {
            return Err(failed(format!(
                "truncated body: expected {} bytes, got {}",
                total, downloaded
            )));
        }
    }

    debug!("Wrote {} bytes to {}", downloaded, dest.display());
    info!("Download completed");
    Ok(downloaded)
}
