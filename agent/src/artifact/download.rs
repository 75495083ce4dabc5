//! Streaming HTTP downloads

use std::path::Path;

use futures::StreamExt;
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::errors::AgentError;

/// Percentage of `total` covered by `downloaded`, when the total is known
pub fn percent(downloaded: u64, total: Option<u64>) -> Option<u8> {
    match total {
        Some(total) if total > 0 => Some((downloaded.saturating_mul(100) / total).min(100) as u8),
        _ => None,
    }
}

/// Stream `url` into `dest`, reporting `(bytes_so_far, content_length)` after each chunk.
/// Returns the number of bytes written.
pub async fn download_to<F>(
    client: &Client,
    url: &str,
    dest: &Path,
    mut on_progress: F,
) -> Result<u64, AgentError>
where
    F: FnMut(u64, Option<u64>),
{
    debug!("Downloading {} to {}", url, dest.display());
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AgentError::DownloadError(format!("Request to {} failed: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AgentError::DownloadError(format!(
            "Download of {} returned {}",
            url, status
        )));
    }

    let total = response.content_length();
    let mut file = fs::File::create(dest)
        .await
        .map_err(|e| AgentError::DownloadError(format!("Cannot create {}: {}", dest.display(), e)))?;

    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| AgentError::DownloadError(format!("Transfer interrupted: {}", e)))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| AgentError::DownloadError(format!("Write failed: {}", e)))?;
        downloaded += chunk.len() as u64;
        on_progress(downloaded, total);
    }

    file.flush()
        .await
        .map_err(|e| AgentError::DownloadError(format!("Write failed: {}", e)))?;
    Ok(downloaded)
}
