//! Streaming HTTP downloads for large binary inputs (PTAU files, zkeys).

use std::path::Path;

use anyhow::anyhow;
use forge_common::{Error, Result};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Download `url` to `dest`, streaming to a uniquely named staging file
/// that is renamed into place only when the transfer completes. Concurrent
/// callers fetching the same `dest` each stream into their own staging
/// file, so a finished `dest` is always one complete transfer. A non-2xx
/// response or transport error is fatal; no partial file remains.
pub async fn download_file(client: &reqwest::Client, url: &str, dest: &Path) -> Result<()> {
    let response = client.get(url).send().await.map_err(|e| Error::Transfer {
        url: url.to_string(),
        source: anyhow!(e),
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Download {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let dir = dest
        .parent()
        .ok_or_else(|| anyhow!("download target {} has no parent", dest.display()))?;
    // Dropped (and deleted) automatically if the transfer fails mid-stream.
    let staging = tempfile::NamedTempFile::new_in(dir)?;

    let mut file = tokio::fs::File::create(staging.path()).await?;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::Transfer {
            url: url.to_string(),
            source: anyhow!(e),
        })?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    staging.persist(dest).map_err(|e| Error::Io(e.error))?;
    info!("Downloaded {} to {}", url, dest.display());
    Ok(())
}
