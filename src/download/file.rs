use std::path::Path;

use futures_util::StreamExt;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::error::DownloadError;
use super::stub::{self, STUB_LEN};
use crate::flickr::RequestExecutor;
use crate::retry::{self, RetryAction};
use crate::state::manifest::part_path;

/// Download `url` to `download_path` through a `.part` temp file.
///
/// Any stale `.part` from an earlier attempt is removed first. The body is
/// streamed to disk and only renamed into place once it is complete and is
/// not a stub; on any failure the `.part` file is removed and the final name
/// is left untouched.
pub async fn download_file(
    executor: &RequestExecutor,
    url: &str,
    download_path: &Path,
) -> Result<(), DownloadError> {
    if let Some(parent) = download_path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let part = part_path(download_path);
    let _ = fs::remove_file(&part).await;

    let result = retry::retry_with_backoff(
        executor.retry_config(),
        |e: &DownloadError| {
            if e.is_retryable() {
                RetryAction::Retry
            } else {
                RetryAction::Abort
            }
        },
        || attempt_download(executor, url, &part),
    )
    .await;

    let size_bytes = match result {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&part).await;
            return Err(e);
        }
    };
    if let Err(e) = fs::rename(&part, download_path).await {
        let _ = fs::remove_file(&part).await;
        return Err(e.into());
    }

    tracing::debug!(
        size_bytes,
        path = %download_path.display(),
        "downloaded",
    );
    Ok(())
}

/// Single attempt: stream the body into `part`, chunk by chunk.
///
/// Only the first `STUB_LEN` bytes are kept in memory, enough to recognise
/// a 200 whose body is the throttling page.
async fn attempt_download(
    executor: &RequestExecutor,
    url: &str,
    part: &Path,
) -> Result<u64, DownloadError> {
    let mut resp = executor
        .open_asset(url)
        .await
        .map_err(|e| DownloadError::from_failure(url, e))?;

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(part)
        .await?;

    let mut head: Vec<u8> = Vec::with_capacity(STUB_LEN as usize);
    let mut bytes_written: u64 = 0;
    while let Some(chunk) = resp.body.next().await {
        let chunk = chunk.map_err(|e| {
            tracing::warn!(
                "Body read error for {} (content_length={:?}, bytes_so_far={}): {:#}",
                url,
                resp.content_length,
                bytes_written,
                e
            );
            DownloadError::Transfer {
                url: url.to_string(),
                reason: format!("{e:#}"),
            }
        })?;
        if bytes_written < STUB_LEN {
            let keep = chunk.len().min((STUB_LEN - bytes_written) as usize);
            head.extend_from_slice(&chunk[..keep]);
        }
        file.write_all(&chunk).await?;
        bytes_written += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    if bytes_written == STUB_LEN && stub::is_stub_bytes(&head) {
        return Err(DownloadError::RateLimited {
            url: url.to_string(),
        });
    }
    Ok(bytes_written)
}
