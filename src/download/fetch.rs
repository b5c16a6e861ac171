//! Retrieval engine: a single idempotent media fetch.
//!
//! The core correctness property is the existence check up front: a
//! destination already on disk short-circuits without any network call, so
//! re-running the mirror against unchanged remote state costs nothing.

use std::path::Path;
use std::time::{Duration, SystemTime};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::error::FetchError;
use crate::instagram::Session;
use crate::retry::{self, RetryAction, RetryConfig};

/// Result of one retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded,
    /// The destination file already exists; nothing was requested.
    SkippedExists,
    /// The remote reports the asset permanently gone (404/410).
    SkippedGone,
    /// Server errors persisted past the retry bound; logged, not raised.
    Failed,
}

enum Attempt {
    Downloaded,
    Gone,
}

/// Fetch `url` into `dest`.
///
/// - Existing destination and `force == false`: `SkippedExists`, no request.
/// - 404/410: `SkippedGone`, immediately, non-retryable.
/// - 5xx and dropped transfers: retried up to the configured bound with the
///   fixed inter-request delay, then `Failed`.
/// - Any other non-success status: a hard error for the caller.
/// - On success the body is streamed to `dest` and `captured_at` (unix
///   seconds), when given, is applied to the file's timestamps best-effort.
pub async fn fetch(
    session: &dyn Session,
    url: &str,
    dest: &Path,
    captured_at: Option<i64>,
    force: bool,
    retry_config: &RetryConfig,
) -> Result<FetchOutcome, FetchError> {
    if !force && dest.exists() {
        debug!(path = %dest.display(), "Already exists, skipping");
        return Ok(FetchOutcome::SkippedExists);
    }

    let result = retry::retry_fixed(
        retry_config,
        |e: &FetchError| {
            if e.is_retryable() {
                RetryAction::Retry
            } else {
                RetryAction::Abort
            }
        },
        || attempt_fetch(session, url, dest),
    )
    .await;

    match result {
        Ok(Attempt::Downloaded) => {
            if let Some(ts) = captured_at.filter(|ts| *ts > 0) {
                if let Err(e) = set_file_times(dest, ts) {
                    debug!(path = %dest.display(), "Could not set file times: {e}");
                }
            }
            Ok(FetchOutcome::Downloaded)
        }
        Ok(Attempt::Gone) => {
            info!(url, "Remote reports asset gone, skipping");
            Ok(FetchOutcome::SkippedGone)
        }
        Err(e) if e.is_retryable() => {
            warn!(url, error = %e, "Retries exhausted, skipping asset");
            Ok(FetchOutcome::Failed)
        }
        Err(e) => Err(e),
    }
}

/// One download attempt. A partial file left by a failed attempt is removed
/// so the existence check never mistakes it for a completed download.
async fn attempt_fetch(
    session: &dyn Session,
    url: &str,
    dest: &Path,
) -> Result<Attempt, FetchError> {
    let response = session.get_media(url).await?;
    match response.status {
        404 | 410 => return Ok(Attempt::Gone),
        s if (200..300).contains(&s) => {}
        s => {
            return Err(FetchError::Status {
                status: s,
                url: url.to_owned(),
            })
        }
    }

    if let Err(e) = write_body(response.body, url, dest).await {
        let _ = tokio::fs::remove_file(dest).await;
        return Err(e);
    }
    Ok(Attempt::Downloaded)
}

async fn write_body(
    mut body: futures_util::stream::BoxStream<'static, std::io::Result<bytes::Bytes>>,
    url: &str,
    dest: &Path,
) -> Result<(), FetchError> {
    let disk = |source: std::io::Error| FetchError::Disk {
        path: dest.display().to_string(),
        source,
    };

    let mut file = tokio::fs::File::create(dest).await.map_err(disk)?;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|source| FetchError::Transfer {
            url: url.to_owned(),
            source,
        })?;
        file.write_all(&chunk).await.map_err(disk)?;
    }
    file.flush().await.map_err(disk)?;
    Ok(())
}

/// Apply the capture timestamp to the file. Creation time is only settable
/// on some platforms; elsewhere the modification time is what we get.
fn set_file_times(dest: &Path, unix_secs: i64) -> std::io::Result<()> {
    let ts = SystemTime::UNIX_EPOCH + Duration::from_secs(unix_secs.max(0) as u64);
    let times = std::fs::FileTimes::new()
        .set_accessed(ts)
        .set_modified(ts);
    #[cfg(windows)]
    let times = {
        use std::os::windows::fs::FileTimesExt;
        times.set_created(ts)
    };
    let file = std::fs::OpenOptions::new().write(true).open(dest)?;
    file.set_times(times)
}
