use thiserror::Error;

use crate::instagram::ApiError;

/// Typed retrieval errors enabling retry classification.
///
/// `is_retryable()` separates transient failures (server errors, dropped
/// transfers) from permanent ones (unexpected statuses, disk failures) so
/// the bounded retry loop can abort early.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} fetching {url}")]
    Status { status: u16, url: String },

    #[error("transfer failed for {url}: {source}")]
    Transfer {
        url: String,
        source: std::io::Error,
    },

    #[error("disk error at {path}: {source}")]
    Disk {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl FetchError {
    /// Whether this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::Transfer { .. } => true,
            FetchError::Api(ApiError::Transport(_)) => true,
            FetchError::Disk { .. } | FetchError::Api(_) => false,
        }
    }
}
