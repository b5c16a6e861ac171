use thiserror::Error;

/// Errors surfaced by the API layer.
///
/// `Status` keeps the raw code so callers can tell expected steady-state
/// conditions (404 on a deleted account) apart from genuinely unexpected
/// responses, which abort the current account's processing.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("no image variant on media item {0}")]
    MalformedMedia(String),
}

impl ApiError {
    /// Whether this error is a plain "resource does not exist" response.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status: 404, .. })
    }
}
