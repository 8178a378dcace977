use thiserror::Error;

use crate::flickr::error::RequestFailure;

/// Typed asset download errors.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP error {status} downloading {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Rate limited downloading {url}")]
    RateLimited { url: String },

    #[error("Transfer of {url} failed: {reason}")]
    Transfer { url: String, reason: String },

    #[error("Downloaded file {0} is a rate-limit placeholder")]
    StubPayload(String),

    #[error("Disk error: {0}")]
    Disk(#[from] std::io::Error),
}

impl DownloadError {
    /// Translate a failed asset request attempt.
    pub fn from_failure(url: &str, failure: RequestFailure) -> Self {
        let url = url.to_string();
        match failure {
            RequestFailure::Rejected { status } => DownloadError::HttpStatus { status, url },
            RequestFailure::RateLimited { .. } => DownloadError::RateLimited { url },
            other => DownloadError::Transfer {
                url,
                reason: other.to_string(),
            },
        }
    }

    /// Throttling and interrupted transfers are worth another attempt;
    /// rejections and local disk failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::RateLimited { .. } | DownloadError::Transfer { .. } => true,
            DownloadError::HttpStatus { .. }
            | DownloadError::StubPayload(_)
            | DownloadError::Disk(_) => false,
        }
    }
}
