use thiserror::Error;

/// Classified failure of a single request attempt.
///
/// `is_retryable()` separates throttling and garbled responses, which are
/// worth another attempt after backing off, from outright rejections, which
/// never change on retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestFailure {
    #[error("rate limited (HTTP {status})")]
    RateLimited { status: u16 },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request rejected with HTTP {status}")]
    Rejected { status: u16 },

    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },
}

impl RequestFailure {
    pub fn is_retryable(&self) -> bool {
        match self {
            RequestFailure::RateLimited { .. } => true,
            RequestFailure::Malformed(_) => true,
            RequestFailure::Transport(_) => true,
            RequestFailure::Rejected { .. } => false,
            RequestFailure::Api { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_retryable() {
        assert!(RequestFailure::RateLimited { status: 429 }.is_retryable());
        assert!(RequestFailure::RateLimited { status: 200 }.is_retryable());
    }

    #[test]
    fn test_malformed_retryable() {
        assert!(RequestFailure::Malformed("eof".into()).is_retryable());
    }

    #[test]
    fn test_transport_retryable() {
        assert!(RequestFailure::Transport("reset".into()).is_retryable());
    }

    #[test]
    fn test_rejected_not_retryable() {
        for status in [400, 401, 403, 404, 500, 503] {
            assert!(!RequestFailure::Rejected { status }.is_retryable());
        }
    }

    #[test]
    fn test_api_failure_not_retryable() {
        let e = RequestFailure::Api {
            code: 1,
            message: "Photo not found".into(),
        };
        assert!(!e.is_retryable());
        assert_eq!(e.to_string(), "API error 1: Photo not found");
    }
}
