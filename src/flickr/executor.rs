//! Request executor: one logical request, classified, retried with backoff.
//!
//! Every failure is turned into a terminal [`RequestOutcome`] rather than
//! propagated, so callers always pick an explicit fallback (a sentinel for
//! metadata, a Failed counter for assets) and the run carries on.
//!
//! Asset bodies are streamed, so their retry loop sits with the code that
//! consumes the body (`download::file`); it uses [`RequestExecutor::open_asset`]
//! and the same [`RetryConfig`].

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::RequestFailure;
use super::session::{ApiSession, RawResponse, StreamedResponse};
use super::types::ApiEnvelope;
use crate::download::stub;
use crate::retry::{self, RetryAction, RetryConfig};

/// Terminal result of a logical request after retries.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome<T> {
    Success(T),
    RateLimited,
    TransientError(String),
    PermanentError(u16),
    MalformedResponse(String),
    /// Well-formed response whose own status reports failure.
    ApiFailure { code: i64, message: String },
}

impl<T> RequestOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, RequestOutcome::Success(_))
    }

    /// Human readable reason for a non-success outcome.
    pub fn describe(&self) -> String {
        match self {
            RequestOutcome::Success(_) => "ok".to_string(),
            RequestOutcome::RateLimited => "rate limited after all retries".to_string(),
            RequestOutcome::TransientError(e) => format!("transport error: {e}"),
            RequestOutcome::PermanentError(status) => format!("HTTP {status}"),
            RequestOutcome::MalformedResponse(e) => format!("malformed response: {e}"),
            RequestOutcome::ApiFailure { code, message } => format!("API error {code}: {message}"),
        }
    }
}

impl<T> From<Result<T, RequestFailure>> for RequestOutcome<T> {
    fn from(result: Result<T, RequestFailure>) -> Self {
        match result {
            Ok(v) => RequestOutcome::Success(v),
            Err(RequestFailure::RateLimited { .. }) => RequestOutcome::RateLimited,
            Err(RequestFailure::Malformed(e)) => RequestOutcome::MalformedResponse(e),
            Err(RequestFailure::Transport(e)) => RequestOutcome::TransientError(e),
            Err(RequestFailure::Rejected { status }) => RequestOutcome::PermanentError(status),
            Err(RequestFailure::Api { code, message }) => {
                RequestOutcome::ApiFailure { code, message }
            }
        }
    }
}

/// Sends requests through an [`ApiSession`] under a retry policy.
///
/// Holds no filesystem state; the session is shared so a run's listing,
/// metadata and asset requests all go through one client.
#[derive(Clone)]
pub struct RequestExecutor {
    session: Arc<dyn ApiSession>,
    retry: RetryConfig,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

fn classify_for_retry(e: &RequestFailure) -> RetryAction {
    if e.is_retryable() {
        RetryAction::Retry
    } else {
        RetryAction::Abort
    }
}

impl RequestExecutor {
    pub fn new(session: Arc<dyn ApiSession>, retry: RetryConfig) -> Self {
        Self { session, retry }
    }

    /// Execute a structured API call and decode its payload as `T`.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> RequestOutcome<T> {
        retry::retry_with_backoff(&self.retry, classify_for_retry, || async {
            let resp = self.send(url, query).await?;
            let value = classify_api_response(&resp)?;
            serde_json::from_value::<T>(value)
                .map_err(|e| RequestFailure::Malformed(format!("unexpected shape: {e}")))
        })
        .await
        .into()
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// One attempt at an asset: send the GET and classify its status. The
    /// body is left unread for the caller to stream.
    pub async fn open_asset(&self, url: &str) -> Result<StreamedResponse, RequestFailure> {
        let resp = self
            .session
            .get_stream(url)
            .await
            .map_err(|e| RequestFailure::Transport(format!("{e:#}")))?;
        classify_asset_status(resp.status)?;
        Ok(resp)
    }

    async fn send(&self, url: &str, query: &[(&str, &str)]) -> Result<RawResponse, RequestFailure> {
        self.session
            .get(url, query)
            .await
            .map_err(|e| RequestFailure::Transport(format!("{e:#}")))
    }
}

/// Classify a raw API response.
///
/// HTML bodies and HTTP 429 mean throttling; any other non-2xx status is a
/// rejection; a 2xx body that isn't a JSON object with `stat` is malformed;
/// `stat != "ok"` is a typed API failure.
pub fn classify_api_response(resp: &RawResponse) -> Result<Value, RequestFailure> {
    if resp.status == 429 || stub::looks_like_html(&resp.body) {
        return Err(RequestFailure::RateLimited {
            status: resp.status,
        });
    }
    if !resp.is_success() {
        return Err(RequestFailure::Rejected {
            status: resp.status,
        });
    }
    let value: Value = serde_json::from_slice(&resp.body)
        .map_err(|e| RequestFailure::Malformed(e.to_string()))?;
    let envelope: ApiEnvelope = serde_json::from_value(value.clone())
        .map_err(|e| RequestFailure::Malformed(e.to_string()))?;
    match envelope.stat.as_deref() {
        Some("ok") => Ok(value),
        Some(_) => Err(RequestFailure::Api {
            code: envelope.code.unwrap_or(-1),
            message: envelope.message.unwrap_or_else(|| "unknown error".to_string()),
        }),
        None => Err(RequestFailure::Malformed("missing stat field".to_string())),
    }
}

/// Classify an asset response status. A 200 still has to pass the stub
/// check once its body has been read.
pub fn classify_asset_status(status: u16) -> Result<(), RequestFailure> {
    match status {
        200 => Ok(()),
        429 => Err(RequestFailure::RateLimited { status }),
        status => Err(RequestFailure::Rejected { status }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flickr::session::testing::ScriptedSession;
    use std::time::Duration;

    fn instant_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_secs: 0,
            max_delay_secs: 0,
            jitter_secs: 0,
        }
    }

    fn executor(session: &Arc<ScriptedSession>, retry: RetryConfig) -> RequestExecutor {
        RequestExecutor::new(session.clone() as Arc<dyn ApiSession>, retry)
    }

    #[test]
    fn test_classify_ok() {
        let resp = RawResponse::new(200, r#"{"person":{"id":"1"},"stat":"ok"}"#);
        let value = classify_api_response(&resp).unwrap();
        assert_eq!(value["person"]["id"], "1");
    }

    #[test]
    fn test_classify_http_429() {
        let resp = RawResponse::new(429, "slow down");
        assert_eq!(
            classify_api_response(&resp),
            Err(RequestFailure::RateLimited { status: 429 })
        );
    }

    #[test]
    fn test_classify_html_body_on_200() {
        let resp = RawResponse::new(200, stub::RATE_LIMIT_PAGE);
        assert_eq!(
            classify_api_response(&resp),
            Err(RequestFailure::RateLimited { status: 200 })
        );
    }

    #[test]
    fn test_classify_other_status_rejected() {
        for status in [400, 403, 404, 500, 502] {
            let resp = RawResponse::new(status, "{}");
            assert_eq!(
                classify_api_response(&resp),
                Err(RequestFailure::Rejected { status })
            );
        }
    }

    #[test]
    fn test_classify_truncated_json_malformed() {
        let resp = RawResponse::new(200, r#"{"photos": {"page": 1"#);
        assert!(matches!(
            classify_api_response(&resp),
            Err(RequestFailure::Malformed(_))
        ));
    }

    #[test]
    fn test_classify_missing_stat_malformed() {
        let resp = RawResponse::new(200, r#"{"photos": {}}"#);
        assert!(matches!(
            classify_api_response(&resp),
            Err(RequestFailure::Malformed(_))
        ));
    }

    #[test]
    fn test_classify_api_failure() {
        let resp =
            RawResponse::new(200, r#"{"stat":"fail","code":2,"message":"Permission denied"}"#);
        assert_eq!(
            classify_api_response(&resp),
            Err(RequestFailure::Api {
                code: 2,
                message: "Permission denied".into()
            })
        );
    }

    #[test]
    fn test_classify_json_mentioning_marker_is_ok() {
        let resp = RawResponse::new(
            200,
            r#"{"photos":{"page":1,"pages":1,"total":1,"photo":[{"id":"1","title":"429 Too Many Requests"}]},"stat":"ok"}"#,
        );
        let value = classify_api_response(&resp).unwrap();
        assert_eq!(value["photos"]["photo"][0]["title"], "429 Too Many Requests");
    }

    #[test]
    fn test_classify_asset_status() {
        assert_eq!(classify_asset_status(200), Ok(()));
        assert_eq!(
            classify_asset_status(429),
            Err(RequestFailure::RateLimited { status: 429 })
        );
        for status in [204, 404, 500] {
            assert_eq!(
                classify_asset_status(status),
                Err(RequestFailure::Rejected { status })
            );
        }
    }

    #[tokio::test]
    async fn test_execute_success_decodes() {
        let session = Arc::new(ScriptedSession::ok(vec![RawResponse::new(
            200,
            r#"{"stat":"ok","value":5}"#,
        )]));
        let outcome: RequestOutcome<Value> =
            executor(&session, instant_retry(3)).execute("http://api", &[]).await;
        let RequestOutcome::Success(value) = outcome else {
            panic!("expected success, got {outcome:?}");
        };
        assert_eq!(value["value"], 5);
        assert_eq!(session.call_count(), 1);
    }

    #[tokio::test]
    async fn test_execute_rate_limited_exhausts_attempts() {
        let session = Arc::new(ScriptedSession::ok(vec![
            RawResponse::new(429, ""),
            RawResponse::new(429, ""),
            RawResponse::new(429, ""),
            RawResponse::new(200, r#"{"stat":"ok"}"#),
        ]));
        let outcome: RequestOutcome<Value> =
            executor(&session, instant_retry(3)).execute("http://api", &[]).await;
        assert_eq!(outcome, RequestOutcome::RateLimited);
        assert_eq!(session.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_backoff_schedule() {
        let session = Arc::new(ScriptedSession::ok(vec![
            RawResponse::new(429, ""),
            RawResponse::new(429, ""),
            RawResponse::new(429, ""),
        ]));
        let retry = RetryConfig {
            max_attempts: 3,
            base_delay_secs: 30,
            max_delay_secs: 960,
            jitter_secs: 0,
        };
        let started = tokio::time::Instant::now();
        let outcome: RequestOutcome<Value> =
            executor(&session, retry).execute("http://api", &[]).await;
        let elapsed = started.elapsed();
        assert_eq!(outcome, RequestOutcome::RateLimited);
        assert_eq!(session.call_count(), 3);
        // base, then 2 x base
        assert!(elapsed >= Duration::from_secs(90), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(91), "{elapsed:?}");
    }

    #[tokio::test]
    async fn test_execute_malformed_then_ok() {
        let session = Arc::new(ScriptedSession::ok(vec![
            RawResponse::new(200, "{garbage"),
            RawResponse::new(200, r#"{"stat":"ok","n":1}"#),
        ]));
        let outcome: RequestOutcome<Value> =
            executor(&session, instant_retry(3)).execute("http://api", &[]).await;
        assert!(outcome.is_success());
        assert_eq!(session.call_count(), 2);
    }

    #[tokio::test]
    async fn test_execute_wrong_shape_is_malformed() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Needs {
            photos: u32,
        }
        let session = Arc::new(ScriptedSession::ok(vec![
            RawResponse::new(200, r#"{"stat":"ok"}"#),
            RawResponse::new(200, r#"{"stat":"ok"}"#),
        ]));
        let outcome: RequestOutcome<Needs> =
            executor(&session, instant_retry(2)).execute("http://api", &[]).await;
        assert!(matches!(outcome, RequestOutcome::MalformedResponse(_)));
        assert_eq!(session.call_count(), 2);
    }

    #[tokio::test]
    async fn test_execute_permanent_error_not_retried() {
        let session = Arc::new(ScriptedSession::ok(vec![
            RawResponse::new(500, ""),
            RawResponse::new(200, r#"{"stat":"ok"}"#),
        ]));
        let outcome: RequestOutcome<Value> =
            executor(&session, instant_retry(3)).execute("http://api", &[]).await;
        assert_eq!(outcome, RequestOutcome::PermanentError(500));
        assert_eq!(session.call_count(), 1);
    }

    #[tokio::test]
    async fn test_execute_api_failure_not_retried() {
        let session = Arc::new(ScriptedSession::ok(vec![RawResponse::new(
            200,
            r#"{"stat":"fail","code":1,"message":"Photo not found"}"#,
        )]));
        let outcome: RequestOutcome<Value> =
            executor(&session, instant_retry(3)).execute("http://api", &[]).await;
        assert_eq!(
            outcome,
            RequestOutcome::ApiFailure {
                code: 1,
                message: "Photo not found".into()
            }
        );
        assert_eq!(session.call_count(), 1);
    }

    #[tokio::test]
    async fn test_execute_transport_error_retried() {
        let session = Arc::new(ScriptedSession::new(vec![
            Err(anyhow::anyhow!("connection reset")),
            Ok(RawResponse::new(200, r#"{"stat":"ok"}"#)),
        ]));
        let outcome: RequestOutcome<Value> =
            executor(&session, instant_retry(3)).execute("http://api", &[]).await;
        assert!(outcome.is_success());
        assert_eq!(session.call_count(), 2);
    }

    #[tokio::test]
    async fn test_open_asset_single_attempt() {
        let session = Arc::new(ScriptedSession::new(vec![
            Ok(RawResponse::new(429, "")),
            Ok(RawResponse::new(404, "")),
            Err(anyhow::anyhow!("connection reset")),
            Ok(RawResponse::new(200, vec![9u8; 10])),
        ]));
        let ex = executor(&session, instant_retry(5));
        assert_eq!(
            ex.open_asset("http://cdn/a.jpg").await.unwrap_err(),
            RequestFailure::RateLimited { status: 429 }
        );
        assert_eq!(
            ex.open_asset("http://cdn/a.jpg").await.unwrap_err(),
            RequestFailure::Rejected { status: 404 }
        );
        assert!(matches!(
            ex.open_asset("http://cdn/a.jpg").await,
            Err(RequestFailure::Transport(_))
        ));
        let resp = ex.open_asset("http://cdn/a.jpg").await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_length, Some(10));
        assert_eq!(session.call_count(), 4);
    }

    #[test]
    fn test_outcome_describe() {
        let o: RequestOutcome<u8> = RequestOutcome::PermanentError(403);
        assert_eq!(o.describe(), "HTTP 403");
        assert!(!o.is_success());
        let api: RequestOutcome<u8> = RequestOutcome::ApiFailure {
            code: 1,
            message: "User not found".into(),
        };
        assert_eq!(api.describe(), "API error 1: User not found");
    }
}
