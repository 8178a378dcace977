use futures_util::stream::BoxStream;
use futures_util::StreamExt;

/// A fully buffered HTTP response: status code plus body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Chunked body of a streamed response.
pub type BodyStream = BoxStream<'static, anyhow::Result<Vec<u8>>>;

/// A response whose body has not been read yet.
pub struct StreamedResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: BodyStream,
}

impl std::fmt::Debug for StreamedResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamedResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Minimal async transport used by the request executor.
///
/// One call is one network round trip; retries live above this layer.
/// Transport-level failures (DNS, connection reset, body read) surface as
/// `Err`, every HTTP status surfaces as `Ok`.
#[async_trait::async_trait]
pub trait ApiSession: Send + Sync {
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> anyhow::Result<RawResponse>;

    /// GET without buffering the body. Used for assets, which can be
    /// hundreds of megabytes.
    async fn get_stream(&self, url: &str) -> anyhow::Result<StreamedResponse>;
}

#[async_trait::async_trait]
impl ApiSession for reqwest::Client {
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> anyhow::Result<RawResponse> {
        let mut builder = reqwest::Client::get(self, url);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?;
        Ok(RawResponse::new(status, body.to_vec()))
    }

    async fn get_stream(&self, url: &str) -> anyhow::Result<StreamedResponse> {
        let resp = reqwest::Client::get(self, url).send().await?;
        let status = resp.status().as_u16();
        let content_length = resp.content_length();
        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(anyhow::Error::from))
            .boxed();
        Ok(StreamedResponse {
            status,
            content_length,
            body,
        })
    }
}

/// Build the HTTP client shared by every request of a run.
pub fn build_client() -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("flickr-export/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(std::time::Duration::from_secs(30))
        .timeout(std::time::Duration::from_secs(300))
        .build()?;
    Ok(client)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_response_success_range() {
        assert!(RawResponse::new(200, "").is_success());
        assert!(RawResponse::new(204, "").is_success());
        assert!(!RawResponse::new(301, "").is_success());
        assert!(!RawResponse::new(429, "").is_success());
    }

    #[tokio::test]
    async fn test_reqwest_session_reports_status_and_body() {
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest"))
            .and(query_param("method", "flickr.test.echo"))
            .respond_with(ResponseTemplate::new(418).set_body_string("teapot"))
            .mount(&server)
            .await;

        let client = build_client().unwrap();
        let resp = ApiSession::get(
            &client,
            &format!("{}/rest", server.uri()),
            &[("method", "flickr.test.echo")],
        )
        .await
        .unwrap();
        assert_eq!(resp.status, 418);
        assert_eq!(resp.body, b"teapot");
    }

    #[tokio::test]
    async fn test_reqwest_session_streams_body() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let payload = vec![7u8; 256 * 1024];
        Mock::given(method("GET"))
            .and(path("/big.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
            .mount(&server)
            .await;

        let client = build_client().unwrap();
        let mut resp = ApiSession::get_stream(&client, &format!("{}/big.jpg", server.uri()))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_length, Some(payload.len() as u64));
        let mut received = Vec::new();
        while let Some(chunk) = resp.body.next().await {
            received.extend(chunk.unwrap());
        }
        assert_eq!(received, payload);
    }
}
