//! Flickr REST client: method dispatch and typed responses over the
//! request executor.

pub mod error;
pub mod executor;
pub mod listing;
pub mod session;
pub mod types;

pub use executor::{RequestExecutor, RequestOutcome};
pub use types::{Item, PhotoRecord};

use serde::de::DeserializeOwned;
use serde_json::Value;

use types::PhotoListResponse;

pub const DEFAULT_ENDPOINT: &str = "https://api.flickr.com/services/rest";

/// Extra fields requested on every listing page.
pub const LIST_EXTRAS: &str = "url_o,url_k,url_h,url_l,url_c,url_z,url_m,url_n,url_s,url_q,url_t,url_sq,\
original_format,date_taken,date_upload,media,o_dims";

pub struct FlickrService {
    endpoint: String,
    api_key: String,
    executor: RequestExecutor,
}

impl std::fmt::Debug for FlickrService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlickrService")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("executor", &self.executor)
            .finish()
    }
}

impl FlickrService {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        executor: RequestExecutor,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            executor,
        }
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> RequestOutcome<T> {
        let mut query: Vec<(&str, &str)> = vec![
            ("method", method),
            ("api_key", self.api_key.as_str()),
            ("format", "json"),
            ("nojsoncallback", "1"),
        ];
        query.extend_from_slice(params);
        let outcome = self.executor.execute(&self.endpoint, &query).await;
        tracing::debug!(method, ok = outcome.is_success(), "API call");
        outcome
    }

    pub async fn account_info(&self, user_id: &str) -> RequestOutcome<Value> {
        self.call("flickr.people.getInfo", &[("user_id", user_id)])
            .await
    }

    pub async fn list_photos(
        &self,
        user_id: &str,
        page: u32,
        per_page: u32,
    ) -> RequestOutcome<PhotoListResponse> {
        let page = page.to_string();
        let per_page = per_page.to_string();
        self.call(
            "flickr.people.getPhotos",
            &[
                ("user_id", user_id),
                ("page", page.as_str()),
                ("per_page", per_page.as_str()),
                ("extras", LIST_EXTRAS),
            ],
        )
        .await
    }

    pub async fn photo_detail(&self, photo_id: &str, secret: &str) -> RequestOutcome<Value> {
        self.call(
            "flickr.photos.getInfo",
            &with_secret(&[("photo_id", photo_id)], secret),
        )
        .await
    }

    pub async fn photo_exif(&self, photo_id: &str, secret: &str) -> RequestOutcome<Value> {
        self.call(
            "flickr.photos.getExif",
            &with_secret(&[("photo_id", photo_id)], secret),
        )
        .await
    }

    pub async fn photo_sizes(&self, photo_id: &str) -> RequestOutcome<Value> {
        self.call("flickr.photos.getSizes", &[("photo_id", photo_id)])
            .await
    }
}

fn with_secret<'a>(params: &[(&'a str, &'a str)], secret: &'a str) -> Vec<(&'a str, &'a str)> {
    let mut out = params.to_vec();
    if !secret.is_empty() {
        out.push(("secret", secret));
    }
    out
}
