use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// The part of every API response that says whether the call worked.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub stat: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response from `flickr.people.getPhotos`.
#[derive(Debug, Deserialize)]
pub struct PhotoListResponse {
    pub photos: PhotoPage,
}

#[derive(Debug, Deserialize)]
pub struct PhotoPage {
    #[serde(default, deserialize_with = "flexible_u32")]
    pub page: u32,
    #[serde(default, deserialize_with = "flexible_u32")]
    pub pages: u32,
    #[serde(default, deserialize_with = "flexible_u32")]
    pub total: u32,
    #[serde(default)]
    pub photo: Vec<PhotoRecord>,
}

/// URL extras in descending quality order, paired with their rank.
pub const URL_EXTRAS: &[(&str, u8)] = &[
    ("url_o", 12),
    ("url_k", 11),
    ("url_h", 10),
    ("url_l", 9),
    ("url_c", 8),
    ("url_z", 7),
    ("url_m", 6),
    ("url_n", 5),
    ("url_s", 4),
    ("url_q", 3),
    ("url_t", 2),
    ("url_sq", 1),
];

/// One photo as returned by the listing endpoint.
///
/// Kept close to the wire format because this is exactly what the NDJSON
/// item list stores; fields we don't model survive in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub title: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A candidate download URL and its quality rank (higher is better).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateUrl {
    pub rank: u8,
    pub url: String,
}

/// Typed view of a listing record used by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub secret: String,
    pub title: String,
    /// Sorted by descending rank.
    pub candidate_urls: Vec<CandidateUrl>,
}

impl Item {
    /// The best non-empty candidate URL, if any.
    pub fn best_url(&self) -> Option<&str> {
        self.candidate_urls
            .iter()
            .map(|c| c.url.trim())
            .find(|u| !u.is_empty())
    }
}

impl From<&PhotoRecord> for Item {
    fn from(record: &PhotoRecord) -> Self {
        let mut candidate_urls: Vec<CandidateUrl> = URL_EXTRAS
            .iter()
            .filter_map(|(key, rank)| {
                record
                    .extra
                    .get(*key)
                    .and_then(Value::as_str)
                    .map(|url| CandidateUrl {
                        rank: *rank,
                        url: url.to_string(),
                    })
            })
            .collect();
        candidate_urls.sort_by(|a, b| b.rank.cmp(&a.rank));
        Self {
            id: record.id.clone(),
            secret: record.secret.clone(),
            title: record.title.clone(),
            candidate_urls,
        }
    }
}

/// Response from `flickr.photos.getSizes`.
#[derive(Debug, Default, Deserialize)]
pub struct SizesResponse {
    #[serde(default)]
    pub sizes: Sizes,
}

#[derive(Debug, Default, Deserialize)]
pub struct Sizes {
    #[serde(default)]
    pub size: Vec<SizeEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SizeEntry {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub source: Option<String>,
}

/// Response from `flickr.photos.getInfo`, reduced to the URL list.
#[derive(Debug, Default, Deserialize)]
pub struct InfoResponse {
    #[serde(default)]
    pub photo: InfoPhoto,
}

#[derive(Debug, Default, Deserialize)]
pub struct InfoPhoto {
    #[serde(default)]
    pub urls: InfoUrls,
}

#[derive(Debug, Default, Deserialize)]
pub struct InfoUrls {
    #[serde(default)]
    pub url: Vec<InfoUrl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InfoUrl {
    #[serde(rename = "_content", default)]
    pub content: String,
}

/// Accept `12`, `"12"`, or null for counters the API is inconsistent about.
fn flexible_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| serde::de::Error::custom(format!("invalid count: {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid count: {s:?}"))),
        Value::Null => Ok(0),
        other => Err(serde::de::Error::custom(format!("invalid count: {other}"))),
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid id: {other}"))),
    }
}
