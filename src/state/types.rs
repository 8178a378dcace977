//! Types for the on-disk manifest and run accounting.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::flickr::RequestOutcome;

/// Marker value of an unavailable sub-record. Serializes as `"fail"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailStatus {
    #[serde(rename = "fail")]
    Fail,
}

/// Sentinel stored in place of a sub-fetch that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Unavailable {
    pub status: FailStatus,
    pub message: String,
}

/// One of the three per-item metadata sub-records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubRecord {
    Unavailable(Unavailable),
    Available(Value),
}

impl SubRecord {
    pub fn unavailable(message: impl Into<String>) -> Self {
        SubRecord::Unavailable(Unavailable {
            status: FailStatus::Fail,
            message: message.into(),
        })
    }

    pub fn is_available(&self) -> bool {
        matches!(self, SubRecord::Available(_))
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            SubRecord::Available(v) => Some(v),
            SubRecord::Unavailable(_) => None,
        }
    }
}

impl From<RequestOutcome<Value>> for SubRecord {
    fn from(outcome: RequestOutcome<Value>) -> Self {
        match outcome {
            RequestOutcome::Success(v) => SubRecord::Available(v),
            failure => SubRecord::unavailable(failure.describe()),
        }
    }
}

/// Contents of `metadata/<id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub detail: SubRecord,
    pub exif: SubRecord,
    pub sizes: SubRecord,
}

impl MetadataRecord {
    pub fn any_available(&self) -> bool {
        self.detail.is_available() || self.exif.is_available() || self.sizes.is_available()
    }
}

/// Result of reconciling one half (metadata or asset) of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ItemStatus {
    Skipped,
    Fetched,
    Failed,
}

/// Per-item reconciliation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemOutcome {
    pub metadata: ItemStatus,
    pub asset: ItemStatus,
}

/// Run-wide counters, accumulated one item at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub items: u64,
    pub fetched_metadata: u64,
    pub skipped_metadata: u64,
    pub failed_metadata: u64,
    pub fetched_assets: u64,
    pub skipped_assets: u64,
    pub failed_assets: u64,
}

impl RunStats {
    pub fn record(&mut self, outcome: &ItemOutcome) {
        self.items += 1;
        match outcome.metadata {
            ItemStatus::Fetched => self.fetched_metadata += 1,
            ItemStatus::Skipped => self.skipped_metadata += 1,
            ItemStatus::Failed => self.failed_metadata += 1,
        }
        match outcome.asset {
            ItemStatus::Fetched => self.fetched_assets += 1,
            ItemStatus::Skipped => self.skipped_assets += 1,
            ItemStatus::Failed => self.failed_assets += 1,
        }
    }

    pub fn failed(&self) -> u64 {
        self.failed_metadata + self.failed_assets
    }
}

/// Where the prefix lookup found an item's asset, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetLookup {
    Present(std::path::PathBuf),
    /// Only a rate-limit placeholder exists; counts as missing.
    Stub(std::path::PathBuf),
    Missing,
}

impl AssetLookup {
    pub fn is_present(&self) -> bool {
        matches!(self, AssetLookup::Present(_))
    }
}

/// Offline report of a manifest's contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestSummary {
    pub listed_items: Option<u64>,
    pub metadata_records: u64,
    pub assets: u64,
    pub stubs: u64,
    pub missing_assets: Option<u64>,
    pub has_account_info: bool,
}
