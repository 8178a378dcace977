//! Run state, derived entirely from the run directory on disk.
//!
//! There is no database: a run directory holds the item list, per-item
//! metadata, downloaded assets and the account record, and every decision
//! about remaining work is made by looking at those files.

pub mod error;
pub mod manifest;
pub mod types;

pub use error::StateError;
pub use manifest::RunManifest;
pub use types::{AssetLookup, ItemOutcome, ItemStatus, MetadataRecord, RunStats, SubRecord};
