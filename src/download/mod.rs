//! Per-item reconciliation: bring one listed item's metadata record and
//! asset file up to date in the run directory, skipping what a previous run
//! already completed.

pub mod error;
pub mod file;
pub mod paths;
pub mod stub;

use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::flickr::{FlickrService, Item};
use crate::state::{AssetLookup, ItemOutcome, ItemStatus, MetadataRecord, RunManifest, SubRecord};

/// Reconciles listed items against a run directory.
pub struct AssetReconciler<'a> {
    service: &'a FlickrService,
    manifest: &'a RunManifest,
    force: bool,
}

impl<'a> AssetReconciler<'a> {
    pub fn new(service: &'a FlickrService, manifest: &'a RunManifest, force: bool) -> Self {
        Self {
            service,
            manifest,
            force,
        }
    }

    /// Reconcile both halves of an item. Never fails: every problem is
    /// logged and reported as `ItemStatus::Failed` for that half.
    pub async fn reconcile(&self, item: &Item) -> ItemOutcome {
        let metadata = self.reconcile_metadata(item).await;
        let asset = self.reconcile_asset(item).await;
        ItemOutcome { metadata, asset }
    }

    async fn reconcile_metadata(&self, item: &Item) -> ItemStatus {
        if !self.force && self.manifest.has_metadata(&item.id) {
            tracing::debug!(id = %item.id, "metadata already present");
            return ItemStatus::Skipped;
        }

        let record = fetch_metadata(self.service, item).await;
        if !record.any_available() {
            tracing::warn!(id = %item.id, "All metadata sub-fetches failed, nothing written");
            return ItemStatus::Failed;
        }

        match self.manifest.write_metadata(&item.id, &record).await {
            Ok(()) => ItemStatus::Fetched,
            Err(e) => {
                tracing::warn!(id = %item.id, error = %e, "Failed to write metadata");
                ItemStatus::Failed
            }
        }
    }

    async fn reconcile_asset(&self, item: &Item) -> ItemStatus {
        let Some(url) = item.best_url() else {
            tracing::debug!(id = %item.id, "no candidate URL, nothing to download");
            return ItemStatus::Skipped;
        };

        let existing = match self.manifest.find_asset(&item.id) {
            Ok(lookup) => lookup,
            Err(e) => {
                tracing::warn!(id = %item.id, error = %e, "Could not scan photos directory");
                AssetLookup::Missing
            }
        };
        if !self.force && existing.is_present() {
            tracing::debug!(id = %item.id, "asset already present");
            return ItemStatus::Skipped;
        }

        let filename = paths::asset_filename(&item.id, &item.title, url);
        let dest = self.manifest.photos_dir().join(filename);
        match file::download_file(self.service.executor(), url, &dest).await {
            Ok(()) => {
                if let AssetLookup::Stub(stub_path) = existing {
                    remove_replaced_stub(&stub_path, &dest).await;
                }
                ItemStatus::Fetched
            }
            Err(e) => {
                tracing::warn!(id = %item.id, error = %e, "Asset download failed");
                ItemStatus::Failed
            }
        }
    }
}

/// Run the detail, exif and sizes sub-fetches for an item. A failed
/// sub-fetch becomes an unavailable sentinel; the others are unaffected.
pub async fn fetch_metadata(service: &FlickrService, item: &Item) -> MetadataRecord {
    let detail = service.photo_detail(&item.id, &item.secret).await;
    let exif = service.photo_exif(&item.id, &item.secret).await;
    let sizes = service.photo_sizes(&item.id).await;
    MetadataRecord {
        detail: SubRecord::from(detail),
        exif: SubRecord::from(exif),
        sizes: SubRecord::from(sizes),
    }
}

/// Remove a placeholder that lived under a different name than its
/// replacement.
async fn remove_replaced_stub(stub_path: &Path, replacement: &Path) {
    if stub_path == replacement {
        return;
    }
    if let Err(e) = tokio::fs::remove_file(stub_path).await {
        tracing::warn!(path = %stub_path.display(), error = %e, "Could not remove replaced stub");
    }
}

/// Create a progress bar with a consistent template.
///
/// Returns `ProgressBar::hidden()` when the user passed `--no-progress-bar` or
/// stdout is not a TTY.
pub(crate) fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ");
    pb.set_style(style);
    pb
}

pub(crate) fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
