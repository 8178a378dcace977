//! Stub recovery: find rate-limit placeholders left in a run's photos
//! directory and re-download exactly those items.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::download::error::DownloadError;
use crate::download::{create_progress_bar, file, paths, stub};
use crate::flickr::types::{InfoResponse, SizesResponse};
use crate::flickr::FlickrService;
use crate::state::{MetadataRecord, RunManifest, StateError};

/// Size labels tried in order when picking a retry URL.
const PREFERRED_SIZE_LABELS: &[&str] = &["Original", "Large", "Medium 640", "Medium-640", "Medium"];

/// Options of one recovery pass, resolved from the CLI.
#[derive(Debug, Clone)]
pub struct RecoverOptions {
    pub dry_run: bool,
    pub verbose: bool,
    /// Pause after each stub retried, on top of any retry backoff.
    pub item_delay: Duration,
}

impl Default for RecoverOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            verbose: false,
            item_delay: Duration::from_secs(1),
        }
    }
}

/// Totals for one recovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub found: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// What happened to a single stub.
#[derive(Debug)]
pub enum RecoverOutcome {
    Recovered,
    /// Dry run: the URL that would have been retried, if one resolved.
    WouldRetry(Option<String>),
    /// No retry URL could be resolved from the item's metadata.
    NoUrl,
    Failed(DownloadError),
}

/// Recover every stub in the run's photos directory.
///
/// `service` should carry the recovery retry policy. With `dry_run`, no
/// network request is made and nothing is written; only `found` is counted.
pub async fn scan_and_recover(
    service: &FlickrService,
    manifest: &RunManifest,
    options: &RecoverOptions,
) -> Result<RecoveryReport, StateError> {
    let dry_run = options.dry_run;
    let photos_dir = manifest.photos_dir();
    let stubs = find_stubs(&photos_dir).map_err(|source| StateError::Read {
        path: photos_dir.clone(),
        source,
    })?;

    let mut report = RecoveryReport {
        found: stubs.len() as u64,
        ..RecoveryReport::default()
    };
    if stubs.is_empty() {
        tracing::info!("No stub files found in {}", photos_dir.display());
        return Ok(report);
    }
    tracing::info!("Found {} stub files", stubs.len());

    let pb = create_progress_bar(false, report.found);
    for path in &stubs {
        let outcome = recover_stub(service, manifest, path, dry_run).await;
        pb.suspend(|| log_outcome(path, &outcome, options.verbose));
        match outcome {
            RecoverOutcome::Recovered => report.succeeded += 1,
            RecoverOutcome::NoUrl | RecoverOutcome::Failed(_) => report.failed += 1,
            RecoverOutcome::WouldRetry(_) => {}
        }
        pb.inc(1);

        if !dry_run && !options.item_delay.is_zero() {
            tokio::time::sleep(options.item_delay).await;
        }
    }
    pb.finish_and_clear();

    if dry_run {
        tracing::info!("── Dry Run Summary ──");
        tracing::info!("  {} stubs would be retried", report.found);
    } else {
        tracing::info!("── Recovery Summary ──");
        tracing::info!(
            "  {} found, {} recovered, {} failed",
            report.found,
            report.succeeded,
            report.failed
        );
    }
    Ok(report)
}

/// All stub files in `dir`, sorted by name. `.part` files are ignored.
pub fn find_stubs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut stubs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_part = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(crate::state::manifest::PART_SUFFIX));
        if is_part || !path.is_file() {
            continue;
        }
        if stub::is_stub(&path)? {
            stubs.push(path);
        }
    }
    stubs.sort();
    Ok(stubs)
}

async fn recover_stub(
    service: &FlickrService,
    manifest: &RunManifest,
    path: &Path,
    dry_run: bool,
) -> RecoverOutcome {
    let url = resolve_retry_url(manifest, path).await;
    if dry_run {
        return RecoverOutcome::WouldRetry(url);
    }
    let Some(url) = url else {
        return RecoverOutcome::NoUrl;
    };

    if let Err(e) = file::download_file(service.executor(), &url, path).await {
        return RecoverOutcome::Failed(e);
    }
    match stub::is_stub(path) {
        Ok(false) => RecoverOutcome::Recovered,
        Ok(true) => RecoverOutcome::Failed(DownloadError::StubPayload(path.display().to_string())),
        Err(e) => RecoverOutcome::Failed(DownloadError::Disk(e)),
    }
}

async fn resolve_retry_url(manifest: &RunManifest, path: &Path) -> Option<String> {
    let filename = path.file_name()?.to_str()?;
    let id = paths::item_id_from_filename(filename)?;
    match manifest.read_metadata(id).await {
        Ok(Some(record)) => select_retry_url(&record),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(id, error = %e, "Unreadable metadata record");
            None
        }
    }
}

/// Pick a URL to retry from a metadata record: the best labelled entry of
/// the sizes sub-record, else the first URL in the detail sub-record.
pub fn select_retry_url(record: &MetadataRecord) -> Option<String> {
    let sizes = record
        .sizes
        .payload()
        .and_then(|v| serde_json::from_value::<SizesResponse>(v.clone()).ok())
        .map(|r| r.sizes.size)
        .unwrap_or_default();
    for label in PREFERRED_SIZE_LABELS {
        let found = sizes
            .iter()
            .filter(|s| s.label == *label)
            .filter_map(|s| s.source.as_deref())
            .find(|s| !s.is_empty());
        if let Some(source) = found {
            return Some(source.to_string());
        }
    }

    record
        .detail
        .payload()
        .and_then(|v| serde_json::from_value::<InfoResponse>(v.clone()).ok())
        .and_then(|r| r.photo.urls.url.into_iter().map(|u| u.content).find(|u| !u.is_empty()))
}

fn log_outcome(path: &Path, outcome: &RecoverOutcome, verbose: bool) {
    let path = path.display();
    match outcome {
        RecoverOutcome::Recovered => {
            if verbose {
                tracing::info!("Recovered {}", path);
            } else {
                tracing::debug!("Recovered {}", path);
            }
        }
        RecoverOutcome::WouldRetry(Some(url)) => {
            tracing::info!("[DRY RUN] Would retry {} from {}", path, url)
        }
        RecoverOutcome::WouldRetry(None) => {
            tracing::info!("[DRY RUN] Would retry {} (no URL resolvable)", path)
        }
        RecoverOutcome::NoUrl => tracing::warn!("No retry URL for {}", path),
        RecoverOutcome::Failed(e) => tracing::warn!("Recovery of {} failed: {}", path, e),
    }
}
