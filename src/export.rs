//! Export run orchestration.
//!
//! A run walks `Init → FetchingAccountInfo → Enumerating → ReconcilingItems
//! → Reporting → Done`. Every state whose artifact already exists in the run
//! directory is skipped unless `force` is set, so re-running an interrupted
//! export resumes it. Item failures only show up in the counters; the run
//! itself fails only when the run directory or item list is unusable.

use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;

use crate::download::{create_progress_bar, format_duration, AssetReconciler};
use crate::flickr::listing::{self, DEFAULT_PAGE_SIZE};
use crate::flickr::{FlickrService, Item, PhotoRecord, RequestOutcome};
use crate::state::{ItemStatus, RunManifest, RunStats, StateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    FetchingAccountInfo,
    Enumerating,
    ReconcilingItems,
    Reporting,
    Done,
}

/// Options of one export run, resolved from the CLI.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub account_id: String,
    pub page_size: u32,
    pub max_pages: Option<u32>,
    pub force: bool,
    /// Pause after each item, on top of any retry backoff.
    pub item_delay: Duration,
    pub no_progress_bar: bool,
}

impl ExportOptions {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: None,
            force: false,
            item_delay: Duration::from_secs(1),
            no_progress_bar: false,
        }
    }
}

/// Final accounting of a run; persisted as `export_summary.json`.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub account_id: String,
    #[serde(flatten)]
    pub stats: RunStats,
    pub pages_fetched: u32,
    pub pages_failed: u32,
    pub truncated: bool,
    /// The item list came from a previous run instead of a fresh listing.
    pub listing_reused: bool,
    pub finished_at: DateTime<Local>,
}

impl ExportReport {
    fn new(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            stats: RunStats::default(),
            pages_fetched: 0,
            pages_failed: 0,
            truncated: false,
            listing_reused: false,
            finished_at: Local::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Item list unusable: {0}")]
    ItemList(#[source] StateError),

    #[error("Cannot write run summary: {0}")]
    Report(#[source] StateError),
}

pub struct RunOrchestrator<'a> {
    service: &'a FlickrService,
    manifest: &'a RunManifest,
    options: ExportOptions,
}

impl<'a> RunOrchestrator<'a> {
    pub fn new(
        service: &'a FlickrService,
        manifest: &'a RunManifest,
        options: ExportOptions,
    ) -> Self {
        Self {
            service,
            manifest,
            options,
        }
    }

    /// Drive the run to `Done`.
    pub async fn run(&self) -> Result<ExportReport, ExportError> {
        let started = Instant::now();
        let mut report = ExportReport::new(&self.options.account_id);
        let mut records: Vec<PhotoRecord> = Vec::new();
        let mut state = RunState::Init;

        loop {
            tracing::debug!(?state, "run state");
            state = match state {
                RunState::Init => {
                    tracing::info!(
                        "Exporting {} into {}",
                        self.options.account_id,
                        self.manifest.root().display()
                    );
                    RunState::FetchingAccountInfo
                }
                RunState::FetchingAccountInfo => {
                    self.fetch_account_info().await;
                    RunState::Enumerating
                }
                RunState::Enumerating => {
                    records = self.load_or_enumerate(&mut report).await?;
                    RunState::ReconcilingItems
                }
                RunState::ReconcilingItems => {
                    report.stats = self.reconcile_items(&records).await;
                    RunState::Reporting
                }
                RunState::Reporting => {
                    report.finished_at = Local::now();
                    self.manifest
                        .write_summary(&report)
                        .await
                        .map_err(ExportError::Report)?;
                    log_summary(&report, started.elapsed());
                    RunState::Done
                }
                RunState::Done => break,
            };
        }
        Ok(report)
    }

    async fn fetch_account_info(&self) {
        if !self.options.force && self.manifest.has_account_info() {
            tracing::debug!("account info already present");
            return;
        }
        match self.service.account_info(&self.options.account_id).await {
            RequestOutcome::Success(info) => {
                if let Err(e) = self.manifest.write_account_info(&info).await {
                    tracing::warn!("Could not save account info: {}", e);
                }
            }
            failure => tracing::warn!("Account info unavailable: {}", failure.describe()),
        }
    }

    async fn load_or_enumerate(
        &self,
        report: &mut ExportReport,
    ) -> Result<Vec<PhotoRecord>, ExportError> {
        let path = if !self.options.force && self.manifest.has_item_list() {
            tracing::info!("Reusing item list from {}", self.manifest.items_path().display());
            report.listing_reused = true;
            self.manifest.items_path()
        } else {
            let enumeration = listing::enumerate(
                self.service,
                &self.options.account_id,
                self.options.page_size,
                self.options.max_pages,
            )
            .await;
            report.pages_fetched = enumeration.pages_fetched;
            report.pages_failed = enumeration.pages_failed;
            report.truncated = enumeration.truncated;

            let complete = enumeration.pages_failed == 0 && !enumeration.truncated;
            if !complete {
                tracing::warn!(
                    "Listing incomplete ({} failed pages, truncated: {}); not reused on resume",
                    enumeration.pages_failed,
                    enumeration.truncated
                );
            }
            self.manifest
                .write_item_list(&enumeration.records, complete)
                .await
                .map_err(ExportError::ItemList)?
        };
        self.manifest
            .read_item_list_from(&path)
            .await
            .map_err(ExportError::ItemList)
    }

    async fn reconcile_items(&self, records: &[PhotoRecord]) -> RunStats {
        let reconciler = AssetReconciler::new(self.service, self.manifest, self.options.force);
        let pb = create_progress_bar(self.options.no_progress_bar, records.len() as u64);
        let mut stats = RunStats::default();

        for record in records {
            let item = Item::from(record);
            pb.set_message(item.id.clone());
            let outcome = reconciler.reconcile(&item).await;
            if outcome.metadata == ItemStatus::Failed || outcome.asset == ItemStatus::Failed {
                pb.suspend(|| {
                    tracing::warn!(
                        "Item {} incomplete (metadata {:?}, asset {:?})",
                        item.id,
                        outcome.metadata,
                        outcome.asset
                    )
                });
            }
            stats.record(&outcome);
            pb.inc(1);

            if !self.options.item_delay.is_zero() {
                tokio::time::sleep(self.options.item_delay).await;
            }
        }
        pb.finish_and_clear();
        stats
    }
}

fn log_summary(report: &ExportReport, elapsed: Duration) {
    let s = &report.stats;
    tracing::info!("── Summary ──");
    tracing::info!("  {} items", s.items);
    tracing::info!(
        "  metadata: {} fetched, {} skipped, {} failed",
        s.fetched_metadata,
        s.skipped_metadata,
        s.failed_metadata
    );
    tracing::info!(
        "  assets: {} fetched, {} skipped, {} failed",
        s.fetched_assets,
        s.skipped_assets,
        s.failed_assets
    );
    if report.truncated {
        tracing::info!("  listing truncated at page cap");
    }
    if report.pages_failed > 0 {
        tracing::warn!("  {} listing pages failed", report.pages_failed);
    }
    if s.failed() > 0 {
        tracing::warn!(
            "  Re-run with --resume-dir to retry failed items, or run `recover` for stubs"
        );
    }
    tracing::info!("  elapsed: {}", format_duration(elapsed));
}
