//! flickr-export: resumable bulk export of a Flickr account.
//!
//! Lists every photo of an account, then fetches each item's metadata and
//! best-quality file into a run directory. Everything is sequential and
//! throttle-aware; an interrupted run resumes from what is already on disk,
//! and `recover` repairs files that were saved as rate-limit placeholders.

#![warn(clippy::all)]

mod cli;
mod config;
mod download;
mod export;
mod flickr;
mod recover;
pub mod retry;
mod state;
mod types;

use std::sync::Arc;

use chrono::Local;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Command, StatusArgs};
use config::{ApiConfig, ExportConfig, RecoverConfig, RunDir};
use flickr::{FlickrService, RequestExecutor};
use retry::RetryConfig;
use state::RunManifest;

fn build_service(api: &ApiConfig, retry: RetryConfig) -> anyhow::Result<FlickrService> {
    let client = flickr::session::build_client()?;
    let executor = RequestExecutor::new(Arc::new(client), retry);
    Ok(FlickrService::new(api.endpoint.as_str(), api.api_key.as_str(), executor))
}

/// Run the export command.
async fn run_export(config: ExportConfig) -> anyhow::Result<()> {
    let manifest = match &config.run_dir {
        RunDir::New(parent) => {
            let name = RunManifest::run_dir_name(&config.options.account_id, &Local::now());
            RunManifest::create(&parent.join(name))?
        }
        RunDir::Resume(dir) => RunManifest::open(dir)?,
    };
    tracing::info!(
        max_attempts = config.retry.max_attempts,
        base_wait = config.retry.base_delay_secs,
        "Starting flickr-export"
    );

    let service = build_service(&config.api, config.retry)?;
    let report = export::RunOrchestrator::new(&service, &manifest, config.options)
        .run()
        .await?;

    if report.stats.failed() > 0 {
        tracing::warn!(
            "{} item halves failed; resume with --resume-dir {}",
            report.stats.failed(),
            manifest.root().display()
        );
    }
    Ok(())
}

/// Run the recover command.
async fn run_recover(config: RecoverConfig) -> anyhow::Result<()> {
    let manifest = RunManifest::open_read_only(&config.run_dir)?;
    let service = build_service(&config.api, config.retry)?;
    let report = recover::scan_and_recover(&service, &manifest, &config.options).await?;
    tracing::debug!(?report, "recovery finished");
    Ok(())
}

/// Run the status command.
async fn run_status(args: StatusArgs) -> anyhow::Result<()> {
    let dir = config::expand_tilde(&args.resume_dir);
    let manifest = RunManifest::open_read_only(&dir)?;
    let summary = manifest.summarize().await?;

    println!("Run directory: {}", manifest.root().display());
    println!();
    match summary.listed_items {
        Some(n) => println!("  Listed items:     {}", n),
        None => println!("  Listed items:     (no item list yet)"),
    }
    println!("  Metadata records: {}", summary.metadata_records);
    println!("  Assets:           {}", summary.assets);
    println!("  Stubs:            {}", summary.stubs);
    if let Some(missing) = summary.missing_assets {
        println!("  Missing assets:   {}", missing);
    }
    println!(
        "  Account info:     {}",
        if summary.has_account_info { "saved" } else { "missing" }
    );

    if summary.stubs > 0 {
        println!();
        println!(
            "Run `flickr-export recover --resume-dir {}` to retry the stubs.",
            manifest.root().display()
        );
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli::Cli { global, command } = cli::Cli::parse();

    let filter = if global.verbose {
        "debug"
    } else {
        global.log_level.as_filter()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match command {
        Command::Export(args) => run_export(ExportConfig::from_cli(&global, args)?).await,
        Command::Recover(args) => run_recover(RecoverConfig::from_cli(&global, args)?).await,
        Command::Status(args) => run_status(args).await,
    }
}
