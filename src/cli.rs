use clap::{Args, Parser, Subcommand};

use crate::flickr::listing::DEFAULT_PAGE_SIZE;
use crate::flickr::DEFAULT_ENDPOINT;
use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "flickr-export",
    version,
    about = "Resumable bulk export of a Flickr account's photos and metadata"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Flickr API key.
    /// Prefer the FLICKR_API_KEY environment variable over the flag, which
    /// is visible in process listings.
    #[arg(long, env = "FLICKR_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// REST endpoint
    #[arg(long, default_value = DEFAULT_ENDPOINT, global = true)]
    pub api_endpoint: String,

    /// Log level (RUST_LOG overrides)
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Shorthand for --log-level debug
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Export an account into a new or existing run directory
    Export(ExportArgs),

    /// Re-download assets that were saved as rate-limit placeholders
    Recover(RecoverArgs),

    /// Report what a run directory contains, without network access
    Status(StatusArgs),
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Account NSID (e.g. 12345678@N00)
    #[arg(long)]
    pub account_id: String,

    /// Parent directory for a fresh run directory
    #[arg(short = 'd', long, default_value = ".")]
    pub output_dir: String,

    /// Resume an existing run directory instead of starting a new one
    #[arg(long, conflicts_with = "output_dir")]
    pub resume_dir: Option<String>,

    /// Stop enumerating after this many listing pages
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Items per listing page (max 500)
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u32,

    /// Fetch everything again, even what the run directory already has
    #[arg(long)]
    pub force_redownload: bool,

    /// Attempts per request, including the first
    #[arg(long, default_value_t = 3)]
    pub max_attempts: u32,

    /// Initial retry delay in seconds, doubled on each retry
    #[arg(long, default_value_t = 30)]
    pub base_wait: u64,

    /// Seconds to pause after each item
    #[arg(long, default_value_t = 1)]
    pub item_delay: u64,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,
}

#[derive(Args, Debug)]
pub struct RecoverArgs {
    /// Run directory to scan
    #[arg(long)]
    pub resume_dir: String,

    /// Only report what would be retried
    #[arg(long)]
    pub dry_run: bool,

    /// Attempts per download, including the first
    #[arg(long, default_value_t = 5)]
    pub max_attempts: u32,

    /// Initial retry delay in seconds, doubled on each retry
    #[arg(long, default_value_t = 30)]
    pub base_wait: u64,

    /// Seconds to pause after each stub retried
    #[arg(long, default_value_t = 1)]
    pub item_delay: u64,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Run directory to inspect
    #[arg(long)]
    pub resume_dir: String,
}
