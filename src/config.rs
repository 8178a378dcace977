use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};

use crate::cli::{ExportArgs, GlobalArgs, RecoverArgs};
use crate::export::ExportOptions;
use crate::flickr::listing::DEFAULT_PAGE_SIZE;
use crate::recover::RecoverOptions;
use crate::retry::RetryConfig;

/// Endpoint and credentials shared by every command that talks to the API.
pub struct ApiConfig {
    pub endpoint: String,
    pub api_key: String,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl ApiConfig {
    pub fn from_global(global: &GlobalArgs) -> anyhow::Result<Self> {
        let api_key = global
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .context("No API key: pass --api-key or set FLICKR_API_KEY")?;
        Ok(Self {
            endpoint: global.api_endpoint.clone(),
            api_key: api_key.to_string(),
        })
    }
}

/// Where an export run writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunDir {
    /// Create a fresh timestamped run directory under this parent.
    New(PathBuf),
    /// Continue in an existing run directory.
    Resume(PathBuf),
}

#[derive(Debug)]
pub struct ExportConfig {
    pub api: ApiConfig,
    pub run_dir: RunDir,
    pub retry: RetryConfig,
    pub options: ExportOptions,
}

impl ExportConfig {
    pub fn from_cli(global: &GlobalArgs, args: ExportArgs) -> anyhow::Result<Self> {
        let api = ApiConfig::from_global(global)?;
        let account_id = args.account_id.trim().to_string();
        if account_id.is_empty() {
            bail!("--account-id must not be empty");
        }
        if args.page_size == 0 || args.page_size > DEFAULT_PAGE_SIZE {
            bail!("--page-size must be between 1 and {}", DEFAULT_PAGE_SIZE);
        }
        if args.max_pages == Some(0) {
            bail!("--max-pages must be at least 1");
        }

        let run_dir = match args.resume_dir {
            Some(dir) => RunDir::Resume(expand_tilde(&dir)),
            None => RunDir::New(expand_tilde(&args.output_dir)),
        };

        Ok(Self {
            api,
            run_dir,
            retry: RetryConfig {
                max_attempts: args.max_attempts,
                base_delay_secs: args.base_wait,
                ..RetryConfig::default()
            },
            options: ExportOptions {
                page_size: args.page_size,
                max_pages: args.max_pages,
                force: args.force_redownload,
                item_delay: Duration::from_secs(args.item_delay),
                no_progress_bar: args.no_progress_bar,
                ..ExportOptions::new(account_id)
            },
        })
    }
}

#[derive(Debug)]
pub struct RecoverConfig {
    pub api: ApiConfig,
    pub run_dir: PathBuf,
    pub retry: RetryConfig,
    pub options: RecoverOptions,
}

impl RecoverConfig {
    pub fn from_cli(global: &GlobalArgs, args: RecoverArgs) -> anyhow::Result<Self> {
        Ok(Self {
            api: ApiConfig::from_global(global)?,
            run_dir: expand_tilde(&args.resume_dir),
            retry: RetryConfig {
                max_attempts: args.max_attempts,
                base_delay_secs: args.base_wait,
                ..RetryConfig::recovery()
            },
            options: RecoverOptions {
                dry_run: args.dry_run,
                verbose: global.verbose,
                item_delay: Duration::from_secs(args.item_delay),
            },
        })
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
