//! Error types for the manifest module.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from reading or writing the on-disk manifest.
#[derive(Error, Debug)]
pub enum StateError {
    /// The run directory could not be created or is not a directory.
    #[error("Output directory {path} is not usable: {source}")]
    Setup {
        path: PathBuf,
        source: std::io::Error,
    },

    /// `--resume-dir` pointed at something that isn't there.
    #[error("Run directory does not exist: {0}")]
    MissingRunDir(PathBuf),

    /// Reconciliation needs the item list and there is none.
    #[error("Item list not found at {0}")]
    MissingItemList(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}
