//! Error types for the chart-vendor CLI.
//!
//! Library modules report their own error enums; [`VendorError`] gathers
//! them at the binary boundary so `main` can print a single message and
//! choose the exit code.

use crate::chart::DownloadError;
use crate::config::ConfigError;
use crate::fetch::FetchError;
use thiserror::Error;

/// Errors that can end a chart-vendor run.
#[derive(Debug, Error)]
pub enum VendorError {
    /// The configuration file is missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The download client could not be constructed.
    #[error("unable to create chart client: {0}")]
    Client(#[from] DownloadError),

    /// One or more charts failed to download or land.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Writing command output failed.
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

/// Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, VendorError>;
