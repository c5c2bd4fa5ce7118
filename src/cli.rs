//! CLI argument definitions for chart-vendor.
//!
//! Kept apart from the entrypoint so the binary stays focused on
//! orchestration and the parser can be tested directly.

use crate::config::DEFAULT_CONFIG_FILE;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Vendor Helm charts declared in a configuration file.
#[derive(Parser, Debug)]
#[command(name = "chart-vendor")]
#[command(version, about)]
#[command(long_about = concat!(
    "Vendor Helm charts declared in a configuration file.\n\n",
    "Each chart is resolved against its repository (an index-based HTTP ",
    "repository or an OCI registry), downloaded into the local cache, and ",
    "copied or extracted into its destination directory. Charts are fetched ",
    "concurrently and every failure is reported.",
))]
#[command(after_help = concat!(
    "ENVIRONMENT:\n",
    "  HELM_REGISTRY_CONFIG     Registry credentials (docker config.json layout)\n",
    "  HELM_REPOSITORY_CONFIG   Repository credentials (repositories.yaml)\n",
    "  HELM_REPOSITORY_CACHE    Directory for downloaded repository indexes\n",
    "  HELM_CONTENT_CACHE       Directory for downloaded chart archives\n",
    "  HELM_DEBUG               Set to 1 for debug logging\n\n",
    "EXAMPLES:\n",
    "  Download every chart in .vendor-charts.yaml:\n",
    "    $ chart-vendor download\n\n",
    "  Check a configuration file without downloading:\n",
    "    $ chart-vendor -f charts.toml verify",
))]
pub struct Cli {
    /// Configuration file listing the charts to vendor.
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE, global = true)]
    pub file: Utf8PathBuf,

    /// Directory that relative destinations are resolved against.
    #[arg(long, value_name = "DIR", default_value = ".", global = true)]
    pub base_dir: Utf8PathBuf,

    /// Increase log verbosity (repeatable: -v, -vv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        global = true
    )]
    pub verbosity: u8,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Fetch every chart in the configuration file.
    Download,

    /// Validate the configuration file without downloading.
    Verify,

    /// Print version, commit, and build date.
    Version,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
