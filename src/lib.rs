//! Chart vendoring library.
//!
//! This crate downloads the charts declared in a vendor-charts document and
//! lands them on disk, either as raw archives or as extracted directory
//! trees. It is used by the `chart-vendor` CLI binary and can be driven
//! programmatically with a custom [`chart::ChartSource`] for testing.
//!
//! # Modules
//!
//! - [`chart`] - Download collaborator interface and its HTTP/OCI client
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Vendor-charts document loading and validation
//! - [`declaration`] - Validated chart declarations
//! - [`error`] - Top-level error type for the CLI
//! - [`extraction`] - Safe tar/gzip extraction
//! - [`fetch`] - Concurrent fetch orchestration
//! - [`landing`] - Placement of downloaded archives at their destination
//! - [`logging`] - Logger initialisation for the binary
//! - [`output`] - User-facing message formatting
//! - [`resolver`] - Chart download URL resolution
//! - [`secure_path`] - Destination-confined path joining
//! - [`settings`] - Environment-backed settings

pub mod chart;
pub mod cli;
pub mod config;
pub mod declaration;
pub mod error;
pub mod extraction;
pub mod fetch;
pub mod landing;
pub mod logging;
pub mod output;
pub mod resolver;
pub mod secure_path;
pub mod settings;

mod serde_scalar;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
