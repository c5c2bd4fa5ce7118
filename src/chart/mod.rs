//! Chart download collaborator.
//!
//! This module provides functionality for:
//! - Defining the collaborator interface used by the resolver and fetcher
//! - Parsing repository indexes and provenance files
//! - Fetching charts over HTTP and from OCI registries with [`HttpChartClient`]
//! - Loading repository and registry credentials
//! - Computing and checking SHA-256 digests

pub mod credentials;
pub mod http;
pub mod index;
pub mod oci;
pub mod provenance;
pub mod sha256_digest;
pub mod source;

pub use http::HttpChartClient;
pub use sha256_digest::Sha256Digest;
pub use source::{CachedChart, ChartSource, DownloadError, Verification, VerificationMode};
