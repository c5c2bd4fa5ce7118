//! Download collaborator interface.
//!
//! The resolver and fetch orchestrator only talk to the network through
//! [`ChartSource`], so tests can substitute mocks or in-memory stubs.

use super::sha256_digest::Sha256Digest;
use camino::Utf8PathBuf;
use std::fmt;
use std::path::{Path, PathBuf};

/// Whether the download collaborator must verify what it fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerificationMode {
    /// Verify the archive and fail the download when verification fails.
    Always,
    /// Skip verification.
    #[default]
    Never,
}

impl VerificationMode {
    /// Map a declaration's `verify` flag onto a mode.
    #[must_use]
    pub const fn from_flag(verify: bool) -> Self {
        if verify { Self::Always } else { Self::Never }
    }

    /// Whether verification was requested.
    #[must_use]
    pub const fn is_required(self) -> bool {
        matches!(self, Self::Always)
    }
}

impl fmt::Display for VerificationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("always"),
            Self::Never => f.write_str("never"),
        }
    }
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    signed_by: Option<String>,
    file_hash: Sha256Digest,
}

impl Verification {
    /// Record a verified archive hash.
    #[must_use]
    pub fn new(file_hash: Sha256Digest) -> Self {
        Self {
            signed_by: None,
            file_hash,
        }
    }

    /// Attach the identity that signed the archive.
    #[must_use]
    pub fn with_signer(mut self, signed_by: impl Into<String>) -> Self {
        self.signed_by = Some(signed_by.into());
        self
    }

    /// Identity that signed the archive, when known.
    #[must_use]
    pub fn signed_by(&self) -> Option<&str> {
        self.signed_by.as_deref()
    }

    /// Hash of the verified archive.
    #[must_use]
    pub fn file_hash(&self) -> &Sha256Digest {
        &self.file_hash
    }
}

/// An archive sitting in the local content cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedChart {
    path: PathBuf,
    verification: Option<Verification>,
}

impl CachedChart {
    /// Describe an unverified cached archive.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            verification: None,
        }
    }

    /// Attach a verification result.
    #[must_use]
    pub fn with_verification(mut self, verification: Option<Verification>) -> Self {
        self.verification = verification;
        self
    }

    /// Location of the archive in the cache.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Verification result, present only when verification ran.
    #[must_use]
    pub fn verification(&self) -> Option<&Verification> {
        self.verification.as_ref()
    }
}

/// Network-facing collaborator used by the resolver and orchestrator.
///
/// Implementations are shared by reference across fetch threads, so every
/// method takes `&self`.
#[cfg_attr(test, mockall::automock)]
pub trait ChartSource {
    /// Fetch the raw `index.yaml` of an index-based repository.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::NotFound`] when the repository has no index
    /// and [`DownloadError::Http`] for any other transport failure.
    fn fetch_index(&self, repository: &str, insecure: bool) -> Result<String, DownloadError>;

    /// Download `url` into the local content cache.
    ///
    /// `version` is the exact chart version; OCI references derive their tag
    /// from it.
    ///
    /// # Errors
    ///
    /// Returns a [`DownloadError`] when the transfer, cache write, or
    /// requested verification fails.
    fn download_to_cache(
        &self,
        url: &str,
        version: &str,
        mode: VerificationMode,
    ) -> Result<CachedChart, DownloadError>;
}

/// Errors arising from chart download operations.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// HTTP request failed.
    #[error("download failed for {url}: {reason}")]
    Http {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The requested resource was not found (HTTP 404).
    #[error("not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// I/O error writing to the content cache.
    #[error("I/O error writing download: {0}")]
    Io(#[from] std::io::Error),

    /// The chart reference could not be interpreted.
    #[error("invalid chart reference {reference}: {reason}")]
    InvalidReference {
        /// The reference as given.
        reference: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The registry manifest was unusable.
    #[error("invalid manifest for {reference}: {reason}")]
    Manifest {
        /// The reference whose manifest was fetched.
        reference: String,
        /// Why the manifest was rejected.
        reason: String,
    },

    /// The downloaded archive failed verification.
    #[error("verification failed for {url}: {reason}")]
    Verification {
        /// The archive URL.
        url: String,
        /// Why verification failed.
        reason: String,
    },

    /// A credentials file could not be loaded.
    #[error("cannot load credentials from {path}: {reason}")]
    Credentials {
        /// The credentials file.
        path: Utf8PathBuf,
        /// Why loading failed.
        reason: String,
    },
}
