//! SHA-256 digest newtype used for archive verification.
//!
//! Digests are held as 64-character lowercase hexadecimal strings. They can
//! be computed from bytes or files, or parsed from the `sha256:<hex>` form
//! used by OCI descriptors and provenance files.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Expected length of a hex-encoded SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// Algorithm prefix used by OCI descriptors and provenance files.
const SHA256_PREFIX: &str = "sha256:";

/// Errors arising from digest parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DigestError {
    /// The hex value is malformed.
    #[error("invalid SHA-256 digest: {reason}")]
    InvalidSha256Digest {
        /// Description of the problem.
        reason: String,
    },

    /// The prefixed digest names an algorithm other than SHA-256.
    #[error("unsupported digest algorithm in {value}")]
    UnsupportedAlgorithm {
        /// The digest as written.
        value: String,
    },
}

/// A validated hex-encoded SHA-256 digest string.
///
/// # Examples
///
/// ```
/// use chart_vendor::chart::sha256_digest::Sha256Digest;
///
/// let digest = Sha256Digest::of_bytes(b"chart");
/// let parsed = Sha256Digest::parse_prefixed(&digest.prefixed()).unwrap();
/// assert_eq!(digest, parsed);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Hash an in-memory byte slice.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(bytes)))
    }

    /// Hash everything `reader` yields.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised while reading.
    pub fn of_reader(reader: &mut impl Read) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];
        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }
        Ok(Self(format!("{:x}", hasher.finalize())))
    }

    /// Hash the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened or read.
    pub fn of_file(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        Self::of_reader(&mut file)
    }

    /// Parse a `sha256:<hex>` digest.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::UnsupportedAlgorithm`] when the prefix is
    /// missing or names another algorithm, and
    /// [`DigestError::InvalidSha256Digest`] when the hex part is malformed.
    pub fn parse_prefixed(value: &str) -> Result<Self, DigestError> {
        let hex = value
            .strip_prefix(SHA256_PREFIX)
            .ok_or_else(|| DigestError::UnsupportedAlgorithm {
                value: value.to_owned(),
            })?;
        Self::try_from(hex)
    }

    /// Render the digest in `sha256:<hex>` form.
    #[must_use]
    pub fn prefixed(&self) -> String {
        format!("{SHA256_PREFIX}{}", self.0)
    }

    /// Return the digest as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Sha256Digest {
    type Error = DigestError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate_sha256(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SHA256_PREFIX}{}", self.0)
    }
}

fn validate_sha256(value: &str) -> Result<(), DigestError> {
    if value.len() != DIGEST_HEX_LEN {
        return Err(DigestError::InvalidSha256Digest {
            reason: format!(
                "expected {DIGEST_HEX_LEN} hex characters, got {}",
                value.len()
            ),
        });
    }
    if let Some(bad) = value.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(DigestError::InvalidSha256Digest {
            reason: format!("non-hex character '{bad}'"),
        });
    }
    if value.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(DigestError::InvalidSha256Digest {
            reason: "digest must be lowercase".to_owned(),
        });
    }
    Ok(())
}
