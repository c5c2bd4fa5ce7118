//! Provenance file parsing.
//!
//! A provenance file is a clear-signed message whose body ends with a
//! `files:` block mapping archive file names to `sha256:<hex>` digests:
//!
//! ```text
//! -----BEGIN PGP SIGNED MESSAGE-----
//! Hash: SHA512
//!
//! name: nginx
//! version: 1.0.0
//! ...
//! files:
//!   nginx-1.0.0.tgz: sha256:5f1a...
//! -----BEGIN PGP SIGNATURE-----
//! ```
//!
//! Only the digest table is read. The signature block is not checked.

use super::sha256_digest::{DigestError, Sha256Digest};
use std::collections::BTreeMap;

const SIGNATURE_MARKER: &str = "-----BEGIN PGP SIGNATURE-----";
const FILES_KEY: &str = "files:";

/// Errors arising from provenance parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvenanceError {
    /// The message carries no `files:` block.
    #[error("provenance has no files block")]
    MissingFiles,

    /// A `files:` line is not `name: digest`.
    #[error("malformed files entry {line:?}")]
    MalformedEntry {
        /// The offending line.
        line: String,
    },

    /// A recorded digest is unusable.
    #[error("invalid digest for {file}: {source}")]
    InvalidDigest {
        /// The archive file name.
        file: String,
        /// The underlying parse error.
        #[source]
        source: DigestError,
    },
}

/// Digest table extracted from a provenance file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    files: BTreeMap<String, Sha256Digest>,
}

impl Provenance {
    /// Parse the `files:` block of a provenance message.
    ///
    /// # Errors
    ///
    /// Returns a [`ProvenanceError`] when the block is absent or any of its
    /// entries is malformed.
    pub fn parse(text: &str) -> Result<Self, ProvenanceError> {
        let mut lines = text
            .lines()
            .take_while(|line| line.trim_end() != SIGNATURE_MARKER);
        if !lines.by_ref().any(|line| line.trim_end() == FILES_KEY) {
            return Err(ProvenanceError::MissingFiles);
        }

        let mut files = BTreeMap::new();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            if !line.starts_with([' ', '\t']) {
                break;
            }
            let (file, digest) = parse_entry(line)?;
            files.insert(file, digest);
        }

        if files.is_empty() {
            return Err(ProvenanceError::MissingFiles);
        }
        Ok(Self { files })
    }

    /// Digest recorded for `file_name`.
    #[must_use]
    pub fn digest_for(&self, file_name: &str) -> Option<&Sha256Digest> {
        self.files.get(file_name)
    }
}

fn parse_entry(line: &str) -> Result<(String, Sha256Digest), ProvenanceError> {
    let malformed = || ProvenanceError::MalformedEntry {
        line: line.to_owned(),
    };
    let (file, digest) = line.trim().split_once(": ").ok_or_else(malformed)?;
    let file = file.trim().trim_matches(['"', '\'']);
    if file.is_empty() {
        return Err(malformed());
    }
    let digest = Sha256Digest::parse_prefixed(digest.trim().trim_matches(['"', '\''])).map_err(
        |source| ProvenanceError::InvalidDigest {
            file: file.to_owned(),
            source,
        },
    )?;
    Ok((file.to_owned(), digest))
}
