//! Validated chart declarations.
//!
//! A [`Declaration`] is the immutable description of one chart to vendor.
//! It is produced by [`crate::config`] (or built directly in code) and read
//! concurrently by every fetch thread, so it exposes accessors only.

use crate::chart::VerificationMode;
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;

/// Prefix identifying OCI registry sources.
pub const OCI_SCHEME: &str = "oci://";

/// Errors arising from declaration construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeclarationError {
    /// A required field is empty or whitespace.
    #[error("{field} must not be empty")]
    EmptyField {
        /// The offending field.
        field: &'static str,
    },

    /// The chart name cannot be used as a path segment.
    #[error("chart name {name:?} {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Name of a chart within its source.
///
/// # Examples
///
/// ```
/// use chart_vendor::declaration::ChartName;
///
/// let name = ChartName::try_from("nginx").unwrap();
/// assert_eq!(name.as_str(), "nginx");
/// assert!(ChartName::try_from("../etc").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChartName(String);

impl ChartName {
    /// Return the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for ChartName {
    type Error = DeclarationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate_name(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for ChartName {
    type Error = DeclarationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_name(&value)?;
        Ok(Self(value))
    }
}

impl AsRef<str> for ChartName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChartName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_name(value: &str) -> Result<(), DeclarationError> {
    if value.trim().is_empty() {
        return Err(DeclarationError::EmptyField { field: "name" });
    }
    if value.contains(['/', '\\']) {
        return Err(DeclarationError::InvalidName {
            name: value.to_owned(),
            reason: "must not contain path separators",
        });
    }
    if value == "." || value == ".." {
        return Err(DeclarationError::InvalidName {
            name: value.to_owned(),
            reason: "must not be a relative path component",
        });
    }
    Ok(())
}

/// One chart to vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    name: ChartName,
    repository: String,
    version: String,
    destination: Utf8PathBuf,
    insecure: bool,
    verify: bool,
    extract: bool,
}

impl Declaration {
    /// Build a declaration with every flag off.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::EmptyField`] when `repository` or
    /// `version` is blank.
    ///
    /// # Examples
    ///
    /// ```
    /// use chart_vendor::declaration::{ChartName, Declaration};
    ///
    /// let declaration = Declaration::new(
    ///     ChartName::try_from("traefik").unwrap(),
    ///     "oci://ghcr.io/traefik/helm",
    ///     "37.4.0",
    ///     "vendor/traefik",
    /// )
    /// .unwrap()
    /// .with_extract(true);
    ///
    /// assert!(declaration.is_oci());
    /// assert!(declaration.extract());
    /// ```
    pub fn new(
        name: ChartName,
        repository: impl Into<String>,
        version: impl Into<String>,
        destination: impl Into<Utf8PathBuf>,
    ) -> Result<Self, DeclarationError> {
        let repository = repository.into();
        let version = version.into();
        if repository.trim().is_empty() {
            return Err(DeclarationError::EmptyField {
                field: "repository",
            });
        }
        if version.trim().is_empty() {
            return Err(DeclarationError::EmptyField { field: "version" });
        }
        Ok(Self {
            name,
            repository,
            version,
            destination: destination.into(),
            insecure: false,
            verify: false,
            extract: false,
        })
    }

    /// Skip TLS verification for index lookups against this source.
    #[must_use]
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Request verification of the downloaded archive.
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Extract the archive instead of copying it.
    #[must_use]
    pub fn with_extract(mut self, extract: bool) -> Self {
        self.extract = extract;
        self
    }

    /// Chart name.
    #[must_use]
    pub fn name(&self) -> &ChartName {
        &self.name
    }

    /// Registry location or index repository base URL.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Exact chart version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Directory the chart lands in.
    #[must_use]
    pub fn destination(&self) -> &Utf8Path {
        &self.destination
    }

    /// Whether TLS verification is skipped for index lookups.
    #[must_use]
    pub fn insecure(&self) -> bool {
        self.insecure
    }

    /// Whether verification was requested.
    #[must_use]
    pub fn verify(&self) -> bool {
        self.verify
    }

    /// Whether the archive is extracted rather than copied.
    #[must_use]
    pub fn extract(&self) -> bool {
        self.extract
    }

    /// Whether the repository is an OCI registry.
    #[must_use]
    pub fn is_oci(&self) -> bool {
        self.repository.starts_with(OCI_SCHEME)
    }

    /// Verification mode passed to the download collaborator.
    #[must_use]
    pub fn verification_mode(&self) -> VerificationMode {
        VerificationMode::from_flag(self.verify)
    }
}
