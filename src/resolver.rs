//! Chart download URL resolution.
//!
//! OCI sources resolve by appending the chart name to the registry path.
//! Index-based sources are looked up in the repository's `index.yaml`; the
//! first URL of the exact version wins and is resolved against the
//! repository base when relative.

use crate::chart::index::{IndexLookupError, RepositoryIndex};
use crate::chart::{ChartSource, DownloadError};
use crate::declaration::{ChartName, Declaration};
use log::debug;
use url::Url;

/// Errors arising from URL resolution.
///
/// Every variant names the chart and version being resolved.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    /// The repository index could not be fetched.
    #[error("unable to find chart {name} {version} in repository: index unavailable: {source}")]
    IndexUnavailable {
        /// Chart name.
        name: ChartName,
        /// Requested version.
        version: String,
        /// The download failure.
        #[source]
        source: DownloadError,
    },

    /// The repository index is not valid YAML of the expected shape.
    #[error("unable to find chart {name} {version} in repository: invalid index: {reason}")]
    InvalidIndex {
        /// Chart name.
        name: ChartName,
        /// Requested version.
        version: String,
        /// Parser message.
        reason: String,
    },

    /// The index lists no chart under this name.
    #[error("unable to find chart {name} {version} in repository: chart not found")]
    ChartNotFound {
        /// Chart name.
        name: ChartName,
        /// Requested version.
        version: String,
    },

    /// The chart exists but not at this version.
    #[error(
        "unable to find chart {name} {version} in repository: version not found (available: {})",
        available.join(", ")
    )]
    VersionNotFound {
        /// Chart name.
        name: ChartName,
        /// Requested version.
        version: String,
        /// Versions the index offers.
        available: Vec<String>,
    },

    /// The matching entry lists no download URL.
    #[error("unable to find chart {name} {version} in repository: entry has no download URL")]
    NoDownloadUrl {
        /// Chart name.
        name: ChartName,
        /// Requested version.
        version: String,
    },

    /// The repository or entry URL cannot be parsed or joined.
    #[error("unable to find chart {name} {version} in repository: invalid URL {url}: {reason}")]
    InvalidUrl {
        /// Chart name.
        name: ChartName,
        /// Requested version.
        version: String,
        /// The offending URL.
        url: String,
        /// Parser message.
        reason: String,
    },
}

/// Resolve the download URL for `declaration`.
///
/// OCI sources never touch `source`. Index-based sources call
/// [`ChartSource::fetch_index`] exactly once.
///
/// # Errors
///
/// Returns a [`ResolutionError`] describing which step of the lookup failed.
pub fn resolve_chart_url<S>(source: &S, declaration: &Declaration) -> Result<String, ResolutionError>
where
    S: ChartSource + ?Sized,
{
    let name = declaration.name();
    let version = declaration.version();
    if declaration.is_oci() {
        return Ok(format!("{}/{name}", declaration.repository()));
    }

    let text = source
        .fetch_index(declaration.repository(), declaration.insecure())
        .map_err(|source| ResolutionError::IndexUnavailable {
            name: name.clone(),
            version: version.to_owned(),
            source,
        })?;
    let index = RepositoryIndex::parse(&text).map_err(|err| ResolutionError::InvalidIndex {
        name: name.clone(),
        version: version.to_owned(),
        reason: err.to_string(),
    })?;
    let entry = index
        .find(name.as_str(), version)
        .map_err(|err| match err {
            IndexLookupError::ChartNotFound => ResolutionError::ChartNotFound {
                name: name.clone(),
                version: version.to_owned(),
            },
            IndexLookupError::VersionNotFound { available } => ResolutionError::VersionNotFound {
                name: name.clone(),
                version: version.to_owned(),
                available,
            },
        })?;
    let reference = entry
        .urls
        .first()
        .ok_or_else(|| ResolutionError::NoDownloadUrl {
            name: name.clone(),
            version: version.to_owned(),
        })?;

    let url = join_reference(declaration.repository(), reference).map_err(|(url, reason)| {
        ResolutionError::InvalidUrl {
            name: name.clone(),
            version: version.to_owned(),
            url,
            reason,
        }
    })?;
    debug!("resolved chart url name={name} version={version} url={url}");
    Ok(url)
}

/// Resolve `reference` against the repository base treated as a directory.
fn join_reference(repository: &str, reference: &str) -> Result<String, (String, String)> {
    let base_text = format!("{}/", repository.trim_end_matches('/'));
    let base = Url::parse(&base_text).map_err(|err| (base_text.clone(), err.to_string()))?;
    base.join(reference)
        .map(String::from)
        .map_err(|err| (reference.to_owned(), err.to_string()))
}
