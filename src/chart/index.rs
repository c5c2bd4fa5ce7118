//! Repository index parsing.
//!
//! Index-based repositories publish an `index.yaml` mapping chart names to
//! the versions they offer. Only the fields needed to locate an archive are
//! modelled; everything else in an entry is ignored.

use crate::serde_scalar::scalar_string;
use serde::Deserialize;
use std::collections::BTreeMap;

/// A parsed `index.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepositoryIndex {
    #[serde(default)]
    entries: BTreeMap<String, Vec<IndexEntry>>,
}

/// One published version of a chart.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IndexEntry {
    /// Version string exactly as published.
    #[serde(deserialize_with = "scalar_string")]
    pub version: String,
    /// Download locations, absolute or relative to the repository.
    #[serde(default)]
    pub urls: Vec<String>,
}

/// Why an index lookup found nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexLookupError {
    /// The index has no entries under the chart name.
    ChartNotFound,
    /// The chart exists but not at the requested version.
    VersionNotFound {
        /// Versions the index does offer, in published order.
        available: Vec<String>,
    },
}

impl RepositoryIndex {
    /// Parse the YAML text of an index.
    ///
    /// # Errors
    ///
    /// Returns the YAML error when the document is not a valid index.
    pub fn parse(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Find the entry for `name` at exactly `version`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexLookupError`] describing which part of the lookup
    /// failed.
    pub fn find(&self, name: &str, version: &str) -> Result<&IndexEntry, IndexLookupError> {
        let entries = self
            .entries
            .get(name)
            .filter(|entries| !entries.is_empty())
            .ok_or(IndexLookupError::ChartNotFound)?;
        entries
            .iter()
            .find(|entry| entry.version == version)
            .ok_or_else(|| IndexLookupError::VersionNotFound {
                available: entries.iter().map(|entry| entry.version.clone()).collect(),
            })
    }
}
