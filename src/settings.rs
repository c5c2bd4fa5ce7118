//! Environment-backed settings.
//!
//! Settings are read from the same `HELM_*` variables the chart tooling
//! ecosystem uses, so an existing registry login or repository list is picked
//! up without extra configuration. Empty values count as unset.

use camino::{Utf8Path, Utf8PathBuf};
use directories_next::ProjectDirs;

/// Path to the registry credentials file (`config.json` layout).
pub const REGISTRY_CONFIG_VAR: &str = "HELM_REGISTRY_CONFIG";
/// Path to the repository list (`repositories.yaml` layout).
pub const REPOSITORY_CONFIG_VAR: &str = "HELM_REPOSITORY_CONFIG";
/// Directory for cached repository indexes.
pub const REPOSITORY_CACHE_VAR: &str = "HELM_REPOSITORY_CACHE";
/// Directory for cached chart archives.
pub const CONTENT_CACHE_VAR: &str = "HELM_CONTENT_CACHE";
/// Set to `1` to enable debug logging.
pub const DEBUG_VAR: &str = "HELM_DEBUG";

/// Fallback cache root when the platform has no cache directory.
const FALLBACK_CACHE_DIR: &str = ".chart-vendor-cache";

/// Paths and flags shared by the download collaborator and the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    registry_config: Option<Utf8PathBuf>,
    repository_config: Option<Utf8PathBuf>,
    repository_cache: Utf8PathBuf,
    content_cache: Utf8PathBuf,
    debug: bool,
}

impl Settings {
    /// Read settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, which maps a variable name to its value.
    ///
    /// # Examples
    ///
    /// ```
    /// use chart_vendor::settings::Settings;
    ///
    /// let settings = Settings::from_lookup(|key| match key {
    ///     "HELM_CONTENT_CACHE" => Some("/tmp/content".to_owned()),
    ///     "HELM_DEBUG" => Some("1".to_owned()),
    ///     _ => None,
    /// });
    /// assert_eq!(settings.content_cache().as_str(), "/tmp/content");
    /// assert!(settings.debug());
    /// ```
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Self {
            registry_config: read(REGISTRY_CONFIG_VAR).map(Utf8PathBuf::from),
            repository_config: read(REPOSITORY_CONFIG_VAR).map(Utf8PathBuf::from),
            repository_cache: read(REPOSITORY_CACHE_VAR)
                .map_or_else(|| default_cache_root().join("repository"), Utf8PathBuf::from),
            content_cache: read(CONTENT_CACHE_VAR)
                .map_or_else(|| default_cache_root().join("content"), Utf8PathBuf::from),
            debug: read(DEBUG_VAR).is_some_and(|value| value.trim() == "1"),
        }
    }

    /// Settings with both caches under `root` and no credentials files.
    #[must_use]
    pub fn for_cache_root(root: &Utf8Path) -> Self {
        Self {
            registry_config: None,
            repository_config: None,
            repository_cache: root.join("repository"),
            content_cache: root.join("content"),
            debug: false,
        }
    }

    /// Use `path` as the registry credentials file.
    #[must_use]
    pub fn with_registry_config(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.registry_config = Some(path.into());
        self
    }

    /// Use `path` as the repository list.
    #[must_use]
    pub fn with_repository_config(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.repository_config = Some(path.into());
        self
    }

    /// Registry credentials file, when configured.
    #[must_use]
    pub fn registry_config(&self) -> Option<&Utf8Path> {
        self.registry_config.as_deref()
    }

    /// Repository list, when configured.
    #[must_use]
    pub fn repository_config(&self) -> Option<&Utf8Path> {
        self.repository_config.as_deref()
    }

    /// Directory for cached repository indexes.
    #[must_use]
    pub fn repository_cache(&self) -> &Utf8Path {
        &self.repository_cache
    }

    /// Directory for cached chart archives.
    #[must_use]
    pub fn content_cache(&self) -> &Utf8Path {
        &self.content_cache
    }

    /// Whether debug logging was requested.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }
}

fn default_cache_root() -> Utf8PathBuf {
    ProjectDirs::from("", "", "chart-vendor")
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.cache_dir().to_path_buf()).ok())
        .unwrap_or_else(|| Utf8PathBuf::from(FALLBACK_CACHE_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        move |key: &str| values.get(key).cloned()
    }

    #[test]
    fn reads_every_variable() {
        let settings = Settings::from_lookup(lookup_from(&[
            (REGISTRY_CONFIG_VAR, "/etc/registry.json"),
            (REPOSITORY_CONFIG_VAR, "/etc/repositories.yaml"),
            (REPOSITORY_CACHE_VAR, "/cache/repository"),
            (CONTENT_CACHE_VAR, "/cache/content"),
            (DEBUG_VAR, "1"),
        ]));
        assert_eq!(settings.registry_config(), Some(Utf8Path::new("/etc/registry.json")));
        assert_eq!(
            settings.repository_config(),
            Some(Utf8Path::new("/etc/repositories.yaml"))
        );
        assert_eq!(settings.repository_cache().as_str(), "/cache/repository");
        assert_eq!(settings.content_cache().as_str(), "/cache/content");
        assert!(settings.debug());
    }

    #[test]
    fn empty_values_are_unset() {
        let settings = Settings::from_lookup(lookup_from(&[
            (REGISTRY_CONFIG_VAR, ""),
            (REPOSITORY_CONFIG_VAR, "  "),
            (CONTENT_CACHE_VAR, ""),
        ]));
        assert_eq!(settings.registry_config(), None);
        assert_eq!(settings.repository_config(), None);
        assert_eq!(settings.content_cache(), default_cache_root().join("content"));
        assert_eq!(settings.repository_cache(), default_cache_root().join("repository"));
    }

    #[rstest]
    #[case::one("1", true)]
    #[case::zero("0", false)]
    #[case::word("true", false)]
    fn debug_requires_exactly_one(#[case] value: &str, #[case] expected: bool) {
        let settings = Settings::from_lookup(lookup_from(&[(DEBUG_VAR, value)]));
        assert_eq!(settings.debug(), expected);
    }

    #[test]
    fn from_env_reads_process_environment() {
        temp_env::with_vars(
            [
                (CONTENT_CACHE_VAR, Some("/env/content")),
                (REGISTRY_CONFIG_VAR, None),
                (DEBUG_VAR, Some("1")),
            ],
            || {
                let settings = Settings::from_env();
                assert_eq!(settings.content_cache().as_str(), "/env/content");
                assert_eq!(settings.registry_config(), None);
                assert!(settings.debug());
            },
        );
    }

    #[test]
    fn cache_root_settings_have_no_credentials() {
        let settings = Settings::for_cache_root(Utf8Path::new("/tmp/cv"));
        assert_eq!(settings.repository_cache().as_str(), "/tmp/cv/repository");
        assert_eq!(settings.content_cache().as_str(), "/tmp/cv/content");
        assert!(settings.registry_config().is_none());
        assert!(!settings.debug());
    }
}
