//! Repository and registry credentials.
//!
//! Index repositories take basic-auth credentials from a
//! `repositories.yaml` file; OCI registries take them from a docker-style
//! `config.json`. A missing file simply means no credentials.

use super::source::DownloadError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io;

/// A username and password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    username: String,
    password: String,
}

impl BasicCredentials {
    /// Pair a username with its password.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Value for an `Authorization` header.
    #[must_use]
    pub fn header_value(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {token}")
    }

    fn decode(encoded: &str) -> Result<Self, String> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|err| format!("auth is not base64: {err}"))?;
        let text = String::from_utf8(bytes).map_err(|_| "auth is not UTF-8".to_owned())?;
        let (username, password) = text
            .split_once(':')
            .ok_or_else(|| "auth must be username:password".to_owned())?;
        Ok(Self::new(username, password))
    }
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct RepositoryFile {
    #[serde(default)]
    repositories: Vec<RepositoryEntry>,
}

#[derive(Debug, Deserialize)]
struct RepositoryEntry {
    url: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Basic-auth credentials keyed by repository URL.
#[derive(Debug, Clone, Default)]
pub struct RepositoryCredentials {
    entries: Vec<(String, BasicCredentials)>,
}

impl RepositoryCredentials {
    /// Load a `repositories.yaml` file.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Credentials`] when the file exists but cannot
    /// be read or parsed.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self, DownloadError> {
        let Some(text) = read_optional(path)? else {
            return Ok(Self::default());
        };
        let file: RepositoryFile =
            serde_yaml::from_str(&text).map_err(|err| credentials_error(path, err))?;
        Ok(Self::from_entries(file.repositories.into_iter().filter_map(
            |entry| match entry.username {
                Some(username) if !username.is_empty() => Some((
                    entry.url,
                    BasicCredentials::new(username, entry.password.unwrap_or_default()),
                )),
                _ => None,
            },
        )))
    }

    /// Build from `(repository URL, credentials)` pairs.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, BasicCredentials)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(url, credentials)| (url.trim_end_matches('/').to_owned(), credentials))
                .collect(),
        }
    }

    /// Credentials for the repository that `url` lives under.
    ///
    /// The longest matching repository URL wins.
    #[must_use]
    pub fn for_url(&self, url: &str) -> Option<&BasicCredentials> {
        self.entries
            .iter()
            .filter(|(base, _)| {
                url.strip_prefix(base.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
            .max_by_key(|(base, _)| base.len())
            .map(|(_, credentials)| credentials)
    }
}

#[derive(Debug, Deserialize)]
struct DockerConfig {
    #[serde(default)]
    auths: BTreeMap<String, DockerAuth>,
}

#[derive(Debug, Deserialize)]
struct DockerAuth {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Registry credentials keyed by host.
#[derive(Debug, Clone, Default)]
pub struct RegistryCredentials {
    hosts: BTreeMap<String, BasicCredentials>,
}

impl RegistryCredentials {
    /// Load a docker-style `config.json`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Credentials`] when the file exists but cannot
    /// be read or parsed, or an `auth` value cannot be decoded.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self, DownloadError> {
        let Some(text) = read_optional(path)? else {
            return Ok(Self::default());
        };
        let config: DockerConfig =
            serde_json::from_str(&text).map_err(|err| credentials_error(path, err))?;

        let mut hosts = BTreeMap::new();
        for (key, auth) in config.auths {
            let credentials = match (auth.auth, auth.username) {
                (Some(encoded), _) if !encoded.is_empty() => BasicCredentials::decode(&encoded)
                    .map_err(|reason| credentials_error(path, format!("{key}: {reason}")))?,
                (_, Some(username)) => {
                    BasicCredentials::new(username, auth.password.unwrap_or_default())
                }
                _ => continue,
            };
            hosts.insert(registry_host(&key).to_owned(), credentials);
        }
        Ok(Self { hosts })
    }

    /// Credentials for a registry host such as `ghcr.io`.
    #[must_use]
    pub fn for_host(&self, host: &str) -> Option<&BasicCredentials> {
        self.hosts.get(host)
    }
}

/// Reduce a config key such as `https://index.docker.io/v1/` to its host.
fn registry_host(key: &str) -> &str {
    let without_scheme = key
        .strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .unwrap_or(key);
    without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
}

fn read_optional(path: Option<&Utf8Path>) -> Result<Option<String>, DownloadError> {
    let Some(path) = path else {
        return Ok(None);
    };
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(credentials_error(Some(path), err)),
    }
}

fn credentials_error(path: Option<&Utf8Path>, reason: impl fmt::Display) -> DownloadError {
    DownloadError::Credentials {
        path: path.map(Utf8Path::to_path_buf).unwrap_or_else(Utf8PathBuf::new),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn write_temp(dir: &tempfile::TempDir, name: &str, contents: &str) -> Utf8PathBuf {
        let path = Utf8PathBuf::from_path_buf(dir.path().join(name)).expect("utf-8 temp path");
        std::fs::write(&path, contents).expect("write credentials file");
        path
    }

    #[test]
    fn header_value_is_base64_basic() {
        let credentials = BasicCredentials::new("user", "pass");
        assert_eq!(credentials.header_value(), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn debug_output_redacts_password() {
        let rendered = format!("{:?}", BasicCredentials::new("user", "hunter2"));
        assert!(rendered.contains("user"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn missing_files_yield_no_credentials() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("absent.yaml")).expect("utf-8");
        let repositories = RepositoryCredentials::load(Some(&path)).expect("load");
        assert!(repositories.for_url("https://charts.example.com/index.yaml").is_none());
        let registries = RegistryCredentials::load(None).expect("load");
        assert!(registries.for_host("ghcr.io").is_none());
    }

    #[test]
    fn loads_repository_credentials() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write_temp(
            &dir,
            "repositories.yaml",
            concat!(
                "apiVersion: \"\"\n",
                "repositories:\n",
                "- name: private\n",
                "  url: https://charts.example.com/private/\n",
                "  username: alice\n",
                "  password: secret\n",
                "- name: public\n",
                "  url: https://charts.example.com\n",
                "  username: \"\"\n",
            ),
        );
        let credentials = RepositoryCredentials::load(Some(&path)).expect("load");
        let found = credentials
            .for_url("https://charts.example.com/private/index.yaml")
            .expect("credentials for private repository");
        assert_eq!(found.username(), "alice");
        assert!(credentials.for_url("https://charts.example.com/index.yaml").is_none());
    }

    #[rstest]
    #[case::exact("https://charts.example.com/team", true)]
    #[case::nested("https://charts.example.com/team/index.yaml", true)]
    #[case::sibling_prefix("https://charts.example.com/teammates/index.yaml", false)]
    #[case::other_host("https://other.example.com/team/index.yaml", false)]
    fn repository_match_respects_segments(#[case] url: &str, #[case] expected: bool) {
        let credentials = RepositoryCredentials::from_entries([(
            "https://charts.example.com/team".to_owned(),
            BasicCredentials::new("bob", "pw"),
        )]);
        assert_eq!(credentials.for_url(url).is_some(), expected);
    }

    #[test]
    fn loads_registry_credentials() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write_temp(
            &dir,
            "config.json",
            r#"{"auths":{"ghcr.io":{"auth":"dXNlcjpwYXNz"},"https://index.docker.io/v1/":{"username":"docker","password":"pw"},"empty.io":{}}}"#,
        );
        let credentials = RegistryCredentials::load(Some(&path)).expect("load");
        assert_eq!(
            credentials.for_host("ghcr.io"),
            Some(&BasicCredentials::new("user", "pass"))
        );
        assert_eq!(
            credentials.for_host("index.docker.io").map(BasicCredentials::username),
            Some("docker")
        );
        assert!(credentials.for_host("empty.io").is_none());
    }

    #[test]
    fn invalid_registry_auth_is_reported() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write_temp(&dir, "config.json", r#"{"auths":{"ghcr.io":{"auth":"!!"}}}"#);
        let err = RegistryCredentials::load(Some(&path)).expect_err("auth should be rejected");
        assert!(matches!(err, DownloadError::Credentials { .. }));
    }

    #[test]
    fn malformed_repository_file_is_reported() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write_temp(&dir, "repositories.yaml", "repositories: 12\n");
        let err = RepositoryCredentials::load(Some(&path)).expect_err("file should be rejected");
        assert!(err.to_string().contains("repositories.yaml"));
    }
}
