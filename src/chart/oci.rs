//! OCI registry references, manifests, and auth challenges.
//!
//! Charts in an OCI registry are addressed as `oci://host/path/name` plus a
//! version. The version becomes the manifest tag, and the chart archive is
//! the manifest layer with the Helm chart content media type.

use super::source::DownloadError;
use crate::declaration::OCI_SCHEME;
use serde::Deserialize;

/// Media type of the chart archive layer.
pub const CHART_LAYER_MEDIA_TYPE: &str = "application/vnd.cncf.helm.chart.content.v1.tar+gzip";

/// Media type of the provenance layer pushed alongside a signed chart.
pub const PROVENANCE_LAYER_MEDIA_TYPE: &str = "application/vnd.cncf.helm.chart.provenance.v1.prov";

/// Media types accepted when requesting a manifest.
pub const MANIFEST_ACCEPT: &str =
    "application/vnd.oci.image.manifest.v1+json, application/vnd.docker.distribution.manifest.v2+json";

/// A parsed `oci://` chart reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciReference {
    registry: String,
    repository: String,
    tag: String,
}

impl OciReference {
    /// Parse `url` and derive the tag from `version`.
    ///
    /// Tags cannot contain `+`, so build metadata separators are replaced
    /// with `_`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidReference`] when the URL is not an
    /// `oci://host/path` reference or already carries a tag or digest.
    ///
    /// # Examples
    ///
    /// ```
    /// use chart_vendor::chart::oci::OciReference;
    ///
    /// let reference = OciReference::parse("oci://ghcr.io/traefik/helm/traefik", "1.0.0+build.2").unwrap();
    /// assert_eq!(reference.tag(), "1.0.0_build.2");
    /// assert_eq!(
    ///     reference.manifest_url(),
    ///     "https://ghcr.io/v2/traefik/helm/traefik/manifests/1.0.0_build.2"
    /// );
    /// ```
    pub fn parse(url: &str, version: &str) -> Result<Self, DownloadError> {
        let invalid = |reason: &str| DownloadError::InvalidReference {
            reference: url.to_owned(),
            reason: reason.to_owned(),
        };
        let rest = url
            .strip_prefix(OCI_SCHEME)
            .ok_or_else(|| invalid("expected an oci:// reference"))?;
        let (registry, repository) = rest
            .split_once('/')
            .ok_or_else(|| invalid("missing repository path"))?;
        let repository = repository.trim_end_matches('/');
        if registry.is_empty() || repository.is_empty() {
            return Err(invalid("missing registry host or repository path"));
        }
        if repository.contains('@') || repository.rsplit('/').next().is_some_and(|last| last.contains(':')) {
            return Err(invalid("tags and digests come from the chart version"));
        }
        if version.trim().is_empty() {
            return Err(invalid("missing version"));
        }
        Ok(Self {
            registry: registry.to_owned(),
            repository: repository.to_owned(),
            tag: version.replace('+', "_"),
        })
    }

    /// Registry host, with port when given.
    #[must_use]
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Repository path within the registry.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Manifest tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Last repository segment, which is the chart name.
    #[must_use]
    pub fn chart_name(&self) -> &str {
        self.repository
            .rsplit('/')
            .next()
            .unwrap_or(&self.repository)
    }

    /// URL of the tagged manifest.
    #[must_use]
    pub fn manifest_url(&self) -> String {
        format!("{}/manifests/{}", self.api_base(), self.tag)
    }

    /// URL of a blob in this repository.
    #[must_use]
    pub fn blob_url(&self, digest: &str) -> String {
        format!("{}/blobs/{digest}", self.api_base())
    }

    /// Token scope requesting pull access to this repository.
    #[must_use]
    pub fn pull_scope(&self) -> String {
        format!("repository:{}:pull", self.repository)
    }

    fn api_base(&self) -> String {
        format!(
            "{}://{}/v2/{}",
            registry_scheme(&self.registry),
            self.registry,
            self.repository
        )
    }
}

impl std::fmt::Display for OciReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{OCI_SCHEME}{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

/// Loopback registries are served over plain HTTP; everything else uses TLS.
fn registry_scheme(registry: &str) -> &'static str {
    let host = registry
        .rsplit_once(':')
        .filter(|(_, port)| port.chars().all(|c| c.is_ascii_digit()))
        .map_or(registry, |(host, _)| host);
    if matches!(host, "localhost" | "127.0.0.1" | "[::1]") {
        "http"
    } else {
        "https"
    }
}

/// An image manifest, reduced to its layers.
#[derive(Debug, Clone, Deserialize)]
pub struct OciManifest {
    #[serde(default)]
    layers: Vec<OciDescriptor>,
}

/// A content descriptor within a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OciDescriptor {
    /// Media type of the referenced blob.
    #[serde(rename = "mediaType")]
    pub media_type: String,
    /// `algorithm:hex` digest of the blob.
    pub digest: String,
    /// Blob size in bytes.
    pub size: u64,
}

impl OciManifest {
    /// Parse a manifest document.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the document is not a manifest.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// The chart archive layer, if the manifest has one.
    #[must_use]
    pub fn chart_layer(&self) -> Option<&OciDescriptor> {
        self.layer(CHART_LAYER_MEDIA_TYPE)
    }

    /// The provenance layer, present only for signed charts.
    #[must_use]
    pub fn provenance_layer(&self) -> Option<&OciDescriptor> {
        self.layer(PROVENANCE_LAYER_MEDIA_TYPE)
    }

    fn layer(&self, media_type: &str) -> Option<&OciDescriptor> {
        self.layers.iter().find(|layer| layer.media_type == media_type)
    }
}

/// Authentication scheme requested by a `401` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChallenge {
    /// `Basic realm=...`
    Basic,
    /// `Bearer realm=...,service=...,scope=...`
    Bearer {
        /// Token endpoint.
        realm: String,
        /// Service the token is issued for.
        service: Option<String>,
        /// Scope requested by the registry.
        scope: Option<String>,
    },
}

impl AuthChallenge {
    /// Parse a `WWW-Authenticate` header value.
    ///
    /// Returns `None` for unknown schemes or a bearer challenge without a
    /// realm.
    ///
    /// # Examples
    ///
    /// ```
    /// use chart_vendor::chart::oci::AuthChallenge;
    ///
    /// let challenge = AuthChallenge::parse(
    ///     r#"Bearer realm="https://ghcr.io/token",service="ghcr.io",scope="repository:a/b:pull""#,
    /// );
    /// assert!(matches!(challenge, Some(AuthChallenge::Bearer { .. })));
    /// ```
    #[must_use]
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, params) = header.split_once(' ').unwrap_or((header, ""));
        if scheme.eq_ignore_ascii_case("basic") {
            return Some(Self::Basic);
        }
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for (key, value) in challenge_params(params) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }
        realm.map(|realm| Self::Bearer {
            realm,
            service,
            scope,
        })
    }
}

/// Split `key="value",key=value` pairs, honouring commas inside quotes.
fn challenge_params(params: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in params.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => pairs.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    pairs.push(current);

    pairs
        .iter()
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((
                key.trim().to_owned(),
                value.trim().trim_matches('"').to_owned(),
            ))
        })
        .collect()
}

/// Token response from a registry auth endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

impl TokenResponse {
    /// The issued token; registries use either field name.
    #[must_use]
    pub fn into_token(self) -> Option<String> {
        self.token
            .filter(|token| !token.is_empty())
            .or(self.access_token)
            .filter(|token| !token.is_empty())
    }
}
