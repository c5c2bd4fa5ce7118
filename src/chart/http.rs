//! HTTP and OCI download collaborator built on `ureq`.
//!
//! [`HttpChartClient`] fetches repository indexes, downloads archives into
//! the content cache, and pulls charts from OCI registries using anonymous
//! or basic credentials. OCI layers are always checked against their
//! descriptor size and digest. When verification is requested, the archive
//! must also match the digest recorded by its provenance file (`<url>.prov`
//! for index repositories, the provenance layer for OCI charts).

use super::credentials::{BasicCredentials, RegistryCredentials, RepositoryCredentials};
use super::oci::{
    AuthChallenge, CHART_LAYER_MEDIA_TYPE, MANIFEST_ACCEPT, OciDescriptor, OciManifest,
    OciReference, TokenResponse,
};
use super::provenance::Provenance;
use super::sha256_digest::Sha256Digest;
use super::source::{CachedChart, ChartSource, DownloadError, Verification, VerificationMode};
use crate::declaration::OCI_SCHEME;
use crate::settings::Settings;
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use ureq::Body;
use ureq::http::{Response, StatusCode, header};

/// Network timeout for a single request, body included.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Length of the URL hash prefix used to partition the content cache.
const CACHE_KEY_LEN: usize = 16;

/// Chart source backed by HTTP(S) repositories and OCI registries.
///
/// One client is shared by reference across all fetch threads; the `ureq`
/// agents pool connections internally.
pub struct HttpChartClient {
    agent: ureq::Agent,
    insecure_agent: ureq::Agent,
    repository_cache: Utf8PathBuf,
    content_cache: Utf8PathBuf,
    repositories: RepositoryCredentials,
    registries: RegistryCredentials,
}

impl HttpChartClient {
    /// Build a client from settings, loading any configured credentials.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Credentials`] when a configured credentials
    /// file exists but cannot be loaded.
    pub fn new(settings: &Settings) -> Result<Self, DownloadError> {
        let repositories = RepositoryCredentials::load(settings.repository_config())?;
        let registries = RegistryCredentials::load(settings.registry_config())?;
        Ok(Self::with_credentials(settings, repositories, registries))
    }

    /// Build a client with explicit credentials.
    #[must_use]
    pub fn with_credentials(
        settings: &Settings,
        repositories: RepositoryCredentials,
        registries: RegistryCredentials,
    ) -> Self {
        Self {
            agent: build_agent(false),
            insecure_agent: build_agent(true),
            repository_cache: settings.repository_cache().to_path_buf(),
            content_cache: settings.content_cache().to_path_buf(),
            repositories,
            registries,
        }
    }

    fn download_http(&self, url: &str, mode: VerificationMode) -> Result<CachedChart, DownloadError> {
        let file_name = archive_file_name(url)?;
        let target = self.content_path(url, file_name);
        let authorization = self
            .repositories
            .for_url(url)
            .map(BasicCredentials::header_value);

        debug!("downloading archive url={url} cache={target}");
        let response = send(&self.agent, url, authorization.as_deref(), None)?;
        let staged = stage_download(url, check_status(url, response)?, &target)?;

        let verification = if mode.is_required() {
            let provenance_url = format!("{url}.prov");
            let text = send(&self.agent, &provenance_url, authorization.as_deref(), None)
                .and_then(|response| check_status(&provenance_url, response))
                .and_then(|response| read_text(&provenance_url, response))
                .map_err(|err| verification_error(url, format!("cannot fetch provenance: {err}")))?;
            Some(check_provenance(url, &text, file_name, staged.path())?)
        } else {
            None
        };
        persist(staged, &target)?;
        Ok(CachedChart::new(target.into_std_path_buf()).with_verification(verification))
    }

    fn pull_oci(
        &self,
        url: &str,
        version: &str,
        mode: VerificationMode,
    ) -> Result<CachedChart, DownloadError> {
        let reference = OciReference::parse(url, version)?;
        let mut session = RegistrySession::new(self, &reference);

        let manifest_url = reference.manifest_url();
        debug!("fetching manifest reference={reference} url={manifest_url}");
        let response = session.get(&manifest_url, Some(MANIFEST_ACCEPT))?;
        let manifest = OciManifest::parse(&read_text(&manifest_url, response)?)
            .map_err(|err| manifest_error(&reference, err))?;
        let layer = manifest.chart_layer().ok_or_else(|| {
            manifest_error(
                &reference,
                format!("no layer with media type {CHART_LAYER_MEDIA_TYPE}"),
            )
        })?;
        let expected =
            Sha256Digest::parse_prefixed(&layer.digest).map_err(|err| manifest_error(&reference, err))?;

        let blob_url = reference.blob_url(&layer.digest);
        let file_name = format!("{}-{version}.tgz", reference.chart_name());
        let target = self.content_path(url, &file_name);
        debug!("downloading layer reference={reference} digest={expected} cache={target}");
        let response = session.get(&blob_url, None)?;
        let staged = stage_download(&blob_url, response, &target)?;

        let length = staged.as_file().metadata()?.len();
        if length != layer.size {
            return Err(verification_error(
                url,
                format!("layer size mismatch: manifest records {} bytes, blob is {length}", layer.size),
            ));
        }
        let actual = Sha256Digest::of_file(staged.path())?;
        if actual != expected {
            return Err(verification_error(
                url,
                format!("layer digest mismatch: manifest records {expected}, blob is {actual}"),
            ));
        }

        let verification = if mode.is_required() {
            let provenance = manifest
                .provenance_layer()
                .ok_or_else(|| verification_error(url, "manifest has no provenance layer"))?;
            let text = fetch_provenance_layer(&mut session, &reference, provenance)
                .map_err(|err| verification_error(url, format!("cannot fetch provenance: {err}")))?;
            Some(check_provenance(url, &text, &file_name, staged.path())?)
        } else {
            None
        };
        persist(staged, &target)?;
        Ok(CachedChart::new(target.into_std_path_buf()).with_verification(verification))
    }

    /// Cache location for an archive, partitioned by source URL.
    fn content_path(&self, url: &str, file_name: &str) -> Utf8PathBuf {
        self.content_cache.join(cache_key(url)).join(file_name)
    }

    fn remember_index(&self, index_url: &str, text: &str) {
        let path = self
            .repository_cache
            .join(format!("{}-index.yaml", cache_key(index_url)));
        let result = std::fs::create_dir_all(&self.repository_cache)
            .and_then(|()| std::fs::write(&path, text));
        if let Err(err) = result {
            debug!("cannot cache repository index path={path}: {err}");
        }
    }
}

impl ChartSource for HttpChartClient {
    fn fetch_index(&self, repository: &str, insecure: bool) -> Result<String, DownloadError> {
        let url = format!("{}/index.yaml", repository.trim_end_matches('/'));
        let agent = if insecure {
            &self.insecure_agent
        } else {
            &self.agent
        };
        let authorization = self
            .repositories
            .for_url(&url)
            .map(BasicCredentials::header_value);

        debug!("fetching repository index url={url} insecure={insecure}");
        let response = send(agent, &url, authorization.as_deref(), None)?;
        let text = read_text(&url, check_status(&url, response)?)?;
        self.remember_index(&url, &text);
        Ok(text)
    }

    fn download_to_cache(
        &self,
        url: &str,
        version: &str,
        mode: VerificationMode,
    ) -> Result<CachedChart, DownloadError> {
        if url.starts_with(OCI_SCHEME) {
            self.pull_oci(url, version, mode)
        } else {
            self.download_http(url, mode)
        }
    }
}

/// Requests against one registry repository, carrying the negotiated
/// authorization between the manifest and blob requests.
struct RegistrySession<'a> {
    client: &'a HttpChartClient,
    reference: &'a OciReference,
    authorization: Option<String>,
}

impl<'a> RegistrySession<'a> {
    fn new(client: &'a HttpChartClient, reference: &'a OciReference) -> Self {
        Self {
            client,
            reference,
            authorization: None,
        }
    }

    fn get(&mut self, url: &str, accept: Option<&str>) -> Result<Response<Body>, DownloadError> {
        let agent = &self.client.agent;
        let response = send(agent, url, self.authorization.as_deref(), accept)?;
        if response.status() != StatusCode::UNAUTHORIZED || self.authorization.is_some() {
            return check_status(url, response);
        }

        let challenge = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .and_then(AuthChallenge::parse)
            .ok_or_else(|| http_error(url, "registry requires authentication without a usable challenge"))?;
        self.authorization = Some(self.authorize(url, challenge)?);

        let retry = send(agent, url, self.authorization.as_deref(), accept)?;
        check_status(url, retry)
    }

    fn authorize(&self, url: &str, challenge: AuthChallenge) -> Result<String, DownloadError> {
        let credentials = self.client.registries.for_host(self.reference.registry());
        match challenge {
            AuthChallenge::Basic => credentials.map(BasicCredentials::header_value).ok_or_else(|| {
                http_error(
                    url,
                    format!("registry {} requires credentials", self.reference.registry()),
                )
            }),
            AuthChallenge::Bearer {
                realm,
                service,
                scope,
            } => {
                let mut token_url = url::Url::parse(&realm)
                    .map_err(|err| http_error(&realm, format!("invalid token realm: {err}")))?;
                {
                    let mut query = token_url.query_pairs_mut();
                    if let Some(service) = &service {
                        query.append_pair("service", service);
                    }
                    let scope = scope.unwrap_or_else(|| self.reference.pull_scope());
                    query.append_pair("scope", &scope);
                }

                let token_url = token_url.to_string();
                debug!(
                    "requesting registry token realm={realm} authenticated={}",
                    credentials.is_some()
                );
                let basic = credentials.map(BasicCredentials::header_value);
                let response = send(&self.client.agent, &token_url, basic.as_deref(), None)?;
                let text = read_text(&token_url, check_status(&token_url, response)?)?;
                let token = serde_json::from_str::<TokenResponse>(&text)
                    .ok()
                    .and_then(TokenResponse::into_token)
                    .ok_or_else(|| http_error(&token_url, "token response carries no token"))?;
                Ok(format!("Bearer {token}"))
            }
        }
    }
}

/// Download a provenance layer and check it against its descriptor digest.
fn fetch_provenance_layer(
    session: &mut RegistrySession<'_>,
    reference: &OciReference,
    layer: &OciDescriptor,
) -> Result<String, DownloadError> {
    let expected =
        Sha256Digest::parse_prefixed(&layer.digest).map_err(|err| manifest_error(reference, err))?;
    let blob_url = reference.blob_url(&layer.digest);
    let text = read_text(&blob_url, session.get(&blob_url, None)?)?;
    let actual = Sha256Digest::of_bytes(text.as_bytes());
    if actual != expected {
        return Err(manifest_error(
            reference,
            format!("provenance layer digest mismatch: manifest records {expected}, blob is {actual}"),
        ));
    }
    Ok(text)
}

/// Compare the staged archive against the digest a provenance file records
/// for `file_name`.
fn check_provenance(
    url: &str,
    text: &str,
    file_name: &str,
    archive: &Path,
) -> Result<Verification, DownloadError> {
    let provenance =
        Provenance::parse(text).map_err(|err| verification_error(url, err.to_string()))?;
    let expected = provenance
        .digest_for(file_name)
        .ok_or_else(|| verification_error(url, format!("provenance has no digest for {file_name}")))?;

    let actual = Sha256Digest::of_file(archive)?;
    if &actual != expected {
        return Err(verification_error(
            url,
            format!("digest mismatch: provenance records {expected}, archive is {actual}"),
        ));
    }
    Ok(Verification::new(actual))
}

fn build_agent(insecure: bool) -> ureq::Agent {
    let builder = ureq::Agent::config_builder()
        .timeout_global(Some(REQUEST_TIMEOUT))
        .http_status_as_error(false);
    let config = if insecure {
        builder
            .tls_config(
                ureq::tls::TlsConfig::builder()
                    .disable_verification(true)
                    .build(),
            )
            .build()
    } else {
        builder.build()
    };
    ureq::Agent::new_with_config(config)
}

fn send(
    agent: &ureq::Agent,
    url: &str,
    authorization: Option<&str>,
    accept: Option<&str>,
) -> Result<Response<Body>, DownloadError> {
    let mut request = agent.get(url);
    if let Some(value) = authorization {
        request = request.header("Authorization", value);
    }
    if let Some(value) = accept {
        request = request.header("Accept", value);
    }
    request.call().map_err(|err| http_error(url, err))
}

/// Map non-success statuses to a [`DownloadError`].
fn check_status(url: &str, response: Response<Body>) -> Result<Response<Body>, DownloadError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if status == StatusCode::NOT_FOUND {
        Err(DownloadError::NotFound {
            url: url.to_owned(),
        })
    } else {
        Err(http_error(url, format!("unexpected status {status}")))
    }
}

fn read_text(url: &str, response: Response<Body>) -> Result<String, DownloadError> {
    let mut text = String::new();
    response
        .into_body()
        .as_reader()
        .read_to_string(&mut text)
        .map_err(|err| http_error(url, err))?;
    Ok(text)
}

/// Stream the body into a temporary file beside `target`.
///
/// Nothing reaches `target` until [`persist`] renames the staged file, so
/// readers never observe partial or unverified archives. Dropping the
/// staged file removes it.
fn stage_download(
    url: &str,
    response: Response<Body>,
    target: &Utf8Path,
) -> Result<NamedTempFile, DownloadError> {
    let parent = target.parent().unwrap_or(Utf8Path::new("."));
    std::fs::create_dir_all(parent)?;
    let mut staged = NamedTempFile::new_in(parent)?;
    std::io::copy(&mut response.into_body().as_reader(), staged.as_file_mut())
        .map_err(|err| http_error(url, err))?;
    Ok(staged)
}

fn persist(staged: NamedTempFile, target: &Utf8Path) -> Result<(), DownloadError> {
    staged
        .persist(target)
        .map_err(|err| DownloadError::Io(err.error))?;
    Ok(())
}

/// Final path segment of an archive URL, without query or fragment.
fn archive_file_name(url: &str) -> Result<&str, DownloadError> {
    crate::landing::archive_file_name(url).ok_or_else(|| DownloadError::InvalidReference {
        reference: url.to_owned(),
        reason: "URL does not name an archive file".to_owned(),
    })
}

fn cache_key(url: &str) -> String {
    let digest = Sha256Digest::of_bytes(url.as_bytes());
    digest.as_str().chars().take(CACHE_KEY_LEN).collect()
}

fn http_error(url: &str, reason: impl ToString) -> DownloadError {
    DownloadError::Http {
        url: url.to_owned(),
        reason: reason.to_string(),
    }
}

fn verification_error(url: &str, reason: impl Into<String>) -> DownloadError {
    DownloadError::Verification {
        url: url.to_owned(),
        reason: reason.into(),
    }
}

fn manifest_error(reference: &OciReference, reason: impl ToString) -> DownloadError {
    DownloadError::Manifest {
        reference: reference.to_string(),
        reason: reason.to_string(),
    }
}
