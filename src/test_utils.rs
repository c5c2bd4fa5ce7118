//! Shared test utilities for the chart-vendor crate.
//!
//! Compiled for unit tests and, through the `test-support` feature, for the
//! integration tests under `tests/`.

#![allow(
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::panic_in_result_fn
)]

use crate::chart::sha256_digest::Sha256Digest;
use crate::chart::source::{CachedChart, ChartSource, DownloadError, Verification, VerificationMode};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tar::{EntryType, Header};

/// Builds gzip-compressed tar archives entry by entry.
///
/// Entry names are written into the header verbatim, so archives can carry
/// hostile paths such as `../evil` that `tar::Builder` would refuse.
pub struct ArchiveBuilder {
    builder: tar::Builder<GzEncoder<Vec<u8>>>,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveBuilder {
    /// Start an empty archive.
    pub fn new() -> Self {
        Self {
            builder: tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default())),
        }
    }

    /// Append a directory entry.
    #[must_use]
    pub fn directory(self, path: &str) -> Self {
        self.entry(path, EntryType::Directory, 0o755, &[], None)
    }

    /// Append a regular file with mode `0o644`.
    #[must_use]
    pub fn file(self, path: &str, contents: &[u8]) -> Self {
        self.file_with_mode(path, contents, 0o644)
    }

    /// Append a regular file with an explicit mode.
    #[must_use]
    pub fn file_with_mode(self, path: &str, contents: &[u8], mode: u32) -> Self {
        self.entry(path, EntryType::Regular, mode, contents, None)
    }

    /// Append a symbolic link.
    #[must_use]
    pub fn symlink(self, path: &str, target: &str) -> Self {
        self.entry(path, EntryType::Symlink, 0o777, &[], Some(target))
    }

    /// Append a pax global extended header.
    #[must_use]
    pub fn pax_global_header(self, records: &str) -> Self {
        self.entry(
            "pax_global_header",
            EntryType::XGlobalHeader,
            0o644,
            records.as_bytes(),
            None,
        )
    }

    /// Finish the archive and return the compressed bytes.
    pub fn build(self) -> Vec<u8> {
        self.builder
            .into_inner()
            .expect("finish tar stream")
            .finish()
            .expect("finish gzip stream")
    }

    fn entry(
        mut self,
        path: &str,
        entry_type: EntryType,
        mode: u32,
        contents: &[u8],
        link: Option<&str>,
    ) -> Self {
        let mut header = Header::new_ustar();
        write_raw(&mut header.as_old_mut().name, path);
        if let Some(target) = link {
            write_raw(&mut header.as_old_mut().linkname, target);
        }
        header.set_entry_type(entry_type);
        header.set_mode(mode);
        header.set_size(contents.len() as u64);
        header.set_mtime(0);
        header.set_cksum();
        self.builder
            .append(&header, contents)
            .expect("append tar entry");
        self
    }
}

fn write_raw(field: &mut [u8; 100], value: &str) {
    assert!(value.len() <= field.len(), "tar name too long: {value}");
    field.fill(0);
    field[..value.len()].copy_from_slice(value.as_bytes());
}

/// Write `bytes` to `dir/name` and return the path.
pub fn write_archive(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("write archive");
    path
}

/// Render a repository index with one entry per `(name, version, url)`.
pub fn index_yaml(entries: &[(&str, &str, &str)]) -> String {
    let mut by_name: BTreeMap<&str, Vec<(&str, &str)>> = BTreeMap::new();
    for &(name, version, url) in entries {
        by_name.entry(name).or_default().push((version, url));
    }

    if by_name.is_empty() {
        return String::from("apiVersion: v1\nentries: {}\n");
    }

    let mut text = String::from("apiVersion: v1\nentries:\n");
    for (name, versions) in by_name {
        text.push_str(&format!("  {name}:\n"));
        for (version, url) in versions {
            text.push_str(&format!(
                "    - name: {name}\n      version: \"{version}\"\n      urls:\n        - {url}\n"
            ));
        }
    }
    text
}

/// In-memory [`ChartSource`] that can be shared across fetch threads.
///
/// Indexes are served by repository URL and archives by download URL.
/// Anything not registered fails with [`DownloadError::NotFound`].
#[derive(Debug, Default)]
pub struct StubChartSource {
    indexes: BTreeMap<String, String>,
    archives: BTreeMap<String, PathBuf>,
    panics: Vec<String>,
    index_calls: Mutex<Vec<String>>,
    downloads: Mutex<Vec<(String, VerificationMode)>>,
}

impl StubChartSource {
    /// Serve `index` for `repository`.
    #[must_use]
    pub fn with_index(mut self, repository: &str, index: impl Into<String>) -> Self {
        self.indexes.insert(repository.to_owned(), index.into());
        self
    }

    /// Serve the archive at `path` for `url`.
    #[must_use]
    pub fn with_archive(mut self, url: &str, path: impl Into<PathBuf>) -> Self {
        self.archives.insert(url.to_owned(), path.into());
        self
    }

    /// Panic when `url` is downloaded.
    #[must_use]
    pub fn panicking_on(mut self, url: &str) -> Self {
        self.panics.push(url.to_owned());
        self
    }

    /// Repositories whose index was requested, in call order.
    pub fn index_calls(&self) -> Vec<String> {
        self.index_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// URLs and modes passed to `download_to_cache`, in call order.
    pub fn downloads(&self) -> Vec<(String, VerificationMode)> {
        self.downloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ChartSource for StubChartSource {
    fn fetch_index(&self, repository: &str, _insecure: bool) -> Result<String, DownloadError> {
        self.index_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(repository.to_owned());
        self.indexes
            .get(repository)
            .cloned()
            .ok_or_else(|| DownloadError::NotFound {
                url: format!("{}/index.yaml", repository.trim_end_matches('/')),
            })
    }

    fn download_to_cache(
        &self,
        url: &str,
        _version: &str,
        mode: VerificationMode,
    ) -> Result<CachedChart, DownloadError> {
        self.downloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((url.to_owned(), mode));
        assert!(!self.panics.iter().any(|panic| panic == url), "stub panic for {url}");

        let path = self.archives.get(url).ok_or_else(|| DownloadError::NotFound {
            url: url.to_owned(),
        })?;
        let verification = if mode.is_required() {
            Some(Verification::new(Sha256Digest::of_file(path)?).with_signer("stub signer"))
        } else {
            None
        };
        Ok(CachedChart::new(path.clone()).with_verification(verification))
    }
}
