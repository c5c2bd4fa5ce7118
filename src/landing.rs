//! Placement of downloaded archives at their destination.
//!
//! A chart lands either as the raw archive, copied under the file name from
//! its download URL, or as an extracted directory tree.

use crate::declaration::Declaration;
use crate::extraction::{ExtractionError, ExtractionReport, StripPolicy, extract_chart_archive};
use camino::{Utf8Path, Utf8PathBuf};
use log::info;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// Trait for landing cached archives, enabling test mocking.
///
/// # Examples
///
/// ```
/// use chart_vendor::landing::FilesystemLander;
///
/// let lander = FilesystemLander;
/// // Use lander.land(archive, &declaration, url) in production
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait ChartLander {
    /// Land the archive at `archive` for `declaration`, downloaded from `url`.
    ///
    /// The destination directory already exists when this is called.
    ///
    /// # Errors
    ///
    /// Returns [`LandingError`] when copying or extraction fails.
    fn land(
        &self,
        archive: &Path,
        declaration: &Declaration,
        url: &str,
    ) -> Result<LandedChart, LandingError>;
}

/// Where a chart ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LandedChart {
    /// The raw archive was copied to `path`.
    Copied {
        /// The copied archive.
        path: Utf8PathBuf,
        /// Bytes written.
        bytes: u64,
    },
    /// The archive was extracted into `destination`.
    Extracted {
        /// The extraction root.
        destination: Utf8PathBuf,
        /// What the extraction wrote.
        report: ExtractionReport,
    },
}

/// Errors arising from raw archive copies.
#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    /// The cached archive could not be opened.
    #[error("cannot open chart in repository cache {path}: {source}")]
    OpenSource {
        /// The cached archive.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The destination file could not be created.
    #[error("cannot create chart in target path {path}: {source}")]
    CreateDestination {
        /// The destination file.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Copying the bytes failed.
    #[error("cannot copy chart to {path}: {source}")]
    Write {
        /// The destination file.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Errors arising from landing a chart.
#[derive(Debug, thiserror::Error)]
pub enum LandingError {
    /// The raw copy failed.
    #[error(transparent)]
    Copy(#[from] CopyError),

    /// Extraction failed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// The download URL has no final path segment to name the copy after.
    #[error("cannot derive an archive file name from {url}")]
    NoFileName {
        /// The download URL.
        url: String,
    },
}

/// Lands charts on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemLander;

impl ChartLander for FilesystemLander {
    fn land(
        &self,
        archive: &Path,
        declaration: &Declaration,
        url: &str,
    ) -> Result<LandedChart, LandingError> {
        let destination = declaration.destination();
        if declaration.extract() {
            info!(
                "extracting chart name={} destination={destination}",
                declaration.name()
            );
            let report = extract_chart_archive(
                archive,
                destination.as_std_path(),
                StripPolicy::TopLevelDirectory,
            )?;
            return Ok(LandedChart::Extracted {
                destination: destination.to_path_buf(),
                report,
            });
        }

        let file_name = archive_file_name(url).ok_or_else(|| LandingError::NoFileName {
            url: url.to_owned(),
        })?;
        let path = destination.join(file_name);
        info!(
            "copying chart archive name={} path={path}",
            declaration.name()
        );
        let bytes = copy_archive(archive, &path)?;
        Ok(LandedChart::Copied { path, bytes })
    }
}

/// Copy the archive at `source` to `target`, returning the bytes written.
///
/// The parent of `target` must already exist. A failed copy may leave a
/// partial file behind.
///
/// # Errors
///
/// Returns [`CopyError`] naming the step that failed.
pub fn copy_archive(source: &Path, target: &Utf8Path) -> Result<u64, CopyError> {
    let mut input = File::open(source).map_err(|err| CopyError::OpenSource {
        path: source.to_path_buf(),
        source: err,
    })?;
    let mut output = File::create(target).map_err(|err| CopyError::CreateDestination {
        path: target.to_path_buf(),
        source: err,
    })?;
    io::copy(&mut input, &mut output).map_err(|err| CopyError::Write {
        path: target.to_path_buf(),
        source: err,
    })
}

/// Last path segment of `url`, ignoring any query or fragment.
pub(crate) fn archive_file_name(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    path.rsplit('/').next().filter(|name| !name.is_empty())
}
