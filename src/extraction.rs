//! Safe extraction of gzip-compressed chart archives.
//!
//! Chart archives wrap their content in a single top-level directory named
//! after the chart. Extraction strips that directory so the chart's files
//! land directly in the destination, and confines every entry to the
//! destination with [`secure_join`].

use crate::secure_path::{UnsafePathError, secure_join};
use flate2::bufread::GzDecoder;
use log::debug;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tar::EntryType;

/// Leading bytes of every gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Permissions for directories created during extraction.
pub const DIR_MODE: u32 = 0o750;

/// Mode bits honoured from entry headers. Setuid, setgid and sticky bits
/// are dropped.
#[cfg(unix)]
const PERMISSION_BITS: u32 = 0o777;

/// How leading path components are removed from entry paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StripPolicy {
    /// Drop everything up to and including the first `/`. Entries without
    /// a remainder (the top-level directory itself, or top-level files) are
    /// skipped.
    #[default]
    TopLevelDirectory,
}

impl StripPolicy {
    /// Apply the policy, returning `None` for entries that should be skipped.
    ///
    /// # Examples
    ///
    /// ```
    /// use chart_vendor::extraction::StripPolicy;
    ///
    /// let policy = StripPolicy::TopLevelDirectory;
    /// assert_eq!(policy.strip("nginx/templates/svc.yaml"), Some("templates/svc.yaml"));
    /// assert_eq!(policy.strip("nginx/"), None);
    /// assert_eq!(policy.strip("README.md"), None);
    /// ```
    #[must_use]
    pub fn strip(self, entry_path: &str) -> Option<&str> {
        let remainder = match self {
            Self::TopLevelDirectory => entry_path.split_once('/').map(|(_, rest)| rest)?,
        };
        (!remainder.is_empty()).then_some(remainder)
    }
}

/// Errors arising from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// The archive file could not be opened.
    #[error("cannot open chart in repository cache {path}: {source}")]
    OpenArchive {
        /// The archive path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The archive is not a gzip stream.
    #[error("unable to read gzip: {source}")]
    Decompression {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The tar stream is malformed or truncated.
    #[error("unable to read tar content: {source}")]
    ArchiveRead {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An entry path would land outside the destination.
    #[error("path traversal detected: {0}")]
    PathTraversal(#[from] UnsafePathError),

    /// The archive holds an entry type other than files and directories.
    #[error("unsupported tar entry type {entry_type} for {path}")]
    UnsupportedEntry {
        /// Debug name of the tar entry type.
        entry_type: String,
        /// The entry path as stored in the archive.
        path: String,
    },

    /// A file or directory could not be written.
    #[error("cannot write {path}: {source}")]
    Io {
        /// The path being written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Counts of what an extraction wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Regular files written.
    pub files: usize,
    /// Directory entries created.
    pub directories: usize,
    /// Entries skipped by the strip policy or as extended headers.
    pub skipped: usize,
}

/// Extract the gzip-compressed tar archive at `archive` into `destination`.
///
/// The destination is created when missing. On failure, entries written
/// before the failing one stay on disk.
///
/// # Errors
///
/// Returns [`ExtractionError`] when the archive cannot be opened or decoded,
/// an entry escapes the destination, an entry type is unsupported, or a
/// write fails.
pub fn extract_chart_archive(
    archive: &Path,
    destination: &Path,
    policy: StripPolicy,
) -> Result<ExtractionReport, ExtractionError> {
    let file = File::open(archive).map_err(|source| ExtractionError::OpenArchive {
        path: archive.to_path_buf(),
        source,
    })?;
    extract_tar_gz(BufReader::new(file), destination, policy)
}

/// Extract a gzip-compressed tar stream into `destination`.
///
/// # Errors
///
/// As for [`extract_chart_archive`], minus opening the file.
pub fn extract_tar_gz<R: BufRead>(
    mut reader: R,
    destination: &Path,
    policy: StripPolicy,
) -> Result<ExtractionReport, ExtractionError> {
    let header = reader
        .fill_buf()
        .map_err(|source| ExtractionError::Decompression { source })?;
    if !header.starts_with(&GZIP_MAGIC) {
        return Err(ExtractionError::Decompression {
            source: io::Error::new(io::ErrorKind::InvalidData, "missing gzip header"),
        });
    }
    create_dir_tree(destination)?;

    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let entries = archive.entries().map_err(archive_read)?;
    let mut report = ExtractionReport::default();

    for entry in entries {
        let mut entry = entry.map_err(archive_read)?;
        let entry_type = entry.header().entry_type();
        if matches!(entry_type, EntryType::XGlobalHeader | EntryType::XHeader) {
            report.skipped += 1;
            continue;
        }

        let raw_path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let Some(relative) = policy.strip(&raw_path) else {
            report.skipped += 1;
            continue;
        };
        let target = secure_join(destination, relative)?;

        match entry_type {
            EntryType::Directory => {
                create_dir_tree(&target)?;
                report.directories += 1;
            }
            EntryType::Regular | EntryType::Continuous => {
                write_entry(&mut entry, &target)?;
                report.files += 1;
            }
            other => {
                return Err(ExtractionError::UnsupportedEntry {
                    entry_type: format!("{other:?}"),
                    path: raw_path,
                });
            }
        }
    }

    debug!(
        "extracted archive destination={} files={} directories={} skipped={}",
        destination.display(),
        report.files,
        report.directories,
        report.skipped
    );
    Ok(report)
}

fn write_entry<R: Read>(entry: &mut tar::Entry<'_, R>, target: &Path) -> Result<(), ExtractionError> {
    let size = entry.header().size().map_err(archive_read)?;
    let mode = entry.header().mode().map_err(archive_read)?;
    if let Some(parent) = target.parent() {
        create_dir_tree(parent)?;
    }

    let mut file = create_file(target, mode).map_err(|source| write_error(target, source))?;
    copy_exact(entry, &mut file, size, target)?;
    file.flush().map_err(|source| write_error(target, source))
}

/// Copy exactly `size` bytes, treating early end-of-stream as a read error.
fn copy_exact(
    reader: &mut impl Read,
    writer: &mut impl Write,
    size: u64,
    target: &Path,
) -> Result<(), ExtractionError> {
    let mut buffer = [0u8; 8192];
    let mut remaining = size;
    while remaining > 0 {
        let want = usize::try_from(remaining).map_or(buffer.len(), |left| left.min(buffer.len()));
        let read = reader.read(&mut buffer[..want]).map_err(archive_read)?;
        if read == 0 {
            return Err(archive_read(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("entry ended {remaining} bytes early"),
            )));
        }
        writer
            .write_all(&buffer[..read])
            .map_err(|source| write_error(target, source))?;
        remaining -= read as u64;
    }
    Ok(())
}

fn create_dir_tree(path: &Path) -> Result<(), ExtractionError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(path).map_err(|source| write_error(path, source))
}

fn create_file(path: &Path, mode: u32) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode & PERMISSION_BITS);
    }
    #[cfg(not(unix))]
    let _ = mode;
    options.open(path)
}

fn archive_read(source: io::Error) -> ExtractionError {
    ExtractionError::ArchiveRead { source }
}

fn write_error(path: &Path, source: io::Error) -> ExtractionError {
    ExtractionError::Io {
        path: path.to_path_buf(),
        source,
    }
}
