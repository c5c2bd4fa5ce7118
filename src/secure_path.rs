//! Destination-confined path joining.
//!
//! [`secure_join`] turns an untrusted relative path from an archive into a
//! path under a root directory. Lexical escapes (`..` past the root) and
//! absolute paths are rejected outright; symlinks already present under the
//! root are followed and rejected when they lead outside it.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Errors arising from confined path joining.
#[derive(Debug, thiserror::Error)]
pub enum UnsafePathError {
    /// `..` components climb above the root.
    #[error("path {path} escapes the destination directory")]
    Escapes {
        /// The untrusted path.
        path: String,
    },

    /// The path is absolute.
    #[error("absolute path {path} is not allowed")]
    Absolute {
        /// The untrusted path.
        path: String,
    },

    /// A symlink on the path resolves outside the root.
    #[error("path {path} passes through symlink {link} which leaves the destination directory")]
    SymlinkEscape {
        /// The untrusted path.
        path: String,
        /// The offending symlink.
        link: PathBuf,
    },

    /// Filesystem metadata could not be read while checking for symlinks.
    #[error("cannot inspect {link} while resolving {path}: {source}")]
    Inspect {
        /// The untrusted path.
        path: String,
        /// The entry being inspected.
        link: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Join `unsafe_path` onto `root`, guaranteeing the result stays inside it.
///
/// `.` components are dropped and `..` components are applied lexically.
///
/// # Errors
///
/// Returns [`UnsafePathError`] when the path is absolute, climbs above
/// `root`, or crosses a symlink that resolves outside `root`.
///
/// # Examples
///
/// ```
/// use chart_vendor::secure_path::secure_join;
/// use std::path::Path;
///
/// let root = Path::new("/nonexistent/vendor");
/// let joined = secure_join(root, "templates/./deployment.yaml").unwrap();
/// assert_eq!(joined, root.join("templates/deployment.yaml"));
/// assert!(secure_join(root, "../../etc/passwd").is_err());
/// ```
pub fn secure_join(root: &Path, unsafe_path: &str) -> Result<PathBuf, UnsafePathError> {
    let mut relative = PathBuf::new();
    for component in Path::new(unsafe_path).components() {
        match component {
            Component::Normal(part) => {
                relative.push(part);
                ensure_not_escaping_symlink(root, &relative, unsafe_path)?;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if !relative.pop() {
                    return Err(UnsafePathError::Escapes {
                        path: unsafe_path.to_owned(),
                    });
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(UnsafePathError::Absolute {
                    path: unsafe_path.to_owned(),
                });
            }
        }
    }
    Ok(root.join(relative))
}

fn ensure_not_escaping_symlink(
    root: &Path,
    relative: &Path,
    unsafe_path: &str,
) -> Result<(), UnsafePathError> {
    let candidate = root.join(relative);
    let inspect_error = |source| UnsafePathError::Inspect {
        path: unsafe_path.to_owned(),
        link: candidate.clone(),
        source,
    };

    match fs::symlink_metadata(&candidate) {
        Ok(metadata) if metadata.file_type().is_symlink() => {}
        Ok(_) => return Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(inspect_error(err)),
    }

    let escape = || UnsafePathError::SymlinkEscape {
        path: unsafe_path.to_owned(),
        link: candidate.clone(),
    };
    let canonical_root = fs::canonicalize(root).map_err(inspect_error)?;
    match fs::canonicalize(&candidate) {
        Ok(target) if target.starts_with(&canonical_root) => Ok(()),
        Ok(_) => Err(escape()),
        // A dangling link could be created outside the root later.
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(escape()),
        Err(err) => Err(inspect_error(err)),
    }
}
