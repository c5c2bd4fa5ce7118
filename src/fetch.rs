//! Concurrent fetch orchestration.
//!
//! [`fetch_all`] runs one scoped thread per declaration. Each thread creates
//! the destination, resolves the download URL, downloads into the cache, and
//! lands the chart, strictly in that order. Threads never observe each
//! other's failures: every chart runs to completion and the caller receives
//! either a summary of everything that landed or every failure, in
//! declaration order.

use crate::chart::{ChartSource, DownloadError};
use crate::declaration::{ChartName, Declaration};
use crate::landing::{ChartLander, FilesystemLander, LandedChart, LandingError};
use crate::resolver::{ResolutionError, resolve_chart_url};
use camino::Utf8PathBuf;
use log::info;
use std::any::Any;
use std::fmt;
use std::io;
use std::thread;

/// Failure of one chart, tagged with the phase that failed.
#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    /// The destination directory could not be created.
    #[error("unable to create target directory {path}: {source}")]
    CreateDestination {
        /// The destination directory.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The download URL could not be resolved.
    #[error("failed to get chart full URL: {0}")]
    Resolve(#[from] ResolutionError),

    /// The download collaborator failed.
    #[error("unable to download chart: {0}")]
    Download(#[from] DownloadError),

    /// Copying or extraction failed.
    #[error("unable to land chart: {0}")]
    Land(#[from] LandingError),

    /// The fetch thread could not be started.
    #[error("unable to start fetch thread: {source}")]
    Spawn {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The fetch thread panicked.
    #[error("fetch thread panicked: {message}")]
    TaskPanicked {
        /// The panic payload, when it was a string.
        message: String,
    },
}

/// One failed chart.
#[derive(Debug)]
pub struct ChartFailure {
    /// The failing chart.
    pub name: ChartName,
    /// What went wrong.
    pub error: ChartError,
}

impl fmt::Display for ChartFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.error)
    }
}

/// Aggregate failure of a fetch run.
///
/// Holds every failure in declaration order. [`std::error::Error::source`]
/// returns the first one.
#[derive(Debug)]
pub struct FetchError {
    /// Failed charts in declaration order.
    pub failures: Vec<ChartFailure>,
    /// Number of charts attempted.
    pub attempted: usize,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unable to download charts: {} of {} failed",
            self.failures.len(),
            self.attempted
        )?;
        for failure in &self.failures {
            write!(f, "\n- {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|failure| &failure.error as &(dyn std::error::Error + 'static))
    }
}

/// Charts that landed, in declaration order.
#[derive(Debug, Default)]
pub struct FetchSummary {
    /// Each landed chart with where it ended up.
    pub landed: Vec<(ChartName, LandedChart)>,
}

impl FetchSummary {
    /// Number of charts that landed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.landed.len()
    }
}

/// A declaration paired with its resolved download URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob<'a> {
    declaration: &'a Declaration,
    url: String,
}

impl<'a> FetchJob<'a> {
    /// Resolve `declaration` through `source`.
    ///
    /// # Errors
    ///
    /// Returns the [`ResolutionError`] when resolution fails.
    pub fn resolve<S>(source: &S, declaration: &'a Declaration) -> Result<Self, ResolutionError>
    where
        S: ChartSource + ?Sized,
    {
        let url = resolve_chart_url(source, declaration)?;
        Ok(Self { declaration, url })
    }

    /// The declaration being fetched.
    #[must_use]
    pub fn declaration(&self) -> &'a Declaration {
        self.declaration
    }

    /// The resolved download URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Fetch every declaration concurrently and land it on the filesystem.
///
/// # Errors
///
/// Returns [`FetchError`] listing every chart that failed, after all charts
/// have finished.
pub fn fetch_all<S>(source: &S, declarations: &[Declaration]) -> Result<FetchSummary, FetchError>
where
    S: ChartSource + Sync + ?Sized,
{
    fetch_all_with(source, &FilesystemLander, declarations)
}

/// Testable inner function with an injected lander.
///
/// The production entry point [`fetch_all`] delegates here with
/// [`FilesystemLander`].
///
/// # Errors
///
/// Returns [`FetchError`] listing every chart that failed.
pub fn fetch_all_with<S, L>(
    source: &S,
    lander: &L,
    declarations: &[Declaration],
) -> Result<FetchSummary, FetchError>
where
    S: ChartSource + Sync + ?Sized,
    L: ChartLander + Sync + ?Sized,
{
    let outcomes: Vec<Result<LandedChart, ChartError>> = thread::scope(|scope| {
        let handles: Vec<_> = declarations
            .iter()
            .map(|declaration| {
                thread::Builder::new()
                    .name(format!("fetch-{}", declaration.name()))
                    .spawn_scoped(scope, move || fetch_chart(source, lander, declaration))
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle {
                Ok(handle) => handle.join().unwrap_or_else(|payload| {
                    Err(ChartError::TaskPanicked {
                        message: panic_message(payload.as_ref()),
                    })
                }),
                Err(source) => Err(ChartError::Spawn { source }),
            })
            .collect()
    });

    let mut summary = FetchSummary::default();
    let mut failures = Vec::new();
    for (declaration, outcome) in declarations.iter().zip(outcomes) {
        match outcome {
            Ok(landed) => summary.landed.push((declaration.name().clone(), landed)),
            Err(error) => failures.push(ChartFailure {
                name: declaration.name().clone(),
                error,
            }),
        }
    }

    if failures.is_empty() {
        Ok(summary)
    } else {
        Err(FetchError {
            failures,
            attempted: declarations.len(),
        })
    }
}

fn fetch_chart<S, L>(
    source: &S,
    lander: &L,
    declaration: &Declaration,
) -> Result<LandedChart, ChartError>
where
    S: ChartSource + ?Sized,
    L: ChartLander + ?Sized,
{
    let name = declaration.name();
    info!(
        "downloading chart name={name} repository={} destination={}",
        declaration.repository(),
        declaration.destination()
    );
    std::fs::create_dir_all(declaration.destination()).map_err(|source| {
        ChartError::CreateDestination {
            path: declaration.destination().to_path_buf(),
            source,
        }
    })?;

    let job = FetchJob::resolve(source, declaration)?;
    let cached =
        source.download_to_cache(job.url(), declaration.version(), declaration.verification_mode())?;
    info!(
        "chart downloaded to cache name={name} url={} cache={}",
        job.url(),
        cached.path().display()
    );

    let landed = lander.land(cached.path(), declaration, job.url())?;
    if let Some(verification) = cached.verification() {
        info!(
            "chart verified name={name} url={} signed_by={} hash={}",
            job.url(),
            verification.signed_by().unwrap_or("unsigned"),
            verification.file_hash()
        );
    }
    Ok(landed)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

#[cfg(test)]
#[path = "fetch_tests.rs"]
mod tests;
