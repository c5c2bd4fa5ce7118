//! Message formatting for the chart-vendor CLI.

use crate::fetch::FetchSummary;
use crate::landing::LandedChart;

/// Render the `version` sub-command output.
///
/// # Example
///
/// ```
/// use chart_vendor::output::version_line;
///
/// assert_eq!(
///     version_line("0.1.0", "abc1234", "2025-01-15"),
///     "chart-vendor 0.1.0 (commit abc1234, built 2025-01-15)"
/// );
/// ```
#[must_use]
pub fn version_line(version: &str, commit: &str, date: &str) -> String {
    format!("chart-vendor {version} (commit {commit}, built {date})")
}

/// Render the closing line of a successful `download`.
#[must_use]
pub fn summary_message(summary: &FetchSummary) -> String {
    format!("downloaded all charts total={}", summary.total())
}

/// Describe where one chart landed.
#[must_use]
pub fn landed_message(landed: &LandedChart) -> String {
    match landed {
        LandedChart::Copied { path, bytes } => format!("copied archive path={path} bytes={bytes}"),
        LandedChart::Extracted {
            destination,
            report,
        } => format!(
            "extracted chart destination={destination} files={} directories={}",
            report.files, report.directories
        ),
    }
}
