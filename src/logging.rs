//! Logger initialisation for the chart-vendor binary.
//!
//! The library only emits through the `log` facade. The binary installs an
//! `env_logger` backend writing to stdout; `RUST_LOG` overrides the level
//! chosen from the command line.

use log::LevelFilter;

/// Pick the log level from `HELM_DEBUG` and the `-v` count.
///
/// # Example
///
/// ```
/// use chart_vendor::logging::level_for;
/// use log::LevelFilter;
///
/// assert_eq!(level_for(false, 0), LevelFilter::Info);
/// assert_eq!(level_for(true, 0), LevelFilter::Debug);
/// assert_eq!(level_for(false, 2), LevelFilter::Trace);
/// ```
#[must_use]
pub fn level_for(debug: bool, verbosity: u8) -> LevelFilter {
    match verbosity {
        0 if debug => LevelFilter::Debug,
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Install the process-wide logger at `level`.
///
/// # Errors
///
/// Returns [`log::SetLoggerError`] when a logger is already installed.
pub fn init_logging(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    env_logger::Builder::new()
        .filter_level(level)
        .target(env_logger::Target::Stdout)
        .parse_default_env()
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::quiet(false, 0, LevelFilter::Info)]
    #[case::helm_debug(true, 0, LevelFilter::Debug)]
    #[case::verbose(false, 1, LevelFilter::Debug)]
    #[case::very_verbose(true, 3, LevelFilter::Trace)]
    fn level_follows_flags(#[case] debug: bool, #[case] verbosity: u8, #[case] expected: LevelFilter) {
        assert_eq!(level_for(debug, verbosity), expected);
    }
}
