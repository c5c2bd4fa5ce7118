//! Loading and validating the vendor-charts document.
//!
//! The document lists the charts to vendor under a `charts` key. It is YAML
//! unless the file name ends in `.toml`. Validation collects every problem
//! before failing, so a user fixing a broken file sees all of them at once.

use crate::declaration::{ChartName, Declaration, OCI_SCHEME};
use crate::serde_scalar::optional_scalar_string;
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::io;

/// Configuration file read when `--file` is not given.
pub const DEFAULT_CONFIG_FILE: &str = ".vendor-charts.yaml";

/// Schemes a chart repository may use.
const REPOSITORY_SCHEMES: [&str; 3] = [OCI_SCHEME, "http://", "https://"];

/// Serialization format of a configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML, the default.
    Yaml,
    /// TOML, selected by a `.toml` extension.
    Toml,
}

impl ConfigFormat {
    /// Pick the format from the extension of `path`.
    ///
    /// # Examples
    ///
    /// ```
    /// use chart_vendor::config::ConfigFormat;
    /// use camino::Utf8Path;
    ///
    /// assert_eq!(ConfigFormat::from_path(Utf8Path::new("charts.toml")), ConfigFormat::Toml);
    /// assert_eq!(ConfigFormat::from_path(Utf8Path::new(".vendor-charts.yaml")), ConfigFormat::Yaml);
    /// ```
    #[must_use]
    pub fn from_path(path: &Utf8Path) -> Self {
        match path.extension() {
            Some(extension) if extension.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Yaml => "YAML",
            Self::Toml => "TOML",
        })
    }
}

/// One validation problem, located by field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigProblem {
    /// Location such as `charts[0].name`.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ConfigProblem {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors arising from loading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("config file {path} does not exist")]
    NotFound {
        /// The missing file.
        path: Utf8PathBuf,
    },

    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// The unreadable file.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The document is not well-formed for its format.
    #[error("failed to parse {format} config: {reason}")]
    Parse {
        /// The format being parsed.
        format: ConfigFormat,
        /// Parser message.
        reason: String,
    },

    /// The document parsed but failed validation.
    #[error("invalid configuration file:{}", render_problems(problems))]
    Invalid {
        /// Every problem found, in document order.
        problems: Vec<ConfigProblem>,
    },
}

fn render_problems(problems: &[ConfigProblem]) -> String {
    problems
        .iter()
        .map(|problem| format!("\n- {problem}"))
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDocument {
    #[serde(default)]
    charts: Option<Vec<RawChart>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawChart {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    repository: Option<String>,
    #[serde(default, deserialize_with = "optional_scalar_string")]
    version: Option<String>,
    #[serde(default)]
    destination: Option<String>,
    #[serde(default)]
    insecure: bool,
    #[serde(default)]
    verify: bool,
    #[serde(default)]
    extract: bool,
}

/// Read and validate the configuration file at `path`.
///
/// Relative destinations are resolved against `base_dir`.
///
/// # Errors
///
/// Returns [`ConfigError::NotFound`] when the file is missing, and the
/// errors of [`parse_declarations`] otherwise.
pub fn load(path: &Utf8Path, base_dir: &Utf8Path) -> Result<Vec<Declaration>, ConfigError> {
    let bytes = std::fs::read(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    parse_declarations(&bytes, ConfigFormat::from_path(path), base_dir)
}

/// Parse and validate a configuration document.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] for malformed documents or unknown fields,
/// and [`ConfigError::Invalid`] listing every validation problem.
///
/// # Examples
///
/// ```
/// use chart_vendor::config::{ConfigFormat, parse_declarations};
/// use camino::Utf8Path;
///
/// let document = b"charts:\n  - name: nginx\n    repository: https://charts.example.com\n    version: 1.2.3\n";
/// let declarations = parse_declarations(document, ConfigFormat::Yaml, Utf8Path::new("/srv")).unwrap();
/// assert_eq!(declarations[0].destination().as_str(), "/srv/nginx");
/// ```
pub fn parse_declarations(
    bytes: &[u8],
    format: ConfigFormat,
    base_dir: &Utf8Path,
) -> Result<Vec<Declaration>, ConfigError> {
    let document = parse_document(bytes, format)?;
    validate(document, base_dir)
}

fn parse_document(bytes: &[u8], format: ConfigFormat) -> Result<RawDocument, ConfigError> {
    let parse_error = |reason: String| ConfigError::Parse { format, reason };
    match format {
        ConfigFormat::Yaml => serde_yaml::from_slice(bytes).map_err(|err| parse_error(err.to_string())),
        ConfigFormat::Toml => {
            let text = std::str::from_utf8(bytes).map_err(|err| parse_error(err.to_string()))?;
            toml::from_str(text).map_err(|err| parse_error(err.to_string()))
        }
    }
}

fn validate(document: RawDocument, base_dir: &Utf8Path) -> Result<Vec<Declaration>, ConfigError> {
    let charts = document.charts.unwrap_or_default();
    if charts.is_empty() {
        return Err(ConfigError::Invalid {
            problems: vec![ConfigProblem::new("charts", "at least one chart is required")],
        });
    }

    let mut problems = Vec::new();
    let mut declarations = Vec::with_capacity(charts.len());
    let mut destinations: HashMap<Utf8PathBuf, usize> = HashMap::new();

    for (index, chart) in charts.into_iter().enumerate() {
        let Some(declaration) = validate_chart(index, chart, base_dir, &mut problems) else {
            continue;
        };
        let key = normalise(declaration.destination());
        if let Some(first) = destinations.get(&key) {
            problems.push(ConfigProblem::new(
                format!("charts[{index}].destination"),
                format!("{key} is already used by charts[{first}]"),
            ));
            continue;
        }
        destinations.insert(key, index);
        declarations.push(declaration);
    }

    if problems.is_empty() {
        Ok(declarations)
    } else {
        Err(ConfigError::Invalid { problems })
    }
}

fn validate_chart(
    index: usize,
    chart: RawChart,
    base_dir: &Utf8Path,
    problems: &mut Vec<ConfigProblem>,
) -> Option<Declaration> {
    let field = |name: &str| format!("charts[{index}].{name}");
    let before = problems.len();

    let name = required(chart.name, &field("name"), problems).and_then(|name| {
        ChartName::try_from(name)
            .map_err(|err| problems.push(ConfigProblem::new(field("name"), err.to_string())))
            .ok()
    });
    let repository = required(chart.repository, &field("repository"), problems);
    if let Some(repository) = repository
        .as_deref()
        .filter(|repository| !has_supported_scheme(repository))
    {
        problems.push(ConfigProblem::new(
            field("repository"),
            format!("{repository} must start with oci://, http:// or https://"),
        ));
    }
    let version = required(chart.version, &field("version"), problems);

    if problems.len() > before {
        return None;
    }
    let (name, repository, version) = (name?, repository?, version?);

    let destination = match chart.destination.map(Utf8PathBuf::from) {
        Some(destination) if destination.is_absolute() => destination,
        Some(destination) => base_dir.join(destination),
        None => base_dir.join(name.as_str()),
    };

    match Declaration::new(name, repository, version, destination) {
        Ok(declaration) => Some(
            declaration
                .with_insecure(chart.insecure)
                .with_verify(chart.verify)
                .with_extract(chart.extract),
        ),
        Err(err) => {
            problems.push(ConfigProblem::new(format!("charts[{index}]"), err.to_string()));
            None
        }
    }
}

fn has_supported_scheme(repository: &str) -> bool {
    REPOSITORY_SCHEMES
        .iter()
        .any(|scheme| repository.starts_with(scheme))
}

fn required(value: Option<String>, field: &str, problems: &mut Vec<ConfigProblem>) -> Option<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Some(value.trim().to_owned()),
        Some(_) => {
            problems.push(ConfigProblem::new(field, "must not be empty"));
            None
        }
        None => {
            problems.push(ConfigProblem::new(field, "is required"));
            None
        }
    }
}

/// Drop `.` components so `vendor/./nginx` and `vendor/nginx` compare equal.
fn normalise(path: &Utf8Path) -> Utf8PathBuf {
    path.components()
        .filter(|component| !matches!(component, Utf8Component::CurDir))
        .collect()
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
