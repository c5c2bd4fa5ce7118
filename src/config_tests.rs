//! Tests for configuration loading and validation.

use super::*;
use rstest::rstest;

const BASE: &str = "/srv/project";

fn parse_yaml(document: &str) -> Result<Vec<Declaration>, ConfigError> {
    parse_declarations(document.as_bytes(), ConfigFormat::Yaml, Utf8Path::new(BASE))
}

fn problems(err: ConfigError) -> Vec<String> {
    match err {
        ConfigError::Invalid { problems } => problems.iter().map(ToString::to_string).collect(),
        other => panic!("expected validation failure, got {other}"),
    }
}

#[test]
fn parses_full_chart_entry() {
    let declarations = parse_yaml(
        r"
charts:
  - name: traefik
    repository: oci://ghcr.io/traefik/helm
    version: 37.4.0
    destination: artifacts/traefik
    insecure: true
    verify: true
    extract: true
",
    )
    .expect("document should be valid");

    let traefik = &declarations[0];
    assert_eq!(traefik.name().as_str(), "traefik");
    assert_eq!(traefik.repository(), "oci://ghcr.io/traefik/helm");
    assert_eq!(traefik.version(), "37.4.0");
    assert_eq!(traefik.destination().as_str(), "/srv/project/artifacts/traefik");
    assert!(traefik.insecure() && traefik.verify() && traefik.extract());
}

#[test]
fn defaults_destination_and_flags() {
    let declarations = parse_yaml(
        "charts:\n  - name: nginx\n    repository: https://charts.example.com\n    version: 1.0.0\n",
    )
    .expect("document should be valid");

    let nginx = &declarations[0];
    assert_eq!(nginx.destination().as_str(), "/srv/project/nginx");
    assert!(!nginx.insecure() && !nginx.verify() && !nginx.extract());
}

#[test]
fn keeps_absolute_destinations() {
    let declarations = parse_yaml(
        "charts:\n  - name: nginx\n    repository: https://charts.example.com\n    version: 1.0.0\n    destination: /opt/charts/nginx\n",
    )
    .expect("document should be valid");
    assert_eq!(declarations[0].destination().as_str(), "/opt/charts/nginx");
}

#[rstest]
#[case::integer("version: 2", "2")]
#[case::float("version: 1.5", "1.5")]
#[case::quoted("version: \"0.1.0\"", "0.1.0")]
fn numeric_versions_are_kept_as_text(#[case] version_line: &str, #[case] expected: &str) {
    let document = format!(
        "charts:\n  - name: nginx\n    repository: https://charts.example.com\n    {version_line}\n"
    );
    let declarations = parse_yaml(&document).expect("document should be valid");
    assert_eq!(declarations[0].version(), expected);
}

#[test]
fn yaml_and_toml_documents_agree() {
    let yaml = r"
charts:
  - name: traefik
    repository: oci://ghcr.io/traefik/helm
    version: 37.4.0
    extract: true
  - name: nginx
    repository: https://charts.example.com
    version: 1.0.0
    destination: vendor/web
    verify: true
";
    let toml = r#"
[[charts]]
name = "traefik"
repository = "oci://ghcr.io/traefik/helm"
version = "37.4.0"
extract = true

[[charts]]
name = "nginx"
repository = "https://charts.example.com"
version = "1.0.0"
destination = "vendor/web"
verify = true
"#;

    let from_yaml = parse_yaml(yaml).expect("YAML should be valid");
    let from_toml = parse_declarations(toml.as_bytes(), ConfigFormat::Toml, Utf8Path::new(BASE))
        .expect("TOML should be valid");
    assert_eq!(from_yaml, from_toml);
}

#[test]
fn reports_every_problem_at_once() {
    let err = parse_yaml(
        r"
charts:
  - name: ''
    repository: ftp://example.com
  - name: ../escape
    repository: https://charts.example.com
    version: '  '
",
    )
    .expect_err("document should be invalid");

    assert_eq!(
        problems(err),
        vec![
            "charts[0].name: must not be empty",
            "charts[0].repository: ftp://example.com must start with oci://, http:// or https://",
            "charts[0].version: is required",
            "charts[1].name: chart name \"../escape\" must not contain path separators",
            "charts[1].version: must not be empty",
        ]
    );
}

#[test]
fn rejects_duplicate_destinations() {
    let err = parse_yaml(
        r"
charts:
  - name: nginx
    repository: https://charts.example.com
    version: 1.0.0
  - name: other
    repository: https://charts.example.com
    version: 1.0.0
    destination: ./nginx
",
    )
    .expect_err("duplicate destination should be rejected");

    let problems = problems(err);
    assert_eq!(problems.len(), 1);
    assert!(problems[0].starts_with("charts[1].destination: /srv/project/nginx is already used by charts[0]"));
}

#[rstest]
#[case::missing_key("{}")]
#[case::empty_list("charts: []")]
fn requires_at_least_one_chart(#[case] document: &str) {
    let err = parse_yaml(document).expect_err("no charts should be rejected");
    assert_eq!(problems(err), vec!["charts: at least one chart is required"]);
}

#[test]
fn rejects_unknown_fields() {
    let err = parse_yaml(
        "charts:\n  - name: nginx\n    repository: https://charts.example.com\n    version: 1.0.0\n    colour: blue\n",
    )
    .expect_err("unknown field should be rejected");
    assert!(matches!(err, ConfigError::Parse { format: ConfigFormat::Yaml, .. }));
    assert!(err.to_string().contains("colour"));
}

#[test]
fn invalid_display_lists_problems() {
    let err = ConfigError::Invalid {
        problems: vec![
            ConfigProblem::new("charts[0].name", "is required"),
            ConfigProblem::new("charts[1].version", "is required"),
        ],
    };
    assert_eq!(
        err.to_string(),
        "invalid configuration file:\n- charts[0].name: is required\n- charts[1].version: is required"
    );
}

#[test]
fn load_reports_missing_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = Utf8Path::from_path(dir.path())
        .expect("utf-8 temp dir")
        .join(DEFAULT_CONFIG_FILE);
    let err = load(&path, Utf8Path::new(BASE)).expect_err("missing file should fail");
    assert!(matches!(err, ConfigError::NotFound { .. }));
}

#[test]
fn load_picks_format_from_extension() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8Path::from_path(dir.path()).expect("utf-8 temp dir");
    let path = root.join("charts.toml");
    std::fs::write(
        &path,
        "[[charts]]\nname = \"nginx\"\nrepository = \"https://charts.example.com\"\nversion = \"1.0.0\"\n",
    )
    .expect("write config");

    let declarations = load(&path, root).expect("TOML config should load");
    assert_eq!(declarations[0].destination(), root.join("nginx").as_path());
}
