//! Tests for concurrent fetch orchestration.

use super::*;
use crate::chart::VerificationMode;
use crate::landing::{CopyError, MockChartLander};
use crate::test_utils::{ArchiveBuilder, StubChartSource, index_yaml, write_archive};
use camino::Utf8Path;
use rstest::{fixture, rstest};
use std::error::Error as _;
use tempfile::TempDir;

const REPO: &str = "https://charts.example.com";

struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    fn cache(&self) -> Utf8PathBuf {
        self.root.join("cache")
    }

    fn vendor(&self, name: &str) -> Utf8PathBuf {
        self.root.join("vendor").join(name)
    }

    fn archive(&self, file_name: &str, chart: &str) -> std::path::PathBuf {
        std::fs::create_dir_all(self.cache()).expect("create cache");
        let bytes = ArchiveBuilder::new()
            .file(&format!("{chart}/Chart.yaml"), format!("name: {chart}\n").as_bytes())
            .build();
        write_archive(self.cache().as_std_path(), file_name, &bytes)
    }
}

#[fixture]
fn workspace() -> Workspace {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8Path::from_path(dir.path()).expect("utf-8 temp dir").to_path_buf();
    Workspace { _dir: dir, root }
}

fn declaration(name: &str, repository: &str, destination: &Utf8Path) -> Declaration {
    Declaration::new(
        ChartName::try_from(name).expect("valid name"),
        repository,
        "1.0.0",
        destination,
    )
    .expect("valid declaration")
}

fn two_chart_source(workspace: &Workspace) -> StubChartSource {
    let index = index_yaml(&[
        ("nginx", "1.0.0", "charts/nginx-1.0.0.tgz"),
        ("redis", "1.0.0", "charts/redis-1.0.0.tgz"),
    ]);
    StubChartSource::default()
        .with_index(REPO, index)
        .with_archive(
            "https://charts.example.com/charts/nginx-1.0.0.tgz",
            workspace.archive("nginx.tgz", "nginx"),
        )
        .with_archive(
            "https://charts.example.com/charts/redis-1.0.0.tgz",
            workspace.archive("redis.tgz", "redis"),
        )
}

#[rstest]
fn lands_every_chart(workspace: Workspace) {
    let source = two_chart_source(&workspace);
    let declarations = vec![
        declaration("nginx", REPO, &workspace.vendor("nginx")),
        declaration("redis", REPO, &workspace.vendor("redis")).with_extract(true),
    ];

    let summary = fetch_all(&source, &declarations).expect("fetch should succeed");

    assert_eq!(summary.total(), 2);
    assert!(workspace.vendor("nginx").join("nginx-1.0.0.tgz").is_file());
    assert!(workspace.vendor("redis").join("Chart.yaml").is_file());
    let names: Vec<_> = summary.landed.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["nginx", "redis"]);
}

#[rstest]
fn failing_chart_does_not_stop_the_others(workspace: Workspace) {
    let source = two_chart_source(&workspace);
    let declarations = vec![
        declaration("missing", REPO, &workspace.vendor("missing")),
        declaration("nginx", REPO, &workspace.vendor("nginx")),
    ];

    let err = fetch_all(&source, &declarations).expect_err("one chart should fail");

    assert_eq!(err.attempted, 2);
    assert_eq!(err.failures.len(), 1);
    assert_eq!(err.failures[0].name.as_str(), "missing");
    assert!(matches!(
        err.failures[0].error,
        ChartError::Resolve(ResolutionError::ChartNotFound { .. })
    ));
    assert!(workspace.vendor("nginx").join("nginx-1.0.0.tgz").is_file());
}

#[rstest]
fn middle_resolution_failure_leaves_neighbours_landed(workspace: Workspace) {
    let source = two_chart_source(&workspace);
    let declarations = vec![
        declaration("nginx", REPO, &workspace.vendor("nginx")),
        declaration("absent", REPO, &workspace.vendor("absent")),
        declaration("redis", REPO, &workspace.vendor("redis")).with_extract(true),
    ];

    let err = fetch_all(&source, &declarations).expect_err("middle chart should fail");

    assert_eq!(err.attempted, 3);
    assert_eq!(err.failures.len(), 1);
    assert_eq!(err.failures[0].name.as_str(), "absent");
    assert!(matches!(
        err.failures[0].error,
        ChartError::Resolve(ResolutionError::ChartNotFound { .. })
    ));
    assert!(err.to_string().contains("1 of 3 failed"));
    assert!(workspace.vendor("nginx").join("nginx-1.0.0.tgz").is_file());
    assert!(workspace.vendor("redis").join("Chart.yaml").is_file());
}

#[rstest]
fn keeps_every_failure_in_declaration_order(workspace: Workspace) {
    let source = StubChartSource::default().with_index(REPO, index_yaml(&[]));
    let declarations = vec![
        declaration("zeta", REPO, &workspace.vendor("zeta")),
        declaration("alpha", "https://unknown.example.com", &workspace.vendor("alpha")),
        declaration("mid", REPO, &workspace.vendor("mid")),
    ];

    let err = fetch_all(&source, &declarations).expect_err("all charts should fail");

    let names: Vec<_> = err.failures.iter().map(|failure| failure.name.as_str()).collect();
    assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    assert!(matches!(
        err.failures[1].error,
        ChartError::Resolve(ResolutionError::IndexUnavailable { .. })
    ));
    let message = err.to_string();
    assert!(message.contains("3 of 3 failed"));
    assert!(message.contains("- alpha: "));
    assert!(err.source().is_some());
}

#[rstest]
fn panicking_download_becomes_a_chart_failure(workspace: Workspace) {
    let source = two_chart_source(&workspace).panicking_on("https://charts.example.com/charts/redis-1.0.0.tgz");
    let declarations = vec![
        declaration("nginx", REPO, &workspace.vendor("nginx")),
        declaration("redis", REPO, &workspace.vendor("redis")),
    ];

    let err = fetch_all(&source, &declarations).expect_err("panic should surface");

    assert_eq!(err.failures.len(), 1);
    assert!(matches!(
        &err.failures[0].error,
        ChartError::TaskPanicked { message } if message.contains("stub panic")
    ));
    assert!(workspace.vendor("nginx").join("nginx-1.0.0.tgz").is_file());
}

#[rstest]
#[case::verify(true, VerificationMode::Always)]
#[case::no_verify(false, VerificationMode::Never)]
fn passes_verification_mode_to_the_source(
    workspace: Workspace,
    #[case] verify: bool,
    #[case] expected: VerificationMode,
) {
    let source = two_chart_source(&workspace);
    let declarations = vec![declaration("nginx", REPO, &workspace.vendor("nginx")).with_verify(verify)];

    fetch_all(&source, &declarations).expect("fetch should succeed");

    assert_eq!(
        source.downloads(),
        vec![(
            "https://charts.example.com/charts/nginx-1.0.0.tgz".to_owned(),
            expected
        )]
    );
}

#[rstest]
fn oci_charts_skip_the_index(workspace: Workspace) {
    let source = StubChartSource::default().with_archive(
        "oci://registry.example.com/charts/nginx",
        workspace.archive("nginx-oci.tgz", "nginx"),
    );
    let declarations = vec![
        declaration("nginx", "oci://registry.example.com/charts", &workspace.vendor("nginx"))
            .with_extract(true),
    ];

    fetch_all(&source, &declarations).expect("fetch should succeed");

    assert!(source.index_calls().is_empty());
    assert!(workspace.vendor("nginx").join("Chart.yaml").is_file());
}

#[rstest]
fn creates_destination_before_landing(workspace: Workspace) {
    let source = two_chart_source(&workspace);
    let destination = workspace.vendor("deeply").join("nested/nginx");
    let declarations = vec![declaration("nginx", REPO, &destination)];

    let mut lander = MockChartLander::new();
    lander
        .expect_land()
        .withf(|_, declaration, url| {
            declaration.destination().is_dir()
                && url == "https://charts.example.com/charts/nginx-1.0.0.tgz"
        })
        .times(1)
        .returning(|_, declaration, _| {
            Ok(LandedChart::Copied {
                path: declaration.destination().join("nginx-1.0.0.tgz"),
                bytes: 0,
            })
        });

    let summary = fetch_all_with(&source, &lander, &declarations).expect("fetch should succeed");
    assert_eq!(summary.total(), 1);
}

#[rstest]
fn destination_creation_failure_skips_download(workspace: Workspace) {
    let source = two_chart_source(&workspace);
    std::fs::create_dir_all(workspace.root.join("vendor")).expect("vendor dir");
    std::fs::write(workspace.vendor("blocker"), b"file").expect("blocker file");
    let declarations = vec![declaration("nginx", REPO, &workspace.vendor("blocker").join("nginx"))];

    let mut lander = MockChartLander::new();
    lander.expect_land().never();

    let err = fetch_all_with(&source, &lander, &declarations).expect_err("mkdir should fail");

    assert!(matches!(
        err.failures[0].error,
        ChartError::CreateDestination { .. }
    ));
    assert!(source.index_calls().is_empty());
    assert!(source.downloads().is_empty());
}

#[rstest]
fn landing_failure_is_reported_as_land_phase(workspace: Workspace) {
    let source = two_chart_source(&workspace);
    let declarations = vec![declaration("nginx", REPO, &workspace.vendor("nginx"))];

    let mut lander = MockChartLander::new();
    lander.expect_land().times(1).returning(|archive, _, _| {
        Err(LandingError::Copy(CopyError::OpenSource {
            path: archive.to_path_buf(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        }))
    });

    let err = fetch_all_with(&source, &lander, &declarations).expect_err("landing should fail");

    assert!(matches!(err.failures[0].error, ChartError::Land(_)));
    assert!(err.to_string().contains("cannot open chart in repository cache"));
}

#[test]
fn empty_declaration_list_is_an_empty_summary() {
    let source = StubChartSource::default();
    let summary = fetch_all(&source, &[]).expect("nothing to fetch");
    assert_eq!(summary.total(), 0);
}

#[test]
fn panic_message_reads_string_payloads() {
    let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
    let borrowed: Box<dyn Any + Send> = Box::new("borrowed");
    let other: Box<dyn Any + Send> = Box::new(7_u8);
    assert_eq!(panic_message(owned.as_ref()), "owned");
    assert_eq!(panic_message(borrowed.as_ref()), "borrowed");
    assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
}
