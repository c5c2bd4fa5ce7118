//! chart-vendor CLI entrypoint.
//!
//! Reads the vendor-charts document, fetches every declared chart
//! concurrently, and lands each one in its destination directory.

use chart_vendor::chart::HttpChartClient;
use chart_vendor::cli::{Cli, Command};
use chart_vendor::config;
use chart_vendor::error::Result;
use chart_vendor::fetch::fetch_all;
use chart_vendor::logging::{init_logging, level_for};
use chart_vendor::output::{landed_message, summary_message, version_line};
use chart_vendor::settings::Settings;
use clap::Parser;
use log::{debug, info};
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    let settings = Settings::from_env();
    let mut stderr = std::io::stderr();
    if let Err(err) = init_logging(level_for(settings.debug(), cli.verbosity)) {
        write_stderr_line(&mut stderr, format!("logging disabled: {err}"));
    }

    let mut stdout = std::io::stdout();
    let run_result = run(&cli, &settings, &mut stdout);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &Cli, settings: &Settings, stdout: &mut dyn Write) -> Result<()> {
    match cli.command {
        Command::Version => {
            writeln!(
                stdout,
                "{}",
                version_line(
                    env!("CARGO_PKG_VERSION"),
                    option_env!("CHART_VENDOR_COMMIT").unwrap_or("unknown"),
                    option_env!("CHART_VENDOR_BUILD_DATE").unwrap_or("unknown"),
                )
            )?;
            Ok(())
        }
        Command::Verify => {
            let declarations = config::load(&cli.file, &cli.base_dir)?;
            info!("config is valid file={} charts={}", cli.file, declarations.len());
            Ok(())
        }
        Command::Download => {
            let declarations = config::load(&cli.file, &cli.base_dir)?;
            let client = HttpChartClient::new(settings)?;
            let summary = fetch_all(&client, &declarations)?;
            for (name, landed) in &summary.landed {
                debug!("{name}: {}", landed_message(landed));
            }
            info!("{}", summary_message(&summary));
            Ok(())
        }
    }
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, err);
            1
        }
    }
}

fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::{Utf8Path, Utf8PathBuf};
    use chart_vendor::config::ConfigError;
    use chart_vendor::error::VendorError;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Project {
        _dir: TempDir,
        root: Utf8PathBuf,
    }

    #[fixture]
    fn project() -> Project {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8Path::from_path(dir.path())
            .expect("utf-8 temp dir")
            .to_path_buf();
        Project { _dir: dir, root }
    }

    fn cli_for(project: &Project, command: &str) -> Cli {
        Cli::parse_from([
            "chart-vendor",
            command,
            "-f",
            project.root.join("charts.yaml").as_str(),
            "--base-dir",
            project.root.as_str(),
        ])
    }

    fn settings_for(project: &Project) -> Settings {
        Settings::for_cache_root(&project.root.join("cache"))
    }

    #[test]
    fn exit_code_for_run_result_returns_zero_on_success() {
        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Ok(()), &mut stderr);
        assert_eq!(exit_code, 0);
        assert!(stderr.is_empty());
    }

    #[test]
    fn exit_code_for_run_result_prints_error_and_returns_one() {
        let err = VendorError::Config(ConfigError::NotFound {
            path: Utf8PathBuf::from(".vendor-charts.yaml"),
        });

        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Err(err), &mut stderr);
        assert_eq!(exit_code, 1);

        let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(stderr_text.contains("config file .vendor-charts.yaml does not exist"));
    }

    #[rstest]
    fn version_prints_package_version(project: Project) {
        let mut stdout = Vec::new();
        run(&cli_for(&project, "version"), &settings_for(&project), &mut stdout)
            .expect("version should succeed");

        let text = String::from_utf8(stdout).expect("stdout was not UTF-8");
        assert!(text.starts_with(&format!("chart-vendor {}", env!("CARGO_PKG_VERSION"))));
    }

    #[rstest]
    fn version_does_not_need_a_config_file(project: Project) {
        let mut stdout = Vec::new();
        assert!(run(&cli_for(&project, "version"), &settings_for(&project), &mut stdout).is_ok());
    }

    #[rstest]
    fn verify_accepts_valid_config(project: Project) {
        std::fs::write(
            project.root.join("charts.yaml"),
            "charts:\n  - name: nginx\n    repository: https://charts.example.com\n    version: 1.0.0\n",
        )
        .expect("write config");

        let mut stdout = Vec::new();
        run(&cli_for(&project, "verify"), &settings_for(&project), &mut stdout)
            .expect("verify should succeed");
        assert!(!project.root.join("nginx").exists());
    }

    #[rstest]
    #[case::verify("verify")]
    #[case::download("download")]
    fn commands_fail_without_config(project: Project, #[case] command: &str) {
        let mut stdout = Vec::new();
        let err = run(&cli_for(&project, command), &settings_for(&project), &mut stdout)
            .expect_err("missing config should fail");
        assert!(matches!(err, VendorError::Config(ConfigError::NotFound { .. })));
    }

    #[rstest]
    fn verify_reports_invalid_config(project: Project) {
        std::fs::write(project.root.join("charts.yaml"), "charts: []\n").expect("write config");

        let mut stdout = Vec::new();
        let err = run(&cli_for(&project, "verify"), &settings_for(&project), &mut stdout)
            .expect_err("empty config should fail");

        let mut stderr = Vec::new();
        assert_eq!(exit_code_for_run_result(Err(err), &mut stderr), 1);
        let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(stderr_text.contains("charts: at least one chart is required"));
    }
}
