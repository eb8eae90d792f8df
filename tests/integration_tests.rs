use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;
use std::process::Command;

mod common;

use common::{copr_with_build, stderr, stdout, TestEnvironment};

/// Integration tests for the copr-gh-release binary
/// These tests run the actual binary against a mocked COPR service

fn binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_copr-gh-release"))
}

#[test]
fn test_cli_help() {
    let output = binary().arg("--help").output().expect("Failed to execute command");

    assert!(output.status.success());
    let help = stdout(&output);

    for flag in [
        "--copr-owner-name",
        "--copr-project-name",
        "--copr-package-name",
        "--tag-to-version-re",
        "--tag",
        "--fetch-tags",
        "--clobber-assets",
        "--no-ignore-epoch",
        "--no-wait-build",
        "--dry-run",
    ] {
        assert!(predicate::str::contains(flag).eval(&help), "help is missing {}", flag);
    }
}

#[test]
fn test_cli_version() {
    let output = binary().arg("--version").output().expect("Failed to execute command");

    assert!(output.status.success());
    assert!(predicate::str::contains("copr-gh-release").eval(&stdout(&output)));
}

#[test]
fn test_required_arguments() {
    let output = binary()
        .args(["--copr-owner-name", "octo"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    assert!(predicate::str::contains("--copr-project-name").eval(&stderr(&output)));
}

#[test]
fn test_error_handling_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.child("invalid-config.yml");
    config.write_str("copr: [").unwrap();

    let output = binary()
        .args([
            "--copr-owner-name",
            "octo",
            "--copr-project-name",
            "widgets",
            "--copr-package-name",
            "widget",
            "--config",
        ])
        .arg(config.path())
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    assert!(predicate::str::contains("Failed to parse config file").eval(&stderr(&output)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_requested_tag_without_artifacts_exits_100() {
    let server = copr_with_build("1.0.0").await;
    let env = TestEnvironment::new();

    let output = env.run(
        &server.uri(),
        &["--tag", "v1.1.0", "--tag-to-version-re", "^v(.*)$", "--dry-run"],
    );

    assert_eq!(output.status.code(), Some(100), "stderr: {}", stderr(&output));
    assert!(predicate::str::contains("no asset files found for tag v1.1.0").eval(&stdout(&output)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dry_run_reports_artifacts() {
    let server = copr_with_build("1.0.0").await;
    let env = TestEnvironment::new();

    let output = env.run(
        &server.uri(),
        &["--tag", "v1.0.0", "--tag-to-version-re", "^v(.*)$", "--dry-run"],
    );

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(predicate::str::contains("would publish 1 assets").eval(&out));
    assert!(predicate::str::contains("widget-1.0.0-1.src.rpm").eval(&out));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_copr_failure_is_fatal() {
    let server = wiremock::MockServer::start().await;
    let env = TestEnvironment::new();

    // No mocks mounted: the build list answers 404
    let output = env.run(&server.uri(), &["--tag", "v1.0.0", "--dry-run"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(predicate::str::contains("Failed to collect COPR builds").eval(&stderr(&output)));
}
