/// Common test utilities and helpers for copr-gh-release tests
use assert_fs::prelude::*;
use assert_fs::TempDir;
use serde_json::json;
use std::path::PathBuf;
use std::process::{Command, Output};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Isolated configuration for one binary invocation
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub config_path: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = temp_dir.child("config.yml");
        config
            .write_str("copr:\n  poll_interval: 0\nlogging:\n  level: \"info\"\n")
            .expect("Failed to write test config");

        Self {
            config_path: config.path().to_path_buf(),
            temp_dir,
        }
    }

    /// Run the binary against `copr_url` with the required COPR flags plus `args`
    pub fn run(&self, copr_url: &str, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_copr-gh-release"))
            .args([
                "--copr-owner-name",
                "octo",
                "--copr-project-name",
                "widgets",
                "--copr-package-name",
                "widget",
                "--copr-url",
                copr_url,
                "--config",
            ])
            .arg(&self.config_path)
            .args(args)
            .env("XDG_CONFIG_HOME", self.temp_dir.path())
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1")
            .current_dir(self.temp_dir.path())
            .output()
            .expect("Failed to execute copr-gh-release")
    }
}

/// COPR frontend and backend serving one finished build of `widget` at `version`
pub async fn copr_with_build(version: &str) -> MockServer {
    let server = MockServer::start().await;
    let repo_url = format!("{}/results/octo/widgets", server.uri());

    Mock::given(method("GET"))
        .and(path("/api_3/build/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "id": 1,
                "state": "succeeded",
                "source_package": {
                    "name": "widget",
                    "version": version,
                    "url": format!("{}/srpm-builds/00000001/widget-{}-1.src.rpm", repo_url, version)
                },
                "ended_on": 1700000000,
                "chroots": ["fedora-39-x86_64"],
                "repo_url": repo_url
            }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    server
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
