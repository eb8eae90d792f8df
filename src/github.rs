use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::process::Output;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info};

use crate::config::Config;
use crate::download::ReleaseAsset;

/// Output of `gh release view` when the tag has no release
const RELEASE_NOT_FOUND: &str = "release not found";

/// Release operations the publisher needs
#[async_trait]
pub trait ReleaseManager: Send + Sync {
    /// Whether a release exists for `tag`
    async fn release_exists(&self, tag: &str) -> Result<bool>;

    /// Create a release for an existing tag with generated notes
    async fn create_release(&self, tag: &str) -> Result<()>;

    /// Upload assets, replacing same-named ones
    async fn upload_assets(&self, tag: &str, assets: &[ReleaseAsset]) -> Result<()>;
}

/// GitHub CLI (`gh`) backed release manager
///
/// Authentication is whatever `gh` is already configured with.
pub struct GitHubCli {
    program: String,
    repo: Option<String>,
}

impl GitHubCli {
    pub fn new(config: &Config) -> Self {
        Self {
            program: config.github.cli.clone(),
            repo: config.github.repo.clone(),
        }
    }

    fn command(&self, args: &[&str]) -> AsyncCommand {
        let mut command = AsyncCommand::new(&self.program);
        command.args(args);
        if let Some(repo) = &self.repo {
            command.args(["--repo", repo]);
        }
        command
    }

    async fn run(&self, args: &[&str]) -> Result<Output> {
        debug!("Running {} {}", self.program, args.join(" "));
        self.command(args)
            .output()
            .await
            .with_context(|| format!("Failed to execute {} {}", self.program, args.join(" ")))
    }

    async fn run_checked(&self, args: &[&str]) -> Result<()> {
        let output = self.run(args).await?;
        if !output.status.success() {
            return Err(anyhow!(
                "{} {} failed ({}): {}",
                self.program,
                args.join(" "),
                output.status,
                combined_output(&output).trim()
            ));
        }
        Ok(())
    }
}

/// stderr followed by stdout, as a terminal would show them
fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stdout));
    text
}

/// Interpret a failed `release view`: missing release, or a real error
pub fn classify_view_failure(output: &str) -> Result<bool> {
    let output = output.trim();
    if output.is_empty() || output == RELEASE_NOT_FOUND {
        Ok(false)
    } else {
        Err(anyhow!("Failed to query release: {}", output))
    }
}

#[async_trait]
impl ReleaseManager for GitHubCli {
    async fn release_exists(&self, tag: &str) -> Result<bool> {
        let output = self
            .run(&["release", "view", "--json", "tagName", tag])
            .await?;

        if output.status.success() {
            return Ok(true);
        }

        classify_view_failure(&combined_output(&output))
    }

    async fn create_release(&self, tag: &str) -> Result<()> {
        info!("creating release for tag {}", tag);
        self.run_checked(&["release", "create", tag, "--verify-tag", "--generate-notes"])
            .await
    }

    async fn upload_assets(&self, tag: &str, assets: &[ReleaseAsset]) -> Result<()> {
        let asset_args: Vec<String> = assets.iter().map(ReleaseAsset::to_arg).collect();

        let mut args = vec!["release", "upload", tag];
        args.extend(asset_args.iter().map(String::as_str));
        args.push("--clobber");

        self.run_checked(&args).await
    }
}
