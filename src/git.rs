use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info};

/// Git tag operations for the repository being released
pub struct GitClient {
    repo_dir: PathBuf,
}

impl GitClient {
    /// Create a client operating on the given working tree
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }

    /// Git client for the current directory
    pub fn current_dir() -> Result<Self> {
        let dir = std::env::current_dir().context("Failed to determine current directory")?;
        Ok(Self::new(dir))
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Refresh tags from the remote
    pub async fn fetch_tags(&self) -> Result<()> {
        info!("Fetching tags in {}", self.repo_dir.display());

        let output = AsyncCommand::new("git")
            .args(["fetch", "--tags"])
            .current_dir(&self.repo_dir)
            .output()
            .await
            .context("Failed to execute git fetch")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Git fetch --tags failed: {}", stderr.trim()));
        }

        Ok(())
    }

    /// List every tag in the repository
    pub async fn list_tags(&self) -> Result<Vec<String>> {
        let output = AsyncCommand::new("git")
            .args(["tag", "-l"])
            .current_dir(&self.repo_dir)
            .output()
            .await
            .context("Failed to execute git tag")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Git tag listing failed: {}", stderr.trim()));
        }

        let tags: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        debug!("Found {} tags", tags.len());
        Ok(tags)
    }
}

/// Maps tags to package versions
#[derive(Debug, Clone, Default)]
pub struct TagMapper {
    pattern: Option<Regex>,
}

impl TagMapper {
    pub fn new(pattern: Option<Regex>) -> Self {
        Self { pattern }
    }

    /// Build a mapper from an optional regex source
    pub fn from_pattern(pattern: Option<&str>) -> Result<Self> {
        let pattern = pattern
            .map(|p| Regex::new(p).with_context(|| format!("Invalid tag-to-version regex: {}", p)))
            .transpose()?;
        Ok(Self::new(pattern))
    }

    /// Version for `tag`: capture group 1 of a match anchored at the tag start, or the tag itself
    pub fn version_for(&self, tag: &str) -> Result<String> {
        let Some(pattern) = &self.pattern else {
            return Ok(tag.to_string());
        };

        let captures = pattern
            .captures(tag)
            .filter(|captures| captures.get(0).map_or(false, |m| m.start() == 0))
            .ok_or_else(|| anyhow!("Tag {} does not match {}", tag, pattern.as_str()))?;

        captures
            .get(1)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| anyhow!("Tag {} has no version group in {}", tag, pattern.as_str()))
    }
}

/// Tags to process: the explicitly requested one, or all tags in the repository
pub async fn resolve_tags(git: &GitClient, explicit: Option<&str>, fetch: bool) -> Result<Vec<String>> {
    if fetch {
        git.fetch_tags().await?;
    }

    match explicit {
        Some(tag) => Ok(vec![tag.to_string()]),
        None => git.list_tags().await,
    }
}
