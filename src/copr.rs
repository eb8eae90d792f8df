//! COPR frontend client
//!
//! Thin wrapper over the read-only parts of the COPR API that the publisher
//! needs: the project build list, per-chroot `results.json` manifests and
//! plain HEAD checks against the backend storage.

use anyhow::{Context, Result};
use reqwest::{redirect, Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;

/// Build as returned by `/api_3/build/list`
#[derive(Debug, Clone, Deserialize)]
pub struct Build {
    pub id: u64,
    pub state: String,
    #[serde(default)]
    pub source_package: SourcePackage,
    pub ended_on: Option<i64>,
    #[serde(default)]
    pub chroots: Vec<String>,
    pub repo_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcePackage {
    pub name: Option<String>,
    pub version: Option<String>,
    pub url: Option<String>,
}

impl Build {
    /// Still pending, importing, starting or running
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self.state.as_str(),
            "pending" | "importing" | "starting" | "running"
        ) || self.ended_on.map_or(true, |ended| ended == 0)
    }

    pub fn is_failed(&self) -> bool {
        self.state == "failed"
    }
}

#[derive(Debug, Deserialize)]
struct BuildList {
    #[serde(default)]
    items: Vec<Build>,
}

/// One entry of a chroot's `results.json`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BuildResult {
    pub name: String,
    pub version: String,
    pub release: String,
    pub epoch: Option<u32>,
    pub arch: String,
}

#[derive(Debug, Deserialize)]
struct BuildResults {
    #[serde(default)]
    packages: Vec<BuildResult>,
}

/// HTTP client for the COPR frontend and backend storage
#[derive(Clone)]
pub struct CoprClient {
    http: Client,
    /// Never follows redirects; a moved file is not present
    head_client: Client,
    base_url: String,
}

impl CoprClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .user_agent(config.http.user_agent.clone())
            .connect_timeout(config.connect_timeout())
            .build()
            .context("Failed to create HTTP client")?;
        let head_client = Client::builder()
            .user_agent(config.http.user_agent.clone())
            .connect_timeout(config.connect_timeout())
            .redirect(redirect::Policy::none())
            .build()
            .context("Failed to create HTTP HEAD client")?;

        Ok(Self {
            http,
            head_client,
            base_url: config.copr_base_url().to_string(),
        })
    }

    /// Underlying HTTP client, shared with the downloader
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// List every build of a project (single page, as returned by the API)
    pub async fn list_builds(&self, owner: &str, project: &str) -> Result<Vec<Build>> {
        let url = format!("{}/api_3/build/list", self.base_url);
        debug!("Listing builds for {}/{}", owner, project);

        let response = self
            .http
            .get(&url)
            .query(&[("ownername", owner), ("projectname", project)])
            .send()
            .await
            .with_context(|| format!("Failed to list builds from {}", url))?
            .error_for_status()
            .with_context(|| format!("COPR build list request failed for {}/{}", owner, project))?;

        let list: BuildList = response
            .json()
            .await
            .context("Failed to parse COPR build list")?;

        debug!("COPR returned {} builds", list.items.len());
        Ok(list.items)
    }

    /// Fetch a chroot's `results.json`; a missing manifest means no binary results
    pub async fn build_results(&self, build_dir_url: &str) -> Result<Vec<BuildResult>> {
        let url = format!("{}/results.json", build_dir_url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("No results manifest at {}", url);
            return Ok(Vec::new());
        }

        let results: BuildResults = response
            .error_for_status()
            .with_context(|| format!("Results manifest request failed: {}", url))?
            .json()
            .await
            .with_context(|| format!("Failed to parse results manifest: {}", url))?;

        Ok(results.packages)
    }

    /// HEAD check; only a plain 200 counts as present and redirects are not followed
    pub async fn url_exists(&self, url: &str) -> Result<bool> {
        let response = self
            .head_client
            .head(url)
            .send()
            .await
            .with_context(|| format!("HEAD request failed for {}", url))?;

        Ok(response.status() == StatusCode::OK)
    }
}
