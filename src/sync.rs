//! Sync Engine - Publishes COPR artifacts to GitHub releases
//!
//! Drives the whole run: collect finished builds, resolve their artifacts,
//! map tags to versions and, tag by tag, create the release and upload the
//! files. Tags are processed strictly one after another.

use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::builds::{self, ArtifactSet, BuildCollector, CollectOptions};
use crate::copr::CoprClient;
use crate::download::Downloader;
use crate::git::{self, GitClient, TagMapper};
use crate::github::{GitHubCli, ReleaseManager};
use crate::Config;

/// Exit status when an explicitly requested tag has nothing to publish
pub const EXIT_NO_ARTIFACTS: i32 = 100;

/// Everything the command line decides about a run
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub owner: String,
    pub project: String,
    pub package: String,
    pub tag_to_version_re: Option<String>,
    pub tag: Option<String>,
    pub fetch_tags: bool,
    pub clobber_assets: bool,
    pub ignore_epoch: bool,
    pub wait_for_builds: bool,
    pub dry_run: bool,
}

/// Per-tag publishing switches
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// The single tag requested on the command line, if any
    pub explicit_tag: Option<String>,
    pub clobber_assets: bool,
    pub dry_run: bool,
}

/// What happened to one tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
    /// Release was created and assets uploaded
    Created { tag: String, version: String, assets: usize },
    /// Existing release had its assets re-uploaded
    Uploaded { tag: String, version: String, assets: usize },
    /// Release exists and clobbering was not requested
    Skipped { tag: String, reason: String },
    /// No artifacts for the tag's version
    NoArtifacts { tag: String, version: String },
    /// Dry run: the release would be checked and assets published
    WouldPublish { tag: String, version: String, assets: usize },
}

/// Results from a complete run
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub total_tags: usize,
    pub published: usize,
    pub skipped: usize,
    pub missing: usize,
    pub duration: Duration,
    pub results: Vec<TagOutcome>,
    /// The explicitly requested tag had no artifacts
    pub requested_tag_missing: bool,
}

impl SyncSummary {
    /// Process exit status for this run
    pub fn exit_code(&self) -> i32 {
        if self.requested_tag_missing {
            EXIT_NO_ARTIFACTS
        } else {
            0
        }
    }
}

/// Publishes artifact sets to releases, tag by tag
pub struct SyncEngine<R: ReleaseManager> {
    releases: R,
    downloader: Downloader,
    mapper: TagMapper,
    options: PublishOptions,
}

impl<R: ReleaseManager> SyncEngine<R> {
    pub fn new(releases: R, downloader: Downloader, mapper: TagMapper, options: PublishOptions) -> Self {
        Self {
            releases,
            downloader,
            mapper,
            options,
        }
    }

    /// Process every tag in order
    pub async fn publish_tags(&self, tags: &[String], artifacts: &ArtifactSet) -> Result<SyncSummary> {
        let start_time = Instant::now();
        let mut results = Vec::new();
        let mut requested_tag_missing = false;

        for tag in tags {
            let outcome = self.publish_tag(tag, artifacts).await?;

            let missing = matches!(outcome, TagOutcome::NoArtifacts { .. });
            results.push(outcome);

            if missing && self.options.explicit_tag.is_some() {
                requested_tag_missing = true;
                break;
            }
        }

        let summary = compile_summary(results, start_time.elapsed(), requested_tag_missing);

        info!(
            "Processed {} tags in {:.2}s: {} published, {} skipped, {} without artifacts",
            summary.total_tags,
            summary.duration.as_secs_f64(),
            summary.published,
            summary.skipped,
            summary.missing
        );

        Ok(summary)
    }

    /// Publish one tag
    pub async fn publish_tag(&self, tag: &str, artifacts: &ArtifactSet) -> Result<TagOutcome> {
        info!("processing tag {}", tag);
        let version = self
            .mapper
            .version_for(tag)
            .with_context(|| format!("Failed to map tag {} to a version", tag))?;
        info!("tag {} maps to rpm version {}", tag, version);

        let Some(files) = artifacts.get(&version) else {
            info!("no asset files found for tag {} rpm version {}", tag, version);
            return Ok(TagOutcome::NoArtifacts {
                tag: tag.to_string(),
                version,
            });
        };

        if self.options.dry_run {
            info!(
                "dry run: would publish {} files to release {}: {}",
                files.len(),
                tag,
                files.keys().cloned().collect::<Vec<_>>().join(", ")
            );
            return Ok(TagOutcome::WouldPublish {
                tag: tag.to_string(),
                version,
                assets: files.len(),
            });
        }

        let release_found = self.releases.release_exists(tag).await?;
        debug!("Release for {} exists: {}", tag, release_found);

        if !release_found {
            self.releases.create_release(tag).await?;
        }

        if release_found && !self.options.clobber_assets {
            info!("Release {} already exists and no '--clobber-assets' is specified", tag);
            return Ok(TagOutcome::Skipped {
                tag: tag.to_string(),
                reason: "release exists".to_string(),
            });
        }

        let assets = self.downloader.download_version(&version, files).await?;
        info!(
            "uploading files into release {}: {}",
            tag,
            assets
                .iter()
                .map(|asset| asset.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.releases.upload_assets(tag, &assets).await?;

        let count = assets.len();
        Ok(if release_found {
            TagOutcome::Uploaded {
                tag: tag.to_string(),
                version,
                assets: count,
            }
        } else {
            TagOutcome::Created {
                tag: tag.to_string(),
                version,
                assets: count,
            }
        })
    }
}

/// Compile run summary from per-tag outcomes
fn compile_summary(results: Vec<TagOutcome>, duration: Duration, requested_tag_missing: bool) -> SyncSummary {
    let mut published = 0;
    let mut skipped = 0;
    let mut missing = 0;

    for result in &results {
        match result {
            TagOutcome::Created { .. } | TagOutcome::Uploaded { .. } | TagOutcome::WouldPublish { .. } => {
                published += 1
            }
            TagOutcome::Skipped { .. } => skipped += 1,
            TagOutcome::NoArtifacts { .. } => missing += 1,
        }
    }

    SyncSummary {
        total_tags: results.len(),
        published,
        skipped,
        missing,
        duration,
        results,
        requested_tag_missing,
    }
}

/// Run the full pipeline against COPR, git and the `gh` CLI
pub async fn run(config: &Config, request: &RunRequest) -> Result<SyncSummary> {
    // Fail on a bad regex before spending minutes waiting on COPR
    let mapper = TagMapper::from_pattern(request.tag_to_version_re.as_deref())?;

    let client = CoprClient::new(config)?;
    let collector = BuildCollector::new(
        client.clone(),
        CollectOptions {
            owner: request.owner.clone(),
            project: request.project.clone(),
            package: request.package.clone(),
            ignore_epoch: request.ignore_epoch,
            wait_for_builds: request.wait_for_builds,
            poll_interval: config.poll_interval(),
        },
    );

    let builds = collector
        .collect()
        .await
        .context("Failed to collect COPR builds")?;
    debug!("Builds per version: {:?}", builds::describe(&builds));

    let artifacts = builds::resolve_artifacts(&client, &builds)
        .await
        .context("Failed to resolve build artifacts")?;
    info!("Resolved artifacts for {} versions", artifacts.len());

    let git = GitClient::current_dir()?;
    let tags = git::resolve_tags(&git, request.tag.as_deref(), request.fetch_tags).await?;

    let scratch = scratch_dir(config)?;
    debug!("Downloading into {}", scratch.path().display());
    let downloader = Downloader::new(
        client.http().clone(),
        scratch.path(),
        config.downloads.workers,
        config.downloads.chunk_size,
    );

    let engine = SyncEngine::new(
        GitHubCli::new(config),
        downloader,
        mapper,
        PublishOptions {
            explicit_tag: request.tag.clone(),
            clobber_assets: request.clobber_assets,
            dry_run: request.dry_run,
        },
    );

    engine.publish_tags(&tags, &artifacts).await
}

/// Per-run scratch directory, removed when dropped
fn scratch_dir(config: &Config) -> Result<tempfile::TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("copr-gh-release-");

    match &config.downloads.directory {
        Some(parent) => builder
            .tempdir_in(parent)
            .with_context(|| format!("Failed to create scratch directory in {}", parent)),
        None => builder.tempdir().context("Failed to create scratch directory"),
    }
}
