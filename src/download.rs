//! Artifact downloads
//!
//! Fetches every artifact of one version into a version-scoped scratch
//! directory, a bounded number at a time.

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::Client;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// A downloaded file and the name it should carry on the release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub path: PathBuf,
    pub name: String,
}

impl ReleaseAsset {
    /// `path#name`, the form the release CLI accepts for labelled uploads
    pub fn to_arg(&self) -> String {
        format!("{}#{}", self.path.display(), self.name)
    }
}

/// Downloads artifacts with a bounded worker pool
pub struct Downloader {
    http: Client,
    root: PathBuf,
    workers: usize,
    chunk_size: usize,
}

impl Downloader {
    pub fn new(http: Client, root: impl Into<PathBuf>, workers: usize, chunk_size: usize) -> Self {
        Self {
            http,
            root: root.into(),
            workers: workers.max(1),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Download every artifact of `version`; the first failure aborts the batch
    pub async fn download_version(
        &self,
        version: &str,
        files: &BTreeMap<String, String>,
    ) -> Result<Vec<ReleaseAsset>> {
        let version_dir = self.root.join(version);
        tokio::fs::create_dir_all(&version_dir)
            .await
            .with_context(|| format!("Failed to create download directory {}", version_dir.display()))?;

        info!(
            "Downloading {} files for version {} with {} workers",
            files.len(),
            version,
            self.workers
        );

        let dir = version_dir.as_path();
        stream::iter(files.iter())
            .map(move |(file_name, url)| self.download_file(dir, version, file_name, url))
            .buffered(self.workers)
            .try_collect()
            .await
    }

    async fn download_file(
        &self,
        dir: &Path,
        version: &str,
        file_name: &str,
        url: &str,
    ) -> Result<ReleaseAsset> {
        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to download {}", url))?
            .error_for_status()
            .with_context(|| format!("Download request failed: {}", url))?;

        info!("downloading file {}/{}", version, file_name);

        let path = dir.join(file_name);
        let mut file = tokio::fs::File::create(&path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;

        let mut buffer: Vec<u8> = Vec::with_capacity(self.chunk_size);
        let mut written = 0u64;

        while let Some(bytes) = response
            .chunk()
            .await
            .with_context(|| format!("Failed reading body of {}", url))?
        {
            let mut remaining = &bytes[..];
            while !remaining.is_empty() {
                let take = (self.chunk_size - buffer.len()).min(remaining.len());
                buffer.extend_from_slice(&remaining[..take]);
                remaining = &remaining[take..];

                if buffer.len() == self.chunk_size {
                    file.write_all(&buffer)
                        .await
                        .with_context(|| format!("Failed writing {}", path.display()))?;
                    written += buffer.len() as u64;
                    buffer.clear();
                }
            }
        }

        if !buffer.is_empty() {
            file.write_all(&buffer)
                .await
                .with_context(|| format!("Failed writing {}", path.display()))?;
            written += buffer.len() as u64;
        }
        file.flush()
            .await
            .with_context(|| format!("Failed flushing {}", path.display()))?;

        debug!("Wrote {} bytes to {}", written, path.display());

        Ok(ReleaseAsset {
            path,
            name: file_name.to_string(),
        })
    }
}
