use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for copr-gh-release
///
/// Everything that identifies *what* to publish (owner, project, package, tags)
/// comes from the command line. The file only tunes *how* it is done.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// COPR endpoint and polling behaviour
    #[serde(default)]
    pub copr: CoprConfig,

    /// Artifact download settings
    #[serde(default)]
    pub downloads: DownloadConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Release CLI settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// COPR configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoprConfig {
    /// Base URL of the COPR frontend
    #[serde(default = "default_copr_url")]
    pub base_url: String,

    /// Seconds to sleep before rescanning when builds are still in flight
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

/// Download configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DownloadConfig {
    /// Maximum concurrent downloads per version
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Write buffer size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Parent directory for the per-run scratch directory (system temp if unset)
    pub directory: Option<String>,
}

/// HTTP client configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// User-Agent header sent to COPR
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// GitHub release CLI configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitHubConfig {
    /// Release management executable
    #[serde(default = "default_cli")]
    pub cli: String,

    /// Target repository (`OWNER/REPO`), defaults to the current checkout
    pub repo: Option<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"
}

// Default value functions
fn default_copr_url() -> String {
    "https://copr.fedorainfracloud.org".to_string()
}
fn default_poll_interval() -> u64 {
    30
}
fn default_workers() -> usize {
    10
}
fn default_chunk_size() -> usize {
    1024 * 1024
}
fn default_connect_timeout() -> u64 {
    30
}
fn default_user_agent() -> String {
    format!("copr-gh-release/{}", env!("CARGO_PKG_VERSION"))
}
fn default_cli() -> String {
    "gh".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations
impl Default for CoprConfig {
    fn default() -> Self {
        Self {
            base_url: default_copr_url(),
            poll_interval: default_poll_interval(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            chunk_size: default_chunk_size(),
            directory: None,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            cli: default_cli(),
            repo: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to built-in defaults
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            tracing::debug!("No configuration at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        // Expand environment variables in paths
        config.expand_paths()?;

        Ok(config)
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("copr-gh-release").join("config.yml"))
    }

    /// Expand environment variables in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        if let Some(directory) = &self.downloads.directory {
            let expanded = shellexpand::full(directory)
                .context("Failed to expand downloads.directory path")?
                .into_owned();
            self.downloads.directory = Some(expanded);
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.copr.poll_interval)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.http.connect_timeout)
    }

    /// COPR base URL without a trailing slash
    pub fn copr_base_url(&self) -> &str {
        self.copr.base_url.trim_end_matches('/')
    }
}
