//! Preflight checks
//!
//! Verifies the external tools a run depends on before any work starts.

use std::path::Path;
use std::process::Command;

use crate::Config;

/// What the upcoming run will need
#[derive(Debug, Clone, Copy, Default)]
pub struct Requirements {
    /// Tags are listed or fetched through git
    pub git: bool,
    /// Releases are queried, created or uploaded
    pub release_cli: bool,
}

/// Result of system health checks
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Git installation status
    pub git: CheckResult,
    /// Release CLI installation status
    pub release_cli: CheckResult,
    /// Release CLI authentication status (warning only)
    pub release_auth: CheckResult,
    /// Download directory status
    pub download_dir: CheckResult,
}

/// Result of an individual health check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
    pub is_warning: bool,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn ok_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn error_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn warning_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: true,
        }
    }

    /// Downgrade a failure to a warning for tools the run can do without
    fn optional(self) -> Self {
        if self.passed {
            self
        } else {
            Self {
                passed: true,
                is_warning: true,
                ..self
            }
        }
    }
}

impl HealthCheck {
    /// Run all health checks
    pub fn run(config: &Config, requirements: Requirements) -> Self {
        let git = Self::check_git();
        let release_cli = Self::check_release_cli(config);
        let release_auth = if release_cli.passed {
            Self::check_release_auth(config)
        } else {
            CheckResult::warning_with_details(
                "Release CLI authentication not checked",
                format!("{} is not available", config.github.cli),
            )
        };

        Self {
            git: if requirements.git { git } else { git.optional() },
            release_cli: if requirements.release_cli {
                release_cli
            } else {
                release_cli.optional()
            },
            release_auth,
            download_dir: Self::check_download_dir(config),
        }
    }

    /// Check if all required checks passed (excludes warnings)
    pub fn all_passed(&self) -> bool {
        self.git.passed && self.release_cli.passed && self.download_dir.passed
    }

    /// Get list of warnings
    pub fn warnings(&self) -> Vec<&CheckResult> {
        [&self.git, &self.release_cli, &self.release_auth, &self.download_dir]
            .into_iter()
            .filter(|r| r.is_warning)
            .collect()
    }

    /// Check git installation
    fn check_git() -> CheckResult {
        match Command::new("git").arg("--version").output() {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                CheckResult::ok_with_details("Git installed", version.trim().to_string())
            }
            Ok(_) => CheckResult::error("Git command failed"),
            Err(_) => CheckResult::error_with_details(
                "Git not found in PATH",
                "Install git: https://git-scm.com/downloads",
            ),
        }
    }

    /// Check the release CLI is installed
    fn check_release_cli(config: &Config) -> CheckResult {
        let program = &config.github.cli;
        match Command::new(program).arg("--version").output() {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                let first_line = version.lines().next().unwrap_or_default().trim().to_string();
                CheckResult::ok_with_details("GitHub CLI installed", first_line)
            }
            Ok(_) => CheckResult::error(format!("{} --version failed", program)),
            Err(_) => CheckResult::error_with_details(
                format!("{} not found in PATH", program),
                "Install GitHub CLI: https://cli.github.com",
            ),
        }
    }

    /// Check the release CLI has a session; GH_TOKEN can still work without one
    fn check_release_auth(config: &Config) -> CheckResult {
        match Command::new(&config.github.cli).args(["auth", "status"]).output() {
            Ok(output) if output.status.success() => CheckResult::ok("GitHub CLI authenticated"),
            _ => CheckResult::warning_with_details(
                "GitHub CLI is not authenticated",
                "Run: gh auth login (or export GH_TOKEN)",
            ),
        }
    }

    /// Check the configured download directory exists
    fn check_download_dir(config: &Config) -> CheckResult {
        match &config.downloads.directory {
            None => CheckResult::ok("Using system temporary directory"),
            Some(dir) if Path::new(dir).is_dir() => {
                CheckResult::ok_with_details("Download directory exists", dir.clone())
            }
            Some(dir) => CheckResult::error_with_details(
                "Download directory does not exist",
                format!("Run: mkdir -p {}", dir),
            ),
        }
    }

    /// Get all checks as a slice for iteration
    pub fn all_checks(&self) -> [(&'static str, &CheckResult); 4] {
        [
            ("Git Installation", &self.git),
            ("GitHub CLI", &self.release_cli),
            ("GitHub CLI Authentication", &self.release_auth),
            ("Download Directory", &self.download_dir),
        ]
    }
}
