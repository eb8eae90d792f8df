use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use copr_gh_release::health::{CheckResult, Requirements};
use copr_gh_release::sync::{self, RunRequest};
use copr_gh_release::{Config, HealthCheck, SyncSummary, TagOutcome};

#[derive(Parser)]
#[command(name = "copr-gh-release")]
#[command(about = "COPR to GH Release Synchronizer")]
#[command(version)]
struct Cli {
    /// COPR owner name
    #[arg(long = "copr-owner-name")]
    owner_name: String,

    /// COPR project name
    #[arg(long = "copr-project-name")]
    project_name: String,

    /// COPR package name
    #[arg(long = "copr-package-name")]
    package_name: String,

    /// A regex that matches a tag and whose group 1 contains an rpm version to match
    #[arg(long)]
    tag_to_version_re: Option<String>,

    /// Specific tag to process
    #[arg(long)]
    tag: Option<String>,

    /// Fetch all tags before listing them
    #[arg(long)]
    fetch_tags: bool,

    /// For releases that already exist, re-upload the assets
    #[arg(long)]
    clobber_assets: bool,

    /// Do not ignore the rpm epoch in version matches
    #[arg(long)]
    no_ignore_epoch: bool,

    /// Wait for pending or running builds (the default)
    #[arg(long, hide = true, conflicts_with = "no_wait_build")]
    wait_build: bool,

    /// Do not wait for pending or running builds; skip them instead
    #[arg(long)]
    no_wait_build: bool,

    /// Report what would be published without touching any release
    #[arg(long)]
    dry_run: bool,

    /// COPR frontend URL (overrides the configuration file)
    #[arg(long)]
    copr_url: Option<String>,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn run_request(&self) -> RunRequest {
        RunRequest {
            owner: self.owner_name.clone(),
            project: self.project_name.clone(),
            package: self.package_name.clone(),
            tag_to_version_re: self.tag_to_version_re.clone(),
            tag: self.tag.clone(),
            fetch_tags: self.fetch_tags,
            clobber_assets: self.clobber_assets,
            ignore_epoch: !self.no_ignore_epoch,
            wait_for_builds: self.wait_build || !self.no_wait_build,
            dry_run: self.dry_run,
        }
    }

    fn requirements(&self) -> Requirements {
        Requirements {
            git: self.tag.is_none() || self.fetch_tags,
            release_cli: !self.dry_run,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(url) = &cli.copr_url {
        config.copr.base_url = url.clone();
    }

    init_logging(cli.verbose, &config)?;
    info!("Starting copr-gh-release v{}", env!("CARGO_PKG_VERSION"));

    // Preflight checks - make sure git and gh are usable before polling COPR
    let health = HealthCheck::run(&config, cli.requirements());
    if !health.all_passed() {
        print_health_report(&health);
        println!();
        println!("❌ Cannot start - fix the errors above first");
        std::process::exit(1);
    }
    for warning in health.warnings() {
        println!("⚠️  {}", warning.message);
        if let Some(details) = &warning.details {
            println!("   {}", details);
        }
    }

    let summary = sync::run(&config, &cli.run_request()).await?;
    print_summary(&summary);

    let code = summary.exit_code();
    if code != 0 {
        std::process::exit(code);
    }

    Ok(())
}

/// Initialize logging; RUST_LOG wins over --verbose and the configured level
fn init_logging(verbose: bool, config: &Config) -> Result<()> {
    let default_level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    Ok(())
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<&std::path::Path>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(path),
        None => Config::load_or_default(),
    }
}

/// Print the per-tag results of a run
fn print_summary(summary: &SyncSummary) {
    println!();
    println!("🎉 Run complete in {:.2}s", summary.duration.as_secs_f64());
    println!("   🏷️  Tags processed: {}", summary.total_tags);
    println!("   ✅ Published: {}", summary.published);
    println!("   ⏭️  Skipped: {}", summary.skipped);
    println!("   ❓ Without artifacts: {}", summary.missing);

    for result in &summary.results {
        match result {
            TagOutcome::Created { tag, version, assets } => {
                println!("   📦 {} ({}): release created, {} assets", tag, version, assets)
            }
            TagOutcome::Uploaded { tag, version, assets } => {
                println!("   🔄 {} ({}): {} assets re-uploaded", tag, version, assets)
            }
            TagOutcome::Skipped { tag, reason } => println!("   ⏭️  {}: {}", tag, reason),
            TagOutcome::NoArtifacts { tag, version } => {
                println!("   ❓ {}: no asset files for rpm version {}", tag, version)
            }
            TagOutcome::WouldPublish { tag, version, assets } => {
                println!("   🔍 {} ({}): would publish {} assets", tag, version, assets)
            }
        }
    }
}

/// Print health check report to stdout
fn print_health_report(health: &HealthCheck) {
    fn print_check(name: &str, result: &CheckResult) {
        println!("{}:", name);
        let icon = if result.passed {
            if result.is_warning { "⚠️ " } else { "✅" }
        } else {
            "❌"
        };
        println!("  {} {}", icon, result.message);
        if let Some(details) = &result.details {
            for line in details.lines() {
                println!("     {}", line);
            }
        }
    }

    println!("🔍 copr-gh-release Preflight Checks");
    println!();

    for (name, result) in health.all_checks() {
        print_check(name, result);
        println!();
    }
}
