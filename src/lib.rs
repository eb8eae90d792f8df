//! copr-gh-release - Publish COPR build artifacts as GitHub release assets
//!
//! Waits for the builds of a COPR package to settle, maps git tags to package
//! versions and attaches the matching source and binary RPMs to the GitHub
//! release named after each tag.
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`copr`]: COPR API client
//! - [`builds`]: Build collection and artifact resolution
//! - [`git`]: Tag listing and tag to version mapping
//! - [`download`]: Bounded parallel artifact downloads
//! - [`github`]: Release management through the GitHub CLI
//! - [`sync`]: Per-tag publishing and the full run
//! - [`health`]: Preflight checks

pub mod builds;
pub mod config;
pub mod copr;
pub mod download;
pub mod git;
pub mod github;
pub mod health;
pub mod sync;

pub use builds::{ArtifactSet, BuildCollector, BuildRecord, VersionArchMap};
pub use config::Config;
pub use copr::CoprClient;
pub use git::{GitClient, TagMapper};
pub use github::{GitHubCli, ReleaseManager};
pub use health::HealthCheck;
pub use sync::{RunRequest, SyncEngine, SyncSummary, TagOutcome};
