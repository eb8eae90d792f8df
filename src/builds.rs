//! Build collection and artifact resolution
//!
//! Turns the COPR build list into the set of downloadable RPMs per package
//! version. Only the latest finished build per (version, chroot) survives.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::copr::{Build, BuildResult, CoprClient};

/// A finished build, as seen from one of its chroots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecord {
    pub id: u64,
    pub version: String,
    pub ended_on: i64,
    pub source_rpm: String,
    pub package_name: String,
    pub repo_url: String,
    pub dir_id: String,
}

impl BuildRecord {
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.ended_on, 0)
    }

    /// Backend directory holding this build's results for `chroot`
    pub fn build_dir_url(&self, chroot: &str) -> String {
        format!(
            "{}/{}/{}-{}",
            self.repo_url.trim_end_matches('/'),
            chroot,
            self.dir_id,
            self.package_name
        )
    }

    /// (asset name, URL) of the source RPM
    pub fn source_artifact(&self) -> (String, String) {
        (url_basename(&self.source_rpm).to_string(), self.source_rpm.clone())
    }
}

/// version -> chroot -> latest finished build
pub type VersionArchMap = BTreeMap<String, BTreeMap<String, BuildRecord>>;

/// version -> asset file name -> download URL
pub type ArtifactSet = BTreeMap<String, BTreeMap<String, String>>;

/// Record `record` for every chroot, keeping the latest-ended build per (version, chroot)
pub fn insert_latest(map: &mut VersionArchMap, chroots: &[String], record: BuildRecord) {
    let version_arches = map.entry(record.version.clone()).or_default();
    for chroot in chroots {
        match version_arches.get(chroot) {
            Some(existing) if existing.ended_on >= record.ended_on => {
                debug!(
                    "Keeping build {} over {} for {} {}",
                    existing.id, record.id, record.version, chroot
                );
            }
            _ => {
                version_arches.insert(chroot.clone(), record.clone());
            }
        }
    }
}

/// Package version with the epoch prefix optionally removed
pub fn build_version(raw: &str, ignore_epoch: bool) -> &str {
    if ignore_epoch {
        if let Some((_, rest)) = raw.split_once(':') {
            return rest;
        }
    }
    raw
}

/// Last path segment of a URL
fn url_basename(url: &str) -> &str {
    url.trim_end_matches('/').rsplit('/').next().unwrap_or(url)
}

/// Name of the directory that contains `url`
fn url_dirname_basename(url: &str) -> &str {
    let trimmed = url.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((parent, _)) => url_basename(parent),
        None => "",
    }
}

/// Split a chroot such as `fedora-39-x86_64` into (`fedora-39`, `x86_64`)
pub fn split_chroot(chroot: &str) -> Result<(&str, &str)> {
    chroot
        .rsplit_once('-')
        .ok_or_else(|| anyhow!("Malformed chroot name: {}", chroot))
}

/// RPM file name for a build result; the epoch is only spelled out when above 1
pub fn rpm_file_name(result: &BuildResult) -> String {
    let epoch = match result.epoch {
        Some(epoch) if epoch > 1 => format!("{}:", epoch),
        _ => String::new(),
    };
    format!(
        "{}{}-{}-{}.{}.rpm",
        epoch, result.name, result.version, result.release, result.arch
    )
}

/// Release asset name and download URL for a binary build result
pub fn binary_artifact(
    record: &BuildRecord,
    chroot: &str,
    result: &BuildResult,
) -> Result<(String, String)> {
    let (platform, _arch) = split_chroot(chroot)?;
    let rpm_name = rpm_file_name(result);
    Ok((
        format!("{}-{}", platform, rpm_name),
        format!("{}/{}", record.build_dir_url(chroot), rpm_name),
    ))
}

/// Scan options for one package
#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub owner: String,
    pub project: String,
    pub package: String,
    pub ignore_epoch: bool,
    pub wait_for_builds: bool,
    pub poll_interval: Duration,
}

/// Outcome of a single pass over the build list
enum Scan {
    Settled(VersionArchMap),
    InFlight(Build),
}

/// Collects finished builds of one package from a COPR project
pub struct BuildCollector {
    client: CoprClient,
    options: CollectOptions,
}

impl BuildCollector {
    pub fn new(client: CoprClient, options: CollectOptions) -> Self {
        Self { client, options }
    }

    /// Scan until no build of the package is in flight (or skip in-flight builds)
    pub async fn collect(&self) -> Result<VersionArchMap> {
        loop {
            match self.scan().await? {
                Scan::Settled(map) => {
                    info!(
                        "Collected builds for {} versions of {}",
                        map.len(),
                        self.options.package
                    );
                    return Ok(map);
                }
                Scan::InFlight(build) => {
                    info!(
                        "found build id {} package {} version {} {} - will retry in {} seconds",
                        build.id,
                        build.source_package.name.as_deref().unwrap_or("<unknown>"),
                        build
                            .source_package
                            .version
                            .as_deref()
                            .map(|v| build_version(v, self.options.ignore_epoch))
                            .unwrap_or("<unknown>"),
                        build.state,
                        self.options.poll_interval.as_secs()
                    );
                    tokio::time::sleep(self.options.poll_interval).await;
                }
            }
        }
    }

    async fn scan(&self) -> Result<Scan> {
        let builds = self
            .client
            .list_builds(&self.options.owner, &self.options.project)
            .await?;

        let mut map = VersionArchMap::new();

        for build in builds {
            if build.is_failed() {
                continue;
            }

            if let Some(name) = build.source_package.name.as_deref() {
                if !name.is_empty() && name != self.options.package {
                    continue;
                }
            }

            if build.is_in_flight() {
                if self.options.wait_for_builds {
                    return Ok(Scan::InFlight(build));
                }
                debug!("Skipping unfinished build {} ({})", build.id, build.state);
                continue;
            }

            if let Some(record) = self.accept(&build).await? {
                debug!(
                    "Accepted build {} version {} ended {:?}",
                    record.id,
                    record.version,
                    record.ended_at()
                );
                insert_latest(&mut map, &build.chroots, record);
            }
        }

        Ok(Scan::Settled(map))
    }

    /// Turn a finished build into a record if its source RPM is reachable
    async fn accept(&self, build: &Build) -> Result<Option<BuildRecord>> {
        let source = &build.source_package;
        let (Some(version), Some(source_rpm)) = (source.version.as_deref(), source.url.as_deref())
        else {
            debug!("Build {} has no source version or URL", build.id);
            return Ok(None);
        };

        if !self.client.url_exists(source_rpm).await? {
            debug!("Source RPM of build {} is gone: {}", build.id, source_rpm);
            return Ok(None);
        }

        Ok(Some(BuildRecord {
            id: build.id,
            version: build_version(version, self.options.ignore_epoch).to_string(),
            ended_on: build.ended_on.unwrap_or_default(),
            source_rpm: source_rpm.to_string(),
            package_name: source
                .name
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| self.options.package.clone()),
            repo_url: build.repo_url.clone(),
            dir_id: url_dirname_basename(source_rpm).to_string(),
        }))
    }
}

/// Resolve every collected build into its downloadable artifacts
pub async fn resolve_artifacts(client: &CoprClient, builds: &VersionArchMap) -> Result<ArtifactSet> {
    let mut artifacts = ArtifactSet::new();

    for (version, chroots) in builds {
        let mut files: BTreeMap<String, String> = BTreeMap::new();

        for (chroot, record) in chroots {
            let (name, url) = record.source_artifact();
            files.entry(name).or_insert(url);

            let build_dir = record.build_dir_url(chroot);
            for result in client.build_results(&build_dir).await? {
                if result.arch == "src" {
                    continue;
                }

                let (file_name, url) = binary_artifact(record, chroot, &result)?;
                if files.contains_key(&file_name) {
                    continue;
                }
                if client.url_exists(&url).await? {
                    files.insert(file_name, url);
                } else {
                    warn!("NOT FOUND: {} {} {}", version, file_name, url);
                }
            }
        }

        if !files.is_empty() {
            debug!("Version {} has {} artifacts", version, files.len());
            artifacts.insert(version.clone(), files);
        }
    }

    Ok(artifacts)
}

/// Chroots per version, for logging
pub fn describe(builds: &VersionArchMap) -> HashMap<&str, Vec<&str>> {
    builds
        .iter()
        .map(|(version, chroots)| {
            (
                version.as_str(),
                chroots.keys().map(String::as_str).collect(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use quickcheck_macros::quickcheck;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(id: u64, version: &str, ended_on: i64) -> BuildRecord {
        BuildRecord {
            id,
            version: version.to_string(),
            ended_on,
            source_rpm: format!("https://backend/results/o/p/srpm-builds/{:08}/widget-{}.src.rpm", id, version),
            package_name: "widget".to_string(),
            repo_url: "https://backend/results/o/p".to_string(),
            dir_id: format!("{:08}", id),
        }
    }

    fn client_for(server: &MockServer) -> CoprClient {
        let mut config = Config::default();
        config.copr.base_url = server.uri();
        CoprClient::new(&config).unwrap()
    }

    fn options(wait_for_builds: bool) -> CollectOptions {
        CollectOptions {
            owner: "octo".to_string(),
            project: "widgets".to_string(),
            package: "widget".to_string(),
            ignore_epoch: true,
            wait_for_builds,
            poll_interval: Duration::from_millis(10),
        }
    }

    fn build_json(server: &MockServer, id: u64, state: &str, name: &str, version: &str, ended_on: Option<i64>) -> serde_json::Value {
        json!({
            "id": id,
            "state": state,
            "source_package": {
                "name": name,
                "version": version,
                "url": format!("{}/results/octo/widgets/srpm-builds/{:08}/{}-{}.src.rpm", server.uri(), id, name, version)
            },
            "ended_on": ended_on,
            "chroots": ["fedora-39-x86_64", "fedora-39-aarch64"],
            "repo_url": format!("{}/results/octo/widgets", server.uri())
        })
    }

    async fn mount_build_list(server: &MockServer, items: Vec<serde_json::Value>) {
        Mock::given(method("GET"))
            .and(path("/api_3/build/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": items })))
            .mount(server)
            .await;
    }

    async fn mount_head_ok(server: &MockServer) {
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }

    #[test]
    fn test_build_version_strips_epoch() {
        assert_eq!(build_version("7:1.2.3", true), "1.2.3");
        assert_eq!(build_version("7:1.2.3", false), "7:1.2.3");
        assert_eq!(build_version("1.2.3", true), "1.2.3");
    }

    #[quickcheck]
    fn prop_epoch_is_stripped(epoch: u32, version: String) -> bool {
        let version = version.replace(':', "");
        build_version(&format!("{}:{}", epoch, version), true) == version
    }

    #[test]
    fn test_rpm_file_name_epoch_rules() {
        let mut result = BuildResult {
            name: "widget".to_string(),
            version: "1.0".to_string(),
            release: "1.fc39".to_string(),
            epoch: None,
            arch: "x86_64".to_string(),
        };
        assert_eq!(rpm_file_name(&result), "widget-1.0-1.fc39.x86_64.rpm");

        result.epoch = Some(1);
        assert_eq!(rpm_file_name(&result), "widget-1.0-1.fc39.x86_64.rpm");

        result.epoch = Some(3);
        assert_eq!(rpm_file_name(&result), "3:widget-1.0-1.fc39.x86_64.rpm");
    }

    #[test]
    fn test_binary_artifact_naming() {
        let record = record(42, "1.0", 100);
        let result = BuildResult {
            name: "widget-devel".to_string(),
            version: "1.0".to_string(),
            release: "1.fc39".to_string(),
            epoch: Some(0),
            arch: "x86_64".to_string(),
        };

        let (name, url) = binary_artifact(&record, "fedora-39-x86_64", &result).unwrap();
        assert_eq!(name, "fedora-39-widget-devel-1.0-1.fc39.x86_64.rpm");
        assert_eq!(
            url,
            "https://backend/results/o/p/fedora-39-x86_64/00000042-widget/widget-devel-1.0-1.fc39.x86_64.rpm"
        );
    }

    #[test]
    fn test_split_chroot() {
        assert_eq!(split_chroot("fedora-39-x86_64").unwrap(), ("fedora-39", "x86_64"));
        assert_eq!(split_chroot("epel-9-aarch64").unwrap(), ("epel-9", "aarch64"));
        assert!(split_chroot("noarch").is_err());
    }

    #[test]
    fn test_source_artifact_and_dir_id() {
        let url = "https://backend/results/o/p/srpm-builds/06543210/widget-1.0-1.src.rpm";
        assert_eq!(url_basename(url), "widget-1.0-1.src.rpm");
        assert_eq!(url_dirname_basename(url), "06543210");
    }

    #[test]
    fn test_insert_latest_keeps_latest_per_chroot() {
        let mut map = VersionArchMap::new();
        let x86 = vec!["fedora-39-x86_64".to_string()];
        let both = vec!["fedora-39-x86_64".to_string(), "fedora-39-aarch64".to_string()];

        insert_latest(&mut map, &both, record(1, "1.0", 100));
        insert_latest(&mut map, &x86, record(2, "1.0", 200));
        insert_latest(&mut map, &both, record(3, "1.0", 150));

        let chroots = &map["1.0"];
        assert_eq!(chroots["fedora-39-x86_64"].id, 2);
        assert_eq!(chroots["fedora-39-aarch64"].id, 3);
    }

    #[test]
    fn test_insert_latest_ties_keep_first() {
        let mut map = VersionArchMap::new();
        let chroots = vec!["fedora-39-x86_64".to_string()];

        insert_latest(&mut map, &chroots, record(1, "1.0", 100));
        insert_latest(&mut map, &chroots, record(2, "1.0", 100));

        assert_eq!(map["1.0"]["fedora-39-x86_64"].id, 1);
    }

    #[quickcheck]
    fn prop_insert_latest_retains_max_ended(ended: Vec<i64>) -> bool {
        if ended.is_empty() {
            return true;
        }
        let chroots = vec!["fedora-39-x86_64".to_string()];
        let mut map = VersionArchMap::new();
        for (i, ended_on) in ended.iter().enumerate() {
            insert_latest(&mut map, &chroots, record(i as u64, "1.0", *ended_on));
        }
        map["1.0"]["fedora-39-x86_64"].ended_on == *ended.iter().max().unwrap()
    }

    #[test]
    fn test_build_record_ended_at() {
        let record = record(1, "1.0", 1_700_000_000);
        assert_eq!(record.ended_at().unwrap().timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn test_collect_skips_failed_and_other_packages() {
        let server = MockServer::start().await;
        mount_build_list(
            &server,
            vec![
                build_json(&server, 1, "succeeded", "widget", "1.0-1", Some(100)),
                build_json(&server, 2, "failed", "widget", "1.1-1", Some(200)),
                build_json(&server, 3, "succeeded", "gadget", "2.0-1", Some(300)),
            ],
        )
        .await;
        mount_head_ok(&server).await;

        let collector = BuildCollector::new(client_for(&server), options(true));
        let map = collector.collect().await.unwrap();

        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["1.0-1"]);
        assert_eq!(map["1.0-1"].len(), 2);
        assert_eq!(map["1.0-1"]["fedora-39-x86_64"].dir_id, "00000001");
    }

    #[tokio::test]
    async fn test_collect_strips_epoch_from_version() {
        let server = MockServer::start().await;
        mount_build_list(
            &server,
            vec![build_json(&server, 1, "succeeded", "widget", "7:1.2.3-1", Some(100))],
        )
        .await;
        mount_head_ok(&server).await;

        let map = BuildCollector::new(client_for(&server), options(true))
            .collect()
            .await
            .unwrap();
        assert!(map.contains_key("1.2.3-1"));
    }

    #[tokio::test]
    async fn test_collect_keeps_build_without_source_name() {
        let server = MockServer::start().await;
        mount_build_list(
            &server,
            vec![json!({
                "id": 5,
                "state": "succeeded",
                "source_package": {
                    "name": null,
                    "version": "1.0-1",
                    "url": format!("{}/results/octo/widgets/srpm-builds/00000005/widget-1.0-1.src.rpm", server.uri())
                },
                "ended_on": 100,
                "chroots": ["fedora-39-x86_64"],
                "repo_url": format!("{}/results/octo/widgets", server.uri())
            })],
        )
        .await;
        mount_head_ok(&server).await;

        let map = BuildCollector::new(client_for(&server), options(true))
            .collect()
            .await
            .unwrap();

        let record = &map["1.0-1"]["fedora-39-x86_64"];
        assert_eq!(record.id, 5);
        assert_eq!(record.package_name, "widget");
        assert!(record
            .build_dir_url("fedora-39-x86_64")
            .ends_with("/fedora-39-x86_64/00000005-widget"));
    }

    #[tokio::test]
    async fn test_collect_discards_unreachable_source_rpm() {
        let server = MockServer::start().await;
        mount_build_list(
            &server,
            vec![build_json(&server, 1, "succeeded", "widget", "1.0-1", Some(100))],
        )
        .await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let map = BuildCollector::new(client_for(&server), options(true))
            .collect()
            .await
            .unwrap();
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn test_collect_without_waiting_skips_running_builds() {
        let server = MockServer::start().await;
        mount_build_list(
            &server,
            vec![
                build_json(&server, 1, "running", "widget", "1.1-1", None),
                build_json(&server, 2, "succeeded", "widget", "1.0-1", Some(100)),
            ],
        )
        .await;
        mount_head_ok(&server).await;

        let map = BuildCollector::new(client_for(&server), options(false))
            .collect()
            .await
            .unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["1.0-1"]);
    }

    #[tokio::test]
    async fn test_collect_waits_for_running_builds() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api_3/build/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [build_json(&server, 1, "running", "widget", "1.1-1", None)]
            })))
            .up_to_n_times(1)
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api_3/build/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [build_json(&server, 1, "succeeded", "widget", "1.1-1", Some(500))]
            })))
            .with_priority(2)
            .expect(1)
            .mount(&server)
            .await;
        mount_head_ok(&server).await;

        let map = BuildCollector::new(client_for(&server), options(true))
            .collect()
            .await
            .unwrap();
        assert_eq!(map["1.1-1"]["fedora-39-x86_64"].id, 1);
    }

    #[tokio::test]
    async fn test_resolve_artifacts() {
        let server = MockServer::start().await;
        let repo_url = format!("{}/results/octo/widgets", server.uri());
        let record = BuildRecord {
            id: 1,
            version: "1.0-1".to_string(),
            ended_on: 100,
            source_rpm: format!("{}/srpm-builds/00000001/widget-1.0-1.src.rpm", repo_url),
            package_name: "widget".to_string(),
            repo_url: repo_url.clone(),
            dir_id: "00000001".to_string(),
        };

        let mut builds = VersionArchMap::new();
        insert_latest(
            &mut builds,
            &["fedora-39-x86_64".to_string(), "fedora-39-aarch64".to_string()],
            record,
        );

        Mock::given(method("GET"))
            .and(path("/results/octo/widgets/fedora-39-x86_64/00000001-widget/results.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "packages": [
                    {"name": "widget", "version": "1.0", "release": "1", "epoch": 0, "arch": "x86_64"},
                    {"name": "widget-debuginfo", "version": "1.0", "release": "1", "epoch": 0, "arch": "x86_64"},
                    {"name": "widget", "version": "1.0", "release": "1", "epoch": 0, "arch": "src"}
                ]
            })))
            .mount(&server)
            .await;
        // aarch64 manifest is missing entirely
        Mock::given(method("HEAD"))
            .and(path("/results/octo/widgets/fedora-39-x86_64/00000001-widget/widget-1.0-1.x86_64.rpm"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let artifacts = resolve_artifacts(&client_for(&server), &builds).await.unwrap();
        let files = &artifacts["1.0-1"];

        assert_eq!(files.len(), 2);
        assert!(files.contains_key("widget-1.0-1.src.rpm"));
        assert_eq!(
            files["fedora-39-widget-1.0-1.x86_64.rpm"],
            format!("{}/fedora-39-x86_64/00000001-widget/widget-1.0-1.x86_64.rpm", repo_url)
        );
    }

    #[test]
    fn test_describe() {
        let mut builds = VersionArchMap::new();
        insert_latest(&mut builds, &["fedora-39-x86_64".to_string()], record(1, "1.0", 1));
        let described = describe(&builds);
        assert_eq!(described["1.0"], vec!["fedora-39-x86_64"]);
    }
}
