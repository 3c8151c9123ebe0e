use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::Client;
use semver::{BuildMetadata, Version};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::App;

pub const DEFAULT_UPDATE_SOURCES: [&str; 2] = [
    "https://gitee.com/tunebridge/tunebridge/raw/master/release/version.json",
    "https://raw.githubusercontent.com/tunebridge/tunebridge/master/release/version.json",
];

/// Parses a version as published in update manifests. A `v` prefix and a
/// shortened core (`2.1` for `2.1.0`) are accepted; build metadata is dropped
/// so it never takes part in ordering.
pub fn parse_version(raw: &str) -> Result<Version, App> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
    let (core, rest) = match trimmed.find(['-', '+']) {
        Some(at) => trimmed.split_at(at),
        None => (trimmed, ""),
    };
    let padding = ".0".repeat(2_usize.saturating_sub(core.matches('.').count()));

    let mut version = Version::parse(&format!("{core}{padding}{rest}"))
        .map_err(|e| App::InvalidVersion(format!("{raw} ({e})")))?;
    version.build = BuildMetadata::EMPTY;
    Ok(version)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReleaseManifest {
    pub version: String,
    #[serde(flatten)]
    pub release: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UpdateInfo {
    /// Version of the running control process.
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<ReleaseManifest>,
}

impl UpdateInfo {
    pub fn current(version: &str) -> Self {
        Self {
            version: version.to_string(),
            update: None,
        }
    }
}

#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ReleaseManifest, App>;
}

pub struct HttpManifestSource {
    client: Client,
}

impl HttpManifestSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    async fn fetch(&self, url: &str) -> Result<ReleaseManifest, App> {
        info!("Fetching update manifest from {}", url);
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

enum SourceOutcome {
    Newer(ReleaseManifest),
    NotNewer(Version),
    Failed(App),
}

async fn probe_source(manifests: &dyn ManifestSource, url: &str, current: &Version) -> SourceOutcome {
    let manifest = match manifests.fetch(url).await {
        Ok(manifest) => manifest,
        Err(e) => return SourceOutcome::Failed(e),
    };
    match parse_version(&manifest.version) {
        Ok(version) if version > *current => SourceOutcome::Newer(manifest),
        Ok(version) => SourceOutcome::NotNewer(version),
        Err(e) => SourceOutcome::Failed(e),
    }
}

/// Walks the mirrors in order. The first mirror announcing a strictly newer
/// version ends the walk; failures and up-to-date answers move on to the next.
pub async fn check_update(
    sources: &[String],
    current_version: &str,
    manifests: &dyn ManifestSource,
) -> UpdateInfo {
    let mut update_info = UpdateInfo::current(current_version);
    let current = match parse_version(current_version) {
        Ok(version) => version,
        Err(e) => {
            error!("Cannot check for updates: {}", e);
            return update_info;
        }
    };

    for url in sources {
        match probe_source(manifests, url, &current).await {
            SourceOutcome::Newer(manifest) => {
                info!("Update {} available from {}", manifest.version, url);
                update_info.update = Some(manifest);
                return update_info;
            }
            SourceOutcome::NotNewer(version) => {
                debug!("{} reports {}, not newer than {}", url, version, current);
            }
            SourceOutcome::Failed(e) => warn!("Update source {} failed: {}", url, e),
        }
    }
    update_info
}

/// Whether the presentation side should offer the update. A version the user
/// chose to skip (or anything older) is not offered again unless the
/// preference is ignored.
pub fn should_prompt(update_info: &UpdateInfo, skip_version: Option<&str>, ignore_preference: bool) -> bool {
    let Some(update) = &update_info.update else {
        return false;
    };
    if ignore_preference {
        return true;
    }
    match (skip_version.map(parse_version), parse_version(&update.version)) {
        (Some(Ok(skipped)), Ok(offered)) => offered > skipped,
        _ => true,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Mirrors with canned manifests; unknown URLs fail like a dead host.
    #[derive(Default)]
    pub(crate) struct FakeMirrors {
        pub versions: HashMap<String, String>,
        pub consulted: Mutex<Vec<String>>,
    }

    impl FakeMirrors {
        pub fn with(entries: &[(&str, &str)]) -> Self {
            Self {
                versions: entries
                    .iter()
                    .map(|(url, version)| ((*url).to_string(), (*version).to_string()))
                    .collect(),
                consulted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ManifestSource for FakeMirrors {
        async fn fetch(&self, url: &str) -> Result<ReleaseManifest, App> {
            self.consulted.lock().unwrap().push(url.to_string());
            let version = self
                .versions
                .get(url)
                .ok_or_else(|| App::InvalidInput(format!("{url} unreachable")))?;
            Ok(serde_json::from_value(serde_json::json!({
                "version": version,
                "changeLog": [format!("release {version}")]
            }))?)
        }
    }

    fn sources(urls: &[&str]) -> Vec<String> {
        urls.iter().map(|url| (*url).to_string()).collect()
    }

    #[test]
    fn versions_order_semantically() {
        let v = |raw| parse_version(raw).unwrap();
        assert!(v("1.10.0") > v("1.9.9"));
        assert!(v("v2.0") > v("1.99.99"));
        assert_eq!(v("1.0"), v("1.0.0"));
        assert!(v("1.0.0") > v("1.0.0-beta.2"));
        assert!(v("1.0.0-beta.11") > v("1.0.0-beta.2"));
        assert!(v("1.0.0-beta") > v("1.0.0-alpha.5"));
        assert!(v("1.0.0-alpha.1") > v("1.0.0-alpha"));
        assert_eq!(v("1.2.3+build.7"), v("1.2.3"));
    }

    #[test]
    fn garbage_versions_are_rejected() {
        for raw in ["", "one.two", "1..2", "1.0-", "latest"] {
            assert!(parse_version(raw).is_err(), "{raw} should not parse");
        }
    }

    #[tokio::test]
    async fn first_newer_mirror_wins_and_later_ones_are_skipped() {
        let mirrors = FakeMirrors::with(&[("b", "2.0.0"), ("c", "3.0.0")]);
        let info = check_update(&sources(&["a", "b", "c"]), "1.0.0", &mirrors).await;
        assert_eq!(info.version, "1.0.0");
        assert_eq!(info.update.unwrap().version, "2.0.0");
        assert_eq!(*mirrors.consulted.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn up_to_date_mirror_does_not_stop_the_walk() {
        let mirrors = FakeMirrors::with(&[("a", "1.0.0"), ("b", "2.0.0")]);
        let info = check_update(&sources(&["a", "b"]), "1.0.0", &mirrors).await;
        assert_eq!(info.update.unwrap().version, "2.0.0");
        assert_eq!(*mirrors.consulted.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn no_newer_version_reports_only_the_running_one() {
        let mirrors = FakeMirrors::with(&[("a", "0.9.0"), ("b", "not-a-version")]);
        let info = check_update(&sources(&["a", "b", "c"]), "1.0.0", &mirrors).await;
        assert_eq!(info, UpdateInfo::current("1.0.0"));
        assert_eq!(mirrors.consulted.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn release_metadata_is_kept() {
        let mirrors = FakeMirrors::with(&[("a", "1.1.0")]);
        let info = check_update(&sources(&["a"]), "1.0.0", &mirrors).await;
        let wire = serde_json::to_value(&info).unwrap();
        assert_eq!(wire["update"]["changeLog"][0], "release 1.1.0");
    }

    #[test]
    fn skipped_versions_are_not_offered_again() {
        let offered = UpdateInfo {
            version: "1.0.0".to_string(),
            update: Some(ReleaseManifest {
                version: "1.2.0".to_string(),
                release: Map::new(),
            }),
        };
        assert!(should_prompt(&offered, None, false));
        assert!(!should_prompt(&offered, Some("1.2.0"), false));
        assert!(!should_prompt(&offered, Some("1.3.0"), false));
        assert!(should_prompt(&offered, Some("1.1.0"), false));
        assert!(should_prompt(&offered, Some("1.2.0"), true));
        assert!(!should_prompt(&UpdateInfo::current("1.0.0"), None, true));
    }
}
