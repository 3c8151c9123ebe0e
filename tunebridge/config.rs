use async_trait::async_trait;
use log::{info, warn};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use toml::{Table, Value};

use crate::error::App;
use crate::media::{MissingQualityPolicy, QualityKey};
use crate::update::DEFAULT_UPDATE_SOURCES;

pub const DEFAULT_QUALITY: &str = "download.defaultQuality";
pub const WHEN_QUALITY_MISSING: &str = "download.whenQualityMissing";
pub const DOWNLOAD_PATH: &str = "download.path";
pub const LOCK_LYRIC: &str = "lyric.lockLyric";
pub const UPDATE_SOURCES: &str = "update.sources";

/// Path-addressed settings, `section.key` style.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, path: &str) -> Option<Value>;

    /// Returns whether the value was stored.
    async fn set(&self, path: &str, value: Value) -> Result<bool, App>;
}

/// Reads a value and converts it, falling back to `default` when the value is
/// missing or has the wrong shape.
pub async fn get_or<T: DeserializeOwned>(store: &dyn ConfigStore, path: &str, default: T) -> T {
    match store.get(path).await {
        Some(value) => value.try_into().unwrap_or_else(|e| {
            warn!("Ignoring invalid {}: {}", path, e);
            default
        }),
        None => default,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSettings {
    pub default_quality: QualityKey,
    pub when_quality_missing: MissingQualityPolicy,
}

impl DownloadSettings {
    pub async fn read(store: &dyn ConfigStore) -> Self {
        let (default_quality, when_quality_missing) = tokio::join!(
            get_or(store, DEFAULT_QUALITY, QualityKey::default()),
            get_or(store, WHEN_QUALITY_MISSING, MissingQualityPolicy::default()),
        );
        Self {
            default_quality,
            when_quality_missing,
        }
    }
}

/// In-memory settings table, seeded from defaults and an optional TOML file.
/// Changes are never written back to disk.
pub struct TomlConfig {
    table: RwLock<Table>,
}

impl TomlConfig {
    pub fn new(table: Table) -> Self {
        Self {
            table: RwLock::new(table),
        }
    }

    pub fn with_defaults(dirs: &AppDirs) -> Self {
        Self::new(defaults(dirs))
    }

    /// Defaults overlaid with `path`, when it exists.
    pub async fn load(path: &Path, dirs: &AppDirs) -> Result<Self, App> {
        let mut table = defaults(dirs);
        if path.exists() {
            info!("Loading config from {}", path.display());
            let content = fs::read_to_string(path).await?;
            let user: Table = toml::from_str(&content)?;
            merge(&mut table, user);
        }
        Ok(Self::new(table))
    }
}

fn defaults(dirs: &AppDirs) -> Table {
    let mut download = Table::new();
    download.insert("defaultQuality".to_string(), Value::from(QualityKey::default().as_str()));
    download.insert("whenQualityMissing".to_string(), Value::from("lower"));
    download.insert(
        "path".to_string(),
        Value::from(dirs.downloads.to_string_lossy().into_owned()),
    );

    let mut lyric = Table::new();
    lyric.insert("lockLyric".to_string(), Value::from(false));

    let mut update = Table::new();
    update.insert(
        "sources".to_string(),
        Value::Array(DEFAULT_UPDATE_SOURCES.iter().map(|url| Value::from(*url)).collect()),
    );

    let mut table = Table::new();
    table.insert("download".to_string(), Value::Table(download));
    table.insert("lyric".to_string(), Value::Table(lyric));
    table.insert("update".to_string(), Value::Table(update));
    table
}

fn merge(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(base)), Value::Table(overlay)) => merge(base, overlay),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[async_trait]
impl ConfigStore for TomlConfig {
    async fn get(&self, path: &str) -> Option<Value> {
        let table = self.table.read().await;
        let mut segments = path.split('.');
        let mut current = table.get(segments.next()?)?;
        for segment in segments {
            current = current.as_table()?.get(segment)?;
        }
        Some(current.clone())
    }

    async fn set(&self, path: &str, value: Value) -> Result<bool, App> {
        let mut table = self.table.write().await;
        let mut segments: Vec<&str> = path.split('.').collect();
        let Some(last) = segments.pop().filter(|last| !last.is_empty()) else {
            return Err(App::Config(format!("Invalid config path: {path}")));
        };

        let mut current = &mut *table;
        for segment in segments {
            let entry = current
                .entry(segment.to_string())
                .or_insert(Value::Table(Table::new()));
            current = entry
                .as_table_mut()
                .ok_or_else(|| App::Config(format!("{segment} in {path} is not a table")))?;
        }
        current.insert(last.to_string(), value);
        Ok(true)
    }
}

/// Per-user directories, all under `$HOME`.
#[derive(Debug, Clone)]
pub struct AppDirs {
    pub root: PathBuf,
    pub logs: PathBuf,
    pub config_file: PathBuf,
    pub downloads: PathBuf,
}

impl AppDirs {
    pub fn from_home(home: &Path) -> Self {
        let root = home.join(".config/tunebridge");
        Self {
            logs: root.join("logs"),
            config_file: root.join("config.toml"),
            downloads: home.join("Music/tunebridge"),
            root,
        }
    }

    pub fn from_env() -> Result<Self, App> {
        let home = std::env::var("HOME")?;
        Ok(Self::from_home(Path::new(&home)))
    }

    pub async fn ensure(&self) -> Result<(), App> {
        for dir in [&self.root, &self.logs] {
            fs::create_dir_all(dir).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirs() -> AppDirs {
        AppDirs::from_home(Path::new("/home/tester"))
    }

    #[tokio::test]
    async fn defaults_cover_the_download_settings() {
        let config = TomlConfig::with_defaults(&dirs());
        let settings = DownloadSettings::read(&config).await;
        assert_eq!(settings.default_quality, QualityKey::Standard);
        assert_eq!(settings.when_quality_missing, MissingQualityPolicy::Lower);
        assert_eq!(
            config.get(DOWNLOAD_PATH).await,
            Some(Value::from("/home/tester/Music/tunebridge"))
        );
        assert_eq!(config.get(LOCK_LYRIC).await, Some(Value::from(false)));
    }

    #[tokio::test]
    async fn set_then_get_by_path() {
        let config = TomlConfig::with_defaults(&dirs());
        assert!(config.set(LOCK_LYRIC, Value::from(true)).await.unwrap());
        assert_eq!(config.get(LOCK_LYRIC).await, Some(Value::from(true)));

        config.set("new.section.key", Value::from(3_i64)).await.unwrap();
        assert_eq!(config.get("new.section.key").await, Some(Value::from(3_i64)));
        assert_eq!(config.get("new.section.missing").await, None);
    }

    #[tokio::test]
    async fn set_through_a_scalar_is_an_error() {
        let config = TomlConfig::with_defaults(&dirs());
        assert!(config.set("lyric.lockLyric.deeper", Value::from(1_i64)).await.is_err());
        assert!(config.set("", Value::from(1_i64)).await.is_err());
    }

    #[tokio::test]
    async fn invalid_values_fall_back_to_defaults() {
        let config = TomlConfig::with_defaults(&dirs());
        config.set(DEFAULT_QUALITY, Value::from("ultra")).await.unwrap();
        config.set(WHEN_QUALITY_MISSING, Value::from("higher")).await.unwrap();
        let settings = DownloadSettings::read(&config).await;
        assert_eq!(settings.default_quality, QualityKey::Standard);
        assert_eq!(settings.when_quality_missing, MissingQualityPolicy::Higher);
    }

    #[test]
    fn user_file_overrides_only_what_it_names() {
        let mut table = defaults(&dirs());
        let user: Table = toml::from_str("[download]\ndefaultQuality = \"super\"\n").unwrap();
        merge(&mut table, user);
        let download = table["download"].as_table().unwrap();
        assert_eq!(download["defaultQuality"].as_str(), Some("super"));
        assert_eq!(download["whenQualityMissing"].as_str(), Some("lower"));
    }
}
