use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::App;
use crate::media::{MediaItem, MediaSourceResult, QualityKey};

/// Capability a source plugin exposes to the control process.
#[async_trait]
pub trait MediaPlugin: Send + Sync {
    fn platform(&self) -> &str;

    /// `Ok(None)` means the plugin has nothing for this quality.
    async fn get_media_source(
        &self,
        item: &MediaItem,
        quality: QualityKey,
    ) -> Result<Option<MediaSourceResult>, App>;
}

pub trait PluginLookup: Send + Sync {
    fn plugin_for(&self, item: &MediaItem) -> Option<Arc<dyn MediaPlugin>>;
}

/// Plugins keyed by the platform they serve.
#[derive(Default)]
pub struct PluginManager {
    plugins: HashMap<String, Arc<dyn MediaPlugin>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn MediaPlugin>) {
        if let Some(previous) = self.plugins.insert(plugin.platform().to_string(), plugin) {
            log::warn!("Replaced plugin for platform {}", previous.platform());
        }
    }
}

impl PluginLookup for PluginManager {
    fn plugin_for(&self, item: &MediaItem) -> Option<Arc<dyn MediaPlugin>> {
        self.plugins.get(&item.platform).cloned()
    }
}

/// Serves items that carry their own links, either per quality:
///
/// ```json
/// { "platform": "direct", "id": "1", "qualities": { "high": { "url": "…" } } }
/// ```
///
/// or a single `url` used for whatever quality is asked.
pub struct DirectLinkPlugin;

pub const DIRECT_PLATFORM: &str = "direct";

#[async_trait]
impl MediaPlugin for DirectLinkPlugin {
    fn platform(&self) -> &str {
        DIRECT_PLATFORM
    }

    async fn get_media_source(
        &self,
        item: &MediaItem,
        quality: QualityKey,
    ) -> Result<Option<MediaSourceResult>, App> {
        if let Some(qualities) = item.extra.get("qualities") {
            return match qualities.get(quality.as_str()) {
                Some(entry) => Ok(Some(serde_json::from_value(entry.clone())?)),
                None => Ok(None),
            };
        }
        Ok(item
            .extra
            .get("url")
            .and_then(|url| url.as_str())
            .map(|url| MediaSourceResult {
                url: url.to_string(),
                ..MediaSourceResult::default()
            }))
    }
}
