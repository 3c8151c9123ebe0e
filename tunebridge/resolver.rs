use log::{info, warn};
use std::collections::BTreeMap;

use crate::error::App;
use crate::media::{MediaItem, MediaSourceResult, MissingQualityPolicy, QualityKey, QualityOrdering};
use crate::plugin::PluginLookup;

/// Outcome of asking the plugin for one quality.
#[derive(Debug)]
pub enum Probe {
    Found(MediaSourceResult),
    Unusable,
    Failed(App),
}

#[derive(Debug)]
pub struct Attempt {
    pub quality: QualityKey,
    pub probe: Probe,
}

#[derive(Debug)]
pub struct ResolvedSource {
    pub quality: QualityKey,
    pub source: MediaSourceResult,
    /// Headers to send with the download, user agent included.
    pub headers: BTreeMap<String, String>,
    /// Qualities tried before `quality`, all unsuccessful.
    pub skipped: Vec<Attempt>,
}

pub struct SourceResolver<'a> {
    plugins: &'a dyn PluginLookup,
    ordering: &'a dyn QualityOrdering,
}

impl<'a> SourceResolver<'a> {
    pub fn new(plugins: &'a dyn PluginLookup, ordering: &'a dyn QualityOrdering) -> Self {
        Self { plugins, ordering }
    }

    /// Probes qualities strictly one after another in precedence order and
    /// stops at the first usable URL.
    pub async fn resolve(
        &self,
        item: &MediaItem,
        preferred: QualityKey,
        policy: MissingQualityPolicy,
    ) -> Result<ResolvedSource, App> {
        let order = self.ordering.order(preferred, policy);
        let plugin = self
            .plugins
            .plugin_for(item)
            .ok_or_else(|| App::NoPluginForMedia(item.to_string()))?;

        let mut skipped = Vec::new();
        for quality in order.iter() {
            let probe = match plugin.get_media_source(item, quality).await {
                Ok(Some(source)) if source.usable_url().is_some() => Probe::Found(source),
                Ok(_) => Probe::Unusable,
                Err(e) => Probe::Failed(e),
            };

            match probe {
                Probe::Found(source) => {
                    info!("Resolved {} at quality {}", item, quality);
                    return Ok(ResolvedSource {
                        quality,
                        headers: source.request_headers(),
                        source,
                        skipped,
                    });
                }
                probe => skipped.push(Attempt { quality, probe }),
            }
        }

        for attempt in &skipped {
            match &attempt.probe {
                Probe::Failed(e) => warn!("{} at {}: {}", item, attempt.quality, e),
                _ => warn!("{} at {}: no usable url", item, attempt.quality),
            }
        }
        Err(App::NoSourceAvailable(item.to_string()))
    }
}
