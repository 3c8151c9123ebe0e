use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MediaItem {
    pub platform: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    /// Plugin specific metadata, kept as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MediaItem {
    pub fn new(platform: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            id: id.into(),
            title: None,
            artist: None,
            extra: Map::new(),
        }
    }
}

impl fmt::Display for MediaItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.platform)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityKey {
    Low,
    #[default]
    Standard,
    High,
    Super,
}

impl QualityKey {
    /// Every key, lowest fidelity first.
    pub const ALL: [QualityKey; 4] = [
        QualityKey::Low,
        QualityKey::Standard,
        QualityKey::High,
        QualityKey::Super,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QualityKey::Low => "low",
            QualityKey::Standard => "standard",
            QualityKey::High => "high",
            QualityKey::Super => "super",
        }
    }
}

impl fmt::Display for QualityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when the preferred quality has no source.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MissingQualityPolicy {
    #[default]
    Lower,
    Higher,
    Exact,
}

/// Precedence-ordered, duplicate-free, never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityOrder(Vec<QualityKey>);

impl QualityOrder {
    pub fn build(preferred: QualityKey, policy: MissingQualityPolicy) -> Self {
        let (lower, higher): (Vec<_>, Vec<_>) = QualityKey::ALL
            .into_iter()
            .filter(|key| *key != preferred)
            .partition(|key| *key < preferred);

        let mut order = vec![preferred];
        match policy {
            MissingQualityPolicy::Higher => {
                order.extend(higher);
                order.extend(lower.into_iter().rev());
            }
            MissingQualityPolicy::Lower => {
                order.extend(lower.into_iter().rev());
                order.extend(higher);
            }
            MissingQualityPolicy::Exact => {}
        }
        Self(order)
    }

    pub fn first(&self) -> QualityKey {
        self.0[0]
    }

    pub fn as_slice(&self) -> &[QualityKey] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = QualityKey> + '_ {
        self.0.iter().copied()
    }
}

/// Source of quality orders for the resolver.
pub trait QualityOrdering: Send + Sync {
    fn order(&self, preferred: QualityKey, policy: MissingQualityPolicy) -> QualityOrder;
}

pub struct StandardOrdering;

impl QualityOrdering for StandardOrdering {
    fn order(&self, preferred: QualityKey, policy: MissingQualityPolicy) -> QualityOrder {
        QualityOrder::build(preferred, policy)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaSourceResult {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl MediaSourceResult {
    pub fn usable_url(&self) -> Option<&str> {
        let url = self.url.trim();
        (!url.is_empty()).then_some(url)
    }

    /// Plugin headers with the user agent folded in under `user-agent`.
    pub fn request_headers(&self) -> BTreeMap<String, String> {
        let mut headers = self.headers.clone().unwrap_or_default();
        if let Some(user_agent) = &self.user_agent {
            headers.insert("user-agent".to_string(), user_agent.clone());
        }
        headers
    }
}
