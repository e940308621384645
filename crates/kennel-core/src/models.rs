use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Score of a listing that has not been scored, or whose scoring failed.
pub const NOT_SCORED: i64 = -1;

/// Display name used when a collector could not extract one.
pub const UNKNOWN_NAME: &str = "Unknown";

/// One adoptable dog as reported by a source.
///
/// Collectors fill in the identity and text fields; `score` and
/// `score_details` belong to the scoring pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub name: String,
    /// Canonical per-listing URL. May be empty.
    pub detail_url: String,
    /// Full free text fed to the evaluator. May be empty.
    pub description: String,
    /// Origin site identifier (e.g. "secondechance.org").
    pub source: String,
    pub scraped_at: DateTime<Utc>,
    pub score: i64,
    pub score_details: Vec<String>,
    /// Source-specific fields (breed, age, size, image URL, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, serde_json::Value>,
    /// The detail page only has content after JavaScript runs.
    #[serde(skip)]
    pub needs_render: bool,
}

impl Listing {
    pub fn new(
        source: impl Into<String>,
        name: impl Into<String>,
        detail_url: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let trimmed = name.trim();
        Self {
            name: if trimmed.is_empty() {
                UNKNOWN_NAME.to_string()
            } else {
                trimmed.to_string()
            },
            detail_url: detail_url.into().trim().to_string(),
            description: String::new(),
            source: source.into(),
            scraped_at: Utc::now(),
            score: NOT_SCORED,
            score_details: Vec::new(),
            extras: BTreeMap::new(),
            needs_render: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_render(mut self, needs_render: bool) -> Self {
        self.needs_render = needs_render;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    /// Identity used for deduplication: `(lowercase(name), detail_url)`.
    pub fn identity(&self) -> (String, String) {
        (self.name.to_lowercase(), self.detail_url.clone())
    }

    /// Key used in both cache namespaces.
    ///
    /// Falls back to the lowercased name when the listing has no URL.
    pub fn cache_key(&self) -> String {
        if self.detail_url.is_empty() {
            format!("name:{}", self.name.to_lowercase())
        } else {
            self.detail_url.clone()
        }
    }

    pub fn is_scored(&self) -> bool {
        self.score != NOT_SCORED
    }
}

/// Fetch Cache entry: previously extracted description for a detail URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptionEntry {
    pub text: String,
    #[serde(default)]
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

/// Scoring Cache entry, stored per `(url, prompt fingerprint)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub score: i64,
    #[serde(default)]
    pub score_details: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
