//! Source models: one row per configured origin.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of origin a source represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Hackernews,
    Lobsters,
    Reddit,
    Rss,
    Youtube,
    Huggingface,
}

impl SourceType {
    pub const ALL: [SourceType; 6] = [
        Self::Hackernews,
        Self::Lobsters,
        Self::Reddit,
        Self::Rss,
        Self::Youtube,
        Self::Huggingface,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hackernews => "hackernews",
            Self::Lobsters => "lobsters",
            Self::Reddit => "reddit",
            Self::Rss => "rss",
            Self::Youtube => "youtube",
            Self::Huggingface => "huggingface",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "hackernews" => Some(Self::Hackernews),
            "lobsters" => Some(Self::Lobsters),
            "reddit" => Some(Self::Reddit),
            "rss" => Some(Self::Rss),
            "youtube" => Some(Self::Youtube),
            "huggingface" => Some(Self::Huggingface),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered origin (one subreddit, one feed, one channel).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: i32,
    pub source_type: SourceType,
    pub name: String,
    /// Adapter-specific configuration captured at registration.
    pub config: serde_json::Value,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}
