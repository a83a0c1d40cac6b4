//! Discussions: one source's view of a post, story or entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::source::SourceType;
use super::status::CommentsStatus;

/// A post/story/entry as seen by one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discussion {
    pub id: i32,
    pub source_id: i32,
    pub content_id: Option<i32>,
    pub source_type: SourceType,
    pub external_id: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub url: Option<String>,
    pub content_text: Option<String>,
    pub published_at: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub meta: serde_json::Value,
    pub comments_status: Option<CommentsStatus>,
    pub comments_json: Option<String>,
    pub score: Option<i32>,
    pub comment_count: Option<i32>,
}

impl Discussion {
    /// Read a string field from the metadata blob.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(|v| v.as_str())
    }
}

/// Columns an adapter may declare as mutable on re-sight.
///
/// Identity fields (`source_type`, `external_id`, `source_id`) and the
/// first-seen content link are never in this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscussionField {
    Title,
    Author,
    Url,
    ContentText,
    Meta,
    Score,
    CommentCount,
}

/// Values for one discussion as produced by an adapter.
#[derive(Debug, Clone, Default)]
pub struct DiscussionDraft {
    pub external_id: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub url: Option<String>,
    pub content_text: Option<String>,
    pub published_at: Option<String>,
    pub meta: Option<serde_json::Value>,
    pub comments_status: Option<CommentsStatus>,
    pub score: Option<i32>,
    pub comment_count: Option<i32>,
}

impl DiscussionDraft {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            ..Default::default()
        }
    }
}

/// Outcome of an upsert against the `(source_type, external_id)` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i32),
    Updated(i32),
}

impl UpsertOutcome {
    pub fn id(&self) -> i32 {
        match self {
            Self::Inserted(id) | Self::Updated(id) => *id,
        }
    }

    /// The id of a newly created row, `None` on re-sight.
    pub fn new_id(&self) -> Option<i32> {
        match self {
            Self::Inserted(id) => Some(*id),
            Self::Updated(_) => None,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}
