//! Shared ingestion path for every adapter.
//!
//! Holds the database context, the bronze store and the HTTP client, and
//! exposes the find-or-create and upsert operations adapters build on.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::http_client::HttpClient;
use super::Result;
use crate::models::{Discussion, DiscussionDraft, DiscussionField, SourceType, UpsertOutcome};
use crate::repository::DbContext;
use crate::storage::{BronzeKey, BronzeStore};

/// Result of storing one discussion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredDiscussion {
    pub outcome: UpsertOutcome,
    pub content_id: Option<i32>,
}

impl StoredDiscussion {
    pub fn is_new(&self) -> bool {
        self.outcome.is_new()
    }
}

/// Everything an adapter needs to persist what it finds.
#[derive(Clone)]
pub struct Ingest {
    db: DbContext,
    bronze: BronzeStore,
    http: HttpClient,
}

impl Ingest {
    pub fn new(db: DbContext, bronze: BronzeStore, http: HttpClient) -> Self {
        Self { db, bronze, http }
    }

    pub fn db(&self) -> &DbContext {
        &self.db
    }

    pub fn bronze(&self) -> &BronzeStore {
        &self.bronze
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Find or create the source row for `(source_type, name)`.
    pub async fn ensure_source(
        &self,
        source_type: SourceType,
        name: &str,
        config: &serde_json::Value,
    ) -> Result<i32> {
        Ok(self.db.sources().ensure(source_type, name, config).await?)
    }

    /// Resolve a URL to its content id, `None` if it is not a usable URL.
    pub async fn ensure_content(&self, url: &str) -> Result<Option<i32>> {
        Ok(self.db.contents().ensure_content(url).await?)
    }

    /// Insert or refresh a discussion, updating only `mutable` columns.
    pub async fn upsert_discussion(
        &self,
        source_id: i32,
        content_id: Option<i32>,
        source_type: SourceType,
        draft: &DiscussionDraft,
        mutable: &[DiscussionField],
    ) -> Result<UpsertOutcome> {
        Ok(self
            .db
            .discussions()
            .upsert(source_id, content_id, source_type, draft, mutable)
            .await?)
    }

    /// Link a discussion to the content behind `link_url` and upsert it.
    pub async fn store_discussion(
        &self,
        source_id: i32,
        source_type: SourceType,
        link_url: Option<&str>,
        draft: &DiscussionDraft,
        mutable: &[DiscussionField],
    ) -> Result<StoredDiscussion> {
        let content_id = match link_url.filter(|u| !u.is_empty()) {
            Some(url) => self.ensure_content(url).await?,
            None => None,
        };
        let outcome = self
            .upsert_discussion(source_id, content_id, source_type, draft, mutable)
            .await?;
        if outcome.is_new() {
            debug!(
                "New {} discussion {} (content {:?})",
                source_type, draft.external_id, content_id
            );
        }
        Ok(StoredDiscussion {
            outcome,
            content_id,
        })
    }

    /// Keep the raw API payload for an item. Existing payloads are left alone.
    pub fn store_raw<T: Serialize + ?Sized>(
        &self,
        source_type: SourceType,
        external_id: &str,
        payload: &T,
    ) -> Result<bool> {
        let key = BronzeKey::item(source_type.as_str(), external_id, "raw", "json");
        Ok(self.bronze.write_json_if_absent(&key, payload)?)
    }

    /// Fetch an item's JSON payload through the bronze store.
    ///
    /// A payload already on disk is returned without touching the network,
    /// so a rerun after a crash never fetches the same artifact twice.
    pub async fn fetch_item_json(
        &self,
        source_type: SourceType,
        external_id: &str,
        kind: &str,
        url: &str,
    ) -> Result<Value> {
        let key = BronzeKey::item(source_type.as_str(), external_id, kind, "json");
        if self.bronze.exists(&key) {
            match self.bronze.read_json(&key) {
                Ok(cached) => {
                    debug!("Using stored {} for {} {}", kind, source_type, external_id);
                    return Ok(cached);
                }
                Err(e) => warn!(
                    "Refetching unreadable {}: {}",
                    self.bronze.relative_path(&key),
                    e
                ),
            }
        }

        let payload: Value = self.http.get_json(url).await?;
        self.bronze.write_json(&key, &payload)?;
        Ok(payload)
    }

    /// Seed a content row's body from an adapter-provided summary.
    pub async fn seed_body_text(&self, content_id: i32, text: &str) -> Result<bool> {
        if text.trim().is_empty() {
            return Ok(false);
        }
        Ok(self
            .db
            .contents()
            .set_body_text_if_empty(content_id, text)
            .await?)
    }

    pub async fn update_last_fetched(&self, source_id: i32) -> Result<()> {
        Ok(self.db.sources().update_last_fetched(source_id).await?)
    }

    pub async fn pending_comments(
        &self,
        source_type: SourceType,
        limit: usize,
    ) -> Result<Vec<Discussion>> {
        Ok(self
            .db
            .discussions()
            .pending_comments(source_type, limit)
            .await?)
    }

    pub async fn mark_comments_done(
        &self,
        discussion_id: i32,
        comments_json: &str,
        comment_count: Option<i32>,
    ) -> Result<()> {
        Ok(self
            .db
            .discussions()
            .mark_comments_done(discussion_id, comments_json, comment_count)
            .await?)
    }
}
