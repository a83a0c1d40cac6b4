//! Lobsters adapter.
//!
//! Stories come from the hottest/newest listings or per-tag listings. URL
//! search goes through the per-domain story listing, cached for one
//! enrichment batch.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::http_client::HttpError;
use super::ingest::Ingest;
use super::{Collector, CollectorWithComments, Result, SearchableCollector, SourceAdapter};
use crate::models::{CommentsStatus, Discussion, DiscussionDraft, DiscussionField, SourceType};
use crate::utils::{canonicalize, extract_domain};

pub const LOBSTERS_BASE: &str = "https://lobste.rs";

const DEFAULT_SOURCE_NAME: &str = "Lobsters";

const MUTABLE: &[DiscussionField] = &[
    DiscussionField::Title,
    DiscussionField::Url,
    DiscussionField::Meta,
    DiscussionField::Score,
    DiscussionField::CommentCount,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobstersSource {
    #[serde(default = "default_name")]
    pub name: String,
    /// Restrict to these tags. Empty means hottest plus newest.
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_name() -> String {
    DEFAULT_SOURCE_NAME.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobstersConfig {
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
    #[serde(default)]
    pub sources: Vec<LobstersSource>,
}

fn default_fetch_limit() -> usize {
    50
}

impl Default for LobstersConfig {
    fn default() -> Self {
        Self {
            fetch_limit: default_fetch_limit(),
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Story {
    short_id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    comments_url: Option<String>,
    created_at: Option<String>,
    score: Option<i32>,
    comment_count: Option<i32>,
    #[serde(default)]
    submitter_user: Option<Value>,
    #[serde(default)]
    tags: Vec<String>,
}

impl Story {
    /// The submitter is a bare username in listings and an object elsewhere.
    fn submitter(&self) -> Option<String> {
        match self.submitter_user.as_ref()? {
            Value::String(name) => Some(name.clone()),
            Value::Object(user) => user
                .get("username")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            _ => None,
        }
    }

    /// The external link, if the story has one besides its comment page.
    fn link(&self) -> Option<&str> {
        let url = self.url.as_deref().filter(|u| !u.is_empty())?;
        if self.comments_url.as_deref() == Some(url) {
            return None;
        }
        Some(url)
    }
}

#[derive(Debug, Deserialize)]
struct StoryComments {
    #[serde(default)]
    comments: Vec<Value>,
}

pub struct LobstersCollector {
    ingest: Ingest,
    domain_cache: Mutex<HashMap<String, Vec<Value>>>,
}

impl LobstersCollector {
    pub fn new(ingest: Ingest) -> Self {
        Self {
            ingest,
            domain_cache: Mutex::new(HashMap::new()),
        }
    }

    fn listing_urls(source: &LobstersSource) -> Vec<String> {
        if source.tags.is_empty() {
            vec![
                format!("{}/hottest.json", LOBSTERS_BASE),
                format!("{}/newest.json", LOBSTERS_BASE),
            ]
        } else {
            source
                .tags
                .iter()
                .map(|tag| format!("{}/t/{}.json", LOBSTERS_BASE, tag))
                .collect()
        }
    }

    /// Store stories, returning how many were new.
    ///
    /// A story that fails to store is logged and the rest still go through.
    pub(crate) async fn store_stories(&self, source_id: i32, stories: Vec<Value>) -> usize {
        let mut new_count = 0;
        for raw in stories {
            match self.store_story(source_id, raw).await {
                Ok(true) => new_count += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to store Lobsters story: {}", e),
            }
        }
        new_count
    }

    async fn store_story(&self, source_id: i32, raw: Value) -> Result<bool> {
        let story: Story = match serde_json::from_value(raw.clone()) {
            Ok(story) => story,
            Err(e) => {
                warn!("Skipping malformed Lobsters story: {}", e);
                return Ok(false);
            }
        };
        let Some(short_id) = story.short_id.clone().filter(|id| !id.is_empty()) else {
            return Ok(false);
        };

        self.ingest.store_raw(SourceType::Lobsters, &short_id, &raw)?;

        let draft = DiscussionDraft {
            title: story.title.clone(),
            author: story.submitter(),
            url: story
                .url
                .clone()
                .filter(|u| !u.is_empty())
                .or_else(|| story.comments_url.clone()),
            published_at: story.created_at.clone(),
            meta: Some(json!({
                "tags": story.tags,
                "lobsters_url": story.comments_url,
            })),
            comments_status: Some(CommentsStatus::Pending),
            score: story.score,
            comment_count: story.comment_count,
            ..DiscussionDraft::new(short_id)
        };

        let stored = self
            .ingest
            .store_discussion(source_id, SourceType::Lobsters, story.link(), &draft, MUTABLE)
            .await?;
        Ok(stored.is_new())
    }

    async fn collect_source(&self, source: &LobstersSource, fetch_limit: usize) -> Result<usize> {
        info!("Collecting Lobsters source {}", source.name);
        let source_id = self
            .ingest
            .ensure_source(
                SourceType::Lobsters,
                &source.name,
                &json!({ "name": source.name, "tags": source.tags }),
            )
            .await?;

        let mut seen = HashSet::new();
        let mut stories = Vec::new();
        for url in Self::listing_urls(source) {
            let listing: Vec<Value> = match self.ingest.http().get_json(&url).await {
                Ok(listing) => listing,
                Err(e) => {
                    warn!("Lobsters fetch failed for {}: {}", url, e);
                    continue;
                }
            };
            for story in listing.into_iter().take(fetch_limit) {
                let id = story
                    .get("short_id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                if let Some(id) = id {
                    if seen.insert(id) {
                        stories.push(story);
                    }
                }
            }
        }

        let count = stories.len();
        let new_count = self.store_stories(source_id, stories).await;
        info!("Lobsters: {} new of {} stories", new_count, count);

        self.ingest.update_last_fetched(source_id).await?;
        Ok(new_count)
    }

    /// Fetch and store one story's comments.
    async fn fetch_comments(&self, discussion: &Discussion) -> Result<()> {
        let url = format!("{}/s/{}.json", LOBSTERS_BASE, discussion.external_id);
        let payload = self
            .ingest
            .fetch_item_json(SourceType::Lobsters, &discussion.external_id, "comments", &url)
            .await?;
        let story: StoryComments = serde_json::from_value(payload)?;

        // Lobsters already returns comments flat, with depth and parent.
        let count = story.comments.len() as i32;
        let comments_json = serde_json::to_string(&story.comments)?;
        self.ingest
            .mark_comments_done(discussion.id, &comments_json, Some(count))
            .await
    }

    /// Stories submitted from `domain`. Unknown domains yield none.
    ///
    /// Only completed lookups are cached; a throttled one surfaces as an
    /// error so the caller can retry the row later.
    async fn domain_stories(&self, domain: &str) -> Result<Vec<Value>> {
        let mut cache = self.domain_cache.lock().await;
        if let Some(stories) = cache.get(domain) {
            return Ok(stories.clone());
        }

        let url = format!("{}/domains/{}.json", LOBSTERS_BASE, domain);
        let stories = domain_listing(domain, self.ingest.http().get_json(&url).await)?;

        cache.insert(domain.to_string(), stories.clone());
        Ok(stories)
    }
}

/// Interpret a domain listing response. A 404 means Lobsters has never seen
/// the domain.
fn domain_listing(
    domain: &str,
    response: std::result::Result<Vec<Value>, HttpError>,
) -> Result<Vec<Value>> {
    match response {
        Ok(stories) => Ok(stories),
        Err(e) if e.status() == Some(404) => {
            debug!("No Lobsters listing for {}", domain);
            Ok(Vec::new())
        }
        Err(e) => Err(e.into()),
    }
}

/// Keep only stories whose link canonicalizes to `target`.
fn matching_stories(stories: Vec<Value>, target: &str) -> Vec<Value> {
    stories
        .into_iter()
        .filter(|story| {
            story
                .get("url")
                .and_then(|u| u.as_str())
                .and_then(canonicalize)
                .as_deref()
                == Some(target)
        })
        .collect()
}

impl SourceAdapter for LobstersCollector {
    fn source_type(&self) -> SourceType {
        SourceType::Lobsters
    }
}

#[async_trait]
impl Collector for LobstersCollector {
    type Config = LobstersConfig;

    async fn collect(&self, config: &LobstersConfig) -> Result<usize> {
        let mut total_new = 0;
        for source in &config.sources {
            match self.collect_source(source, config.fetch_limit).await {
                Ok(new_count) => total_new += new_count,
                Err(e) => warn!("Lobsters source {} failed: {}", source.name, e),
            }
        }
        Ok(total_new)
    }
}

#[async_trait]
impl CollectorWithComments for LobstersCollector {
    async fn collect_comments(&self, batch_limit: usize) -> Result<usize> {
        if batch_limit == 0 {
            return Ok(0);
        }

        let pending = self
            .ingest
            .pending_comments(SourceType::Lobsters, batch_limit)
            .await?;

        let mut fetched = 0;
        for discussion in &pending {
            match self.fetch_comments(discussion).await {
                Ok(()) => fetched += 1,
                Err(e) => warn!(
                    "Failed to fetch comments for story {}: {}",
                    discussion.external_id, e
                ),
            }
        }

        info!("Fetched Lobsters comments for {} stories", fetched);
        Ok(fetched)
    }
}

#[async_trait]
impl SearchableCollector for LobstersCollector {
    async fn begin_batch(&self) {
        self.domain_cache.lock().await.clear();
    }

    async fn search_by_url(&self, url: &str) -> Result<usize> {
        let (Some(target), Some(domain)) = (canonicalize(url), extract_domain(url)) else {
            return Ok(0);
        };

        let stories = matching_stories(self.domain_stories(&domain).await?, &target);
        if stories.is_empty() {
            return Ok(0);
        }

        let source_id = self
            .ingest
            .ensure_source(
                SourceType::Lobsters,
                DEFAULT_SOURCE_NAME,
                &json!({ "name": DEFAULT_SOURCE_NAME }),
            )
            .await?;
        Ok(self.store_stories(source_id, stories).await)
    }
}
