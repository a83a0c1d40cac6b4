//! RSS, Atom and JSON Feed adapter.

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::ingest::Ingest;
use super::{Collector, CollectorError, Result, SourceAdapter};
use crate::models::{DiscussionDraft, DiscussionField, SourceType};

const MUTABLE: &[DiscussionField] = &[
    DiscussionField::Title,
    DiscussionField::Author,
    DiscussionField::Url,
    DiscussionField::ContentText,
    DiscussionField::Meta,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RssSource {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RssConfig {
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
    #[serde(default)]
    pub sources: Vec<RssSource>,
}

fn default_fetch_limit() -> usize {
    50
}

impl Default for RssConfig {
    fn default() -> Self {
        Self {
            fetch_limit: default_fetch_limit(),
            sources: Vec::new(),
        }
    }
}

/// One feed entry reduced to the fields we keep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedEntry {
    pub id: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub author: Option<String>,
    pub text: Option<String>,
    pub published_at: Option<String>,
}

/// A parsed feed.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub entries: Vec<FeedEntry>,
}

/// Parse a feed body. Entries with neither an id nor a link are dropped.
pub fn parse_feed(body: &[u8]) -> Result<ParsedFeed> {
    let feed = feed_rs::parser::parse(body).map_err(|e| CollectorError::Feed(e.to_string()))?;

    let entries = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let link = entry.links.first().map(|l| l.href.clone());
            let id = Some(entry.id)
                .filter(|id| !id.is_empty())
                .or_else(|| link.clone())?;

            let text = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .filter(|t| !t.trim().is_empty());

            Some(FeedEntry {
                id,
                title: entry.title.map(|t| t.content),
                link,
                author: entry.authors.first().map(|a| a.name.clone()),
                text,
                published_at: entry
                    .published
                    .or(entry.updated)
                    .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
            })
        })
        .collect();

    Ok(ParsedFeed {
        title: feed.title.map(|t| t.content),
        entries,
    })
}

pub struct RssCollector {
    ingest: Ingest,
}

impl RssCollector {
    pub fn new(ingest: Ingest) -> Self {
        Self { ingest }
    }

    /// Store up to `limit` entries, returning how many were new. Failures
    /// are per entry.
    pub(crate) async fn store_entries(
        &self,
        source_id: i32,
        feed: &ParsedFeed,
        limit: usize,
    ) -> usize {
        let mut new_count = 0;
        for entry in feed.entries.iter().take(limit) {
            match self.store_entry(source_id, feed, entry).await {
                Ok(true) => new_count += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to store feed entry {}: {}", entry.id, e),
            }
        }
        new_count
    }

    async fn store_entry(
        &self,
        source_id: i32,
        feed: &ParsedFeed,
        entry: &FeedEntry,
    ) -> Result<bool> {
        self.ingest.store_raw(SourceType::Rss, &entry.id, entry)?;

        let draft = DiscussionDraft {
            title: entry.title.clone(),
            author: entry.author.clone(),
            url: entry.link.clone(),
            content_text: entry.text.clone(),
            published_at: entry.published_at.clone(),
            meta: Some(json!({ "feed_title": feed.title })),
            ..DiscussionDraft::new(entry.id.clone())
        };

        let stored = self
            .ingest
            .store_discussion(
                source_id,
                SourceType::Rss,
                entry.link.as_deref(),
                &draft,
                MUTABLE,
            )
            .await?;

        if let (Some(content_id), Some(text)) = (stored.content_id, entry.text.as_deref()) {
            self.ingest.seed_body_text(content_id, text).await?;
        }
        Ok(stored.is_new())
    }

    async fn collect_source(&self, source: &RssSource, fetch_limit: usize) -> Result<usize> {
        info!("Collecting feed {}", source.name);
        let source_id = self
            .ingest
            .ensure_source(
                SourceType::Rss,
                &source.name,
                &json!({ "name": source.name, "url": source.url }),
            )
            .await?;

        let body = self.ingest.http().get(&source.url).await?.bytes().await?;
        let feed = parse_feed(&body)?;

        let new_count = self.store_entries(source_id, &feed, fetch_limit).await;
        info!(
            "{}: {} new of {} entries",
            source.name,
            new_count,
            feed.entries.len().min(fetch_limit)
        );

        self.ingest.update_last_fetched(source_id).await?;
        Ok(new_count)
    }
}

impl SourceAdapter for RssCollector {
    fn source_type(&self) -> SourceType {
        SourceType::Rss
    }
}

#[async_trait]
impl Collector for RssCollector {
    type Config = RssConfig;

    async fn collect(&self, config: &RssConfig) -> Result<usize> {
        let mut total_new = 0;
        for source in &config.sources {
            match self.collect_source(source, config.fetch_limit).await {
                Ok(new_count) => total_new += new_count,
                Err(e) => warn!("Feed {} failed: {}", source.name, e),
            }
        }
        Ok(total_new)
    }
}
