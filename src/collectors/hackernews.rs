//! Hacker News adapter backed by the Algolia search API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::comments::flatten_json;
use super::ingest::Ingest;
use super::{Collector, CollectorWithComments, Result, SearchableCollector, SourceAdapter};
use crate::models::{CommentsStatus, Discussion, DiscussionDraft, DiscussionField, SourceType};

pub const HN_ALGOLIA_BASE: &str = "https://hn.algolia.com/api/v1";

const DEFAULT_SOURCE_NAME: &str = "Hacker News";

/// Columns refreshed when a story is seen again.
const MUTABLE: &[DiscussionField] = &[
    DiscussionField::Title,
    DiscussionField::Author,
    DiscussionField::Url,
    DiscussionField::Meta,
    DiscussionField::Score,
    DiscussionField::CommentCount,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HackernewsSource {
    #[serde(default = "default_name")]
    pub name: String,
}

fn default_name() -> String {
    DEFAULT_SOURCE_NAME.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HackernewsConfig {
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
    #[serde(default)]
    pub sources: Vec<HackernewsSource>,
}

fn default_fetch_limit() -> usize {
    100
}

impl Default for HackernewsConfig {
    fn default() -> Self {
        Self {
            fetch_limit: default_fetch_limit(),
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "objectID")]
    object_id: Option<String>,
    title: Option<String>,
    author: Option<String>,
    url: Option<String>,
    created_at: Option<String>,
    points: Option<i32>,
    num_comments: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    children: Vec<Value>,
}

fn item_url(id: &str) -> String {
    format!("https://news.ycombinator.com/item?id={}", id)
}

pub struct HackernewsCollector {
    ingest: Ingest,
}

impl HackernewsCollector {
    pub fn new(ingest: Ingest) -> Self {
        Self { ingest }
    }

    /// Store a page of search hits, returning how many were new.
    ///
    /// A hit that fails to store is logged and the rest still go through.
    pub(crate) async fn store_hits(&self, source_id: i32, hits: Vec<Value>) -> usize {
        let mut new_count = 0;
        for raw in hits {
            match self.store_hit(source_id, raw).await {
                Ok(true) => new_count += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to store Hacker News hit: {}", e),
            }
        }
        new_count
    }

    /// Store one hit. Returns whether it created a discussion.
    async fn store_hit(&self, source_id: i32, raw: Value) -> Result<bool> {
        let hit: Hit = match serde_json::from_value(raw.clone()) {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Skipping malformed Hacker News hit: {}", e);
                return Ok(false);
            }
        };
        let Some(id) = hit.object_id.filter(|id| !id.is_empty()) else {
            return Ok(false);
        };

        self.ingest.store_raw(SourceType::Hackernews, &id, &raw)?;

        let hn_url = item_url(&id);
        let draft = DiscussionDraft {
            title: hit.title,
            author: hit.author,
            url: Some(hit.url.clone().unwrap_or_else(|| hn_url.clone())),
            published_at: hit.created_at,
            meta: Some(json!({ "hn_url": hn_url })),
            comments_status: Some(CommentsStatus::Pending),
            score: Some(hit.points.unwrap_or(0)),
            comment_count: Some(hit.num_comments.unwrap_or(0)),
            ..DiscussionDraft::new(id)
        };

        // Self posts have no external URL and link to no content.
        let stored = self
            .ingest
            .store_discussion(
                source_id,
                SourceType::Hackernews,
                hit.url.as_deref(),
                &draft,
                MUTABLE,
            )
            .await?;
        Ok(stored.is_new())
    }

    async fn collect_source(&self, source: &HackernewsSource, fetch_limit: usize) -> Result<usize> {
        info!("Collecting Hacker News source {}", source.name);
        let source_id = self
            .ingest
            .ensure_source(SourceType::Hackernews, &source.name, &json!({ "name": source.name }))
            .await?;

        let url = format!(
            "{}/search_by_date?tags=story,front_page&hitsPerPage={}",
            HN_ALGOLIA_BASE, fetch_limit
        );
        let response: SearchResponse = self.ingest.http().get_json(&url).await?;

        let seen = response.hits.len();
        let new_count = self.store_hits(source_id, response.hits).await;
        info!("Hacker News: {} new of {} hits", new_count, seen);

        self.ingest.update_last_fetched(source_id).await?;
        Ok(new_count)
    }

    /// Fetch and store one story's comment tree.
    async fn fetch_comments(&self, discussion: &Discussion) -> Result<()> {
        let url = format!("{}/items/{}", HN_ALGOLIA_BASE, discussion.external_id);
        let payload = self
            .ingest
            .fetch_item_json(SourceType::Hackernews, &discussion.external_id, "comments", &url)
            .await?;
        let item: Item = serde_json::from_value(payload)?;

        let flat = flatten_json(item.children, "children", "id");
        let comments_json = serde_json::to_string(&flat)?;
        self.ingest
            .mark_comments_done(discussion.id, &comments_json, Some(flat.len() as i32))
            .await
    }
}

impl SourceAdapter for HackernewsCollector {
    fn source_type(&self) -> SourceType {
        SourceType::Hackernews
    }
}

#[async_trait]
impl Collector for HackernewsCollector {
    type Config = HackernewsConfig;

    async fn collect(&self, config: &HackernewsConfig) -> Result<usize> {
        let mut total_new = 0;
        for source in &config.sources {
            match self.collect_source(source, config.fetch_limit).await {
                Ok(new_count) => total_new += new_count,
                Err(e) => warn!("Hacker News source {} failed: {}", source.name, e),
            }
        }
        Ok(total_new)
    }
}

#[async_trait]
impl CollectorWithComments for HackernewsCollector {
    async fn collect_comments(&self, batch_limit: usize) -> Result<usize> {
        if batch_limit == 0 {
            return Ok(0);
        }

        let pending = self
            .ingest
            .pending_comments(SourceType::Hackernews, batch_limit)
            .await?;
        if pending.is_empty() {
            info!("No Hacker News discussions awaiting comments");
            return Ok(0);
        }

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

        info!(
            "Fetched Hacker News comments for {} of {} stories",
            fetched,
            pending.len()
        );
        Ok(fetched)
    }
}

#[async_trait]
impl SearchableCollector for HackernewsCollector {
    async fn search_by_url(&self, url: &str) -> Result<usize> {
        let search_url = format!(
            "{}/search?query={}&tags=story&restrictSearchableAttributes=url",
            HN_ALGOLIA_BASE,
            urlencoding::encode(url)
        );

        let response: SearchResponse = match self.ingest.http().get_json(&search_url).await {
            Ok(response) => response,
            Err(e) if e.status() == Some(404) => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        if response.hits.is_empty() {
            return Ok(0);
        }

        let source_id = self
            .ingest
            .ensure_source(
                SourceType::Hackernews,
                DEFAULT_SOURCE_NAME,
                &json!({ "name": DEFAULT_SOURCE_NAME }),
            )
            .await?;
        Ok(self.store_hits(source_id, response.hits).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::ingest::test_support::setup_ingest;

    fn hit(points: i32) -> Value {
        json!({
            "objectID": "8863",
            "title": "My YC app: Dropbox",
            "author": "dhouston",
            "url": "http://www.getdropbox.com/u/2/screencast.html",
            "created_at": "2007-04-04T19:16:40Z",
            "points": points,
            "num_comments": 71
        })
    }

    #[tokio::test]
    async fn test_resighting_updates_score_in_place() {
        let (ingest, _db, _bronze) = setup_ingest().await;
        let collector = HackernewsCollector::new(ingest.clone());
        let source_id = ingest
            .ensure_source(SourceType::Hackernews, "Hacker News", &json!({}))
            .await
            .unwrap();

        assert_eq!(collector.store_hits(source_id, vec![hit(10)]).await, 1);
        let first = ingest
            .db()
            .discussions()
            .get_by_key(SourceType::Hackernews, "8863")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(collector.store_hits(source_id, vec![hit(111)]).await, 0);
        let second = ingest
            .db()
            .discussions()
            .get_by_key(SourceType::Hackernews, "8863")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.score, Some(10));
        assert_eq!(second.score, Some(111));
        assert_eq!(second.comments_status, Some(CommentsStatus::Pending));
        assert_eq!(
            second.meta_str("hn_url"),
            Some("https://news.ycombinator.com/item?id=8863")
        );

        let content = ingest
            .db()
            .contents()
            .get(second.content_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(content.canonical_url, "https://getdropbox.com/u/2/screencast.html");
    }

    #[tokio::test]
    async fn test_self_post_has_no_content_link() {
        let (ingest, _db, _bronze) = setup_ingest().await;
        let collector = HackernewsCollector::new(ingest.clone());
        let source_id = ingest
            .ensure_source(SourceType::Hackernews, "Hacker News", &json!({}))
            .await
            .unwrap();

        let ask = json!({"objectID": "121003", "title": "Ask HN: anything", "points": 5});
        collector.store_hits(source_id, vec![ask, json!({"title": "no id"})]).await;

        let row = ingest
            .db()
            .discussions()
            .get_by_key(SourceType::Hackernews, "121003")
            .await
            .unwrap()
            .unwrap();
        assert!(row.content_id.is_none());
        assert_eq!(row.url.as_deref(), Some("https://news.ycombinator.com/item?id=121003"));
        assert_eq!(ingest.db().discussions().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_one_failing_hit_does_not_stop_the_page() {
        let (ingest, _db, _bronze) = setup_ingest().await;
        let collector = HackernewsCollector::new(ingest.clone());
        let source_id = ingest
            .ensure_source(SourceType::Hackernews, "Hacker News", &json!({}))
            .await
            .unwrap();

        // A plain file where the item directory should go makes its raw write fail.
        let blocked = ingest.bronze().root().join("hackernews").join("200");
        std::fs::create_dir_all(blocked.parent().unwrap()).unwrap();
        std::fs::write(&blocked, b"").unwrap();

        let hits = ["100", "200", "300"]
            .iter()
            .map(|id| json!({"objectID": id, "title": format!("Story {}", id), "points": 1}))
            .collect();
        assert_eq!(collector.store_hits(source_id, hits).await, 2);

        let discussions = ingest.db().discussions();
        for id in ["100", "300"] {
            assert!(discussions
                .get_by_key(SourceType::Hackernews, id)
                .await
                .unwrap()
                .is_some());
        }
        assert!(discussions
            .get_by_key(SourceType::Hackernews, "200")
            .await
            .unwrap()
            .is_none());
    }
}
