//! Reddit adapter over the public JSON listings.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::comments::{flatten_comments, json_id};
use super::ingest::Ingest;
use super::{Collector, CollectorWithComments, Result, SourceAdapter};
use crate::models::{CommentsStatus, Discussion, DiscussionDraft, DiscussionField, SourceType};

pub const REDDIT_BASE: &str = "https://www.reddit.com";

const LISTINGS: [&str; 2] = ["hot", "new"];

const MUTABLE: &[DiscussionField] = &[
    DiscussionField::Title,
    DiscussionField::Author,
    DiscussionField::Url,
    DiscussionField::ContentText,
    DiscussionField::Meta,
    DiscussionField::Score,
    DiscussionField::CommentCount,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditSource {
    pub subreddit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditConfig {
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
    #[serde(default)]
    pub sources: Vec<RedditSource>,
}

fn default_fetch_limit() -> usize {
    100
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            fetch_limit: default_fetch_limit(),
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    #[serde(default)]
    kind: String,
    data: Value,
}

#[derive(Debug, Deserialize)]
struct Post {
    name: Option<String>,
    title: Option<String>,
    author: Option<String>,
    url: Option<String>,
    permalink: Option<String>,
    selftext: Option<String>,
    #[serde(default)]
    is_self: bool,
    subreddit: Option<String>,
    link_flair_text: Option<String>,
    score: Option<i32>,
    num_comments: Option<i32>,
    created_utc: Option<f64>,
}

impl Post {
    /// Self posts and links back into reddit point at no external content.
    fn link(&self) -> Option<&str> {
        if self.is_self {
            return None;
        }
        self.url
            .as_deref()
            .filter(|u| !u.is_empty() && !u.contains("reddit.com"))
    }

    fn published_at(&self) -> Option<String> {
        let secs = self.created_utc?;
        DateTime::from_timestamp(secs as i64, 0)
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

/// Fullname without the `t3_` kind prefix.
fn short_id(fullname: &str) -> &str {
    fullname.strip_prefix("t3_").unwrap_or(fullname)
}

fn is_comment(thing: &Value) -> bool {
    thing.get("kind").and_then(|k| k.as_str()) == Some("t1")
}

/// Flatten a comment listing, following `data.replies.data.children`.
fn flatten_reddit_comments(children: Vec<Value>) -> Vec<super::FlatComment<Value>> {
    let roots = children.into_iter().filter(is_comment).collect();

    flatten_comments(
        roots,
        |node| {
            let replies = node
                .get_mut("data")
                .and_then(|d| d.as_object_mut())
                .and_then(|d| d.remove("replies"));
            match replies.and_then(|mut r| r.pointer_mut("/data/children").map(Value::take)) {
                Some(Value::Array(children)) => children.into_iter().filter(is_comment).collect(),
                _ => Vec::new(),
            }
        },
        |node| json_id(node.pointer("/data/id")?),
    )
}

pub struct RedditCollector {
    ingest: Ingest,
}

impl RedditCollector {
    pub fn new(ingest: Ingest) -> Self {
        Self { ingest }
    }

    /// Store posts, returning how many were new. Failures are per post.
    pub(crate) async fn store_posts(&self, source_id: i32, posts: Vec<Value>) -> usize {
        let mut new_count = 0;
        for raw in posts {
            match self.store_post(source_id, raw).await {
                Ok(true) => new_count += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to store Reddit post: {}", e),
            }
        }
        new_count
    }

    async fn store_post(&self, source_id: i32, raw: Value) -> Result<bool> {
        let post: Post = match serde_json::from_value(raw.clone()) {
            Ok(post) => post,
            Err(e) => {
                warn!("Skipping malformed Reddit post: {}", e);
                return Ok(false);
            }
        };
        let Some(name) = post.name.clone().filter(|n| !n.is_empty()) else {
            return Ok(false);
        };

        self.ingest.store_raw(SourceType::Reddit, &name, &raw)?;

        let draft = DiscussionDraft {
            title: post.title.clone(),
            author: post.author.clone(),
            url: post
                .permalink
                .as_ref()
                .map(|p| format!("https://reddit.com{}", p)),
            content_text: post.selftext.clone().filter(|t| !t.is_empty()),
            published_at: post.published_at(),
            meta: Some(json!({
                "subreddit": post.subreddit,
                "flair": post.link_flair_text,
            })),
            comments_status: Some(CommentsStatus::Pending),
            score: post.score,
            comment_count: post.num_comments,
            ..DiscussionDraft::new(name)
        };

        let stored = self
            .ingest
            .store_discussion(source_id, SourceType::Reddit, post.link(), &draft, MUTABLE)
            .await?;
        Ok(stored.is_new())
    }

    async fn collect_source(&self, source: &RedditSource, fetch_limit: usize) -> Result<usize> {
        let sub = &source.subreddit;
        info!("Collecting r/{}", sub);
        let source_id = self
            .ingest
            .ensure_source(SourceType::Reddit, sub, &json!({ "subreddit": sub }))
            .await?;

        let mut seen = HashSet::new();
        let mut posts = Vec::new();
        for listing_name in LISTINGS {
            let url = format!(
                "{}/r/{}/{}.json?limit={}",
                REDDIT_BASE, sub, listing_name, fetch_limit
            );
            let (listing, headers): (Listing, _) =
                match self.ingest.http().get_json_with_headers(&url).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!("Reddit fetch failed for {}: {}", url, e);
                        continue;
                    }
                };
            if let Some(remaining) = headers.get("x-ratelimit-remaining") {
                debug!("Reddit quota remaining: {}", remaining);
            }

            for thing in listing.data.children {
                if thing.kind != "t3" {
                    continue;
                }
                let name = thing
                    .data
                    .get("name")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                if let Some(name) = name {
                    if seen.insert(name) {
                        posts.push(thing.data);
                    }
                }
            }
        }

        let count = posts.len();
        let new_count = self.store_posts(source_id, posts).await;
        info!("r/{}: {} new of {} posts", sub, new_count, count);

        self.ingest.update_last_fetched(source_id).await?;
        Ok(new_count)
    }

    /// Fetch and store one post's comment tree. Returns `false` when the
    /// post cannot be addressed.
    async fn fetch_comments(&self, discussion: &Discussion) -> Result<bool> {
        let Some(sub) = discussion.meta_str("subreddit") else {
            warn!("Reddit discussion {} has no subreddit", discussion.external_id);
            return Ok(false);
        };
        let url = format!(
            "{}/r/{}/comments/{}.json",
            REDDIT_BASE,
            sub,
            short_id(&discussion.external_id)
        );

        // The response is [post listing, comment listing].
        let payload = self
            .ingest
            .fetch_item_json(SourceType::Reddit, &discussion.external_id, "comments", &url)
            .await?;
        let listings: Vec<Listing> = serde_json::from_value(payload)?;
        let children = listings
            .into_iter()
            .nth(1)
            .map(|l| {
                l.data
                    .children
                    .into_iter()
                    .map(|t| json!({ "kind": t.kind, "data": t.data }))
                    .collect()
            })
            .unwrap_or_default();

        let flat = flatten_reddit_comments(children);
        let comments_json = serde_json::to_string(&flat)?;
        self.ingest
            .mark_comments_done(discussion.id, &comments_json, Some(flat.len() as i32))
            .await?;
        Ok(true)
    }
}

impl SourceAdapter for RedditCollector {
    fn source_type(&self) -> SourceType {
        SourceType::Reddit
    }
}

#[async_trait]
impl Collector for RedditCollector {
    type Config = RedditConfig;

    async fn collect(&self, config: &RedditConfig) -> Result<usize> {
        let mut total_new = 0;
        for source in &config.sources {
            match self.collect_source(source, config.fetch_limit).await {
                Ok(new_count) => total_new += new_count,
                Err(e) => warn!("r/{} failed: {}", source.subreddit, e),
            }
        }
        Ok(total_new)
    }
}

#[async_trait]
impl CollectorWithComments for RedditCollector {
    async fn collect_comments(&self, batch_limit: usize) -> Result<usize> {
        if batch_limit == 0 {
            return Ok(0);
        }

        let pending = self
            .ingest
            .pending_comments(SourceType::Reddit, batch_limit)
            .await?;

        let mut fetched = 0;
        for discussion in &pending {
            match self.fetch_comments(discussion).await {
                Ok(true) => fetched += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    "Failed to fetch comments for {}: {}",
                    discussion.external_id, e
                ),
            }
        }

        info!("Fetched Reddit comments for {} posts", fetched);
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::ingest::test_support::setup_ingest;

    fn post(is_self: bool, url: &str) -> Value {
        json!({
            "name": "t3_1abcde",
            "title": "Announcing a new release",
            "author": "ferris",
            "url": url,
            "permalink": "/r/rust/comments/1abcde/announcing_a_new_release/",
            "selftext": if is_self { "body text" } else { "" },
            "is_self": is_self,
            "subreddit": "rust",
            "link_flair_text": "news",
            "score": 512,
            "num_comments": 64,
            "created_utc": 1700000000.0
        })
    }

    #[test]
    fn test_link_rules() {
        let external: Post = serde_json::from_value(post(false, "https://blog.rust-lang.org/x")).unwrap();
        assert_eq!(external.link(), Some("https://blog.rust-lang.org/x"));

        let own: Post = serde_json::from_value(post(true, "https://www.reddit.com/r/rust/comments/1abcde/")).unwrap();
        assert_eq!(own.link(), None);

        let crosspost: Post = serde_json::from_value(post(false, "https://www.reddit.com/r/other/comments/zz/")).unwrap();
        assert_eq!(crosspost.link(), None);
    }

    #[test]
    fn test_published_at_from_epoch() {
        let p: Post = serde_json::from_value(post(false, "https://example.com")).unwrap();
        assert_eq!(p.published_at().as_deref(), Some("2023-11-14T22:13:20Z"));
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("t3_1abcde"), "1abcde");
        assert_eq!(short_id("1abcde"), "1abcde");
    }

    #[test]
    fn test_flatten_follows_replies() {
        let children = vec![
            json!({
                "kind": "t1",
                "data": {
                    "id": "c1",
                    "body": "top",
                    "replies": {"kind": "Listing", "data": {"children": [
                        {"kind": "t1", "data": {"id": "c2", "body": "reply", "replies": ""}},
                        {"kind": "more", "data": {"id": "m1", "children": ["c9"]}}
                    ]}}
                }
            }),
            json!({"kind": "more", "data": {"id": "m2"}}),
        ];

        let flat = flatten_reddit_comments(children);
        let ids: Vec<(&str, Option<&str>, usize)> = flat
            .iter()
            .map(|c| (c.id.as_str(), c.parent_id.as_deref(), c.depth))
            .collect();
        assert_eq!(ids, vec![("c1", None, 0), ("c2", Some("c1"), 1)]);
        assert!(flat[0].data.pointer("/data/replies").is_none());
    }

    #[tokio::test]
    async fn test_store_posts_seeds_inline_text() {
        let (ingest, _db, _bronze) = setup_ingest().await;
        let collector = RedditCollector::new(ingest.clone());
        let source_id = ingest
            .ensure_source(SourceType::Reddit, "rust", &json!({"subreddit": "rust"}))
            .await
            .unwrap();

        collector
            .store_posts(source_id, vec![post(true, "https://www.reddit.com/r/rust/comments/1abcde/")])
            .await;

        let row = ingest
            .db()
            .discussions()
            .get_by_key(SourceType::Reddit, "t3_1abcde")
            .await
            .unwrap()
            .unwrap();
        assert!(row.content_id.is_none());
        assert_eq!(row.content_text.as_deref(), Some("body text"));
        assert_eq!(row.meta_str("subreddit"), Some("rust"));
        assert_eq!(
            row.url.as_deref(),
            Some("https://reddit.com/r/rust/comments/1abcde/announcing_a_new_release/")
        );
    }
}
