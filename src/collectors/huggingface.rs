//! Hugging Face daily papers adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::ingest::Ingest;
use super::{Collector, Result, SourceAdapter};
use crate::models::{DiscussionDraft, DiscussionField, SourceType};

pub const HF_API_BASE: &str = "https://huggingface.co/api";

const MUTABLE: &[DiscussionField] = &[
    DiscussionField::Title,
    DiscussionField::Author,
    DiscussionField::ContentText,
    DiscussionField::Meta,
    DiscussionField::Score,
    DiscussionField::CommentCount,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuggingfaceSource {
    #[serde(default = "default_name")]
    pub name: String,
}

fn default_name() -> String {
    "HuggingFace Papers".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuggingfaceConfig {
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
    #[serde(default)]
    pub sources: Vec<HuggingfaceSource>,
}

fn default_fetch_limit() -> usize {
    100
}

impl Default for HuggingfaceConfig {
    fn default() -> Self {
        Self {
            fetch_limit: default_fetch_limit(),
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailyPaper {
    paper: Paper,
    title: Option<String>,
    num_comments: Option<i32>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Paper {
    id: Option<String>,
    title: Option<String>,
    summary: Option<String>,
    #[serde(default)]
    authors: Vec<Author>,
    upvotes: Option<i32>,
    published_at: Option<String>,
    github_repo: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: Option<String>,
}

impl Paper {
    fn author_list(&self) -> Option<String> {
        let names: Vec<&str> = self
            .authors
            .iter()
            .filter_map(|a| a.name.as_deref())
            .filter(|n| !n.is_empty())
            .collect();
        (!names.is_empty()).then(|| names.join(", "))
    }
}

fn paper_url(id: &str) -> String {
    format!("https://huggingface.co/papers/{}", id)
}

pub struct HuggingfaceCollector {
    ingest: Ingest,
}

impl HuggingfaceCollector {
    pub fn new(ingest: Ingest) -> Self {
        Self { ingest }
    }

    /// Store daily papers, returning how many were new. Failures are per
    /// paper.
    pub(crate) async fn store_papers(&self, source_id: i32, items: Vec<Value>) -> usize {
        let mut new_count = 0;
        for raw in items {
            match self.store_paper(source_id, raw).await {
                Ok(true) => new_count += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to store daily paper: {}", e),
            }
        }
        new_count
    }

    async fn store_paper(&self, source_id: i32, raw: Value) -> Result<bool> {
        let item: DailyPaper = match serde_json::from_value(raw.clone()) {
            Ok(item) => item,
            Err(e) => {
                warn!("Skipping malformed daily paper: {}", e);
                return Ok(false);
            }
        };
        let Some(id) = item.paper.id.clone().filter(|id| !id.is_empty()) else {
            return Ok(false);
        };

        self.ingest.store_raw(SourceType::Huggingface, &id, &raw)?;

        let url = paper_url(&id);
        let summary = item.paper.summary.clone().filter(|s| !s.trim().is_empty());
        let draft = DiscussionDraft {
            title: item.paper.title.clone().or(item.title.clone()),
            author: item.paper.author_list(),
            url: Some(url.clone()),
            content_text: summary.clone(),
            published_at: item.paper.published_at.clone().or(item.published_at.clone()),
            meta: Some(json!({ "github_repo": item.paper.github_repo })),
            score: item.paper.upvotes,
            comment_count: item.num_comments,
            ..DiscussionDraft::new(id)
        };

        let stored = self
            .ingest
            .store_discussion(source_id, SourceType::Huggingface, Some(&url), &draft, MUTABLE)
            .await?;
        if let (Some(content_id), Some(text)) = (stored.content_id, summary.as_deref()) {
            self.ingest.seed_body_text(content_id, text).await?;
        }
        Ok(stored.is_new())
    }

    async fn collect_source(
        &self,
        source: &HuggingfaceSource,
        fetch_limit: usize,
    ) -> Result<usize> {
        info!("Collecting {}", source.name);
        let source_id = self
            .ingest
            .ensure_source(SourceType::Huggingface, &source.name, &json!({ "name": source.name }))
            .await?;

        let url = format!("{}/daily_papers?limit={}", HF_API_BASE, fetch_limit);
        let items: Vec<Value> = self.ingest.http().get_json(&url).await?;

        let count = items.len();
        let new_count = self.store_papers(source_id, items).await;
        info!("{}: {} new of {} papers", source.name, new_count, count);

        self.ingest.update_last_fetched(source_id).await?;
        Ok(new_count)
    }
}

impl SourceAdapter for HuggingfaceCollector {
    fn source_type(&self) -> SourceType {
        SourceType::Huggingface
    }
}

#[async_trait]
impl Collector for HuggingfaceCollector {
    type Config = HuggingfaceConfig;

    async fn collect(&self, config: &HuggingfaceConfig) -> Result<usize> {
        let mut total_new = 0;
        for source in &config.sources {
            match self.collect_source(source, config.fetch_limit).await {
                Ok(new_count) => total_new += new_count,
                Err(e) => warn!("{} failed: {}", source.name, e),
            }
        }
        Ok(total_new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::ingest::test_support::setup_ingest;

    fn item(upvotes: i32) -> Value {
        json!({
            "paper": {
                "id": "2401.04088",
                "title": "Mixtral of Experts",
                "summary": "We introduce Mixtral 8x7B, a sparse mixture of experts model.",
                "authors": [{"name": "Albert Q. Jiang"}, {"name": "Alexandre Sablayrolles"}],
                "upvotes": upvotes,
                "publishedAt": "2024-01-08T18:47:34.000Z",
                "githubRepo": "https://github.com/mistralai/mistral-src"
            },
            "title": "Mixtral of Experts",
            "numComments": 3,
            "publishedAt": "2024-01-09T01:00:00.000Z"
        })
    }

    #[tokio::test]
    async fn test_store_papers() {
        let (ingest, _db, _bronze) = setup_ingest().await;
        let collector = HuggingfaceCollector::new(ingest.clone());
        let source_id = ingest
            .ensure_source(SourceType::Huggingface, "HuggingFace Papers", &json!({}))
            .await
            .unwrap();

        assert_eq!(collector.store_papers(source_id, vec![item(50)]).await, 1);
        assert_eq!(collector.store_papers(source_id, vec![item(80)]).await, 0);

        let row = ingest
            .db()
            .discussions()
            .get_by_key(SourceType::Huggingface, "2401.04088")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.score, Some(80));
        assert_eq!(row.comment_count, Some(3));
        assert_eq!(
            row.author.as_deref(),
            Some("Albert Q. Jiang, Alexandre Sablayrolles")
        );
        assert_eq!(
            row.meta_str("github_repo"),
            Some("https://github.com/mistralai/mistral-src")
        );

        let content = ingest
            .db()
            .contents()
            .get(row.content_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(content.canonical_url, "https://huggingface.co/papers/2401.04088");
        assert!(content.body_text.unwrap().starts_with("We introduce Mixtral"));
    }
}
