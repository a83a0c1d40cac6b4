//! Cross-source enrichment.
//!
//! For content not yet enriched, asks every searchable source whether it
//! has discussions of the same URL. The searches upsert what they find.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::collectors::SearchableCollector;
use crate::models::{Content, SourceType};
use crate::repository::DbContext;

/// Domains that no discussion site links in a searchable way.
const SKIP_DOMAINS: &[&str] = &[
    "youtube.com",
    "m.youtube.com",
    "youtu.be",
    "i.redd.it",
    "v.redd.it",
    "linkedin.com",
];

/// Result of one enrichment batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentReport {
    /// Content rows looked at.
    pub processed: usize,
    /// Rows marked enriched without searching.
    pub skipped: usize,
    /// Rows left for a later run after a transient search failure.
    pub deferred: usize,
    /// New discussions found, per source.
    pub found: BTreeMap<SourceType, usize>,
}

impl EnrichmentReport {
    pub fn total_found(&self) -> usize {
        self.found.values().sum()
    }
}

pub struct EnrichmentService {
    db: DbContext,
    searchers: Vec<Arc<dyn SearchableCollector>>,
}

impl EnrichmentService {
    pub fn new(db: DbContext, searchers: Vec<Arc<dyn SearchableCollector>>) -> Self {
        Self { db, searchers }
    }

    /// Enrich one batch of content rows, oldest first.
    pub async fn enrich(&self, batch_limit: usize) -> anyhow::Result<EnrichmentReport> {
        let batch = self.db.contents().unenriched(batch_limit).await?;
        let mut report = EnrichmentReport::default();
        if batch.is_empty() {
            info!("No content awaiting enrichment");
            return Ok(report);
        }

        for searcher in &self.searchers {
            searcher.begin_batch().await;
        }

        for content in &batch {
            report.processed += 1;

            if is_skipped_domain(content) {
                debug!("Not searching for {}", content.canonical_url);
                self.mark_enriched(content).await;
                report.skipped += 1;
                continue;
            }

            if self.search_all(content, &mut report).await {
                self.mark_enriched(content).await;
            } else {
                report.deferred += 1;
            }
        }

        info!(
            "Enrichment: {} processed, {} new discussions, {} deferred",
            report.processed,
            report.total_found(),
            report.deferred
        );
        Ok(report)
    }

    /// A failed write leaves the row for the next batch.
    async fn mark_enriched(&self, content: &Content) {
        if let Err(e) = self.db.contents().mark_enriched(content.id).await {
            warn!("Failed to mark {} enriched: {}", content.canonical_url, e);
        }
    }

    /// Run every search for one row. Returns `false` if any search hit a
    /// transient failure, so the row is retried on a later run.
    async fn search_all(&self, content: &Content, report: &mut EnrichmentReport) -> bool {
        let mut complete = true;

        for searcher in &self.searchers {
            let source_type = searcher.source_type();
            match searcher.search_by_url(&content.canonical_url).await {
                Ok(found) => {
                    *report.found.entry(source_type).or_insert(0) += found;
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        "{} search for {} will be retried: {}",
                        source_type, content.canonical_url, e
                    );
                    complete = false;
                }
                Err(e) => {
                    warn!(
                        "{} search for {} failed: {}",
                        source_type, content.canonical_url, e
                    );
                }
            }
        }

        complete
    }
}

fn is_skipped_domain(content: &Content) -> bool {
    content
        .domain
        .as_deref()
        .is_some_and(|domain| SKIP_DOMAINS.contains(&domain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::collectors::{CollectorError, HttpError, SourceAdapter};
    use crate::repository::test_support::setup_test_db;

    /// Records queried URLs and answers with a fixed result.
    struct FakeSearch {
        source_type: SourceType,
        status: Option<u16>,
        found: usize,
        queries: Mutex<Vec<String>>,
        batches: Mutex<usize>,
    }

    impl FakeSearch {
        fn finding(source_type: SourceType, found: usize) -> Arc<Self> {
            Arc::new(Self {
                source_type,
                status: None,
                found,
                queries: Mutex::new(Vec::new()),
                batches: Mutex::new(0),
            })
        }

        fn failing(source_type: SourceType, status: u16) -> Arc<Self> {
            Arc::new(Self {
                source_type,
                status: Some(status),
                found: 0,
                queries: Mutex::new(Vec::new()),
                batches: Mutex::new(0),
            })
        }
    }

    impl SourceAdapter for FakeSearch {
        fn source_type(&self) -> SourceType {
            self.source_type
        }
    }

    #[async_trait]
    impl SearchableCollector for FakeSearch {
        async fn begin_batch(&self) {
            *self.batches.lock().unwrap() += 1;
        }

        async fn search_by_url(&self, url: &str) -> crate::collectors::Result<usize> {
            self.queries.lock().unwrap().push(url.to_string());
            match self.status {
                Some(status) => Err(CollectorError::Http(HttpError::Status {
                    status,
                    url: url.to_string(),
                    retry_after: None,
                })),
                None => Ok(self.found),
            }
        }
    }

    #[tokio::test]
    async fn test_skip_domains_are_marked_without_search() {
        let (db, _dir) = setup_test_db().await;
        let id = db
            .contents()
            .ensure_content("https://youtu.be/abc123")
            .await
            .unwrap()
            .unwrap();
        let hn = FakeSearch::finding(SourceType::Hackernews, 1);

        let searchers: Vec<Arc<dyn SearchableCollector>> = vec![hn.clone()];
        let service = EnrichmentService::new(db.clone(), searchers);
        let report = service.enrich(10).await.unwrap();

        assert_eq!(report.skipped, 1);
        assert!(hn.queries.lock().unwrap().is_empty());
        assert!(db.contents().get(id).await.unwrap().unwrap().enriched_at.is_some());
    }

    #[tokio::test]
    async fn test_found_counts_per_source() {
        let (db, _dir) = setup_test_db().await;
        db.contents()
            .ensure_content("https://example.com/post")
            .await
            .unwrap();
        let hn = FakeSearch::finding(SourceType::Hackernews, 2);
        let lobsters = FakeSearch::finding(SourceType::Lobsters, 0);

        let searchers: Vec<Arc<dyn SearchableCollector>> = vec![hn.clone(), lobsters];
        let service = EnrichmentService::new(db.clone(), searchers);
        let report = service.enrich(10).await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.found.get(&SourceType::Hackernews), Some(&2));
        assert_eq!(report.found.get(&SourceType::Lobsters), Some(&0));
        assert_eq!(
            hn.queries.lock().unwrap().as_slice(),
            ["https://example.com/post".to_string()]
        );
        assert!(db.contents().unenriched(10).await.unwrap().is_empty());
        assert_eq!(*hn.batches.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_defers_row() {
        let (db, _dir) = setup_test_db().await;
        let id = db
            .contents()
            .ensure_content("https://example.com/throttled")
            .await
            .unwrap()
            .unwrap();
        let hn = FakeSearch::failing(SourceType::Hackernews, 429);
        let lobsters = FakeSearch::finding(SourceType::Lobsters, 1);

        let searchers: Vec<Arc<dyn SearchableCollector>> = vec![hn, lobsters.clone()];
        let service = EnrichmentService::new(db.clone(), searchers);
        let report = service.enrich(10).await.unwrap();

        assert_eq!(report.deferred, 1);
        assert_eq!(lobsters.queries.lock().unwrap().len(), 1);
        assert!(db.contents().get(id).await.unwrap().unwrap().enriched_at.is_none());
    }

    #[tokio::test]
    async fn test_permanent_failure_still_marks_enriched() {
        let (db, _dir) = setup_test_db().await;
        let id = db
            .contents()
            .ensure_content("https://example.com/forbidden")
            .await
            .unwrap()
            .unwrap();
        let hn = FakeSearch::failing(SourceType::Hackernews, 403);

        let searchers: Vec<Arc<dyn SearchableCollector>> = vec![hn];
        let service = EnrichmentService::new(db.clone(), searchers);
        let report = service.enrich(10).await.unwrap();

        assert_eq!(report.deferred, 0);
        assert!(db.contents().get(id).await.unwrap().unwrap().enriched_at.is_some());
    }
}
