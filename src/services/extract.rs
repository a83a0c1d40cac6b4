//! Text extraction stage: `downloaded -> fetched | failed`.
//!
//! Rows are processed one at a time. The extractor runs on the blocking
//! pool under a wall-clock timeout so a pathological page cannot stall the
//! batch.

use std::sync::Arc;
use std::time::Duration;

use scraper::{Html, Node, Selector};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::models::{Content, FetchStatus};
use crate::repository::DbContext;
use crate::services::outcome::{BatchReport, ItemOutcome};
use crate::storage::BronzeStore;

/// Default wall-clock limit for one page.
pub const DEFAULT_EXTRACT_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Raw HTML missing: {0}")]
    MissingArtifact(String),

    #[error("Extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("Extraction failed: {0}")]
    Failed(String),
}

/// Turns a page into its main readable text.
pub trait TextExtractor: Send + Sync {
    /// `Ok(None)` means the page had no extractable text.
    fn extract(&self, html: &str, url: &str) -> Result<Option<String>, ExtractError>;
}

/// Readable text from `article`, `main` or `body`, one block per line.
#[derive(Debug, Clone, Default)]
pub struct HtmlTextExtractor;

const ROOT_SELECTORS: &[&str] = &["article", "main", "body"];
const BLOCK_SELECTOR: &str = "h1, h2, h3, h4, h5, h6, p, li, pre, blockquote";
const IGNORED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

impl TextExtractor for HtmlTextExtractor {
    fn extract(&self, html: &str, _url: &str) -> Result<Option<String>, ExtractError> {
        let document = Html::parse_document(html);
        let blocks = Selector::parse(BLOCK_SELECTOR)
            .map_err(|e| ExtractError::Failed(e.to_string()))?;

        for root_selector in ROOT_SELECTORS {
            let selector = Selector::parse(root_selector)
                .map_err(|e| ExtractError::Failed(e.to_string()))?;
            let Some(root) = document.select(&selector).next() else {
                continue;
            };

            let paragraphs: Vec<String> = root
                .select(&blocks)
                .map(|el| normalize_whitespace(&el.text().collect::<String>()))
                .filter(|t| !t.is_empty())
                .collect();
            if !paragraphs.is_empty() {
                return Ok(Some(paragraphs.join("\n\n")));
            }

            // No block elements: take every visible text node under the root.
            let text: Vec<&str> = root
                .descendants()
                .filter_map(|node| {
                    let text = node.value().as_text()?;
                    let parent = node.parent()?;
                    match parent.value() {
                        Node::Element(el) if IGNORED_ELEMENTS.contains(&el.name()) => None,
                        _ => Some(&**text),
                    }
                })
                .collect();
            let text = normalize_whitespace(&text.join(" "));
            return Ok((!text.is_empty()).then_some(text));
        }

        Ok(None)
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Best-effort page title: `og:title`, then `<title>`.
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    if let Ok(selector) = Selector::parse(r#"meta[property="og:title"]"#) {
        let og = document
            .select(&selector)
            .filter_map(|el| el.value().attr("content"))
            .map(normalize_whitespace)
            .find(|t| !t.is_empty());
        if og.is_some() {
            return og;
        }
    }

    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

/// Service for extracting text from downloaded content.
pub struct ExtractService {
    db: DbContext,
    bronze: BronzeStore,
    extractor: Arc<dyn TextExtractor>,
    timeout: Duration,
}

impl ExtractService {
    pub fn new(db: DbContext, bronze: BronzeStore, extractor: Arc<dyn TextExtractor>) -> Self {
        Self {
            db,
            bronze,
            extractor,
            timeout: DEFAULT_EXTRACT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Extract one batch of downloaded rows, oldest first.
    pub async fn extract(&self, batch_limit: usize) -> anyhow::Result<BatchReport> {
        let batch = self
            .db
            .contents()
            .by_fetch_status(FetchStatus::Downloaded, batch_limit)
            .await?;
        if batch.is_empty() {
            info!("No content awaiting extraction");
            return Ok(BatchReport::default());
        }

        let mut report = BatchReport::default();
        for content in &batch {
            let outcome = self.extract_one(content).await;
            report.record(&outcome);
        }

        info!("Extract batch: {}", report);
        Ok(report)
    }

    async fn extract_one(&self, content: &Content) -> ItemOutcome {
        let contents = self.db.contents();

        let transition = match self.run_extractor(content).await {
            Ok((text, title)) => {
                debug!(
                    "Extracted {} chars from {}",
                    text.as_ref().map_or(0, |t| t.len()),
                    content.canonical_url
                );
                contents
                    .mark_fetched(content.id, text.as_deref(), title.as_deref())
                    .await
                    .map(|moved| (moved, ItemOutcome::Succeeded))
            }
            Err(e) => {
                let message = e.to_string();
                warn!("{}: {}", content.canonical_url, message);
                contents
                    .mark_extract_failed(content.id, &message)
                    .await
                    .map(|moved| (moved, ItemOutcome::failed(message)))
            }
        };

        match transition {
            Ok((true, outcome)) => outcome,
            Ok((false, _)) => ItemOutcome::skipped("no longer downloaded"),
            Err(e) => {
                error!(
                    "Could not record extraction for {}: {}",
                    content.canonical_url,
                    e
                );
                ItemOutcome::failed(e.to_string())
            }
        }
    }

    async fn run_extractor(
        &self,
        content: &Content,
    ) -> Result<(Option<String>, Option<String>), ExtractError> {
        let reference = content
            .raw_html_ref
            .as_deref()
            .ok_or_else(|| ExtractError::MissingArtifact("no reference recorded".to_string()))?;
        let path = self.bronze.resolve(reference);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ExtractError::MissingArtifact(format!("{}: {}", reference, e)))?;
        let html = String::from_utf8_lossy(&bytes).into_owned();

        let extractor = self.extractor.clone();
        let url = content.canonical_url.clone();
        let task = tokio::task::spawn_blocking(move || -> Result<_, ExtractError> {
            let text = extractor
                .extract(&html, &url)?
                .filter(|t| !t.trim().is_empty());
            Ok((text, extract_title(&html)))
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ExtractError::Failed(join_error.to_string())),
            Err(_) => Err(ExtractError::Timeout(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::repository::test_support::setup_test_db;
    use crate::services::download::response_key;

    const PAGE: &str = r#"<html>
<head>
  <title>Fallback title</title>
  <meta property="og:title" content="  The real   title ">
  <script>var tracking = 1;</script>
</head>
<body>
  <nav><a href="/">Home</a></nav>
  <article>
    <h1>Heading</h1>
    <p>First   paragraph.</p>
    <p>Second paragraph.</p>
  </article>
</body>
</html>"#;

    struct SlowExtractor;

    impl TextExtractor for SlowExtractor {
        fn extract(&self, _html: &str, _url: &str) -> Result<Option<String>, ExtractError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Some("late".to_string()))
        }
    }

    struct FailingExtractor;

    impl TextExtractor for FailingExtractor {
        fn extract(&self, _html: &str, _url: &str) -> Result<Option<String>, ExtractError> {
            Err(ExtractError::Failed("parser exploded".to_string()))
        }
    }

    /// A content row already in `downloaded` with `html` stored in bronze.
    async fn downloaded_row(db: &DbContext, bronze: &BronzeStore, url: &str, html: &str) -> i32 {
        let id = db.contents().ensure_content(url).await.unwrap().unwrap();
        let canonical = db.contents().get(id).await.unwrap().unwrap().canonical_url;
        let key = response_key(&canonical);
        bronze.write(&key, html.as_bytes()).unwrap();
        assert!(db
            .contents()
            .mark_downloaded(id, &bronze.relative_path(&key))
            .await
            .unwrap());
        id
    }

    async fn setup() -> (DbContext, BronzeStore, TempDir, TempDir) {
        let (db, db_dir) = setup_test_db().await;
        let bronze_dir = tempfile::tempdir().unwrap();
        let bronze = BronzeStore::new(bronze_dir.path());
        (db, bronze, db_dir, bronze_dir)
    }

    #[test]
    fn test_html_extractor_prefers_article_blocks() {
        let text = HtmlTextExtractor.extract(PAGE, "https://example.com").unwrap();
        assert_eq!(
            text.as_deref(),
            Some("Heading\n\nFirst paragraph.\n\nSecond paragraph.")
        );
    }

    #[test]
    fn test_html_extractor_skips_scripts_in_fallback() {
        let html = "<html><body><div>Just text</div><script>alert(1)</script></body></html>";
        let text = HtmlTextExtractor.extract(html, "https://example.com").unwrap();
        assert_eq!(text.as_deref(), Some("Just text"));
    }

    #[test]
    fn test_extract_title_prefers_og() {
        assert_eq!(extract_title(PAGE).as_deref(), Some("The real title"));
        assert_eq!(
            extract_title("<html><head><title> Plain </title></head></html>").as_deref(),
            Some("Plain")
        );
        assert_eq!(extract_title("<p>none</p>"), None);
    }

    #[tokio::test]
    async fn test_extract_stores_text_and_title() {
        let (db, bronze, _d, _b) = setup().await;
        let id = downloaded_row(&db, &bronze, "https://example.com/post", PAGE).await;

        let service = ExtractService::new(db.clone(), bronze, Arc::new(HtmlTextExtractor));
        let report = service.extract(10).await.unwrap();
        assert_eq!(report.succeeded, 1);

        let row = db.contents().get(id).await.unwrap().unwrap();
        assert_eq!(row.fetch_status, FetchStatus::Fetched);
        assert_eq!(row.title.as_deref(), Some("The real title"));
        assert!(row.body_text.unwrap().contains("Second paragraph."));
    }

    #[tokio::test]
    async fn test_empty_text_is_fetched_with_null_body() {
        let (db, bronze, _d, _b) = setup().await;
        let id = downloaded_row(&db, &bronze, "https://example.com/empty", "<html></html>").await;

        let service = ExtractService::new(db.clone(), bronze, Arc::new(HtmlTextExtractor));
        service.extract(10).await.unwrap();

        let row = db.contents().get(id).await.unwrap().unwrap();
        assert_eq!(row.fetch_status, FetchStatus::Fetched);
        assert!(row.body_text.is_none());
    }

    #[tokio::test]
    async fn test_failures_are_recorded_per_row() {
        let (db, bronze, _d, _b) = setup().await;
        let missing = db
            .contents()
            .ensure_content("https://example.com/missing")
            .await
            .unwrap()
            .unwrap();
        db.contents()
            .mark_downloaded(missing, "content/0000000000000000/response.html")
            .await
            .unwrap();
        let broken = downloaded_row(&db, &bronze, "https://example.com/broken", PAGE).await;

        let service = ExtractService::new(db.clone(), bronze, Arc::new(FailingExtractor));
        let report = service.extract(10).await.unwrap();
        assert_eq!(report.failed, 2);

        let row = db.contents().get(missing).await.unwrap().unwrap();
        assert_eq!(row.fetch_status, FetchStatus::Failed);
        assert!(row.fetch_error.unwrap().starts_with("Raw HTML missing"));

        let row = db.contents().get(broken).await.unwrap().unwrap();
        assert_eq!(row.fetch_error.as_deref(), Some("Extraction failed: parser exploded"));
    }

    #[tokio::test]
    async fn test_timeout_marks_failed() {
        let (db, bronze, _d, _b) = setup().await;
        let id = downloaded_row(&db, &bronze, "https://example.com/slow", PAGE).await;

        let service = ExtractService::new(db.clone(), bronze, Arc::new(SlowExtractor))
            .with_timeout(Duration::from_millis(20));
        let report = service.extract(10).await.unwrap();
        assert_eq!(report.failed, 1);

        let row = db.contents().get(id).await.unwrap().unwrap();
        assert_eq!(row.fetch_status, FetchStatus::Failed);
        assert!(row.fetch_error.unwrap().contains("timed out"));
    }
}
