//! Pipeline Tests
//!
//! Drives content through identity resolution and every stage against a
//! temporary database and bronze store, with the network replaced by fakes.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use aggre::collectors::http_client::{FetchedPage, HttpClientOptions, PageFetcher};
use aggre::collectors::{HttpClient, HttpError, Ingest, SearchableCollector, SourceAdapter};
use aggre::models::{
    CommentsStatus, DiscussionDraft, DiscussionField, FetchStatus, SourceType, TranscriptionStatus,
};
use aggre::repository::DbContext;
use aggre::services::transcription::{transcript_key, AudioError};
use aggre::services::{
    AudioFetcher, DownloadConfig, DownloadService, EnrichmentService, ExtractService,
    HtmlTextExtractor, SpeechToText, Transcript, TranscriptionError, TranscriptionService,
};
use aggre::storage::BronzeStore;
use aggre::utils::canonicalize;

struct Workspace {
    ingest: Ingest,
    _dirs: (TempDir, TempDir),
}

impl Workspace {
    async fn new() -> Self {
        let db_dir = tempfile::tempdir().unwrap();
        let bronze_dir = tempfile::tempdir().unwrap();
        let db = DbContext::from_path(&db_dir.path().join("aggre.db"));
        db.init_schema().await.unwrap();
        let http = HttpClient::new(&HttpClientOptions::default()).unwrap();
        Self {
            ingest: Ingest::new(db, BronzeStore::new(bronze_dir.path()), http),
            _dirs: (db_dir, bronze_dir),
        }
    }

    fn db(&self) -> &DbContext {
        self.ingest.db()
    }

    fn bronze(&self) -> &BronzeStore {
        self.ingest.bronze()
    }
}

/// Serves a fixed article for every URL and counts requests.
struct ArticleFetcher {
    calls: AtomicUsize,
}

impl ArticleFetcher {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PageFetcher for ArticleFetcher {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, HttpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let html = "<html><head><title>Local-first software</title></head>\
            <body><article><h1>Local-first software</h1>\
            <p>You own your data, in spite of the cloud.</p></article></body></html>";
        Ok(FetchedPage {
            url: url.to_string(),
            content_type: Some("text/html; charset=utf-8".to_string()),
            body: html.as_bytes().to_vec(),
        })
    }
}

struct OneHitSearch {
    queries: AtomicUsize,
}

impl SourceAdapter for OneHitSearch {
    fn source_type(&self) -> SourceType {
        SourceType::Lobsters
    }
}

#[async_trait]
impl SearchableCollector for OneHitSearch {
    async fn search_by_url(&self, _url: &str) -> aggre::collectors::Result<usize> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(1)
    }
}

struct NoAudio;

#[async_trait]
impl AudioFetcher for NoAudio {
    async fn fetch_audio(&self, video_id: &str, _dest: &Path) -> Result<(), AudioError> {
        panic!("audio for {} should not be downloaded", video_id);
    }
}

struct NoSpeech;

#[async_trait]
impl SpeechToText for NoSpeech {
    async fn transcribe(&self, audio: &Path) -> Result<Transcript, TranscriptionError> {
        panic!("{} should not be transcribed", audio.display());
    }
}

const HN_MUTABLE: &[DiscussionField] = &[DiscussionField::Title, DiscussionField::Score];

fn story(id: &str, score: i32) -> DiscussionDraft {
    DiscussionDraft {
        title: Some("Local-first software".to_string()),
        url: Some("https://www.inkandswitch.com/local-first/".to_string()),
        score: Some(score),
        comments_status: Some(CommentsStatus::Pending),
        ..DiscussionDraft::new(id)
    }
}

#[test]
fn test_canonical_form_of_messy_url() {
    assert_eq!(
        canonicalize("HTTP://WWW.Example.COM/Page/?utm_source=x&id=7").as_deref(),
        Some("https://example.com/page?id=7")
    );
}

#[tokio::test]
async fn test_resighted_story_updates_in_place() {
    let ws = Workspace::new().await;
    let source_id = ws
        .ingest
        .ensure_source(SourceType::Hackernews, "Hacker News", &json!({}))
        .await
        .unwrap();
    let link = Some("https://www.inkandswitch.com/local-first/");

    let first = ws
        .ingest
        .store_discussion(source_id, SourceType::Hackernews, link, &story("19249312", 10), HN_MUTABLE)
        .await
        .unwrap();
    let second = ws
        .ingest
        .store_discussion(source_id, SourceType::Hackernews, link, &story("19249312", 250), HN_MUTABLE)
        .await
        .unwrap();

    assert!(first.is_new());
    assert!(!second.is_new());
    assert_eq!(first.outcome.id(), second.outcome.id());
    assert_eq!(first.content_id, second.content_id);

    let row = ws.db().discussions().get(first.outcome.id()).await.unwrap().unwrap();
    assert_eq!(row.score, Some(250));
    assert_eq!(ws.db().discussions().count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_sightings_share_one_identity() {
    let ws = Workspace::new().await;
    let source_id = ws
        .ingest
        .ensure_source(SourceType::Hackernews, "Hacker News", &json!({}))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let ingest = ws.ingest.clone();
        handles.push(tokio::spawn(async move {
            let link = format!("https://www.example.com/a/?utm_source={}", i);
            let draft = story("42", i);
            ingest
                .store_discussion(source_id, SourceType::Hackernews, Some(&link), &draft, HN_MUTABLE)
                .await
        }));
    }

    let mut stored = Vec::new();
    for handle in handles {
        stored.push(handle.await.unwrap().unwrap());
    }

    let content_id = stored[0].content_id;
    assert!(content_id.is_some());
    assert!(stored.iter().all(|s| s.content_id == content_id));
    assert!(stored.iter().all(|s| s.outcome.id() == stored[0].outcome.id()));
    assert_eq!(stored.iter().filter(|s| s.is_new()).count(), 1);
    assert_eq!(ws.db().contents().count().await.unwrap(), 1);
    assert_eq!(ws.db().discussions().count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_video_link_forms_share_content() {
    let ws = Workspace::new().await;
    let short = ws.ingest.ensure_content("https://youtu.be/abc123").await.unwrap();
    let long = ws
        .ingest
        .ensure_content("https://www.youtube.com/watch?v=abc123&list=xyz")
        .await
        .unwrap();

    assert!(short.is_some());
    assert_eq!(short, long);
    assert_eq!(ws.db().contents().count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_pdf_skipped_without_network() {
    let ws = Workspace::new().await;
    let id = ws
        .ingest
        .ensure_content("https://arxiv.org/pdf/2401.00001.pdf")
        .await
        .unwrap()
        .unwrap();
    let fetcher = ArticleFetcher::new();

    let service = DownloadService::new(ws.db().clone(), ws.bronze().clone(), fetcher.clone());
    let result = service.download(DownloadConfig::default(), None).await.unwrap();

    assert_eq!(result.report.skipped, 1);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    let row = ws.db().contents().get(id).await.unwrap().unwrap();
    assert_eq!(row.fetch_status, FetchStatus::Skipped);
}

#[tokio::test]
async fn test_story_flows_through_download_extract_and_enrich() {
    let ws = Workspace::new().await;
    let source_id = ws
        .ingest
        .ensure_source(SourceType::Hackernews, "Hacker News", &json!({}))
        .await
        .unwrap();
    let stored = ws
        .ingest
        .store_discussion(
            source_id,
            SourceType::Hackernews,
            Some("https://www.inkandswitch.com/local-first/"),
            &story("19249312", 10),
            HN_MUTABLE,
        )
        .await
        .unwrap();
    let content_id = stored.content_id.unwrap();

    let fetcher = ArticleFetcher::new();
    let download = DownloadService::new(ws.db().clone(), ws.bronze().clone(), fetcher.clone());
    let result = download.download(DownloadConfig::default(), None).await.unwrap();
    assert_eq!(result.report.succeeded, 1);
    assert_eq!(result.remaining, 0);

    let extract = ExtractService::new(
        ws.db().clone(),
        ws.bronze().clone(),
        Arc::new(HtmlTextExtractor),
    );
    let report = extract.extract(10).await.unwrap();
    assert_eq!(report.succeeded, 1);

    let row = ws.db().contents().get(content_id).await.unwrap().unwrap();
    assert_eq!(row.fetch_status, FetchStatus::Fetched);
    assert_eq!(row.title.as_deref(), Some("Local-first software"));
    assert!(row
        .body_text
        .unwrap()
        .contains("You own your data, in spite of the cloud."));

    let search = Arc::new(OneHitSearch {
        queries: AtomicUsize::new(0),
    });
    let searchers: Vec<Arc<dyn SearchableCollector>> = vec![search.clone()];
    let enrich = EnrichmentService::new(ws.db().clone(), searchers);
    let report = enrich.enrich(10).await.unwrap();
    assert_eq!(report.found.get(&SourceType::Lobsters), Some(&1));
    assert_eq!(search.queries.load(Ordering::SeqCst), 1);

    // Nothing left for any stage.
    assert!(download
        .download(DownloadConfig::default(), None)
        .await
        .unwrap()
        .report
        .is_empty());
    assert!(extract.extract(10).await.unwrap().is_empty());
    assert_eq!(enrich.enrich(10).await.unwrap().processed, 0);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_crashed_transcription_resumes_from_cache() {
    let ws = Workspace::new().await;
    let source_id = ws
        .ingest
        .ensure_source(SourceType::Youtube, "Talks", &json!({"channel_id": "UC123"}))
        .await
        .unwrap();
    let stored = ws
        .ingest
        .store_discussion(
            source_id,
            SourceType::Youtube,
            Some("https://www.youtube.com/watch?v=abc123"),
            &DiscussionDraft {
                title: Some("A talk".to_string()),
                ..DiscussionDraft::new("abc123")
            },
            &[],
        )
        .await
        .unwrap();
    let content_id = stored.content_id.unwrap();
    let contents = ws.db().contents();
    contents.request_transcription(content_id).await.unwrap();
    contents
        .set_transcription_status(content_id, TranscriptionStatus::Transcribing)
        .await
        .unwrap();
    ws.bronze()
        .write_json(
            &transcript_key("abc123"),
            &Transcript {
                transcript: "welcome to the talk".to_string(),
                language: Some("en".to_string()),
                language_probability: Some(0.99),
            },
        )
        .unwrap();

    let service = TranscriptionService::new(
        ws.db().clone(),
        ws.bronze().clone(),
        Arc::new(NoAudio),
        Arc::new(NoSpeech),
    );
    let report = service.transcribe(10).await.unwrap();
    assert_eq!(report.succeeded, 1);

    let row = contents.get(content_id).await.unwrap().unwrap();
    assert_eq!(row.transcription_status, Some(TranscriptionStatus::Completed));
    assert_eq!(row.body_text.as_deref(), Some("welcome to the talk"));
    assert_eq!(row.detected_language.as_deref(), Some("en"));
}
