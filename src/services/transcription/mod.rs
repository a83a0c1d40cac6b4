//! Video transcription:
//! `pending -> downloading -> transcribing -> completed | failed`.
//!
//! Rows left in `downloading` or `transcribing` by an interrupted run are
//! picked up again. A transcript already cached in bronze completes the row
//! without touching the network.

pub mod audio;
pub mod whisper;

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::models::TranscriptionStatus;
use crate::repository::{DbContext, DieselError, TranscriptionJob};
use crate::services::outcome::{BatchReport, ItemOutcome};
use crate::storage::{BronzeError, BronzeKey, BronzeStore};
use crate::utils::ToolError;

pub use audio::{check_audio_size, AudioError, AudioFetcher, YtDlpAudioFetcher};
pub use whisper::{SpeechToText, Transcript, WhisperCli, DEFAULT_WHISPER_MODEL};

/// Default ceiling on downloaded audio.
pub const DEFAULT_MAX_AUDIO_BYTES: u64 = 500 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Transcription I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid transcript: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Bronze(#[from] BronzeError),

    #[error("Database error: {0}")]
    Database(#[from] DieselError),
}

/// Bronze key of a cached transcript.
pub fn transcript_key(video_id: &str) -> BronzeKey {
    BronzeKey::item("youtube", video_id, "whisper", "json")
}

/// Bronze key of downloaded audio.
pub fn audio_key(video_id: &str) -> BronzeKey {
    BronzeKey::item("youtube", video_id, "audio", "opus")
}

/// Drives video content through transcription.
///
/// The speech-to-text engine is supplied by the caller and shared for the
/// life of the service.
pub struct TranscriptionService {
    db: DbContext,
    bronze: BronzeStore,
    audio: Arc<dyn AudioFetcher>,
    engine: Arc<dyn SpeechToText>,
    max_audio_bytes: u64,
}

impl TranscriptionService {
    pub fn new(
        db: DbContext,
        bronze: BronzeStore,
        audio: Arc<dyn AudioFetcher>,
        engine: Arc<dyn SpeechToText>,
    ) -> Self {
        Self {
            db,
            bronze,
            audio,
            engine,
            max_audio_bytes: DEFAULT_MAX_AUDIO_BYTES,
        }
    }

    pub fn with_max_audio_bytes(mut self, max_audio_bytes: u64) -> Self {
        self.max_audio_bytes = max_audio_bytes;
        self
    }

    /// Transcribe one batch, oldest first.
    pub async fn transcribe(&self, batch_limit: usize) -> anyhow::Result<BatchReport> {
        let jobs = self.db.contents().pending_transcriptions(batch_limit).await?;
        if jobs.is_empty() {
            info!("No videos awaiting transcription");
            return Ok(BatchReport::default());
        }

        let mut report = BatchReport::default();
        for job in &jobs {
            let outcome = match self.process(job).await {
                Ok(()) => ItemOutcome::Succeeded,
                Err(e) => {
                    let message = e.to_string();
                    warn!("Transcription failed for {}: {}", job.external_id, message);
                    if let Err(db_err) = self
                        .db
                        .contents()
                        .fail_transcription(job.content.id, &message)
                        .await
                    {
                        warn!("Could not record failure for {}: {}", job.external_id, db_err);
                    }
                    ItemOutcome::failed(message)
                }
            };
            report.record(&outcome);
        }

        info!("Transcription batch: {}", report);
        Ok(report)
    }

    async fn process(&self, job: &TranscriptionJob) -> Result<(), TranscriptionError> {
        let contents = self.db.contents();
        let id = job.content.id;
        let cached = transcript_key(&job.external_id);

        if self.bronze.exists(&cached) {
            match self.bronze.read_json::<Transcript>(&cached) {
                Ok(transcript) => {
                    info!("Using cached transcript for {}", job.external_id);
                    contents
                        .complete_transcription(
                            id,
                            &transcript.transcript,
                            transcript.language.as_deref(),
                        )
                        .await?;
                    return Ok(());
                }
                Err(e) => warn!(
                    "Ignoring unreadable cached transcript for {}: {}",
                    job.external_id, e
                ),
            }
        }

        contents
            .set_transcription_status(id, TranscriptionStatus::Downloading)
            .await?;
        let audio_path = self.bronze.prepare_dir(&audio_key(&job.external_id))?;
        if !audio_path.exists() {
            self.audio.fetch_audio(&job.external_id, &audio_path).await?;
        }
        check_audio_size(&audio_path, self.max_audio_bytes)?;

        contents
            .set_transcription_status(id, TranscriptionStatus::Transcribing)
            .await?;
        let transcript = self.engine.transcribe(&audio_path).await?;
        self.bronze.write_json(&cached, &transcript)?;

        contents
            .complete_transcription(id, &transcript.transcript, transcript.language.as_deref())
            .await?;
        info!(
            "Transcribed {} ({} chars)",
            job.external_id,
            transcript.transcript.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    use crate::models::{DiscussionDraft, SourceType};
    use crate::repository::test_support::setup_test_db;

    struct FakeAudio {
        size: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AudioFetcher for FakeAudio {
        async fn fetch_audio(&self, _video_id: &str, dest: &Path) -> Result<(), AudioError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::fs::write(dest, vec![1u8; self.size])?;
            Ok(())
        }
    }

    struct FakeEngine {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechToText for FakeEngine {
        async fn transcribe(&self, _audio: &Path) -> Result<Transcript, TranscriptionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Transcript {
                transcript: "hello from the video".to_string(),
                language: Some("en".to_string()),
                language_probability: Some(0.98),
            })
        }
    }

    struct Fixture {
        db: DbContext,
        bronze: BronzeStore,
        audio: Arc<FakeAudio>,
        engine: Arc<FakeEngine>,
        _dirs: (TempDir, TempDir),
    }

    impl Fixture {
        async fn new(audio_size: usize) -> Self {
            let (db, db_dir) = setup_test_db().await;
            let bronze_dir = tempfile::tempdir().unwrap();
            Self {
                db,
                bronze: BronzeStore::new(bronze_dir.path()),
                audio: Arc::new(FakeAudio {
                    size: audio_size,
                    calls: AtomicUsize::new(0),
                }),
                engine: Arc::new(FakeEngine {
                    calls: AtomicUsize::new(0),
                }),
                _dirs: (db_dir, bronze_dir),
            }
        }

        fn service(&self) -> TranscriptionService {
            TranscriptionService::new(
                self.db.clone(),
                self.bronze.clone(),
                self.audio.clone(),
                self.engine.clone(),
            )
        }

        /// A video content row linked to a youtube discussion.
        async fn video(&self, video_id: &str) -> i32 {
            let url = format!("https://www.youtube.com/watch?v={}", video_id);
            let content_id = self.db.contents().ensure_content(&url).await.unwrap().unwrap();
            let source_id = self
                .db
                .sources()
                .ensure(SourceType::Youtube, "channel", &json!({}))
                .await
                .unwrap();
            self.db
                .discussions()
                .upsert(
                    source_id,
                    Some(content_id),
                    SourceType::Youtube,
                    &DiscussionDraft::new(video_id),
                    &[],
                )
                .await
                .unwrap();
            self.db.contents().request_transcription(content_id).await.unwrap();
            content_id
        }
    }

    #[tokio::test]
    async fn test_full_path_caches_transcript() {
        let fx = Fixture::new(128).await;
        let id = fx.video("abc123").await;

        let report = fx.service().transcribe(10).await.unwrap();
        assert_eq!(report.succeeded, 1);

        let row = fx.db.contents().get(id).await.unwrap().unwrap();
        assert_eq!(row.transcription_status, Some(TranscriptionStatus::Completed));
        assert_eq!(row.body_text.as_deref(), Some("hello from the video"));
        assert_eq!(row.detected_language.as_deref(), Some("en"));

        let cached: Transcript = fx.bronze.read_json(&transcript_key("abc123")).unwrap();
        assert_eq!(cached.language_probability, Some(0.98));
        assert!(fx.bronze.exists(&audio_key("abc123")));
    }

    #[tokio::test]
    async fn test_interrupted_row_with_cache_skips_download() {
        let fx = Fixture::new(128).await;
        let id = fx.video("abc123").await;
        fx.db
            .contents()
            .set_transcription_status(id, TranscriptionStatus::Transcribing)
            .await
            .unwrap();
        fx.bronze
            .write_json(
                &transcript_key("abc123"),
                &Transcript {
                    transcript: "cached words".to_string(),
                    language: Some("de".to_string()),
                    language_probability: None,
                },
            )
            .unwrap();

        fx.service().transcribe(10).await.unwrap();

        assert_eq!(fx.audio.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.engine.calls.load(Ordering::SeqCst), 0);
        let row = fx.db.contents().get(id).await.unwrap().unwrap();
        assert_eq!(row.transcription_status, Some(TranscriptionStatus::Completed));
        assert_eq!(row.body_text.as_deref(), Some("cached words"));
        assert_eq!(row.detected_language.as_deref(), Some("de"));
    }

    #[tokio::test]
    async fn test_oversized_audio_fails_row() {
        let fx = Fixture::new(2048).await;
        let id = fx.video("big").await;

        let report = fx
            .service()
            .with_max_audio_bytes(1024)
            .transcribe(10)
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(fx.engine.calls.load(Ordering::SeqCst), 0);

        let row = fx.db.contents().get(id).await.unwrap().unwrap();
        assert_eq!(row.transcription_status, Some(TranscriptionStatus::Failed));
        assert!(row.transcription_error.unwrap().contains("over the 1024 byte limit"));

        // Failed rows are not picked up again.
        let again = fx.service().transcribe(10).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_failed_row_does_not_stop_the_batch() {
        let fx = Fixture::new(128).await;
        let first = fx.video("v1").await;
        let middle = fx.video("v2").await;
        let last = fx.video("v3").await;
        // Audio left over for the middle video is too large to transcribe.
        fx.bronze.write(&audio_key("v2"), &[0u8; 4096]).unwrap();

        let report = fx
            .service()
            .with_max_audio_bytes(1024)
            .transcribe(10)
            .await
            .unwrap();
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);

        for id in [first, last] {
            let row = fx.db.contents().get(id).await.unwrap().unwrap();
            assert_eq!(row.transcription_status, Some(TranscriptionStatus::Completed));
            assert_eq!(row.body_text.as_deref(), Some("hello from the video"));
        }
        let row = fx.db.contents().get(middle).await.unwrap().unwrap();
        assert_eq!(row.transcription_status, Some(TranscriptionStatus::Failed));
        assert_eq!(fx.engine.calls.load(Ordering::SeqCst), 2);
    }
}
