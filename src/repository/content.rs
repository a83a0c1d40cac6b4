//! Content repository and identity resolver.
//!
//! Status transitions are guarded by the expected predecessor state in the
//! `WHERE` clause, so a row can never skip a lifecycle step even when two
//! stages race on it. Each transition is a single statement.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::debug;

use super::models::{ContentRecord, NewContent};
use super::pool::{AsyncSqliteConnection, AsyncSqlitePool, DieselError};
use super::util::{now_rfc3339, unknown_value};
use super::{parse_datetime, parse_datetime_opt};
use crate::models::{Content, FetchStatus, SourceType, TranscriptionStatus};
use crate::schema::{contents, discussions};
use crate::utils::urls::{canonicalize, extract_domain};

impl TryFrom<ContentRecord> for Content {
    type Error = DieselError;

    fn try_from(record: ContentRecord) -> Result<Self, Self::Error> {
        let fetch_status = FetchStatus::from_str(&record.fetch_status)
            .ok_or_else(|| unknown_value("fetch_status", &record.fetch_status))?;
        let transcription_status = match record.transcription_status.as_deref() {
            Some(s) => Some(
                TranscriptionStatus::from_str(s)
                    .ok_or_else(|| unknown_value("transcription_status", s))?,
            ),
            None => None,
        };
        Ok(Content {
            id: record.id,
            canonical_url: record.canonical_url,
            domain: record.domain,
            title: record.title,
            body_text: record.body_text,
            raw_html_ref: record.raw_html_ref,
            fetch_status,
            fetch_error: record.fetch_error,
            fetched_at: parse_datetime_opt(record.fetched_at),
            created_at: parse_datetime(&record.created_at),
            transcription_status,
            transcription_error: record.transcription_error,
            detected_language: record.detected_language,
            enriched_at: parse_datetime_opt(record.enriched_at),
        })
    }
}

/// A content row due for transcription, with the video id it came from.
#[derive(Debug, Clone)]
pub struct TranscriptionJob {
    pub content: Content,
    pub external_id: String,
}

/// Diesel-based content repository.
#[derive(Clone)]
pub struct ContentRepository {
    pool: AsyncSqlitePool,
}

impl ContentRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Resolve a raw URL to the id of its canonical content row.
    ///
    /// Returns `None` when the URL cannot be canonicalized. Concurrent
    /// callers racing on the same canonical URL all get the id of the one
    /// row the unique constraint lets through.
    pub async fn ensure_content(&self, raw_url: &str) -> Result<Option<i32>, DieselError> {
        let Some(canonical) = canonicalize(raw_url) else {
            debug!("Rejected URL for content identity: {:?}", raw_url);
            return Ok(None);
        };

        let mut conn = self.pool.get().await?;

        if let Some(id) = Self::find_id(&mut conn, &canonical).await? {
            return Ok(Some(id));
        }

        let domain = extract_domain(&canonical);
        let created_at = now_rfc3339();
        let inserted = diesel::insert_into(contents::table)
            .values(&NewContent {
                canonical_url: &canonical,
                domain: domain.as_deref(),
                fetch_status: FetchStatus::Pending.as_str(),
                created_at: &created_at,
            })
            .on_conflict(contents::canonical_url)
            .do_nothing()
            .execute(&mut conn)
            .await?;

        if inserted == 0 {
            debug!("Lost insert race for {}, re-reading", canonical);
        }

        Self::find_id(&mut conn, &canonical).await
    }

    async fn find_id(
        conn: &mut AsyncSqliteConnection,
        canonical_url: &str,
    ) -> Result<Option<i32>, DieselError> {
        contents::table
            .filter(contents::canonical_url.eq(canonical_url))
            .select(contents::id)
            .first::<i32>(conn)
            .await
            .optional()
    }

    /// Get content by ID.
    pub async fn get(&self, id: i32) -> Result<Option<Content>, DieselError> {
        let mut conn = self.pool.get().await?;

        contents::table
            .find(id)
            .select(ContentRecord::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .map(Content::try_from)
            .transpose()
    }

    /// Get content by its canonical URL.
    pub async fn get_by_canonical_url(&self, url: &str) -> Result<Option<Content>, DieselError> {
        let mut conn = self.pool.get().await?;

        contents::table
            .filter(contents::canonical_url.eq(url))
            .select(ContentRecord::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .map(Content::try_from)
            .transpose()
    }

    /// Oldest rows in the given fetch state.
    pub async fn by_fetch_status(
        &self,
        status: FetchStatus,
        limit: usize,
    ) -> Result<Vec<Content>, DieselError> {
        let mut conn = self.pool.get().await?;

        contents::table
            .filter(contents::fetch_status.eq(status.as_str()))
            .order((contents::created_at.asc(), contents::id.asc()))
            .limit(limit as i64)
            .select(ContentRecord::as_select())
            .load(&mut conn)
            .await?
            .into_iter()
            .map(Content::try_from)
            .collect()
    }

    /// Oldest rows that have never been enriched.
    pub async fn unenriched(&self, limit: usize) -> Result<Vec<Content>, DieselError> {
        let mut conn = self.pool.get().await?;

        contents::table
            .filter(contents::enriched_at.is_null())
            .order((contents::created_at.asc(), contents::id.asc()))
            .limit(limit as i64)
            .select(ContentRecord::as_select())
            .load(&mut conn)
            .await?
            .into_iter()
            .map(Content::try_from)
            .collect()
    }

    /// Move a fetch status forward if the row is still in `from`.
    ///
    /// Returns `false` if the row was not in the expected state.
    async fn transition_fetch(
        &self,
        id: i32,
        from: FetchStatus,
        to: FetchStatus,
        error: Option<&str>,
    ) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;
        let now = now_rfc3339();

        let rows = diesel::update(
            contents::table
                .filter(contents::id.eq(id))
                .filter(contents::fetch_status.eq(from.as_str())),
        )
        .set((
            contents::fetch_status.eq(to.as_str()),
            contents::fetch_error.eq(error),
            contents::fetched_at.eq(Some(now.as_str())),
        ))
        .execute(&mut conn)
        .await?;

        Ok(rows > 0)
    }

    /// `pending -> downloaded`, recording where the raw body lives.
    pub async fn mark_downloaded(&self, id: i32, raw_html_ref: &str) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;
        let now = now_rfc3339();

        let rows = diesel::update(
            contents::table
                .filter(contents::id.eq(id))
                .filter(contents::fetch_status.eq(FetchStatus::Pending.as_str())),
        )
        .set((
            contents::fetch_status.eq(FetchStatus::Downloaded.as_str()),
            contents::fetch_error.eq(None::<String>),
            contents::raw_html_ref.eq(Some(raw_html_ref)),
            contents::fetched_at.eq(Some(now.as_str())),
        ))
        .execute(&mut conn)
        .await?;

        Ok(rows > 0)
    }

    /// `pending -> skipped` with a short reason.
    pub async fn mark_skipped(&self, id: i32, reason: &str) -> Result<bool, DieselError> {
        self.transition_fetch(id, FetchStatus::Pending, FetchStatus::Skipped, Some(reason))
            .await
    }

    /// `pending -> failed` from the download stage.
    pub async fn mark_download_failed(&self, id: i32, error: &str) -> Result<bool, DieselError> {
        self.transition_fetch(id, FetchStatus::Pending, FetchStatus::Failed, Some(error))
            .await
    }

    /// `downloaded -> failed` from the extract stage.
    pub async fn mark_extract_failed(&self, id: i32, error: &str) -> Result<bool, DieselError> {
        self.transition_fetch(id, FetchStatus::Downloaded, FetchStatus::Failed, Some(error))
            .await
    }

    /// `downloaded -> fetched` with the extracted text and title.
    ///
    /// An existing title is kept when extraction finds none.
    pub async fn mark_fetched(
        &self,
        id: i32,
        body_text: Option<&str>,
        title: Option<&str>,
    ) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;
        let target = contents::table
            .filter(contents::id.eq(id))
            .filter(contents::fetch_status.eq(FetchStatus::Downloaded.as_str()));

        let rows = match title {
            Some(title) => {
                diesel::update(target)
                    .set((
                        contents::fetch_status.eq(FetchStatus::Fetched.as_str()),
                        contents::fetch_error.eq(None::<String>),
                        contents::body_text.eq(body_text),
                        contents::title.eq(Some(title)),
                    ))
                    .execute(&mut conn)
                    .await?
            }
            None => {
                diesel::update(target)
                    .set((
                        contents::fetch_status.eq(FetchStatus::Fetched.as_str()),
                        contents::fetch_error.eq(None::<String>),
                        contents::body_text.eq(body_text),
                    ))
                    .execute(&mut conn)
                    .await?
            }
        };

        Ok(rows > 0)
    }

    /// Seed `body_text` from an adapter's inline summary if nothing is there yet.
    pub async fn set_body_text_if_empty(&self, id: i32, text: &str) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;

        let rows = diesel::update(
            contents::table
                .filter(contents::id.eq(id))
                .filter(contents::body_text.is_null()),
        )
        .set(contents::body_text.eq(Some(text)))
        .execute(&mut conn)
        .await?;

        Ok(rows > 0)
    }

    pub async fn mark_enriched(&self, id: i32) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let now = now_rfc3339();

        diesel::update(contents::table.find(id))
            .set(contents::enriched_at.eq(Some(now.as_str())))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Enter the transcription lifecycle if the row has not entered it yet.
    pub async fn request_transcription(&self, id: i32) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;

        let rows = diesel::update(
            contents::table
                .filter(contents::id.eq(id))
                .filter(contents::transcription_status.is_null()),
        )
        .set(contents::transcription_status.eq(Some(TranscriptionStatus::Pending.as_str())))
        .execute(&mut conn)
        .await?;

        Ok(rows > 0)
    }

    /// Oldest video content whose transcription is pending or was interrupted.
    pub async fn pending_transcriptions(
        &self,
        limit: usize,
    ) -> Result<Vec<TranscriptionJob>, DieselError> {
        let mut conn = self.pool.get().await?;
        let resumable: Vec<&str> = TranscriptionStatus::RESUMABLE
            .iter()
            .map(|s| s.as_str())
            .collect();

        let rows: Vec<(ContentRecord, String)> = contents::table
            .inner_join(
                discussions::table.on(discussions::content_id.eq(contents::id.nullable())),
            )
            .filter(discussions::source_type.eq(SourceType::Youtube.as_str()))
            .filter(contents::transcription_status.eq_any(resumable))
            .order((contents::created_at.asc(), contents::id.asc()))
            .limit(limit as i64)
            .select((ContentRecord::as_select(), discussions::external_id))
            .load(&mut conn)
            .await?;

        rows.into_iter()
            .map(|(record, external_id)| {
                Ok(TranscriptionJob {
                    content: Content::try_from(record)?,
                    external_id,
                })
            })
            .collect()
    }

    /// Set a non-terminal transcription state.
    pub async fn set_transcription_status(
        &self,
        id: i32,
        status: TranscriptionStatus,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;

        diesel::update(contents::table.find(id))
            .set((
                contents::transcription_status.eq(Some(status.as_str())),
                contents::transcription_error.eq(None::<String>),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Finish a transcription, storing the transcript as the body text.
    pub async fn complete_transcription(
        &self,
        id: i32,
        transcript: &str,
        language: Option<&str>,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;

        diesel::update(contents::table.find(id))
            .set((
                contents::transcription_status.eq(Some(TranscriptionStatus::Completed.as_str())),
                contents::transcription_error.eq(None::<String>),
                contents::body_text.eq(Some(transcript)),
                contents::detected_language.eq(language),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    pub async fn fail_transcription(&self, id: i32, error: &str) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;

        diesel::update(contents::table.find(id))
            .set((
                contents::transcription_status.eq(Some(TranscriptionStatus::Failed.as_str())),
                contents::transcription_error.eq(Some(error)),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Row counts per fetch status.
    pub async fn count_by_fetch_status(&self) -> Result<Vec<(String, i64)>, DieselError> {
        let mut conn = self.pool.get().await?;

        contents::table
            .group_by(contents::fetch_status)
            .select((contents::fetch_status, diesel::dsl::count_star()))
            .order(contents::fetch_status.asc())
            .load(&mut conn)
            .await
    }

    pub async fn count(&self) -> Result<i64, DieselError> {
        let mut conn = self.pool.get().await?;
        contents::table.count().get_result(&mut conn).await
    }
}

#[cfg(test)]
mod tests {
    use crate::models::{FetchStatus, TranscriptionStatus};
    use crate::repository::test_support::setup_test_db;

    #[tokio::test]
    async fn test_ensure_content_dedups_variants() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.contents();

        let a = repo.ensure_content("https://www.example.com/a/").await.unwrap();
        let b = repo.ensure_content("http://example.com/a").await.unwrap();
        let c = repo
            .ensure_content("https://example.com/a?utm_source=x")
            .await
            .unwrap();

        assert!(a.is_some());
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(repo.count().await.unwrap(), 1);

        let content = repo.get(a.unwrap()).await.unwrap().unwrap();
        assert_eq!(content.canonical_url, "https://example.com/a");
        assert_eq!(content.domain.as_deref(), Some("example.com"));
        assert_eq!(content.fetch_status, FetchStatus::Pending);
        assert!(content.transcription_status.is_none());
    }

    #[tokio::test]
    async fn test_ensure_content_rejects_bad_urls() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.contents();

        assert_eq!(repo.ensure_content("").await.unwrap(), None);
        assert_eq!(repo.ensure_content("ftp://x.org/f").await.unwrap(), None);
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fetch_transitions_require_predecessor() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.contents();
        let id = repo
            .ensure_content("https://example.com/post")
            .await
            .unwrap()
            .unwrap();

        // Cannot reach fetched straight from pending.
        assert!(!repo.mark_fetched(id, Some("text"), None).await.unwrap());

        assert!(repo.mark_downloaded(id, "content/abc/response.html").await.unwrap());
        assert!(!repo.mark_skipped(id, "late skip").await.unwrap());
        assert!(repo
            .mark_fetched(id, Some("body"), Some("Title"))
            .await
            .unwrap());

        let content = repo.get(id).await.unwrap().unwrap();
        assert_eq!(content.fetch_status, FetchStatus::Fetched);
        assert_eq!(content.body_text.as_deref(), Some("body"));
        assert_eq!(content.title.as_deref(), Some("Title"));
        assert!(content.fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_by_fetch_status_oldest_first_and_limited() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.contents();
        let first = repo.ensure_content("https://a.example/1").await.unwrap();
        let second = repo.ensure_content("https://a.example/2").await.unwrap();
        repo.ensure_content("https://a.example/3").await.unwrap();

        let batch = repo.by_fetch_status(FetchStatus::Pending, 2).await.unwrap();
        let ids: Vec<Option<i32>> = batch.iter().map(|c| Some(c.id)).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[tokio::test]
    async fn test_body_text_seeded_only_once() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.contents();
        let id = repo
            .ensure_content("https://example.com/paper")
            .await
            .unwrap()
            .unwrap();

        assert!(repo.set_body_text_if_empty(id, "summary").await.unwrap());
        assert!(!repo.set_body_text_if_empty(id, "other").await.unwrap());
        let content = repo.get(id).await.unwrap().unwrap();
        assert_eq!(content.body_text.as_deref(), Some("summary"));
    }

    #[tokio::test]
    async fn test_request_transcription_only_from_null() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.contents();
        let id = repo
            .ensure_content("https://youtu.be/abc123")
            .await
            .unwrap()
            .unwrap();

        assert!(repo.request_transcription(id).await.unwrap());
        repo.fail_transcription(id, "boom").await.unwrap();
        assert!(!repo.request_transcription(id).await.unwrap());

        let content = repo.get(id).await.unwrap().unwrap();
        assert_eq!(content.transcription_status, Some(TranscriptionStatus::Failed));
        assert_eq!(content.transcription_error.as_deref(), Some("boom"));
    }
}
