//! Discussion repository.
//!
//! Discussions are keyed on `(source_type, external_id)`. Re-ingesting the
//! same item rewrites only the columns the adapter declares mutable.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{DiscussionChangeset, DiscussionRecord, NewDiscussion};
use super::pool::{AsyncSqliteConnection, AsyncSqlitePool, DieselError};
use super::util::{now_rfc3339, unknown_value};
use super::parse_datetime;
use crate::models::{
    CommentsStatus, Discussion, DiscussionDraft, DiscussionField, SourceType, UpsertOutcome,
};
use crate::schema::discussions;

impl TryFrom<DiscussionRecord> for Discussion {
    type Error = DieselError;

    fn try_from(record: DiscussionRecord) -> Result<Self, Self::Error> {
        let source_type = SourceType::from_str(&record.source_type)
            .ok_or_else(|| unknown_value("source type", &record.source_type))?;
        let comments_status = match record.comments_status.as_deref() {
            Some(s) => Some(
                CommentsStatus::from_str(s).ok_or_else(|| unknown_value("comments_status", s))?,
            ),
            None => None,
        };
        Ok(Discussion {
            id: record.id,
            source_id: record.source_id,
            content_id: record.content_id,
            source_type,
            external_id: record.external_id,
            title: record.title,
            author: record.author,
            url: record.url,
            content_text: record.content_text,
            published_at: record.published_at,
            fetched_at: parse_datetime(&record.fetched_at),
            meta: serde_json::from_str(&record.meta).unwrap_or_default(),
            comments_status,
            comments_json: record.comments_json,
            score: record.score,
            comment_count: record.comment_count,
        })
    }
}

/// Build the update half of an upsert from the declared mutable columns.
fn build_changeset<'a>(
    draft: &'a DiscussionDraft,
    meta_json: &'a str,
    mutable: &[DiscussionField],
) -> DiscussionChangeset<'a> {
    let mut changes = DiscussionChangeset::default();
    for field in mutable {
        match field {
            DiscussionField::Title => changes.title = Some(draft.title.as_deref()),
            DiscussionField::Author => changes.author = Some(draft.author.as_deref()),
            DiscussionField::Url => changes.url = Some(draft.url.as_deref()),
            DiscussionField::ContentText => {
                changes.content_text = Some(draft.content_text.as_deref())
            }
            DiscussionField::Meta => changes.meta = Some(meta_json),
            DiscussionField::Score => changes.score = Some(draft.score),
            DiscussionField::CommentCount => changes.comment_count = Some(draft.comment_count),
        }
    }
    changes
}

/// Diesel-based discussion repository.
#[derive(Clone)]
pub struct DiscussionRepository {
    pool: AsyncSqlitePool,
}

impl DiscussionRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a discussion or update its mutable columns on re-sight.
    ///
    /// Each step is a single autocommit statement, so concurrent writers wait
    /// on `busy_timeout` instead of failing a read-to-write lock upgrade. Only
    /// the call whose insert lands reports `Inserted`.
    pub async fn upsert(
        &self,
        source_id: i32,
        content_id: Option<i32>,
        source_type: SourceType,
        draft: &DiscussionDraft,
        mutable: &[DiscussionField],
    ) -> Result<UpsertOutcome, DieselError> {
        let mut conn = self.pool.get().await?;

        let meta_json = draft
            .meta
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "{}".to_string());
        let fetched_at = now_rfc3339();
        let record = NewDiscussion {
            source_id,
            content_id,
            source_type: source_type.as_str(),
            external_id: &draft.external_id,
            title: draft.title.as_deref(),
            author: draft.author.as_deref(),
            url: draft.url.as_deref(),
            content_text: draft.content_text.as_deref(),
            published_at: draft.published_at.as_deref(),
            fetched_at: &fetched_at,
            meta: &meta_json,
            comments_status: draft.comments_status.map(|s| s.as_str()),
            score: draft.score,
            comment_count: draft.comment_count,
        };
        let external_id = draft.external_id.as_str();

        let inserted = diesel::insert_into(discussions::table)
            .values(&record)
            .on_conflict((discussions::source_type, discussions::external_id))
            .do_nothing()
            .execute(&mut conn)
            .await?;

        if inserted == 0 {
            let changes = build_changeset(draft, &meta_json, mutable);
            if !changes.is_empty() {
                diesel::update(
                    discussions::table
                        .filter(discussions::source_type.eq(source_type.as_str()))
                        .filter(discussions::external_id.eq(external_id)),
                )
                .set(&changes)
                .execute(&mut conn)
                .await?;
            }
        }

        let id = Self::find_id(&mut conn, source_type, external_id)
            .await?
            .ok_or(diesel::result::Error::NotFound)?;
        Ok(if inserted > 0 {
            UpsertOutcome::Inserted(id)
        } else {
            UpsertOutcome::Updated(id)
        })
    }

    async fn find_id(
        conn: &mut AsyncSqliteConnection,
        source_type: SourceType,
        external_id: &str,
    ) -> Result<Option<i32>, DieselError> {
        discussions::table
            .filter(discussions::source_type.eq(source_type.as_str()))
            .filter(discussions::external_id.eq(external_id))
            .select(discussions::id)
            .first::<i32>(conn)
            .await
            .optional()
    }

    pub async fn get(&self, id: i32) -> Result<Option<Discussion>, DieselError> {
        let mut conn = self.pool.get().await?;

        discussions::table
            .find(id)
            .select(DiscussionRecord::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .map(Discussion::try_from)
            .transpose()
    }

    /// Look up a discussion by its natural key.
    pub async fn get_by_key(
        &self,
        source_type: SourceType,
        external_id: &str,
    ) -> Result<Option<Discussion>, DieselError> {
        let mut conn = self.pool.get().await?;

        discussions::table
            .filter(discussions::source_type.eq(source_type.as_str()))
            .filter(discussions::external_id.eq(external_id))
            .select(DiscussionRecord::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .map(Discussion::try_from)
            .transpose()
    }

    /// All discussions that link to a content row.
    pub async fn for_content(&self, content_id: i32) -> Result<Vec<Discussion>, DieselError> {
        let mut conn = self.pool.get().await?;

        discussions::table
            .filter(discussions::content_id.eq(content_id))
            .order(discussions::id.asc())
            .select(DiscussionRecord::as_select())
            .load(&mut conn)
            .await?
            .into_iter()
            .map(Discussion::try_from)
            .collect()
    }

    /// Discussions of one source type still waiting for their comment tree.
    pub async fn pending_comments(
        &self,
        source_type: SourceType,
        limit: usize,
    ) -> Result<Vec<Discussion>, DieselError> {
        let mut conn = self.pool.get().await?;

        discussions::table
            .filter(discussions::source_type.eq(source_type.as_str()))
            .filter(discussions::comments_status.eq(CommentsStatus::Pending.as_str()))
            .order(discussions::id.asc())
            .limit(limit as i64)
            .select(DiscussionRecord::as_select())
            .load(&mut conn)
            .await?
            .into_iter()
            .map(Discussion::try_from)
            .collect()
    }

    /// Store a fetched comment tree and close out the discussion.
    pub async fn mark_comments_done(
        &self,
        id: i32,
        comments_json: &str,
        comment_count: Option<i32>,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let target = discussions::table.find(id);

        match comment_count {
            Some(count) => {
                diesel::update(target)
                    .set((
                        discussions::comments_status.eq(Some(CommentsStatus::Done.as_str())),
                        discussions::comments_json.eq(Some(comments_json)),
                        discussions::comment_count.eq(Some(count)),
                    ))
                    .execute(&mut conn)
                    .await?;
            }
            None => {
                diesel::update(target)
                    .set((
                        discussions::comments_status.eq(Some(CommentsStatus::Done.as_str())),
                        discussions::comments_json.eq(Some(comments_json)),
                    ))
                    .execute(&mut conn)
                    .await?;
            }
        }

        Ok(())
    }

    /// Row counts per source type.
    pub async fn count_by_source_type(&self) -> Result<Vec<(String, i64)>, DieselError> {
        let mut conn = self.pool.get().await?;

        discussions::table
            .group_by(discussions::source_type)
            .select((discussions::source_type, diesel::dsl::count_star()))
            .order(discussions::source_type.asc())
            .load(&mut conn)
            .await
    }

    pub async fn count(&self) -> Result<i64, DieselError> {
        let mut conn = self.pool.get().await?;
        discussions::table.count().get_result(&mut conn).await
    }
}
