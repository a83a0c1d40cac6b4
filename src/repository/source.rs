//! Source repository.
//!
//! Sources are registered on first reference by an adapter and are never
//! duplicated for the same `(type, name)` pair.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{NewSource, SourceRecord};
use super::pool::{AsyncSqlitePool, DieselError};
use super::util::{now_rfc3339, unknown_value};
use super::{parse_datetime, parse_datetime_opt};
use crate::models::{Source, SourceType};
use crate::schema::sources;

impl TryFrom<SourceRecord> for Source {
    type Error = DieselError;

    fn try_from(record: SourceRecord) -> Result<Self, Self::Error> {
        let source_type = SourceType::from_str(&record.source_type)
            .ok_or_else(|| unknown_value("source type", &record.source_type))?;
        Ok(Source {
            id: record.id,
            source_type,
            name: record.name,
            config: serde_json::from_str(&record.config).unwrap_or_default(),
            enabled: record.enabled != 0,
            created_at: parse_datetime(&record.created_at),
            last_fetched_at: parse_datetime_opt(record.last_fetched_at),
        })
    }
}

/// Diesel-based source repository.
#[derive(Clone)]
pub struct SourceRepository {
    pool: AsyncSqlitePool,
}

impl SourceRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Find or create the source for `(source_type, name)` and return its id.
    ///
    /// `config` is only recorded when the row is created.
    pub async fn ensure(
        &self,
        source_type: SourceType,
        name: &str,
        config: &serde_json::Value,
    ) -> Result<i32, DieselError> {
        let mut conn = self.pool.get().await?;

        if let Some(id) = Self::find_id(&mut conn, source_type, name).await? {
            return Ok(id);
        }

        let config_json = serde_json::to_string(config).unwrap_or_else(|_| "{}".to_string());
        let created_at = now_rfc3339();
        diesel::insert_into(sources::table)
            .values(&NewSource {
                source_type: source_type.as_str(),
                name,
                config: &config_json,
                enabled: 1,
                created_at: &created_at,
            })
            .on_conflict((sources::source_type, sources::name))
            .do_nothing()
            .execute(&mut conn)
            .await?;

        Self::find_id(&mut conn, source_type, name)
            .await?
            .ok_or(diesel::result::Error::NotFound)
    }

    async fn find_id(
        conn: &mut super::pool::AsyncSqliteConnection,
        source_type: SourceType,
        name: &str,
    ) -> Result<Option<i32>, DieselError> {
        sources::table
            .filter(sources::source_type.eq(source_type.as_str()))
            .filter(sources::name.eq(name))
            .select(sources::id)
            .first::<i32>(conn)
            .await
            .optional()
    }

    /// Get a source by ID.
    pub async fn get(&self, id: i32) -> Result<Option<Source>, DieselError> {
        let mut conn = self.pool.get().await?;

        sources::table
            .find(id)
            .select(SourceRecord::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .map(Source::try_from)
            .transpose()
    }

    /// Get all sources ordered by type and name.
    pub async fn get_all(&self) -> Result<Vec<Source>, DieselError> {
        let mut conn = self.pool.get().await?;

        sources::table
            .order((sources::source_type.asc(), sources::name.asc()))
            .select(SourceRecord::as_select())
            .load(&mut conn)
            .await?
            .into_iter()
            .map(Source::try_from)
            .collect()
    }

    /// Record a successful fetch.
    pub async fn update_last_fetched(&self, id: i32) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let ts = now_rfc3339();

        diesel::update(sources::table.find(id))
            .set(sources::last_fetched_at.eq(Some(ts.as_str())))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    pub async fn count(&self) -> Result<i64, DieselError> {
        let mut conn = self.pool.get().await?;
        sources::table.count().get_result(&mut conn).await
    }
}
