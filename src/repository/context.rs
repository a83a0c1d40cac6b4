//! Database context for managing connections and repository access.
//!
//! The DbContext is the primary entry point for all database operations.
//! It holds the connection factory and provides access to all repositories.

use std::path::Path;

use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel_async::{RunQueryDsl, SimpleAsyncConnection};

use super::content::ContentRepository;
use super::discussion::DiscussionRepository;
use super::pool::{AsyncSqlitePool, DieselError};
use super::source::SourceRepository;

/// Database context that owns the connection factory and hands out repositories.
///
/// # Example
/// ```ignore
/// let ctx = DbContext::from_path(Path::new("data/aggre.db"));
/// ctx.init_schema().await?;
/// let id = ctx.contents().ensure_content("https://example.com/a").await?;
/// ```
#[derive(Clone)]
pub struct DbContext {
    pool: AsyncSqlitePool,
}

#[derive(QueryableByName)]
struct TableName {
    #[diesel(sql_type = Text)]
    name: String,
}

impl DbContext {
    /// Create a context from a database file path.
    pub fn from_path(db_path: &Path) -> Self {
        Self {
            pool: AsyncSqlitePool::from_path(db_path),
        }
    }

    /// Create a context from a database URL (`sqlite:` prefix optional).
    pub fn from_url(url: &str) -> Self {
        Self {
            pool: AsyncSqlitePool::new(url),
        }
    }

    /// Get the underlying connection factory.
    pub fn pool(&self) -> &AsyncSqlitePool {
        &self.pool
    }

    pub fn sources(&self) -> SourceRepository {
        SourceRepository::new(self.pool.clone())
    }

    pub fn contents(&self) -> ContentRepository {
        ContentRepository::new(self.pool.clone())
    }

    pub fn discussions(&self) -> DiscussionRepository {
        DiscussionRepository::new(self.pool.clone())
    }

    /// Initialize database schema. Safe to run repeatedly.
    pub async fn init_schema(&self) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        conn.batch_execute(include_str!("schema_sqlite.sql")).await
    }

    /// Names of the user tables present in the database.
    pub async fn list_tables(&self) -> Result<Vec<String>, DieselError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<TableName> = diesel::sql_query(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .load(&mut conn)
        .await?;
        Ok(rows.into_iter().map(|r| r.name).collect())
    }
}
