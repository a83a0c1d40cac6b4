//! Repository layer for database persistence.
//!
//! All database access uses Diesel with diesel-async over SQLite.

pub mod content;
pub mod context;
pub mod discussion;
pub mod models;
pub mod pool;
pub mod source;
pub mod util;

pub use content::{ContentRepository, TranscriptionJob};
pub use context::DbContext;
pub use discussion::DiscussionRepository;
pub use pool::{AsyncSqlitePool, DieselError};
pub use source::SourceRepository;

use chrono::{DateTime, Utc};

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}
