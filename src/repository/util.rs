//! Repository utilities.

use chrono::{DateTime, SecondsFormat, Utc};
use diesel::result::DatabaseErrorInformation;

/// Simple error info wrapper for database errors.
#[derive(Debug)]
pub struct DbErrorInfo(pub String);

impl DatabaseErrorInformation for DbErrorInfo {
    fn message(&self) -> &str {
        &self.0
    }
    fn details(&self) -> Option<&str> {
        None
    }
    fn hint(&self) -> Option<&str> {
        None
    }
    fn table_name(&self) -> Option<&str> {
        None
    }
    fn column_name(&self) -> Option<&str> {
        None
    }
    fn constraint_name(&self) -> Option<&str> {
        None
    }
    fn statement_position(&self) -> Option<i32> {
        None
    }
}

/// Convert any displayable error to a diesel error with proper message.
pub fn to_diesel_error(e: impl std::fmt::Display) -> diesel::result::Error {
    diesel::result::Error::DatabaseError(
        diesel::result::DatabaseErrorKind::Unknown,
        Box::new(DbErrorInfo(e.to_string())),
    )
}

/// Error for a persisted vocabulary value this build does not know.
pub fn unknown_value(column: &str, value: &str) -> diesel::result::Error {
    to_diesel_error(format!("unknown {} value '{}'", column, value))
}

/// Format a timestamp for storage.
///
/// Fixed-width microseconds keep text ordering identical to time ordering,
/// which the oldest-first batch selectors rely on.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time in the form stored in timestamp columns.
pub fn now_rfc3339() -> String {
    format_timestamp(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_diesel_error_keeps_message() {
        let err = to_diesel_error("connection refused");
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_timestamps_sort_as_text() {
        let later = DateTime::parse_from_rfc3339("2024-01-01T00:00:00.5Z")
            .unwrap()
            .with_timezone(&Utc);
        let earlier = DateTime::parse_from_rfc3339("2024-01-01T00:00:00.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(format_timestamp(earlier) < format_timestamp(later));
        assert_eq!(format_timestamp(later), "2024-01-01T00:00:00.500000Z");
    }

    #[test]
    fn test_now_is_parseable() {
        let now = now_rfc3339();
        assert!(chrono::DateTime::parse_from_rfc3339(&now).is_ok());
    }
}
