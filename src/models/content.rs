//! Canonical, source-independent content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{FetchStatus, TranscriptionStatus};

/// One distinct real-world URL after canonicalization.
///
/// Rows are created by the identity resolver and then advanced by the
/// download, extract, enrichment and transcription stages. They are never
/// deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub id: i32,
    pub canonical_url: String,
    pub domain: Option<String>,
    pub title: Option<String>,
    pub body_text: Option<String>,
    /// Path of the raw HTML artifact, relative to the bronze root.
    pub raw_html_ref: Option<String>,
    pub fetch_status: FetchStatus,
    pub fetch_error: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub transcription_status: Option<TranscriptionStatus>,
    pub transcription_error: Option<String>,
    pub detected_language: Option<String>,
    pub enriched_at: Option<DateTime<Utc>>,
}

impl Content {
    pub fn is_enriched(&self) -> bool {
        self.enriched_at.is_some()
    }
}
