//! Download stage types, events and skip rules.

use url::Url;

use crate::services::outcome::{BatchReport, ItemOutcome};

/// Default number of concurrent download workers.
pub const DEFAULT_WORKERS: usize = 5;

/// Hosts whose pages are never downloaded; video content goes through
/// transcription instead.
const SKIP_HOSTS: &[&str] = &["youtube.com", "youtu.be", "m.youtube.com"];

/// Events emitted while a batch downloads.
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    Started {
        worker_id: usize,
        url: String,
    },
    Finished {
        worker_id: usize,
        url: String,
        outcome: ItemOutcome,
    },
}

/// Configuration for the download stage.
#[derive(Debug, Clone, Copy)]
pub struct DownloadConfig {
    pub batch_limit: usize,
    pub workers: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            batch_limit: 100,
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Result of a download batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadResult {
    pub report: BatchReport,
    /// Rows still pending after the batch.
    pub remaining: u64,
}

/// Why a URL should be skipped without touching the network, if it should.
pub fn skip_reason(url: &str) -> Option<&'static str> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    if SKIP_HOSTS.contains(&host) {
        return Some("video host");
    }
    if parsed.path().to_lowercase().ends_with(".pdf") {
        return Some("pdf");
    }
    None
}
