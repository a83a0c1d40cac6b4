//! Pipeline stages over stored content.
//!
//! Each stage processes one bounded batch per call and records per-row
//! outcomes on the rows themselves. Callers schedule them independently.

pub mod download;
pub mod enrichment;
pub mod extract;
pub mod outcome;
pub mod transcription;

pub use download::{DownloadConfig, DownloadEvent, DownloadResult, DownloadService};
pub use enrichment::{EnrichmentReport, EnrichmentService};
pub use extract::{ExtractError, ExtractService, HtmlTextExtractor, TextExtractor};
pub use outcome::{BatchReport, ItemOutcome};
pub use transcription::{
    AudioFetcher, SpeechToText, Transcript, TranscriptionError, TranscriptionService, WhisperCli,
    YtDlpAudioFetcher,
};
