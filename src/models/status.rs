//! Lifecycle vocabularies persisted as plain strings.
//!
//! These values are a stable contract for anything reading the database,
//! so the string forms must never change.

use serde::{Deserialize, Serialize};

/// Content fetch lifecycle: `pending -> downloaded -> fetched|skipped|failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Pending,
    Downloaded,
    Fetched,
    Skipped,
    Failed,
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloaded => "downloaded",
            Self::Fetched => "fetched",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "downloaded" => Some(Self::Downloaded),
            "fetched" => Some(Self::Fetched),
            "skipped" => Some(Self::Skipped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal states are never picked up again by the batch selectors.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fetched | Self::Skipped | Self::Failed)
    }
}

/// Video transcription lifecycle:
/// `pending -> downloading -> transcribing -> completed|failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionStatus {
    Pending,
    Downloading,
    Transcribing,
    Completed,
    Failed,
}

impl TranscriptionStatus {
    /// States eligible for (re)processing. A crash mid-run leaves a row in
    /// `downloading` or `transcribing`, and those rows must not be stranded.
    pub const RESUMABLE: [TranscriptionStatus; 3] =
        [Self::Pending, Self::Downloading, Self::Transcribing];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Transcribing => "transcribing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "downloading" => Some(Self::Downloading),
            "transcribing" => Some(Self::Transcribing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_resumable(&self) -> bool {
        Self::RESUMABLE.contains(self)
    }
}

/// Per-discussion comment collection lifecycle: `pending -> done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentsStatus {
    Pending,
    Done,
}

impl CommentsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}
