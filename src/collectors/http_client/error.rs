//! HTTP client errors.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by [`super::HttpClient`].
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP {status} for {url}")]
    Status {
        status: u16,
        url: String,
        retry_after: Option<Duration>,
    },

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

impl HttpError {
    /// Status code for error responses.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Request { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Worth retrying: throttling, overload, timeouts and dropped connections.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => matches!(status, 429 | 503),
            Self::Request { source, .. } => source.is_timeout() || source.is_connect(),
            _ => false,
        }
    }

    /// The resource is gone and will not come back.
    pub fn is_gone(&self) -> bool {
        matches!(self.status(), Some(404 | 410))
    }

    /// Server-requested wait before retrying.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// One-line reason suitable for a `*_error` column.
    pub fn short_reason(&self) -> String {
        match self.status() {
            Some(status) => format!("HTTP {}", status),
            None => self.to_string(),
        }
    }
}
