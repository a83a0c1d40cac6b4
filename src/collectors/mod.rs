//! Source adapters and the helpers they share.
//!
//! Every adapter registers its source, resolves content identity for the
//! URLs it discovers and upserts discussions through [`ingest::Ingest`].
//! Capabilities are separate traits so callers depend only on what they use.

pub mod comments;
pub mod hackernews;
pub mod http_client;
pub mod huggingface;
pub mod ingest;
pub mod lobsters;
pub mod rate_limiter;
pub mod reddit;
pub mod rss;
pub mod youtube;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::SourceType;
use crate::repository::DieselError;
use crate::storage::BronzeError;
use crate::utils::ToolError;

pub use comments::{flatten_comments, FlatComment};
pub use hackernews::HackernewsCollector;
pub use http_client::{HttpClient, HttpError, PageFetcher};
pub use huggingface::HuggingfaceCollector;
pub use ingest::Ingest;
pub use lobsters::LobstersCollector;
pub use rate_limiter::RateLimiter;
pub use reddit::RedditCollector;
pub use rss::RssCollector;
pub use youtube::YoutubeCollector;

/// Errors raised by adapters.
///
/// "Nothing found" is never an error; these are transport, storage or
/// parse failures.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Database error: {0}")]
    Database(#[from] DieselError),

    #[error("Bronze store error: {0}")]
    Bronze(#[from] BronzeError),

    #[error("Invalid payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Feed parse error: {0}")]
    Feed(String),

    #[error(transparent)]
    Tool(#[from] ToolError),
}

impl CollectorError {
    /// Whether trying again later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_transient(),
            Self::Database(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CollectorError>;

/// Common identity of every adapter.
pub trait SourceAdapter: Send + Sync {
    fn source_type(&self) -> SourceType;
}

/// Fetches new items from the adapter's configured sources.
#[async_trait]
pub trait Collector: SourceAdapter {
    type Config: Send + Sync;

    /// Returns the number of newly created discussions.
    async fn collect(&self, config: &Self::Config) -> Result<usize>;
}

/// Fetches comment trees for discussions still marked pending.
#[async_trait]
pub trait CollectorWithComments: SourceAdapter {
    /// Returns the number of discussions whose comments were fetched.
    async fn collect_comments(&self, batch_limit: usize) -> Result<usize>;
}

/// Finds discussions of an arbitrary URL on the adapter's platform.
#[async_trait]
pub trait SearchableCollector: SourceAdapter {
    /// Called once before each enrichment batch to drop per-batch caches.
    async fn begin_batch(&self) {}

    /// Returns the number of newly created discussions.
    async fn search_by_url(&self, url: &str) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let throttled = CollectorError::Http(HttpError::Status {
            status: 429,
            url: "https://hn.algolia.com/api/v1/search".to_string(),
            retry_after: None,
        });
        let missing = CollectorError::Http(HttpError::Status {
            status: 404,
            url: "https://lobste.rs/domains/x.json".to_string(),
            retry_after: None,
        });

        assert!(throttled.is_transient());
        assert!(!missing.is_transient());
        assert!(!CollectorError::Feed("bad xml".to_string()).is_transient());
    }
}
