//! Content download stage: `pending -> downloaded | skipped | failed`.
//!
//! A fixed pool of workers drains a shared queue of pending rows. Each row
//! is handled in isolation; a failure is recorded on the row and the worker
//! moves on.

mod types;

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::collectors::PageFetcher;
use crate::models::{Content, FetchStatus};
use crate::repository::DbContext;
use crate::services::outcome::{BatchReport, ItemOutcome};
use crate::storage::{BronzeKey, BronzeStore};
use crate::utils::is_text_like;

pub use types::{skip_reason, DownloadConfig, DownloadEvent, DownloadResult, DEFAULT_WORKERS};

/// Bronze key of a downloaded page body.
pub fn response_key(url: &str) -> BronzeKey {
    BronzeKey::request("content", url, "response", "html")
}

/// Service for downloading pending content.
pub struct DownloadService {
    db: DbContext,
    bronze: BronzeStore,
    fetcher: Arc<dyn PageFetcher>,
}

impl DownloadService {
    pub fn new(db: DbContext, bronze: BronzeStore, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            db,
            bronze,
            fetcher,
        }
    }

    /// Download one batch of pending rows, oldest first.
    pub async fn download(
        &self,
        config: DownloadConfig,
        event_tx: Option<mpsc::Sender<DownloadEvent>>,
    ) -> anyhow::Result<DownloadResult> {
        let batch = self
            .db
            .contents()
            .by_fetch_status(FetchStatus::Pending, config.batch_limit)
            .await?;
        if batch.is_empty() {
            info!("No content pending download");
            return Ok(DownloadResult::default());
        }

        let workers = config.workers.max(1).min(batch.len());
        info!("Downloading {} items with {} workers", batch.len(), workers);

        let queue = Arc::new(Mutex::new(VecDeque::from(batch)));
        let mut handles = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let queue = queue.clone();
            let db = self.db.clone();
            let bronze = self.bronze.clone();
            let fetcher = self.fetcher.clone();
            let event_tx = event_tx.clone();

            handles.push(tokio::spawn(async move {
                let mut report = BatchReport::default();
                loop {
                    // Hold the lock only long enough to claim the next row.
                    let next = queue.lock().await.pop_front();
                    let Some(content) = next else {
                        break;
                    };

                    if let Some(ref tx) = event_tx {
                        let _ = tx
                            .send(DownloadEvent::Started {
                                worker_id,
                                url: content.canonical_url.clone(),
                            })
                            .await;
                    }

                    let outcome = download_one(&db, &bronze, fetcher.as_ref(), &content).await;
                    report.record(&outcome);

                    if let Some(ref tx) = event_tx {
                        let _ = tx
                            .send(DownloadEvent::Finished {
                                worker_id,
                                url: content.canonical_url.clone(),
                                outcome,
                            })
                            .await;
                    }
                }
                report
            }));
        }

        let mut report = BatchReport::default();
        for handle in handles {
            match handle.await {
                Ok(worker_report) => report.merge(worker_report),
                Err(e) => error!("Download worker panicked: {}", e),
            }
        }

        let remaining = self
            .db
            .contents()
            .count_by_fetch_status()
            .await?
            .into_iter()
            .find(|(status, _)| status == FetchStatus::Pending.as_str())
            .map(|(_, count)| count as u64)
            .unwrap_or(0);

        info!("Download batch: {}", report);
        Ok(DownloadResult { report, remaining })
    }
}

/// Download a single row and record the outcome on it.
pub async fn download_one(
    db: &DbContext,
    bronze: &BronzeStore,
    fetcher: &dyn PageFetcher,
    content: &Content,
) -> ItemOutcome {
    let contents = db.contents();
    let url = content.canonical_url.as_str();

    if let Some(reason) = skip_reason(url) {
        debug!("Skipping {}: {}", url, reason);
        return record(contents.mark_skipped(content.id, reason).await, ItemOutcome::skipped(reason));
    }

    // A body left by an interrupted run is reused instead of fetched again.
    let key = response_key(url);
    if bronze.exists(&key) {
        let reference = bronze.relative_path(&key);
        debug!("Reusing stored body for {} at {}", url, reference);
        return record(
            contents.mark_downloaded(content.id, &reference).await,
            ItemOutcome::Succeeded,
        );
    }

    let page = match fetcher.fetch_page(url).await {
        Ok(page) => page,
        Err(e) if e.is_gone() => {
            let reason = e.short_reason();
            warn!("{}: {}", url, reason);
            return record(
                contents.mark_download_failed(content.id, &reason).await,
                ItemOutcome::failed(reason),
            );
        }
        Err(e) => {
            let message = e.to_string();
            warn!("Download failed for {}: {}", url, message);
            return record(
                contents.mark_download_failed(content.id, &message).await,
                ItemOutcome::failed(message),
            );
        }
    };

    if !is_text_like(page.content_type.as_deref()) {
        let reason = format!(
            "non-text content: {}",
            page.content_type.as_deref().unwrap_or("unknown")
        );
        debug!("Skipping {}: {}", url, reason);
        return record(contents.mark_skipped(content.id, &reason).await, ItemOutcome::skipped(reason));
    }

    if let Err(e) = bronze.write(&key, &page.body) {
        let message = e.to_string();
        error!("Could not store body for {}: {}", url, message);
        return record(
            contents.mark_download_failed(content.id, &message).await,
            ItemOutcome::failed(message),
        );
    }

    let reference = bronze.relative_path(&key);
    debug!("Stored {} bytes for {} at {}", page.body.len(), url, reference);
    record(
        contents.mark_downloaded(content.id, &reference).await,
        ItemOutcome::Succeeded,
    )
}

/// Combine the result of a guarded transition with the intended outcome.
///
/// A transition that matched no row means another run already moved it.
fn record(
    transition: Result<bool, crate::repository::DieselError>,
    outcome: ItemOutcome,
) -> ItemOutcome {
    match transition {
        Ok(true) => outcome,
        Ok(false) => ItemOutcome::skipped("no longer pending"),
        Err(e) => {
            error!("Could not record download outcome: {}", e);
            ItemOutcome::failed(e.to_string())
        }
    }
}
