//! Shared helper functions for CLI commands.

use std::future::Future;
use std::time::Duration;

use console::style;

use crate::cli::commands::LoopArgs;
use crate::collectors::{HttpClient, Ingest, RateLimiter};
use crate::config::Settings;
use crate::repository::DbContext;
use crate::services::BatchReport;

/// Open the database, creating the schema if it is missing.
pub async fn open_db(settings: &Settings) -> anyhow::Result<DbContext> {
    settings.ensure_directories()?;
    let db = settings.create_db_context();
    db.init_schema().await?;
    Ok(db)
}

/// HTTP client with the configured proxy, timeout and per-host pacing.
pub fn build_http_client(settings: &Settings) -> anyhow::Result<HttpClient> {
    let rate_limiter = RateLimiter::with_config(settings.rate_limit_config());
    Ok(HttpClient::new(&settings.http_options())?.with_rate_limiter(rate_limiter))
}

/// Everything an adapter needs to store what it fetches.
pub async fn build_ingest(settings: &Settings) -> anyhow::Result<Ingest> {
    let db = open_db(settings).await?;
    let http = build_http_client(settings)?;
    Ok(Ingest::new(db, settings.bronze_store(), http))
}

/// Run `run_once`, then again every `interval` seconds in loop mode.
///
/// In loop mode a failed run is reported and the loop continues.
pub async fn run_repeatedly<F, Fut>(repeat: LoopArgs, mut run_once: F) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    loop {
        let result = run_once().await;
        if !repeat.repeat {
            return result;
        }
        if let Err(e) = result {
            eprintln!("{} {:#}", style("✗").red(), e);
        }

        println!(
            "{} Sleeping for {}s before next run...",
            style("→").dim(),
            repeat.interval
        );
        tokio::time::sleep(Duration::from_secs(repeat.interval)).await;
    }
}

/// One-line summary of a batch.
pub fn print_report(stage: &str, report: &BatchReport) {
    if report.is_empty() {
        println!("{} {}: nothing to do", style("-").dim(), stage);
    } else if report.failed > 0 {
        println!("{} {}: {}", style("!").yellow(), stage, report);
    } else {
        println!("{} {}: {}", style("✓").green(), stage, report);
    }
}
