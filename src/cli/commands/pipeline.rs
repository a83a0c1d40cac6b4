//! Batch stage commands: download, extract, enrich and transcribe.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use console::style;
use tokio::sync::mpsc;

use super::LoopArgs;
use crate::cli::helpers::{build_http_client, build_ingest, open_db, print_report, run_repeatedly};
use crate::collectors::{HackernewsCollector, LobstersCollector, SearchableCollector};
use crate::config::Settings;
use crate::services::{
    DownloadConfig, DownloadEvent, DownloadService, EnrichmentService, ExtractService,
    HtmlTextExtractor, ItemOutcome, TranscriptionService, WhisperCli, YtDlpAudioFetcher,
};

/// Download pending content pages into the bronze store.
pub async fn cmd_download(
    settings: &Settings,
    batch: usize,
    workers: usize,
    repeat: LoopArgs,
) -> anyhow::Result<()> {
    let db = open_db(settings).await?;
    let fetcher = Arc::new(build_http_client(settings)?);
    let service = DownloadService::new(db, settings.bronze_store(), fetcher);
    let config = DownloadConfig {
        batch_limit: batch,
        workers,
    };

    run_repeatedly(repeat, || download_once(&service, config)).await
}

async fn download_once(service: &DownloadService, config: DownloadConfig) -> anyhow::Result<()> {
    let (event_tx, mut event_rx) = mpsc::channel::<DownloadEvent>(100);
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if let DownloadEvent::Finished { url, outcome, .. } = event {
                match outcome {
                    ItemOutcome::Succeeded => println!("  {} {}", style("✓").green(), url),
                    ItemOutcome::Skipped(reason) => {
                        println!("  {} {} ({})", style("-").dim(), url, reason)
                    }
                    ItemOutcome::Failed(error) => {
                        println!("  {} {}: {}", style("✗").red(), url, error)
                    }
                }
            }
        }
    });

    let result = service.download(config, Some(event_tx)).await;
    let _ = printer.await;
    let result = result?;

    print_report("download", &result.report);
    if result.remaining > 0 {
        println!("  {} still pending", result.remaining);
    }
    Ok(())
}

/// Extract text from downloaded pages.
pub async fn cmd_extract(
    settings: &Settings,
    batch: usize,
    timeout: Option<u64>,
    repeat: LoopArgs,
) -> anyhow::Result<()> {
    let db = open_db(settings).await?;
    let timeout = Duration::from_secs(timeout.unwrap_or(settings.extract_timeout));
    let service = ExtractService::new(db, settings.bronze_store(), Arc::new(HtmlTextExtractor))
        .with_timeout(timeout);

    run_repeatedly(repeat, || extract_once(&service, batch)).await
}

async fn extract_once(service: &ExtractService, batch: usize) -> anyhow::Result<()> {
    let report = service.extract(batch).await?;
    print_report("extract", &report);
    Ok(())
}

/// Search Hacker News and Lobsters for discussions of known content.
pub async fn cmd_enrich(settings: &Settings, batch: usize, repeat: LoopArgs) -> anyhow::Result<()> {
    let ingest = build_ingest(settings).await?;
    let searchers: Vec<Arc<dyn SearchableCollector>> = vec![
        Arc::new(HackernewsCollector::new(ingest.clone())),
        Arc::new(LobstersCollector::new(ingest.clone())),
    ];
    let service = EnrichmentService::new(ingest.db().clone(), searchers);

    run_repeatedly(repeat, || enrich_once(&service, batch)).await
}

async fn enrich_once(service: &EnrichmentService, batch: usize) -> anyhow::Result<()> {
    let report = service.enrich(batch).await?;
    if report.processed == 0 {
        println!("{} enrich: nothing to do", style("-").dim());
        return Ok(());
    }

    println!(
        "{} enrich: {} processed, {} new discussions, {} skipped, {} deferred",
        style("✓").green(),
        report.processed,
        report.total_found(),
        report.skipped,
        report.deferred
    );
    for (source_type, found) in &report.found {
        println!("  {}: {}", source_type, found);
    }
    Ok(())
}

/// Transcribe queued videos with yt-dlp and whisper.
pub async fn cmd_transcribe(
    settings: &Settings,
    batch: usize,
    repeat: LoopArgs,
) -> anyhow::Result<()> {
    // Missing tools would fail every row, so refuse to start instead.
    which::which(&settings.ytdlp_binary)
        .with_context(|| format!("{} not found in PATH", settings.ytdlp_binary))?;
    which::which(&settings.whisper_binary)
        .with_context(|| format!("{} not found in PATH", settings.whisper_binary))?;

    let db = open_db(settings).await?;
    let audio = Arc::new(YtDlpAudioFetcher::new(
        &settings.ytdlp_binary,
        settings.proxy_url.clone(),
    ));
    let engine = Arc::new(WhisperCli::new(
        &settings.whisper_binary,
        &settings.whisper_model,
    ));
    let service = TranscriptionService::new(db, settings.bronze_store(), audio, engine)
        .with_max_audio_bytes(settings.max_audio_bytes);

    run_repeatedly(repeat, || transcribe_once(&service, batch)).await
}

async fn transcribe_once(service: &TranscriptionService, batch: usize) -> anyhow::Result<()> {
    let report = service.transcribe(batch).await?;
    print_report("transcribe", &report);
    Ok(())
}
