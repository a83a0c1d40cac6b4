//! Collection commands: new items and comment trees.

use console::style;
use futures::future::join_all;

use super::LoopArgs;
use crate::cli::helpers::{build_ingest, run_repeatedly};
use crate::collectors::{
    Collector, CollectorWithComments, HackernewsCollector, HuggingfaceCollector, Ingest,
    LobstersCollector, RedditCollector, RssCollector, SourceAdapter, YoutubeCollector,
};
use crate::config::{Config, Settings};
use crate::models::SourceType;

/// Fetch new items from every configured source of the selected types.
pub async fn cmd_collect(
    settings: &Settings,
    config: &Config,
    sources: &[SourceType],
    repeat: LoopArgs,
) -> anyhow::Result<()> {
    let ingest = build_ingest(settings).await?;
    let selected = if sources.is_empty() {
        SourceType::ALL.to_vec()
    } else {
        sources.to_vec()
    };

    run_repeatedly(repeat, || collect_once(settings, config, &ingest, &selected)).await
}

async fn collect_once(
    settings: &Settings,
    config: &Config,
    ingest: &Ingest,
    selected: &[SourceType],
) -> anyhow::Result<()> {
    println!(
        "{} Collecting from {} source types",
        style("→").cyan(),
        selected.len()
    );

    let mut failed = 0;
    for source_type in selected {
        let ok = match source_type {
            SourceType::Hackernews => {
                run_collector(&HackernewsCollector::new(ingest.clone()), &config.hackernews).await
            }
            SourceType::Lobsters => {
                run_collector(&LobstersCollector::new(ingest.clone()), &config.lobsters).await
            }
            SourceType::Reddit => {
                run_collector(&RedditCollector::new(ingest.clone()), &config.reddit).await
            }
            SourceType::Rss => run_collector(&RssCollector::new(ingest.clone()), &config.rss).await,
            SourceType::Youtube => {
                let collector = YoutubeCollector::new(
                    ingest.clone(),
                    &settings.ytdlp_binary,
                    settings.proxy_url.clone(),
                );
                run_collector(&collector, &config.youtube).await
            }
            SourceType::Huggingface => {
                run_collector(&HuggingfaceCollector::new(ingest.clone()), &config.huggingface)
                    .await
            }
        };
        if !ok {
            failed += 1;
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} collectors failed", failed, selected.len());
    }
    Ok(())
}

async fn run_collector<C: Collector>(collector: &C, config: &C::Config) -> bool {
    let source_type = collector.source_type();
    match collector.collect(config).await {
        Ok(created) => {
            println!("  {} {}: {} new", style("✓").green(), source_type, created);
            true
        }
        Err(e) => {
            println!("  {} {}: {}", style("✗").red(), source_type, e);
            false
        }
    }
}

/// Fetch pending comment trees from every source that has them.
pub async fn cmd_comments(
    settings: &Settings,
    batch: usize,
    repeat: LoopArgs,
) -> anyhow::Result<()> {
    let ingest = build_ingest(settings).await?;
    let collectors: Vec<Box<dyn CollectorWithComments>> = vec![
        Box::new(HackernewsCollector::new(ingest.clone())),
        Box::new(LobstersCollector::new(ingest.clone())),
        Box::new(RedditCollector::new(ingest)),
    ];

    run_repeatedly(repeat, || comments_once(&collectors, batch)).await
}

async fn comments_once(
    collectors: &[Box<dyn CollectorWithComments>],
    batch: usize,
) -> anyhow::Result<()> {
    // Each source has its own host and rate limit, so they run side by side.
    let results = join_all(collectors.iter().map(|collector| async move {
        (
            collector.source_type(),
            collector.collect_comments(batch).await,
        )
    }))
    .await;

    let mut failed = 0;
    for (source_type, result) in results {
        match result {
            Ok(fetched) => println!(
                "  {} {}: {} comment trees",
                style("✓").green(),
                source_type,
                fetched
            ),
            Err(e) => {
                failed += 1;
                println!("  {} {}: {}", style("✗").red(), source_type, e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} comment fetchers failed", failed, collectors.len());
    }
    Ok(())
}
