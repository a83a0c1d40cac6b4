//! Status command.

use console::style;

use crate::cli::helpers::open_db;
use crate::config::Settings;

/// Show sources, content per fetch status and discussions per source type.
pub async fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    let db = open_db(settings).await?;

    let sources = db.sources().get_all().await?;
    println!("{} ({})", style("Sources").bold(), sources.len());
    for source in &sources {
        let last = source
            .last_fetched_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {:<12} {:<30} last fetched {}",
            source.source_type.as_str(),
            source.name,
            last
        );
    }

    println!();
    println!("{} ({})", style("Content").bold(), db.contents().count().await?);
    for (status, count) in db.contents().count_by_fetch_status().await? {
        println!("  {:<12} {}", status, count);
    }

    println!();
    println!(
        "{} ({})",
        style("Discussions").bold(),
        db.discussions().count().await?
    );
    for (source_type, count) in db.discussions().count_by_source_type().await? {
        println!("  {:<12} {}", source_type, count);
    }

    Ok(())
}
