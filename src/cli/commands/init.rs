//! Initialize command.

use console::style;

use crate::cli::helpers::open_db;
use crate::config::Settings;

/// Initialize the data directory, bronze store and database.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    let db = open_db(settings).await?;
    let tables = db.list_tables().await?;

    println!(
        "{} Initialized aggre in {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    println!("  Database: {}", settings.database_url());
    println!("  Bronze store: {}", settings.bronze_dir.display());
    println!("  Tables: {}", tables.join(", "));

    Ok(())
}
