//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod collect;
mod init;
mod pipeline;
mod status;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};
use crate::models::SourceType;

#[derive(Parser)]
#[command(name = "aggre")]
#[command(about = "Content aggregation pipeline: collect, deduplicate, fetch, enrich and transcribe")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Repeat options shared by the batch stages.
#[derive(Args, Debug, Clone, Copy)]
pub struct LoopArgs {
    /// Keep running, one batch per interval
    #[arg(long = "loop")]
    pub repeat: bool,
    /// Seconds to sleep between batches in loop mode
    #[arg(long, default_value = "300")]
    pub interval: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Fetch new items from configured sources
    Collect {
        /// Only collect from these source types (default: all)
        #[arg(short, long = "source", value_parser = parse_source_type)]
        sources: Vec<SourceType>,
        #[command(flatten)]
        repeat: LoopArgs,
    },

    /// Fetch comment trees for discussions still pending
    Comments {
        /// Discussions per source per batch
        #[arg(short, long, default_value = "50")]
        batch: usize,
        #[command(flatten)]
        repeat: LoopArgs,
    },

    /// Download pending content pages
    Download {
        /// Rows per batch
        #[arg(short, long, default_value = "100")]
        batch: usize,
        /// Number of download workers
        #[arg(short, long, default_value = "5")]
        workers: usize,
        #[command(flatten)]
        repeat: LoopArgs,
    },

    /// Extract readable text from downloaded pages
    Extract {
        /// Rows per batch
        #[arg(short, long, default_value = "50")]
        batch: usize,
        /// Per-document timeout in seconds (overrides config)
        #[arg(long)]
        timeout: Option<u64>,
        #[command(flatten)]
        repeat: LoopArgs,
    },

    /// Search other sources for discussions of known content
    Enrich {
        /// Rows per batch
        #[arg(short, long, default_value = "50")]
        batch: usize,
        #[command(flatten)]
        repeat: LoopArgs,
    },

    /// Transcribe queued videos
    Transcribe {
        /// Videos per batch
        #[arg(short, long, default_value = "5")]
        batch: usize,
        #[command(flatten)]
        repeat: LoopArgs,
    },

    /// Show row counts per stage
    Status,
}

fn parse_source_type(s: &str) -> Result<SourceType, String> {
    SourceType::from_str(&s.to_lowercase()).ok_or_else(|| {
        let known: Vec<&str> = SourceType::ALL.iter().map(|t| t.as_str()).collect();
        format!("unknown source '{}' (expected one of: {})", s, known.join(", "))
    })
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
    };
    let (settings, config) = load_settings_with_options(options).await;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Collect { sources, repeat } => {
            collect::cmd_collect(&settings, &config, &sources, repeat).await
        }
        Commands::Comments { batch, repeat } => {
            collect::cmd_comments(&settings, batch, repeat).await
        }
        Commands::Download {
            batch,
            workers,
            repeat,
        } => pipeline::cmd_download(&settings, batch, workers, repeat).await,
        Commands::Extract {
            batch,
            timeout,
            repeat,
        } => pipeline::cmd_extract(&settings, batch, timeout, repeat).await,
        Commands::Enrich { batch, repeat } => {
            pipeline::cmd_enrich(&settings, batch, repeat).await
        }
        Commands::Transcribe { batch, repeat } => {
            pipeline::cmd_transcribe(&settings, batch, repeat).await
        }
        Commands::Status => status::cmd_status(&settings).await,
    }
}
