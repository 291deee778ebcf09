//! Pinecone target CLI
//!
//! Main entry point for the `target-pinecone` binary.
//! Reads Singer messages from stdin and upserts record embeddings into a
//! Pinecone index.

mod about;
mod driver;

use clap::Parser;
use driver::Driver;
use pinesink_core::{config::AppConfig, logging, AppResult};
use pinesink_loader::SinkSettings;
use pinesink_vector::create_gateway;
use std::path::PathBuf;
use tokio::io::BufReader;

/// Pinecone target - load pre-computed embeddings into a Pinecone index
#[derive(Parser, Debug)]
#[command(name = "target-pinecone")]
#[command(about = "Load pre-computed embeddings into a Pinecone index", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config file (JSON, or YAML by extension)
    #[arg(short, long, env = "TARGET_PINECONE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, env = "NO_COLOR")]
    no_color: bool,

    /// Write to an in-memory store instead of Pinecone
    #[arg(long)]
    dry_run: bool,

    /// Print a JSON description of the target and its settings, then exit
    #[arg(long)]
    about: bool,
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();

    if cli.about {
        return about::print_about();
    }

    // Environment first, then CLI overrides
    let config = AppConfig::load().with_overrides(
        cli.config,
        cli.log_level,
        cli.verbose,
        cli.no_color,
        cli.dry_run,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("{} starting", about::TARGET_NAME);
    tracing::debug!("Config file: {:?}", config.config_file);

    let sink_config = config.sink_config()?;
    tracing::debug!("Sink config: {:?}", sink_config);

    let gateway = create_gateway(&sink_config)?;

    let _span = tracing::info_span!(
        "sync",
        index = %sink_config.index_name,
        provider = %sink_config.provider
    )
    .entered();

    let mut driver = Driver::new(
        SinkSettings::from(&sink_config),
        gateway,
        tokio::io::stdout(),
    );
    let result = driver.run(BufReader::new(tokio::io::stdin())).await;

    match &result {
        Ok(summary) => tracing::info!(
            "Sync completed: {} records in {} batches, {} state messages",
            summary.records,
            summary.batches,
            summary.states
        ),
        Err(e) => tracing::error!("Sync failed: {}", e),
    }

    result.map(|_| ())
}
