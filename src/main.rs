//! Gridfeed
//!
//! Runs the configured crawl sources once and prints each run summary as JSON.

use anyhow::Context;
use clap::Parser;
use gridfeed::{generate_default_config, Config, Crawler, LoggingConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gridfeed")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Incremental energy-market data ingestion")]
struct Cli {
    /// Config file (default: search the usual locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only crawl this source
    #[arg(short, long)]
    source: Option<String>,

    /// Print a default config file and exit
    #[arg(long)]
    print_config: bool,
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("gridfeed={}", logging.level)));

    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", generate_default_config());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load_default(),
    };

    init_logging(&config.logging);
    tracing::info!("Gridfeed v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Database: {:?}", config.storage.database_path());

    let sources = match &cli.source {
        Some(name) => vec![config.source(name)?.clone()],
        None => config.sources.clone(),
    };

    if sources.is_empty() {
        tracing::warn!("No sources configured");
        return Ok(());
    }

    let crawler = Crawler::from_config(&config)?;
    let mut failed = 0;

    for (source, result) in sources.iter().zip(crawler.run_all(&sources).await) {
        match result {
            Ok(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
            Err(e) => {
                tracing::error!("Crawl of {} failed: {}", source.name, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} sources failed", failed, sources.len());
    }

    Ok(())
}
