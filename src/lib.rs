//! # Gridfeed
//!
//! Incremental energy-market ingestion. Crawls remote directory listings of
//! published market files, decodes them into raw samples, stores those
//! samples idempotently, and integrates power samples into bucketed energy.
//!
//! ## Write path
//!
//! ```text
//! listing -> frontier -> pipeline (download, decompress, decode, split, transform) -> store
//! ```
//!
//! ## Modules
//!
//! - [`listing`]: directory listing parser
//! - [`frontier`]: entry selection and the per-source progress cursor
//! - [`pipeline`]: priority-ordered decode stages
//! - [`store`]: idempotent sample store
//! - [`energy`]: trapezoidal energy integration
//! - [`series`]: query window resolution with fixed network offsets
//! - [`crawler`]: per-source crawl runs over HTTP
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gridfeed::{Config, Crawler};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default();
//!     let crawler = Crawler::from_config(&config)?;
//!
//!     for source in &config.sources {
//!         let summary = crawler.run(source).await?;
//!         println!("{}: {} parsed, {} failed", summary.source, summary.parsed, summary.failed);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod energy;
pub mod frontier;
pub mod listing;
pub mod pipeline;
pub mod series;
pub mod store;

pub use config::{
    generate_default_config, Config, ConfigError, CrawlerConfig, LoggingConfig, SourceConfig,
    StorageConfig, ThrottleConfig,
};

pub use crawler::{CrawlError, CrawlResult, CrawlSummary, Crawler, CrawlerSettings, HttpFetcher};

pub use energy::{derive_buckets, energy_sum, energy_sum_averages, EnergyBucket, EnergyError};

pub use frontier::{select, CrawlProgress, EmissionOrder, ProgressStore, SqliteProgressStore};

pub use listing::{parse_listing, DirectoryEntry, DirectoryListing, ListingDialect};

pub use pipeline::{FetchError, Fetcher, FileReport, Pipeline, PipelineError, RetryPolicy};

pub use series::{resolve, Network, RangeError, TimeInterval, TimePeriod, TimeSeriesWindow};

pub use store::{RawSample, SampleStore, SqliteSampleStore, StoreError};
