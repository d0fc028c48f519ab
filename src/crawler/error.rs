//! Crawler error types
//!
//! These abort a whole crawl run. Per-file failures are tallied in the run
//! summary instead.

use crate::config::ConfigError;
use crate::frontier::FrontierError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Frontier error: {0}")]
    Frontier(#[from] FrontierError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Client(String),

    /// Every listing page of the source failed to load
    #[error("No listing could be fetched for {0}")]
    NoListings(String),
}

/// Result type alias for crawl operations
pub type CrawlResult<T> = Result<T, CrawlError>;
