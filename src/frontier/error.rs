//! Crawl frontier error types

use crate::store::StoreError;
use thiserror::Error;

/// Errors raised while building filters or reading/committing progress
#[derive(Error, Debug)]
pub enum FrontierError {
    /// Filename regex filter does not compile
    #[error("Invalid filename pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Progress cursor could not be read or written
    #[error("Progress store error: {0}")]
    Progress(#[from] StoreError),
}

/// Result type alias for frontier operations
pub type FrontierResult<T> = Result<T, FrontierError>;
