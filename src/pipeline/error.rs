//! Decode pipeline error types
//!
//! Record-level errors (`Validation`) are absorbed by the stage that raised
//! them. Everything else aborts the current file only.

use crate::store::StoreError;
use thiserror::Error;

/// HTTP status codes worth retrying
pub const RETRY_HTTP_CODES: &[u16] = &[400, 403, 408, 429, 500, 502, 503, 504, 522, 524];

/// Errors fetching a remote document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    /// Body larger than the download limit; refetching will not shrink it
    #[error("{url} exceeds download limit ({size} > {limit} bytes)")]
    TooLarge { url: String, size: u64, limit: u64 },

    #[error("Gave up on {url} after {attempts} attempts: {last_error}")]
    Exhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },
}

impl FetchError {
    /// Timeouts, transport failures and the listed status codes are retried;
    /// each retry consumes one unit of the budget.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => RETRY_HTTP_CODES.contains(status),
            FetchError::TooLarge { .. } | FetchError::Exhausted { .. } => false,
        }
    }
}

/// Errors raised by pipeline stages
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Corrupt or unreadable archive
    #[error("Archive error in {file}: {message}")]
    Archive { file: String, message: String },

    /// Payload larger than the configured memory guard
    #[error("{file} exceeds memory guard ({size} > {limit} bytes)")]
    MemoryGuard { file: String, size: u64, limit: u64 },

    #[error("Decode error in {file}: {message}")]
    Decode { file: String, message: String },

    /// A single record failed validation
    #[error("Invalid record: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Errors that drop one record rather than the whole file
    pub fn is_record_level(&self) -> bool {
        matches!(self, PipelineError::Validation(_))
    }
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
