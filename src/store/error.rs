//! Store error types
//!
//! Defines all errors that can occur while persisting samples or crawl progress.

use thiserror::Error;

/// Errors that can occur in the store layer
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite operation failed (including constraint violations other than
    /// the natural-key conflict handled by the upsert)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be read back
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),

    /// Batch still failing after the retry budget
    #[error("Batch failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl StoreError {
    /// Contention that may clear on its own: lock poisoning races and SQLite
    /// busy/locked results. Constraint violations and corruption are not.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Lock(_) => true,
            StoreError::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
