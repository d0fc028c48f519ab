//! Listing parser error types

use thiserror::Error;

/// Errors for a single listing line. Never fatal to the listing as a whole:
/// the parser logs the error, skips the line and carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListingError {
    /// Line does not match the dialect's layout
    #[error("Could not match listing line: {0}")]
    Unmatched(String),

    /// Line has fewer columns than the dialect needs
    #[error("Missing columns in listing line: {0}")]
    MissingColumns(String),

    /// Date column could not be parsed
    #[error("Invalid listing date: {0}")]
    InvalidDate(String),

    /// Link could not be resolved against the listing URL
    #[error("Invalid link {link}: {reason}")]
    InvalidLink { link: String, reason: String },
}

/// Result type alias for listing operations
pub type ListingResult<T> = Result<T, ListingError>;
