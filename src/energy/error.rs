//! Energy engine error types
//!
//! All of these are argument errors: retrying with the same inputs fails the
//! same way. `Overflow` points at an out-of-range sample value.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by the energy integration functions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnergyError {
    /// Fewer than two samples; nothing to integrate between
    #[error("Series requires at least two values, got {0}")]
    SeriesTooShort(usize),

    /// Bucket size is zero, negative or above the ceiling
    #[error("Invalid bucket size: {0} minutes")]
    InvalidBucketSize(Decimal),

    /// Bucket size is not a whole number of minutes
    #[error("Bucket size is not a round number of minutes: {0}")]
    FractionalBucketSize(Decimal),

    /// Interval does not divide the bucket
    #[error("Interval of {interval} minutes does not divide a {bucket} minute bucket")]
    IntervalMismatch { bucket: u32, interval: u32 },

    /// Interval does not divide an hour
    #[error("Invalid interval size: {0} minutes")]
    InvalidIntervalSize(u32),

    /// A sample value pushed the arithmetic outside the decimal range
    #[error("Arithmetic overflow integrating series")]
    Overflow,
}

/// Result type alias for energy operations
pub type EnergyResult<T> = Result<T, EnergyError>;
