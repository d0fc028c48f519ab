//! Range resolver error types

use thiserror::Error;

/// Errors raised while resolving a time-series query window
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    /// Requested year lies after the window end
    #[error("Requested year {year} is after the end year {end_year}")]
    YearAfterEnd { year: i32, end_year: i32 },

    /// Year cannot be represented as a calendar date
    #[error("Invalid year: {0}")]
    InvalidYear(i32),

    /// Date arithmetic left the representable range
    #[error("Date out of range: {0}")]
    OutOfRange(String),

    /// Interval string not recognised (e.g. "5m", "1d", "1M")
    #[error("Unknown interval: {0}")]
    UnknownInterval(String),

    /// Period string not recognised (e.g. "7d", "1Y", "all")
    #[error("Unknown period: {0}")]
    UnknownPeriod(String),

    /// Network code not recognised
    #[error("Unknown network: {0}")]
    UnknownNetwork(String),
}

/// Result type alias for range resolution
pub type RangeResult<T> = Result<T, RangeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RangeError::YearAfterEnd {
            year: 2030,
            end_year: 2021,
        };
        assert_eq!(
            err.to_string(),
            "Requested year 2030 is after the end year 2021"
        );
    }
}
