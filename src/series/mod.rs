//! Time-Series Range Resolver
//!
//! Computes the concrete `[start, end]` bucket window for a query given the
//! network's timezone rules:
//!
//! - **types**: `Network`, `TimeInterval`, `TimePeriod`
//! - **window**: `TimeSeries` query, `TimeSeriesWindow` result, `resolve`
//! - **error**: `RangeError`
//!
//! Resolution is pure and holds no shared state; windows can be resolved
//! concurrently from any number of callers.

pub mod error;
pub mod types;
pub mod window;

pub use error::{RangeError, RangeResult};
pub use types::{Network, TimeInterval, TimePeriod};
pub use window::{resolve, TimeSeries, TimeSeriesWindow};
