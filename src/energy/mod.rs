//! Energy Series Engine
//!
//! Integrates raw power samples (MW) over a bucket into energy (MWh):
//!
//! - **integrate**: trapezoidal `energy_sum` and composite `energy_sum_averages`
//! - **buckets**: grouping of stored samples into aligned `EnergyBucket`s
//! - **error**: `EnergyError`
//!
//! Arithmetic uses `rust_decimal` rounded to nine significant digits after
//! every operation, so long sums of small terms do not drift. Every function
//! here is pure and safe to call concurrently.

pub mod buckets;
pub mod error;
pub mod integrate;

pub use buckets::{derive_buckets, EnergyBucket};
pub use error::{EnergyError, EnergyResult};
pub use integrate::{
    energy_sum, energy_sum_averages, integrate_points, sigfig_compact, Point,
    MAX_BUCKET_MINUTES, PRECISION,
};
