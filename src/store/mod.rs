//! Idempotent Store
//!
//! Persists decoded samples keyed by `(timestamp, entity_code)`:
//!
//! - **types**: `RawSample`, `SampleKey`
//! - **sqlite**: `SampleStore` trait and the SQLite upsert backend
//! - **stage**: batching pipeline stage with retry and backoff
//! - **error**: `StoreError`

pub mod error;
pub mod sqlite;
pub mod stage;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use sqlite::{SampleStore, SqliteSampleStore};
pub use stage::StoreStage;
pub use types::{RawSample, SampleKey};
