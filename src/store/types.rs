//! Stored sample types

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single raw interval sample, e.g. one unit's SCADA reading.
///
/// Unique by `(timestamp, entity_code)`. Timestamps are network-local
/// wall-clock times as published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    /// Generating unit or market entity (e.g. a DUID)
    pub entity_code: String,
    /// Interval end time
    pub timestamp: NaiveDateTime,
    /// Reading; `None` when published empty
    pub value: Option<Decimal>,
}

impl RawSample {
    pub fn new(
        entity_code: impl Into<String>,
        timestamp: NaiveDateTime,
        value: Option<Decimal>,
    ) -> Self {
        Self {
            entity_code: entity_code.into(),
            timestamp,
            value,
        }
    }

    /// Natural key
    pub fn key(&self) -> SampleKey {
        SampleKey {
            timestamp: self.timestamp,
            entity_code: self.entity_code.clone(),
        }
    }
}

/// Natural composite key of a stored sample
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleKey {
    pub timestamp: NaiveDateTime,
    pub entity_code: String,
}

/// Storage format for timestamps; sorts lexically in time order
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
