//! Bucketed energy derivation
//!
//! Samples are grouped per entity and aligned to fixed-width buckets counted
//! from the Unix epoch in local wall-clock minutes. A bucket covers
//! `[bucket_start, bucket_end]` inclusively, so a sample sitting exactly on a
//! boundary contributes to both neighbours.

use crate::energy::error::{EnergyError, EnergyResult};
use crate::energy::integrate::energy_sum;
use crate::store::RawSample;
use chrono::{Duration, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Energy (MWh) for one entity over one bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyBucket {
    pub entity_code: String,
    pub bucket_start: NaiveDateTime,
    pub bucket_end: NaiveDateTime,
    pub energy_value: Decimal,
}

fn floor_to_bucket(ts: NaiveDateTime, bucket_minutes: i64) -> NaiveDateTime {
    let seconds = ts.and_utc().timestamp();
    let floored = seconds.div_euclid(60 * bucket_minutes) * 60 * bucket_minutes;
    ts - Duration::seconds(seconds - floored)
}

/// Derive energy buckets from raw power samples.
///
/// Buckets holding fewer than two samples are skipped since there is nothing
/// to integrate. Output is ordered by entity, then bucket start.
pub fn derive_buckets(samples: &[RawSample], bucket_minutes: u32) -> EnergyResult<Vec<EnergyBucket>> {
    if bucket_minutes == 0 {
        return Err(EnergyError::InvalidBucketSize(Decimal::ZERO));
    }

    let width = i64::from(bucket_minutes);
    let bucket_size = Decimal::from(bucket_minutes);

    let mut by_entity: BTreeMap<&str, BTreeMap<NaiveDateTime, Option<Decimal>>> = BTreeMap::new();
    for sample in samples {
        by_entity
            .entry(sample.entity_code.as_str())
            .or_default()
            .insert(sample.timestamp, sample.value);
    }

    let mut buckets = Vec::new();

    for (entity, series) in by_entity {
        let mut starts = BTreeSet::new();
        for ts in series.keys() {
            let start = floor_to_bucket(*ts, width);
            starts.insert(start);
            if start == *ts {
                starts.insert(start - Duration::minutes(width));
            }
        }

        for start in starts {
            let end = start + Duration::minutes(width);
            let values: Vec<Option<Decimal>> = series.range(start..=end).map(|(_, v)| *v).collect();

            if values.len() < 2 {
                continue;
            }

            buckets.push(EnergyBucket {
                entity_code: entity.to_string(),
                bucket_start: start,
                bucket_end: end,
                energy_value: energy_sum(&values, bucket_size)?,
            });
        }
    }

    Ok(buckets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn five_minute_series(entity: &str, from: &str, count: i64, value: Option<Decimal>) -> Vec<RawSample> {
        (0..count)
            .map(|i| RawSample::new(entity, ts(from) + Duration::minutes(5 * i), value))
            .collect()
    }

    fn close_to(actual: Decimal, expected: &str) -> bool {
        let expected: Decimal = expected.parse().unwrap();
        (actual - expected).abs() < Decimal::new(1, 4)
    }

    #[test]
    fn test_boundary_samples_shared_between_buckets() {
        let samples = five_minute_series("BAYSW1", "2020-06-11 00:00", 13, Some(Decimal::from(100)));
        let buckets = derive_buckets(&samples, 30).unwrap();

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].bucket_start, ts("2020-06-11 00:00"));
        assert_eq!(buckets[0].bucket_end, ts("2020-06-11 00:30"));
        assert_eq!(buckets[1].bucket_start, ts("2020-06-11 00:30"));

        // seven samples spread over the bucket: 100 * 0.5 * 6/7
        assert!(close_to(buckets[0].energy_value, "42.857142857"));
        assert_eq!(buckets[0].energy_value, buckets[1].energy_value);
    }

    #[test]
    fn test_unaligned_samples_floor_to_bucket() {
        let samples = five_minute_series("ER01", "2020-06-11 00:05", 5, Some(Decimal::from(10)));
        let buckets = derive_buckets(&samples, 30).unwrap();

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].bucket_start, ts("2020-06-11 00:00"));
    }

    #[test]
    fn test_nulls_count_as_zero_power() {
        let mut samples = five_minute_series("ER01", "2020-06-11 00:00", 7, Some(Decimal::from(60)));
        for sample in samples.iter_mut().skip(3) {
            sample.value = None;
        }
        let with_nulls = derive_buckets(&samples, 30).unwrap();

        let full = derive_buckets(
            &five_minute_series("ER01", "2020-06-11 00:00", 7, Some(Decimal::from(60))),
            30,
        )
        .unwrap();

        assert!(with_nulls[0].energy_value < full[0].energy_value);
        assert!(with_nulls[0].energy_value > Decimal::ZERO);
    }

    #[test]
    fn test_entities_kept_apart_and_ordered() {
        let mut samples = five_minute_series("ZZ01", "2020-06-11 00:00", 7, Some(Decimal::ONE));
        samples.extend(five_minute_series("AA01", "2020-06-11 00:00", 7, Some(Decimal::TWO)));

        let buckets = derive_buckets(&samples, 30).unwrap();
        let entities: Vec<_> = buckets.iter().map(|b| b.entity_code.as_str()).collect();

        assert_eq!(entities, vec!["AA01", "ZZ01"]);
        assert!(buckets[0].energy_value > buckets[1].energy_value);
    }

    #[test]
    fn test_single_sample_buckets_skipped() {
        let samples = vec![RawSample::new("ER01", ts("2020-06-11 00:10"), Some(Decimal::ONE))];
        assert!(derive_buckets(&samples, 30).unwrap().is_empty());
    }

    #[test]
    fn test_zero_bucket_rejected() {
        let samples = five_minute_series("ER01", "2020-06-11 00:00", 3, Some(Decimal::ONE));
        assert_eq!(
            derive_buckets(&samples, 0),
            Err(EnergyError::InvalidBucketSize(Decimal::ZERO))
        );
    }
}
