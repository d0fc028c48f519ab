//! Numeric integration of power series
//!
//! Every operation is checked: a feed value large enough to overflow the
//! decimal range yields `EnergyError::Overflow` instead of a panic.

use crate::energy::error::{EnergyError, EnergyResult};
use rust_decimal::Decimal;

/// Significant digits carried through every intermediate result
pub const PRECISION: u32 = 9;

/// Largest bucket accepted by `energy_sum` (one leap year)
pub const MAX_BUCKET_MINUTES: i64 = 366 * 24 * 60;

/// A sample positioned on the bucket's time axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    /// Power value (nulls already zeroed)
    pub value: Decimal,
    /// Minutes from the bucket start
    pub offset: Decimal,
}

/// Round to the working precision
fn fixed(value: Decimal) -> Decimal {
    value.round_sf(PRECISION).unwrap_or(value)
}

fn add(a: Decimal, b: Decimal) -> EnergyResult<Decimal> {
    a.checked_add(b).map(fixed).ok_or(EnergyError::Overflow)
}

fn sub(a: Decimal, b: Decimal) -> EnergyResult<Decimal> {
    a.checked_sub(b).map(fixed).ok_or(EnergyError::Overflow)
}

fn mul(a: Decimal, b: Decimal) -> EnergyResult<Decimal> {
    a.checked_mul(b).map(fixed).ok_or(EnergyError::Overflow)
}

fn div(a: Decimal, b: Decimal) -> EnergyResult<Decimal> {
    a.checked_div(b).map(fixed).ok_or(EnergyError::Overflow)
}

/// Canonical output form: `digits` significant figures, trailing zeros dropped
pub fn sigfig_compact(value: Decimal, digits: u32) -> Decimal {
    if value.is_zero() {
        return Decimal::ZERO;
    }
    value.round_sf(digits).unwrap_or(value).normalize()
}

/// Trapezoidal area between two consecutive points
fn trapezoid(p1: &Point, p2: &Point) -> EnergyResult<Decimal> {
    let width = sub(p2.offset, p1.offset)?;
    let rect = mul(p1.value, width)?;
    let tri = div(mul(sub(p2.value, p1.value)?, width)?, Decimal::TWO)?;
    add(rect, tri)
}

/// Sum of trapezoids across `points`, in power x minutes.
///
/// Points are sorted by offset first, so input order does not matter.
pub fn integrate_points(mut points: Vec<Point>) -> EnergyResult<Decimal> {
    points.sort_by(|a, b| a.offset.cmp(&b.offset));

    points.windows(2).try_fold(Decimal::ZERO, |area, pair| {
        add(area, trapezoid(&pair[0], &pair[1])?)
    })
}

/// Energy for one bucket from evenly spread samples.
///
/// Nulls count as zero power but still occupy a slot on the time axis. Sample
/// `i` sits at `i * bucket_minutes / len`; the trapezoidal area is converted
/// from power-minutes to power-hours.
pub fn energy_sum(series: &[Option<Decimal>], bucket_minutes: Decimal) -> EnergyResult<Decimal> {
    if series.len() < 2 {
        return Err(EnergyError::SeriesTooShort(series.len()));
    }

    if bucket_minutes <= Decimal::ZERO || bucket_minutes > Decimal::from(MAX_BUCKET_MINUTES) {
        return Err(EnergyError::InvalidBucketSize(bucket_minutes));
    }

    if !bucket_minutes.fract().is_zero() {
        return Err(EnergyError::FractionalBucketSize(bucket_minutes));
    }

    let interval_size = div(bucket_minutes, Decimal::from(series.len()))?;

    let points = series
        .iter()
        .enumerate()
        .map(|(i, v)| {
            Ok(Point {
                value: v.unwrap_or(Decimal::ZERO),
                offset: mul(Decimal::from(i), interval_size)?,
            })
        })
        .collect::<EnergyResult<Vec<_>>>()?;

    let area = integrate_points(points)?;

    Ok(sigfig_compact(div(area, Decimal::from(60))?, PRECISION))
}

/// Per-bucket energy for a series of fixed-interval samples.
///
/// The series is cut into windows of `intervals_per_bucket + 1` samples that
/// share their boundary sample with the neighbouring window. Each window is
/// weighted `[1, 2, 2, ..., 2, 1]` (composite trapezoid) and scaled by
/// `buckets_per_hour / intervals_per_hour`, i.e. `(bucket / 60) / (60 /
/// interval)`. A trailing short window yields a partial bucket.
pub fn energy_sum_averages(
    series: &[Option<Decimal>],
    bucket_minutes: u32,
    interval_minutes: u32,
) -> EnergyResult<Vec<Decimal>> {
    if interval_minutes == 0 || 60 % interval_minutes != 0 {
        return Err(EnergyError::InvalidIntervalSize(interval_minutes));
    }

    if bucket_minutes == 0 || bucket_minutes % interval_minutes != 0 {
        return Err(EnergyError::IntervalMismatch {
            bucket: bucket_minutes,
            interval: interval_minutes,
        });
    }

    if series.len() < 2 {
        return Err(EnergyError::SeriesTooShort(series.len()));
    }

    let intervals_per_bucket = (bucket_minutes / interval_minutes) as usize;
    let buckets_per_hour = div(Decimal::from(bucket_minutes), Decimal::from(60))?;
    let intervals_per_hour = Decimal::from(60 / interval_minutes);

    let mut buckets = Vec::with_capacity(series.len() / intervals_per_bucket + 1);
    let mut start = 0;

    while start + 1 < series.len() {
        let end = (start + intervals_per_bucket + 1).min(series.len());
        let chunk = &series[start..end];
        let last = chunk.len() - 1;

        let weighted = chunk
            .iter()
            .enumerate()
            .try_fold(Decimal::ZERO, |sum, (i, v)| {
                let weight = if i == 0 || i == last {
                    Decimal::ONE
                } else {
                    Decimal::TWO
                };
                add(sum, mul(v.unwrap_or(Decimal::ZERO), weight)?)
            })?;

        let energy = div(mul(buckets_per_hour, weighted)?, intervals_per_hour)?;
        buckets.push(sigfig_compact(energy, PRECISION));
        start += intervals_per_bucket;
    }

    Ok(buckets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn series(values: &[&str]) -> Vec<Option<Decimal>> {
        values.iter().map(|v| Some(d(v))).collect()
    }

    #[test]
    fn test_constant_power() {
        let k = 6;
        let v = d("100");
        let result = energy_sum(&vec![Some(v); k], d("30")).unwrap();

        // k samples span (k - 1) / k of the bucket
        let expected = v * d("30") / d("60") * Decimal::from(k - 1) / Decimal::from(k);
        assert!((result - expected).abs() < d("0.000001"), "{result} vs {expected}");

        let nominal = v * d("30") / d("60");
        assert!((result - nominal).abs() <= nominal / Decimal::from(k));
    }

    #[test]
    fn test_constant_power_converges_with_many_samples() {
        let v = d("42.5");
        let result = energy_sum(&vec![Some(v); 1000], d("60")).unwrap();

        assert!((result - v).abs() < d("0.05"));
    }

    #[test]
    fn test_linear_ramp() {
        // 0, 10, 20, 30 over 40 minutes: points at 0, 10, 20, 30 minutes
        let result = energy_sum(&series(&["0", "10", "20", "30"]), d("40")).unwrap();

        // area = 5*10 + 15*10 + 25*10 = 450 MW.min = 7.5 MWh
        assert_eq!(result, d("7.5"));
    }

    #[test]
    fn test_nulls_are_zero_power() {
        let with_null = vec![Some(d("10")), None, Some(d("10"))];
        let with_zero = series(&["10", "0", "10"]);

        assert_eq!(
            energy_sum(&with_null, d("30")).unwrap(),
            energy_sum(&with_zero, d("30")).unwrap()
        );
    }

    #[test]
    fn test_precondition_errors() {
        assert_eq!(
            energy_sum(&[], d("30")),
            Err(EnergyError::SeriesTooShort(0))
        );
        assert_eq!(
            energy_sum(&series(&["1"]), d("30")),
            Err(EnergyError::SeriesTooShort(1))
        );
        assert_eq!(
            energy_sum(&series(&["1", "2"]), d("0")),
            Err(EnergyError::InvalidBucketSize(d("0")))
        );
        assert_eq!(
            energy_sum(&series(&["1", "2"]), d("-5")),
            Err(EnergyError::InvalidBucketSize(d("-5")))
        );
        assert!(matches!(
            energy_sum(&series(&["1", "2"]), Decimal::from(MAX_BUCKET_MINUTES + 1)),
            Err(EnergyError::InvalidBucketSize(_))
        ));
        assert_eq!(
            energy_sum(&series(&["1", "2"]), d("7.5")),
            Err(EnergyError::FractionalBucketSize(d("7.5")))
        );
    }

    #[test]
    fn test_integration_is_order_independent() {
        let points: Vec<Point> = ["3", "8.25", "1", "0", "12.125"]
            .iter()
            .enumerate()
            .map(|(i, v)| Point {
                value: d(v),
                offset: Decimal::from(i as i64 * 5),
            })
            .collect();

        let forward = integrate_points(points.clone()).unwrap();

        let mut reversed = points.clone();
        reversed.reverse();
        let mut interleaved = points.clone();
        interleaved.swap(0, 3);
        interleaved.swap(1, 4);

        assert_eq!(integrate_points(reversed).unwrap(), forward);
        assert_eq!(integrate_points(interleaved).unwrap(), forward);
    }

    #[test]
    fn test_precision_is_bounded() {
        let result = energy_sum(&series(&["1", "1", "1"]), d("7")).unwrap();
        let digits = result.mantissa().abs().to_string().len();
        assert!(digits <= PRECISION as usize);
    }

    #[test]
    fn test_energy_sum_averages_constant() {
        // 30 minute buckets of 5 minute intervals, 2 buckets share sample 6
        let values = vec![Some(d("100")); 13];
        let result = energy_sum_averages(&values, 30, 5).unwrap();

        assert_eq!(result, vec![d("50"), d("50")]);
    }

    #[test]
    fn test_energy_sum_averages_weights() {
        // weights [1, 2, 1] over one 10 minute bucket of 5 minute intervals
        let result = energy_sum_averages(&series(&["0", "36", "72"]), 10, 5).unwrap();

        // (0 + 72 + 72) * (10 / 60) / 12 = 2
        assert_eq!(result, vec![d("2")]);
    }

    #[test]
    fn test_energy_sum_averages_hourly_buckets() {
        // one 60 minute bucket: weighted sum 2400, scaled by 1 / 12
        let values = vec![Some(d("100")); 13];
        assert_eq!(energy_sum_averages(&values, 60, 5).unwrap(), vec![d("200")]);

        // 15 minute buckets of 15 minute intervals: (100 + 100) * 0.25 / 4
        let quarter = vec![Some(d("100")); 3];
        assert_eq!(
            energy_sum_averages(&quarter, 15, 15).unwrap(),
            vec![d("12.5"), d("12.5")]
        );
    }

    #[test]
    fn test_huge_values_overflow_instead_of_panicking() {
        assert_eq!(
            energy_sum(&[Some(Decimal::MAX), Some(Decimal::MAX)], d("60")),
            Err(EnergyError::Overflow)
        );
        assert_eq!(
            energy_sum_averages(&[Some(Decimal::MAX), Some(Decimal::MAX)], 5, 5),
            Err(EnergyError::Overflow)
        );
        assert_eq!(
            energy_sum(&[Some(Decimal::MIN), Some(Decimal::MAX)], d("30")),
            Err(EnergyError::Overflow)
        );
    }

    #[test]
    fn test_energy_sum_averages_preconditions() {
        assert_eq!(
            energy_sum_averages(&series(&["1", "2"]), 30, 7),
            Err(EnergyError::InvalidIntervalSize(7))
        );
        assert_eq!(
            energy_sum_averages(&series(&["1", "2"]), 25, 10),
            Err(EnergyError::IntervalMismatch {
                bucket: 25,
                interval: 10
            })
        );
        assert_eq!(
            energy_sum_averages(&series(&["1"]), 30, 5),
            Err(EnergyError::SeriesTooShort(1))
        );
    }

    #[test]
    fn test_sigfig_compact() {
        assert_eq!(sigfig_compact(d("123.456789123"), 4), d("123.5"));
        assert_eq!(sigfig_compact(d("50.000"), 9).to_string(), "50");
        assert_eq!(sigfig_compact(Decimal::ZERO, 4), Decimal::ZERO);
    }
}
