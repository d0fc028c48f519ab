//! Query window resolution
//!
//! Turns a loose query (end, period, interval, optional year) into the
//! concrete bucket-aligned window used to fetch and validate sample ranges.
//!
//! ```text
//! [start] === buckets === [end]      end is the most recent bucket
//! ```
//!
//! Sub-daily windows are exclusive of `start` and inclusive of `end`: a value
//! stamped `t` represents the interval ending at `t`, so the resolved start is
//! shifted forward by one interval.

use crate::series::error::{RangeError, RangeResult};
use crate::series::types::{Network, TimeInterval, TimePeriod};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

/// A resolved, bucket-aligned query window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeriesWindow {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub interval: TimeInterval,
    pub network: Network,
}

impl TimeSeriesWindow {
    pub fn new(
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        interval: TimeInterval,
        network: Network,
    ) -> Self {
        Self {
            start,
            end,
            interval,
            network,
        }
    }

    /// Start as a calendar date (meaningful for daily or longer intervals)
    pub fn start_date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    /// End as a calendar date
    pub fn end_date(&self) -> NaiveDate {
        self.end.date_naive()
    }

    /// Number of buckets in the window, inclusive of the starting bucket.
    ///
    /// Steps from `start` by the interval until reaching or passing `end`.
    pub fn length(&self) -> usize {
        let mut count = 1;

        if self.interval.is_daily_or_longer() {
            let end = self.end_date();
            let mut cursor = self.start_date();
            while cursor < end {
                match self.interval.step_date(cursor) {
                    Some(next) if next > cursor => cursor = next,
                    _ => break,
                }
                count += 1;
            }
        } else {
            let end = self.end.naive_utc();
            let mut cursor = self.start.naive_utc();
            while cursor < end {
                // a zero-width interval never advances
                match self.interval.step(cursor) {
                    Some(next) if next > cursor => cursor = next,
                    _ => break,
                }
                count += 1;
            }
        }

        count
    }

    /// Bucket start times in network-local time, oldest first
    pub fn bucket_starts(&self) -> Vec<NaiveDateTime> {
        let offset = self.network.fixed_offset();
        let mut cursor = if self.interval.is_daily_or_longer() {
            self.start_date().and_time(NaiveTime::MIN)
        } else {
            self.start.with_timezone(&offset).naive_local()
        };

        let mut starts = Vec::with_capacity(self.length());
        for _ in 0..self.length() {
            starts.push(cursor);
            match self.interval.step(cursor) {
                Some(next) => cursor = next,
                None => break,
            }
        }
        starts
    }
}

/// A time-series query prior to resolution
#[derive(Debug, Clone)]
pub struct TimeSeries {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub network: Network,
    pub interval: TimeInterval,
    pub period: TimePeriod,
    pub year: Option<i32>,
}

impl TimeSeries {
    /// Resolve against the network's current year
    pub fn resolve(&self) -> RangeResult<TimeSeriesWindow> {
        self.resolve_at(self.network.today().year())
    }

    /// Resolve treating `current_year` as "this year" (the year whose end is
    /// left open rather than clamped to Dec 31)
    pub fn resolve_at(&self, current_year: i32) -> RangeResult<TimeSeriesWindow> {
        let mut start = self.start;
        let mut end = self.end;
        let mut year = self.year;

        if self.period != TimePeriod::All {
            start = self.period.subtract_from(end).ok_or_else(|| {
                RangeError::OutOfRange(format!("{:?} before {}", self.period, end))
            })?;
        } else {
            start = replace_naive(start, self.interval.truncate(start.naive_local()));
            end = replace_naive(end, end_of_last_month(end.naive_local())?);
            year = None;
        }

        if let Some(year) = year {
            if year > end.year() {
                return Err(RangeError::YearAfterEnd {
                    year,
                    end_year: end.year(),
                });
            }

            let jan_first = NaiveDate::from_ymd_opt(year, 1, 1)
                .ok_or(RangeError::InvalidYear(year))?
                .and_time(start.naive_local().time());
            start = replace_naive(start, self.interval.truncate(jan_first));

            if year != current_year {
                let dec_last = NaiveDate::from_ymd_opt(year, 12, 31)
                    .ok_or(RangeError::InvalidYear(year))?
                    .and_time(NaiveTime::MIN);
                end = replace_naive(end, dec_last);
            }
        }

        if !self.interval.is_daily_or_longer() {
            start = start
                .checked_add_signed(Duration::minutes(i64::from(self.interval.minutes())))
                .ok_or_else(|| RangeError::OutOfRange(format!("{} + {}", start, self.interval)))?;

            let offset = self.network.fixed_offset();
            start = start.with_timezone(&offset);
            end = end.with_timezone(&offset);
        }

        Ok(TimeSeriesWindow::new(start, end, self.interval, self.network))
    }
}

/// Resolve a query window. See [`TimeSeries::resolve`].
pub fn resolve(
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    network: Network,
    interval: TimeInterval,
    period: TimePeriod,
    year: Option<i32>,
) -> RangeResult<TimeSeriesWindow> {
    TimeSeries {
        start,
        end,
        network,
        interval,
        period,
        year,
    }
    .resolve()
}

/// Keep the offset of `dt` but replace its local wall-clock time
fn replace_naive(dt: DateTime<FixedOffset>, local: NaiveDateTime) -> DateTime<FixedOffset> {
    let offset = *dt.offset();
    DateTime::from_naive_utc_and_offset(
        local - Duration::seconds(i64::from(offset.local_minus_utc())),
        offset,
    )
}

/// Midnight on the last day of the month before `dt`
fn end_of_last_month(dt: NaiveDateTime) -> RangeResult<NaiveDateTime> {
    dt.date()
        .with_day(1)
        .and_then(|first| first.pred_opt())
        .map(|d| d.and_time(NaiveTime::MIN))
        .ok_or_else(|| RangeError::OutOfRange(format!("month before {}", dt)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn series(
        start: &str,
        end: &str,
        interval: TimeInterval,
        period: TimePeriod,
        year: Option<i32>,
    ) -> TimeSeries {
        TimeSeries {
            start: at(start),
            end: at(end),
            network: Network::Nem,
            interval,
            period,
            year,
        }
    }

    #[test]
    fn test_period_subtracts_from_end() {
        let ts = series(
            "2020-01-01T00:00:00+10:00",
            "2021-03-15T00:00:00+10:00",
            TimeInterval::Day,
            TimePeriod::Days(7),
            None,
        );
        let window = ts.resolve_at(2021).unwrap();

        assert_eq!(window.start, at("2021-03-08T00:00:00+10:00"));
        assert_eq!(window.end, at("2021-03-15T00:00:00+10:00"));
        assert_eq!(window.length(), 8);
    }

    #[test]
    fn test_sub_daily_shifts_start_and_localizes() {
        let ts = series(
            "2020-01-01T00:00:00Z",
            "2021-03-15T00:00:00Z",
            TimeInterval::Minutes(5),
            TimePeriod::Days(1),
            None,
        );
        let window = ts.resolve_at(2021).unwrap();

        assert_eq!(window.start, at("2021-03-14T00:05:00Z"));
        assert_eq!(window.start.offset().local_minus_utc(), 36000);
        assert_eq!(window.end.offset().local_minus_utc(), 36000);
        assert_eq!(window.end, at("2021-03-15T10:00:00+10:00"));
        // 24h of 5-minute buckets, start exclusive
        assert_eq!(window.length(), 288);
    }

    #[test]
    fn test_period_all_truncates_and_clips_to_last_month() {
        let ts = series(
            "2018-12-03T13:47:00+10:00",
            "2021-03-15T09:30:00+10:00",
            TimeInterval::Month,
            TimePeriod::All,
            Some(2019),
        );
        let window = ts.resolve_at(2021).unwrap();

        assert_eq!(window.start, at("2018-12-01T00:00:00+10:00"));
        assert_eq!(window.end, at("2021-02-28T00:00:00+10:00"));
    }

    #[test]
    fn test_year_clamps_start_and_end() {
        let ts = series(
            "2018-06-03T00:00:00+10:00",
            "2021-03-15T00:00:00+10:00",
            TimeInterval::Day,
            TimePeriod::Years(5),
            Some(2019),
        );
        let window = ts.resolve_at(2021).unwrap();

        assert_eq!(window.start_date(), NaiveDate::from_ymd_opt(2019, 1, 1).unwrap());
        assert_eq!(window.end_date(), NaiveDate::from_ymd_opt(2019, 12, 31).unwrap());
        assert_eq!(window.length(), 365);
    }

    #[test]
    fn test_current_year_leaves_end_open() {
        let ts = series(
            "2018-06-03T00:00:00+10:00",
            "2021-03-15T00:00:00+10:00",
            TimeInterval::Day,
            TimePeriod::Years(1),
            Some(2021),
        );
        let window = ts.resolve_at(2021).unwrap();

        assert_eq!(window.start_date(), NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
        assert_eq!(window.end_date(), NaiveDate::from_ymd_opt(2021, 3, 15).unwrap());
    }

    #[test]
    fn test_year_after_end_is_rejected() {
        let ts = series(
            "2020-01-01T00:00:00+10:00",
            "2021-03-15T00:00:00+10:00",
            TimeInterval::Day,
            TimePeriod::Days(7),
            Some(2022),
        );

        assert_eq!(
            ts.resolve_at(2021),
            Err(RangeError::YearAfterEnd {
                year: 2022,
                end_year: 2021
            })
        );
    }

    #[test]
    fn test_length_counts_inclusive_buckets() {
        let window = TimeSeriesWindow::new(
            at("2020-01-01T00:00:00+10:00"),
            at("2020-01-01T01:00:00+10:00"),
            TimeInterval::Minutes(5),
            Network::Nem,
        );

        assert_eq!(window.length(), 13);
        assert_eq!(window.bucket_starts().len(), 13);
    }

    #[test]
    fn test_zero_minute_interval_terminates() {
        let window = TimeSeriesWindow::new(
            at("2020-01-01T00:00:00+10:00"),
            at("2020-01-01T01:00:00+10:00"),
            TimeInterval::Minutes(0),
            Network::Nem,
        );

        assert_eq!(window.length(), 1);
        assert_eq!(window.bucket_starts().len(), 1);
    }

    #[test]
    fn test_length_stable_across_dst_transition() {
        // Sydney moves clocks forward on 2020-10-04; fixed offset ignores it
        let window = TimeSeriesWindow::new(
            at("2020-10-04T00:00:00+10:00"),
            at("2020-10-05T00:00:00+10:00"),
            TimeInterval::Minutes(30),
            Network::Nem,
        );

        assert_eq!(window.length(), 49);
    }

    #[test]
    fn test_daily_length_ignores_time_of_day() {
        let window = TimeSeriesWindow::new(
            at("2021-01-01T23:00:00+10:00"),
            at("2021-01-03T01:00:00+10:00"),
            TimeInterval::Day,
            Network::Nem,
        );

        assert_eq!(window.length(), 3);
    }
}
