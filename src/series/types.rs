//! Calendar types used by the range resolver
//!
//! - `Network`: market network with its fixed UTC offset
//! - `TimeInterval`: bucket size, with truncation and stepping rules
//! - `TimePeriod`: how far back from the window end a query reaches

use crate::series::error::RangeError;
use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveDateTime, Offset,
    Timelike, Utc,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A wholesale market network.
///
/// Networks publish timestamps in local standard time. Bucket alignment always
/// uses the network's fixed offset, never a DST-following zone, so a bucket
/// boundary computed for any historical date is stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Network {
    /// National Electricity Market (AEST, UTC+10:00)
    #[default]
    Nem,
    /// Wholesale Electricity Market (AWST, UTC+08:00)
    Wem,
}

impl Network {
    pub fn code(&self) -> &'static str {
        match self {
            Network::Nem => "NEM",
            Network::Wem => "WEM",
        }
    }

    /// Offset from UTC in seconds, ignoring daylight saving
    pub fn offset_seconds(&self) -> i32 {
        match self {
            Network::Nem => 10 * 3600,
            Network::Wem => 8 * 3600,
        }
    }

    /// The network's fixed UTC offset
    pub fn fixed_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.offset_seconds()).unwrap_or_else(|| Utc.fix())
    }

    /// Display zone name. Both zones are DST-free, matching the fixed offset.
    pub fn timezone(&self) -> &'static str {
        match self {
            Network::Nem => "Australia/Brisbane",
            Network::Wem => "Australia/Perth",
        }
    }

    /// Native dispatch interval of the network in minutes
    pub fn interval_minutes(&self) -> u32 {
        match self {
            Network::Nem => 5,
            Network::Wem => 30,
        }
    }

    /// Current calendar date in network time
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.fixed_offset()).date_naive()
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Network {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NEM" => Ok(Network::Nem),
            "WEM" => Ok(Network::Wem),
            other => Err(RangeError::UnknownNetwork(other.to_string())),
        }
    }
}

/// Bucket size of a time series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeInterval {
    /// Sub-daily bucket of N minutes (N < 1440)
    Minutes(u32),
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl TimeInterval {
    /// Nominal bucket width in minutes
    pub fn minutes(&self) -> u32 {
        match self {
            TimeInterval::Minutes(m) => *m,
            TimeInterval::Day => 1440,
            TimeInterval::Week => 7 * 1440,
            TimeInterval::Month => 30 * 1440,
            TimeInterval::Quarter => 91 * 1440,
            TimeInterval::Year => 365 * 1440,
        }
    }

    /// Buckets of a day or more are compared by calendar date only
    pub fn is_daily_or_longer(&self) -> bool {
        self.minutes() >= 1440
    }

    /// Human form, e.g. "5m", "1d", "1M"
    pub fn human(&self) -> String {
        match self {
            TimeInterval::Minutes(m) if m % 60 == 0 => format!("{}h", m / 60),
            TimeInterval::Minutes(m) => format!("{}m", m),
            TimeInterval::Day => "1d".to_string(),
            TimeInterval::Week => "1w".to_string(),
            TimeInterval::Month => "1M".to_string(),
            TimeInterval::Quarter => "1Q".to_string(),
            TimeInterval::Year => "1Y".to_string(),
        }
    }

    /// Floor a local datetime to this interval's boundary
    pub fn truncate(&self, dt: NaiveDateTime) -> NaiveDateTime {
        let midnight = dt.date().and_time(chrono::NaiveTime::MIN);
        match self {
            TimeInterval::Minutes(m) => {
                let m = (*m).max(1);
                let since_midnight = dt.hour() * 60 + dt.minute();
                midnight + Duration::minutes(i64::from(since_midnight - since_midnight % m))
            }
            TimeInterval::Day => midnight,
            TimeInterval::Week => {
                midnight - Duration::days(i64::from(dt.weekday().num_days_from_monday()))
            }
            TimeInterval::Month => first_of_month(dt.date(), dt.month()),
            TimeInterval::Quarter => first_of_month(dt.date(), (dt.month0() / 3) * 3 + 1),
            TimeInterval::Year => first_of_month(dt.date(), 1),
        }
    }

    /// Advance a local datetime by one bucket
    pub fn step(&self, dt: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            TimeInterval::Minutes(m) => dt.checked_add_signed(Duration::minutes(i64::from(*m))),
            TimeInterval::Day => dt.checked_add_signed(Duration::days(1)),
            TimeInterval::Week => dt.checked_add_signed(Duration::days(7)),
            TimeInterval::Month => dt.checked_add_months(Months::new(1)),
            TimeInterval::Quarter => dt.checked_add_months(Months::new(3)),
            TimeInterval::Year => dt.checked_add_months(Months::new(12)),
        }
    }

    /// Advance a calendar date by one bucket
    pub fn step_date(&self, date: NaiveDate) -> Option<NaiveDate> {
        self.step(date.and_time(chrono::NaiveTime::MIN))
            .map(|dt| dt.date())
    }
}

fn first_of_month(date: NaiveDate, month: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(date.year(), month, 1)
        .unwrap_or(date)
        .and_time(chrono::NaiveTime::MIN)
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.human())
    }
}

impl FromStr for TimeInterval {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let unknown = || RangeError::UnknownInterval(s.to_string());

        match s {
            "1d" | "day" => return Ok(TimeInterval::Day),
            "1w" | "7d" | "week" => return Ok(TimeInterval::Week),
            "1M" | "month" => return Ok(TimeInterval::Month),
            "1Q" | "3M" | "quarter" => return Ok(TimeInterval::Quarter),
            "1Y" | "year" => return Ok(TimeInterval::Year),
            _ => {}
        }

        let (num, unit) = s.split_at(s.find(|c: char| !c.is_ascii_digit()).ok_or_else(unknown)?);
        let n: u32 = num.parse().map_err(|_| unknown())?;
        let minutes = match unit {
            "m" | "min" => n,
            "h" => n.checked_mul(60).ok_or_else(unknown)?,
            _ => return Err(unknown()),
        };

        if minutes == 0 || minutes >= 1440 || 1440 % minutes != 0 {
            return Err(unknown());
        }
        Ok(TimeInterval::Minutes(minutes))
    }
}

/// How far back from the end a query reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimePeriod {
    Days(u32),
    Months(u32),
    Years(u32),
    /// Entire history, clipped to the last complete month
    All,
}

impl TimePeriod {
    /// `end - period`; `None` for `All` or on overflow
    pub fn subtract_from(&self, end: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        match self {
            TimePeriod::Days(d) => end.checked_sub_signed(Duration::days(i64::from(*d))),
            TimePeriod::Months(m) => end.checked_sub_months(Months::new(*m)),
            TimePeriod::Years(y) => end.checked_sub_months(Months::new(y.checked_mul(12)?)),
            TimePeriod::All => None,
        }
    }
}

impl FromStr for TimePeriod {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let unknown = || RangeError::UnknownPeriod(s.to_string());

        if s.eq_ignore_ascii_case("all") {
            return Ok(TimePeriod::All);
        }

        let split = s.find(|c: char| !c.is_ascii_digit()).ok_or_else(unknown)?;
        let (num, unit) = s.split_at(split);
        let n: u32 = num.parse().map_err(|_| unknown())?;

        match unit {
            "d" => Ok(TimePeriod::Days(n)),
            "w" => Ok(TimePeriod::Days(n.checked_mul(7).ok_or_else(unknown)?)),
            "M" => Ok(TimePeriod::Months(n)),
            "Y" | "y" => Ok(TimePeriod::Years(n)),
            _ => Err(unknown()),
        }
    }
}
