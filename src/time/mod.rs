//! Module `time`.
//!
//! Discrete delivery periods and contiguous period-indexed series.
//!
//! Key types: `Granularity` fixes the length of a period, `TimePeriod` is one interval at
//! that granularity and `TimeSeries` holds one value per consecutive period.
//!
//! Numerical considerations: a period is stored as a signed index from the Unix epoch, so
//! ordering, successor and distance are integer operations and never drift.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::core::ValuationError;

pub mod series;

pub use series::TimeSeries;

const DAYS_FROM_CE_TO_EPOCH: i64 = 719_163;

/// Length of a delivery period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Granularity {
    QuarterHour,
    HalfHour,
    Hour,
    Day,
    Month,
    Quarter,
}

impl Granularity {
    /// Frequency code accepted by [`FromStr`].
    pub fn code(self) -> &'static str {
        match self {
            Self::QuarterHour => "15min",
            Self::HalfHour => "30min",
            Self::Hour => "H",
            Self::Day => "D",
            Self::Month => "M",
            Self::Quarter => "Q",
        }
    }

    fn minutes(self) -> Option<i64> {
        match self {
            Self::QuarterHour => Some(15),
            Self::HalfHour => Some(30),
            Self::Hour => Some(60),
            Self::Day | Self::Month | Self::Quarter => None,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Granularity {
    type Err = ValuationError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        match code {
            "15min" => Ok(Self::QuarterHour),
            "30min" => Ok(Self::HalfHour),
            "H" => Ok(Self::Hour),
            "D" => Ok(Self::Day),
            "M" => Ok(Self::Month),
            "Q" => Ok(Self::Quarter),
            other => Err(ValuationError::Validation(format!(
                "unsupported frequency code `{other}`; expected one of 15min, 30min, H, D, M, Q"
            ))),
        }
    }
}

/// A delivery interval at a fixed granularity.
///
/// Ordering compares the granularity first, so periods of different granularity never
/// interleave. Engines reject mixed granularity before comparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimePeriod {
    granularity: Granularity,
    index: i64,
}

fn epoch() -> NaiveDateTime {
    NaiveDate::default().and_time(NaiveTime::MIN)
}

impl TimePeriod {
    /// Period containing `date` (its midnight for intraday granularities).
    pub fn from_date(granularity: Granularity, date: NaiveDate) -> Self {
        Self::from_datetime(granularity, date.and_time(NaiveTime::MIN))
    }

    /// Period containing the timestamp `at`.
    pub fn from_datetime(granularity: Granularity, at: NaiveDateTime) -> Self {
        let index = match granularity.minutes() {
            Some(minutes) => at.signed_duration_since(epoch()).num_minutes().div_euclid(minutes),
            None => match granularity {
                Granularity::Day => i64::from(at.date().num_days_from_ce()) - DAYS_FROM_CE_TO_EPOCH,
                Granularity::Month => i64::from(at.year()) * 12 + i64::from(at.month0()),
                _ => i64::from(at.year()) * 4 + i64::from(at.month0() / 3),
            },
        };
        Self { granularity, index }
    }

    /// Convenience constructor for daily periods.
    pub fn day(date: NaiveDate) -> Self {
        Self::from_date(Granularity::Day, date)
    }

    /// Convenience constructor for monthly periods; `None` on an invalid month.
    pub fn month(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|d| Self::from_date(Granularity::Month, d))
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn index(&self) -> i64 {
        self.index
    }

    /// The next period.
    pub fn successor(&self) -> Self {
        self.offset(1)
    }

    pub fn offset(&self, n: i64) -> Self {
        Self {
            granularity: self.granularity,
            index: self.index + n,
        }
    }

    /// Number of periods from `self` to `other` (negative if `other` is earlier).
    pub fn periods_until(&self, other: &Self) -> i64 {
        other.index - self.index
    }

    /// Start timestamp of the period, saturating at the supported calendar range.
    pub fn start(&self) -> NaiveDateTime {
        match self.granularity.minutes() {
            Some(minutes) => TimeDelta::try_minutes(self.index.saturating_mul(minutes))
                .and_then(|delta| epoch().checked_add_signed(delta))
                .unwrap_or(NaiveDateTime::MAX),
            None => self.start_date().and_time(NaiveTime::MIN),
        }
    }

    /// Calendar date on which the period starts.
    pub fn start_date(&self) -> NaiveDate {
        let date = match self.granularity {
            Granularity::Day => i32::try_from(self.index + DAYS_FROM_CE_TO_EPOCH)
                .ok()
                .and_then(NaiveDate::from_num_days_from_ce_opt),
            Granularity::Month => first_of_month(self.index.div_euclid(12), self.index.rem_euclid(12)),
            Granularity::Quarter => {
                first_of_month(self.index.div_euclid(4), self.index.rem_euclid(4) * 3)
            }
            _ => return self.start().date(),
        };
        date.unwrap_or(NaiveDate::MAX)
    }

    /// Start timestamp of the following period.
    pub fn end(&self) -> NaiveDateTime {
        self.successor().start()
    }
}

fn first_of_month(year: i64, month0: i64) -> Option<NaiveDate> {
    let year = i32::try_from(year).ok()?;
    NaiveDate::from_ymd_opt(year, u32::try_from(month0).ok()? + 1, 1)
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.granularity {
            Granularity::Day => write!(f, "{}", self.start_date().format("%Y-%m-%d")),
            Granularity::Month => write!(f, "{}", self.start_date().format("%Y-%m")),
            Granularity::Quarter => {
                let start = self.start_date();
                write!(f, "{}-Q{}", start.year(), start.month0() / 3 + 1)
            }
            _ => write!(f, "{}", self.start().format("%Y-%m-%d %H:%M")),
        }
    }
}

/// Iterator over `[start, end)`.
pub fn period_range(start: TimePeriod, end: TimePeriod) -> impl Iterator<Item = TimePeriod> {
    let count = start.periods_until(&end).max(0);
    (0..count).map(move |n| start.offset(n))
}
