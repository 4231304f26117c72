//! Module `rates::day_count`.
//!
//! Year fractions for discounting and simulation time.
//!
//! Key types and purpose: `DayCountConvention` selects the denominator; `year_fraction`
//! works on dates and `year_fraction_at` on timestamps, which intraday delivery periods need.
//!
//! Numerical considerations: both functions are antisymmetric and return exactly zero for
//! equal arguments, so a cashflow on the valuation date discounts with factor one.
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Supported actual-day conventions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayCountConvention {
    /// Actual day count over a 360-day year.
    Act360,
    /// Actual day count over a 365-day year.
    #[default]
    Act365Fixed,
}

impl DayCountConvention {
    fn days_per_year(self) -> f64 {
        match self {
            Self::Act360 => 360.0,
            Self::Act365Fixed => 365.0,
        }
    }
}

/// Computes year fraction between two dates under a day-count convention.
///
/// Edge cases:
/// - If `start == end`, returns `0.0`.
/// - If `start > end`, the result is negative and antisymmetric.
///
/// # Examples
/// ```rust
/// use chrono::NaiveDate;
/// use ferric_storage::rates::{DayCountConvention, year_fraction};
///
/// let s = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
/// let e = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
/// assert_eq!(year_fraction(s, e, DayCountConvention::Act365Fixed), 1.0);
/// ```
pub fn year_fraction(start: NaiveDate, end: NaiveDate, convention: DayCountConvention) -> f64 {
    if start == end {
        return 0.0;
    }
    (end - start).num_days() as f64 / convention.days_per_year()
}

/// Year fraction between two timestamps, counting partial days.
pub fn year_fraction_at(
    start: NaiveDateTime,
    end: NaiveDateTime,
    convention: DayCountConvention,
) -> f64 {
    if start == end {
        return 0.0;
    }
    let seconds = (end - start).num_seconds() as f64;
    seconds / SECONDS_PER_DAY / convention.days_per_year()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn act_conventions() {
        let s = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let e = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        assert_relative_eq!(year_fraction(s, e, DayCountConvention::Act360), 181.0 / 360.0);
        assert_relative_eq!(
            year_fraction(s, e, DayCountConvention::Act365Fixed),
            -year_fraction(e, s, DayCountConvention::Act365Fixed)
        );
        assert_eq!(year_fraction(s, s, DayCountConvention::Act360), 0.0);
    }

    #[test]
    fn timestamps_count_partial_days() {
        let s = NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let e = NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_relative_eq!(
            year_fraction_at(s, e, DayCountConvention::Act365Fixed),
            0.5 / 365.0,
            epsilon = 1e-15
        );
    }
}
