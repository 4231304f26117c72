//! Module `rates::discounting`.
//!
//! Settlement dates and discount factors for storage cashflows.
//!
//! Key types and purpose: `InterestRates` maps a cashflow date to a continuously compounded
//! annual rate, `SettlementRule` maps a delivery period to the date its cash settles, and
//! `CashflowDiscounter` combines both with the valuation date. Every present value computed
//! by the engines goes through `CashflowDiscounter`.
//!
//! Numerical considerations: cashflows on or before the valuation date are not discounted.

use std::fmt;
use std::sync::Arc;

use chrono::{Datelike, Months, NaiveDate};

use crate::core::ValuationError;
use crate::math::{InterpolationError, LinearInterpolator};
use crate::rates::day_count::{DayCountConvention, year_fraction};
use crate::time::TimePeriod;

/// `date -> continuously compounded annual rate`.
pub type RateFn = dyn Fn(NaiveDate) -> f64 + Send + Sync;

/// `delivery period -> cash settlement date`.
pub type SettlementFn = dyn Fn(TimePeriod) -> NaiveDate + Send + Sync;

impl From<InterpolationError> for ValuationError {
    fn from(e: InterpolationError) -> Self {
        ValuationError::Validation(e.to_string())
    }
}

/// Interest-rate curve keyed by cashflow date.
#[derive(Clone)]
pub enum InterestRates {
    /// Same rate for every date.
    Flat(f64),
    /// Linear in calendar days between pillar dates, flat outside.
    Pillars(LinearInterpolator),
    /// Arbitrary rate function.
    Function(Arc<RateFn>),
}

impl InterestRates {
    /// Rate curve through `(date, rate)` pillars, sorted by date.
    pub fn pillars(points: &[(NaiveDate, f64)]) -> Result<Self, ValuationError> {
        if points.len() == 1 {
            return Ok(Self::Flat(points[0].1));
        }
        let x = points
            .iter()
            .map(|(d, _)| f64::from(d.num_days_from_ce()))
            .collect();
        let y = points.iter().map(|(_, r)| *r).collect();
        Ok(Self::Pillars(LinearInterpolator::new(x, y)?))
    }

    pub fn function<F>(f: F) -> Self
    where
        F: Fn(NaiveDate) -> f64 + Send + Sync + 'static,
    {
        Self::Function(Arc::new(f))
    }

    /// Rate applying to a cashflow on `date`; fails when the curve yields no finite rate.
    pub fn rate(&self, date: NaiveDate) -> Result<f64, ValuationError> {
        let rate = match self {
            Self::Flat(r) => *r,
            Self::Pillars(curve) => curve
                .value(f64::from(date.num_days_from_ce()))
                .map_err(|e| ValuationError::Domain(format!("interest rate at {date}: {e}")))?,
            Self::Function(f) => f(date),
        };
        if !rate.is_finite() {
            return Err(ValuationError::Domain(format!(
                "interest rate at {date} is not finite: {rate}"
            )));
        }
        Ok(rate)
    }
}

impl fmt::Debug for InterestRates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flat(r) => f.debug_tuple("Flat").field(r).finish(),
            Self::Pillars(curve) => f.debug_tuple("Pillars").field(&curve.x().len()).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// When the cash for a delivery period settles.
#[derive(Clone, Default)]
pub enum SettlementRule {
    /// On the first day of the period.
    #[default]
    PeriodStart,
    /// On the given day of the month after the period starts, clamped to the month length.
    DayOfNextMonth(u32),
    /// Arbitrary rule.
    Function(Arc<SettlementFn>),
}

impl SettlementRule {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(TimePeriod) -> NaiveDate + Send + Sync + 'static,
    {
        Self::Function(Arc::new(f))
    }

    pub fn settlement_date(&self, period: TimePeriod) -> NaiveDate {
        match self {
            Self::PeriodStart => period.start_date(),
            Self::DayOfNextMonth(day) => {
                let start = period.start_date();
                let first_of_next = start
                    .with_day(1)
                    .and_then(|d| d.checked_add_months(Months::new(1)))
                    .unwrap_or(start);
                let mut day = (*day).max(1);
                loop {
                    if let Some(date) = first_of_next.with_day(day) {
                        break date;
                    }
                    if day <= 28 {
                        break first_of_next;
                    }
                    day -= 1;
                }
            }
            Self::Function(f) => f(period),
        }
    }
}

impl fmt::Debug for SettlementRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeriodStart => f.write_str("PeriodStart"),
            Self::DayOfNextMonth(d) => f.debug_tuple("DayOfNextMonth").field(d).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// Present-values storage cashflows as of a valuation date.
#[derive(Debug, Clone)]
pub struct CashflowDiscounter {
    valuation_date: NaiveDate,
    rates: InterestRates,
    settlement: SettlementRule,
    convention: DayCountConvention,
}

impl CashflowDiscounter {
    pub fn new(valuation_date: NaiveDate, rates: InterestRates, settlement: SettlementRule) -> Self {
        Self {
            valuation_date,
            rates,
            settlement,
            convention: DayCountConvention::Act365Fixed,
        }
    }

    pub fn with_day_count(mut self, convention: DayCountConvention) -> Self {
        self.convention = convention;
        self
    }

    pub fn valuation_date(&self) -> NaiveDate {
        self.valuation_date
    }

    pub fn settlement_date(&self, period: TimePeriod) -> NaiveDate {
        self.settlement.settlement_date(period)
    }

    /// `exp(-r(date) * yf(valuation, date))`, or one for dates not after valuation.
    pub fn discount_factor(&self, date: NaiveDate) -> Result<f64, ValuationError> {
        if date <= self.valuation_date {
            return Ok(1.0);
        }
        let t = year_fraction(self.valuation_date, date, self.convention);
        Ok((-self.rates.rate(date)? * t).exp())
    }

    /// Discount factor for cash settling against `period`.
    pub fn settlement_discount_factor(&self, period: TimePeriod) -> Result<f64, ValuationError> {
        self.discount_factor(self.settlement_date(period))
    }

    /// Settlement discount factors for `[start, end)`; fails on a non-finite factor.
    pub fn period_discount_factors(
        &self,
        start: TimePeriod,
        end: TimePeriod,
    ) -> Result<Vec<f64>, ValuationError> {
        crate::time::period_range(start, end)
            .map(|p| {
                let df = self.settlement_discount_factor(p)?;
                if df.is_finite() {
                    Ok(df)
                } else {
                    Err(ValuationError::Validation(format!(
                        "discount factor for {p} settling {} is not finite",
                        self.settlement_date(p)
                    )))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn discount_factor_uses_act365() {
        let disc = CashflowDiscounter::new(
            date(2020, 1, 1),
            InterestRates::Flat(0.05),
            SettlementRule::PeriodStart,
        );
        let df = disc.discount_factor(date(2020, 12, 31)).unwrap();
        assert_relative_eq!(df, (-0.05_f64).exp(), epsilon = 1e-14);
        assert_eq!(disc.discount_factor(date(2019, 6, 1)).unwrap(), 1.0);
        assert_eq!(disc.discount_factor(date(2020, 1, 1)).unwrap(), 1.0);
    }

    #[test]
    fn twentieth_of_next_month() {
        let rule = SettlementRule::DayOfNextMonth(20);
        let p = TimePeriod::day(date(2020, 12, 5));
        assert_eq!(rule.settlement_date(p), date(2021, 1, 20));
        let end_of_month = SettlementRule::DayOfNextMonth(31);
        let jan = TimePeriod::month(2021, 1).unwrap();
        assert_eq!(end_of_month.settlement_date(jan), date(2021, 2, 28));
    }

    #[test]
    fn pillar_rates_interpolate_in_days() {
        let rates =
            InterestRates::pillars(&[(date(2020, 1, 1), 0.01), (date(2020, 1, 11), 0.02)]).unwrap();
        assert_relative_eq!(rates.rate(date(2020, 1, 6)).unwrap(), 0.015, epsilon = 1e-14);
        assert_eq!(rates.rate(date(2019, 1, 1)).unwrap(), 0.01);
        assert_eq!(rates.rate(date(2030, 1, 1)).unwrap(), 0.02);
        assert!(InterestRates::pillars(&[(date(2020, 1, 2), 0.0), (date(2020, 1, 1), 0.0)]).is_err());
    }

    #[test]
    fn custom_settlement_and_non_finite_rates() {
        let disc = CashflowDiscounter::new(
            date(2020, 1, 1),
            InterestRates::function(|_| f64::NAN),
            SettlementRule::function(|p| p.start_date() + chrono::Days::new(2)),
        );
        let p = TimePeriod::day(date(2020, 1, 1));
        assert_eq!(disc.settlement_date(p), date(2020, 1, 3));
        assert!(matches!(
            disc.settlement_discount_factor(p),
            Err(ValuationError::Domain(_))
        ));
        assert!(disc.period_discount_factors(p, p.offset(2)).is_err());
    }
}
