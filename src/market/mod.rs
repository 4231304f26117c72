//! Module `market`.
//!
//! Market snapshot consumed by the storage valuation engines: the valuation date, the
//! forward curve and the cashflow discounter.

use chrono::NaiveDate;

use crate::core::ValuationError;
use crate::rates::{CashflowDiscounter, InterestRates, SettlementRule};
use crate::storage::CmdtyStorage;
use crate::time::{Granularity, TimePeriod, TimeSeries};

/// Market snapshot used by all storage engines.
#[derive(Debug, Clone)]
pub struct StorageMarket {
    valuation_date: NaiveDate,
    forward_curve: TimeSeries<f64>,
    discounter: CashflowDiscounter,
}

impl StorageMarket {
    /// Starts a market builder.
    #[inline]
    pub fn builder() -> StorageMarketBuilder {
        StorageMarketBuilder::default()
    }

    pub fn valuation_date(&self) -> NaiveDate {
        self.valuation_date
    }

    pub fn forward_curve(&self) -> &TimeSeries<f64> {
        &self.forward_curve
    }

    pub fn discounter(&self) -> &CashflowDiscounter {
        &self.discounter
    }

    /// Period containing the valuation date at `granularity`.
    pub fn current_period(&self, granularity: Granularity) -> TimePeriod {
        TimePeriod::from_date(granularity, self.valuation_date)
    }

    /// Checks the curve against `storage` and returns the forward prices for `[first, end]`.
    ///
    /// The end period price is needed for the terminal value; when the storage must be empty
    /// the curve may stop one period earlier.
    pub(crate) fn forwards_for(
        &self,
        storage: &CmdtyStorage,
        first: TimePeriod,
    ) -> Result<Vec<f64>, ValuationError> {
        if self.forward_curve.granularity() != storage.granularity() {
            return Err(ValuationError::FrequencyMismatch {
                storage: storage.granularity(),
                curve: self.forward_curve.granularity(),
            });
        }
        let end = storage.end();
        crate::time::period_range(first, end.successor())
            .map(|p| match self.forward_curve.get(p) {
                Some(price) if price.is_finite() => Ok(*price),
                Some(price) => Err(ValuationError::Validation(format!(
                    "forward price {price} at {p} is not finite"
                ))),
                None if p == end && storage.must_be_empty_at_end() => Ok(0.0),
                None => Err(ValuationError::Validation(format!(
                    "forward curve [{}, {}) does not cover {p}",
                    self.forward_curve.start(),
                    self.forward_curve.end()
                ))),
            })
            .collect()
    }
}

/// Builder for [`StorageMarket`].
#[derive(Debug, Clone, Default)]
pub struct StorageMarketBuilder {
    valuation_date: Option<NaiveDate>,
    forward_curve: Option<TimeSeries<f64>>,
    rates: Option<InterestRates>,
    settlement: SettlementRule,
}

impl StorageMarketBuilder {
    pub fn valuation_date(mut self, date: NaiveDate) -> Self {
        self.valuation_date = Some(date);
        self
    }

    pub fn forward_curve(mut self, curve: TimeSeries<f64>) -> Self {
        self.forward_curve = Some(curve);
        self
    }

    pub fn interest_rates(mut self, rates: InterestRates) -> Self {
        self.rates = Some(rates);
        self
    }

    /// Continuously compounded flat rate.
    pub fn flat_rate(self, rate: f64) -> Self {
        self.interest_rates(InterestRates::Flat(rate))
    }

    pub fn settlement_rule(mut self, rule: SettlementRule) -> Self {
        self.settlement = rule;
        self
    }

    /// Builds a validated market snapshot.
    pub fn build(self) -> Result<StorageMarket, ValuationError> {
        let valuation_date = self.valuation_date.ok_or_else(|| {
            ValuationError::Validation("market valuation date is required".to_string())
        })?;
        let forward_curve = self.forward_curve.ok_or_else(|| {
            ValuationError::Validation("market forward curve is required".to_string())
        })?;
        if forward_curve.is_empty() {
            return Err(ValuationError::Validation(
                "market forward curve is empty".to_string(),
            ));
        }
        let rates = self.rates.unwrap_or(InterestRates::Flat(0.0));
        Ok(StorageMarket {
            valuation_date,
            forward_curve,
            discounter: CashflowDiscounter::new(valuation_date, rates, self.settlement),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> TimePeriod {
        TimePeriod::day(NaiveDate::from_ymd_opt(2022, 5, d).unwrap())
    }

    fn storage(empty: bool) -> CmdtyStorage {
        let b = CmdtyStorage::builder()
            .active_period(day(2), day(5))
            .constant_limits(0.0, 10.0, 1.0, 1.0);
        if empty {
            b.build().unwrap()
        } else {
            b.terminal_value(crate::storage::TerminalValue::function(|p, i| p * i))
                .build()
                .unwrap()
        }
    }

    fn market(curve: TimeSeries<f64>) -> StorageMarket {
        StorageMarket::builder()
            .valuation_date(NaiveDate::from_ymd_opt(2022, 5, 1).unwrap())
            .forward_curve(curve)
            .flat_rate(0.01)
            .build()
            .unwrap()
    }

    #[test]
    fn forwards_cover_decisions_and_terminal() {
        let m = market(TimeSeries::new(day(1), vec![1.0, 2.0, 3.0, 4.0, 5.0]));
        assert_eq!(m.forwards_for(&storage(false), day(2)).unwrap(), vec![2.0, 3.0, 4.0, 5.0]);
        let short = market(TimeSeries::new(day(2), vec![2.0, 3.0, 4.0]));
        assert!(short.forwards_for(&storage(false), day(2)).is_err());
        assert_eq!(
            short.forwards_for(&storage(true), day(2)).unwrap(),
            vec![2.0, 3.0, 4.0, 0.0]
        );
    }

    #[test]
    fn granularity_mismatch_is_reported() {
        let monthly = TimeSeries::new(TimePeriod::month(2022, 5).unwrap(), vec![1.0; 3]);
        let err = market(monthly)
            .forwards_for(&storage(true), day(2))
            .unwrap_err();
        assert_eq!(
            err,
            ValuationError::FrequencyMismatch {
                storage: Granularity::Day,
                curve: Granularity::Month
            }
        );
    }
}
