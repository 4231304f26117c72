//! Day counts, interest rates, settlement rules and cashflow discounting.

pub mod day_count;
pub mod discounting;

pub use day_count::{DayCountConvention, year_fraction, year_fraction_at};
pub use discounting::{CashflowDiscounter, InterestRates, RateFn, SettlementFn, SettlementRule};
