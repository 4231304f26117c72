//! Pluggable cost and terminal-value rules.

use std::fmt;
use std::sync::Arc;

use crate::time::TimePeriod;

/// State-dependent cost: `(period, inventory, volume) -> cost`, with `volume >= 0`.
pub type CostFn = dyn Fn(TimePeriod, f64, f64) -> f64 + Send + Sync;

/// Terminal value function: `(terminal price, terminal inventory) -> value`.
pub type TerminalFn = dyn Fn(f64, f64) -> f64 + Send + Sync;

/// Cost of moving commodity in or out of storage.
#[derive(Clone)]
pub enum CostRule {
    /// Constant cost per unit of volume.
    PerUnit(f64),
    /// Arbitrary cost of a volume given the period and opening inventory.
    Function(Arc<CostFn>),
}

impl CostRule {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(TimePeriod, f64, f64) -> f64 + Send + Sync + 'static,
    {
        Self::Function(Arc::new(f))
    }

    /// Undiscounted cost of moving `volume` units (sign ignored).
    #[inline]
    pub fn cost(&self, period: TimePeriod, inventory: f64, volume: f64) -> f64 {
        match self {
            Self::PerUnit(rate) => rate * volume.abs(),
            Self::Function(f) => f(period, inventory, volume.abs()),
        }
    }

    pub fn is_per_unit(&self) -> bool {
        matches!(self, Self::PerUnit(_))
    }
}

impl Default for CostRule {
    fn default() -> Self {
        Self::PerUnit(0.0)
    }
}

impl fmt::Debug for CostRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerUnit(rate) => f.debug_tuple("PerUnit").field(rate).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// Value of inventory left in storage at the end period.
#[derive(Clone, Default)]
pub enum TerminalValue {
    /// Inventory must be zero at the end; the terminal value is then zero.
    #[default]
    MustBeEmpty,
    /// Arbitrary value of the remaining inventory.
    Function(Arc<TerminalFn>),
}

impl TerminalValue {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(f64, f64) -> f64 + Send + Sync + 'static,
    {
        Self::Function(Arc::new(f))
    }

    /// Undiscounted terminal value; only called with zero inventory for `MustBeEmpty`.
    #[inline]
    pub fn value(&self, price: f64, inventory: f64) -> f64 {
        match self {
            Self::MustBeEmpty => 0.0,
            Self::Function(f) => f(price, inventory),
        }
    }

    pub fn must_be_empty(&self) -> bool {
        matches!(self, Self::MustBeEmpty)
    }
}

impl fmt::Debug for TerminalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MustBeEmpty => f.write_str("MustBeEmpty"),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn per_unit_cost_ignores_sign() {
        let p = TimePeriod::day(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
        let rule = CostRule::PerUnit(1.3);
        assert_eq!(rule.cost(p, 0.0, -10.0), 13.0);
        let f = CostRule::function(|_, inventory, volume| 0.01 * inventory + volume);
        assert_eq!(f.cost(p, 100.0, -2.0), 3.0);
        assert!(!f.is_per_unit());
        assert_eq!(format!("{f:?}"), "Function(..)");
    }

    #[test]
    fn terminal_value_rules() {
        assert_eq!(TerminalValue::MustBeEmpty.value(50.0, 0.0), 0.0);
        let sell_at_discount = TerminalValue::function(|price, inventory| 0.5 * price * inventory);
        assert_eq!(sell_at_discount.value(10.0, 5.0), 25.0);
        assert!(!sell_at_discount.must_be_empty());
        assert!(TerminalValue::default().must_be_empty());
    }
}
