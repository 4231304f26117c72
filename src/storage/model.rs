//! Immutable storage facility definition and its validating builder.

use crate::core::ValuationError;
use crate::storage::costs::{CostRule, TerminalValue};
use crate::storage::ratchet::{InjectWithdrawRange, InventoryRatePoint, Ratchet, RatchetCurve};
use crate::time::{Granularity, TimePeriod};

/// Commodity storage facility: constraints and economics over `[start, end)`.
///
/// Decisions are taken in every period from `start` up to but excluding `end`; the terminal
/// value is assessed on the inventory held at `end`.
#[derive(Debug, Clone)]
pub struct CmdtyStorage {
    start: TimePeriod,
    end: TimePeriod,
    ratchets: Vec<RatchetCurve>,
    injection_cost: CostRule,
    withdrawal_cost: CostRule,
    consumed_on_inject: f64,
    consumed_on_withdraw: f64,
    inventory_loss: f64,
    inventory_cost: f64,
    terminal_value: TerminalValue,
}

impl CmdtyStorage {
    /// Starts a storage builder.
    #[inline]
    pub fn builder() -> CmdtyStorageBuilder {
        CmdtyStorageBuilder::default()
    }

    pub fn granularity(&self) -> Granularity {
        self.start.granularity()
    }

    pub fn start(&self) -> TimePeriod {
        self.start
    }

    pub fn end(&self) -> TimePeriod {
        self.end
    }

    #[inline]
    fn ratchet(&self, period: TimePeriod) -> &RatchetCurve {
        let idx = self.ratchets.partition_point(|r| r.period <= period);
        &self.ratchets[idx.saturating_sub(1)]
    }

    /// Net volume range available in `period` when holding `inventory`.
    #[inline]
    pub fn inject_withdraw_range(&self, period: TimePeriod, inventory: f64) -> InjectWithdrawRange {
        self.ratchet(period).range(inventory)
    }

    pub fn min_inventory(&self, period: TimePeriod) -> f64 {
        self.ratchet(period).min_inventory()
    }

    pub fn max_inventory(&self, period: TimePeriod) -> f64 {
        self.ratchet(period).max_inventory()
    }

    /// Inventory breakpoints of the ratchet in force at `period`.
    pub fn inventory_breakpoints(&self, period: TimePeriod) -> &[f64] {
        &self.ratchet(period).inventories
    }

    pub fn injection_cost(&self, period: TimePeriod, inventory: f64, volume: f64) -> f64 {
        self.injection_cost.cost(period, inventory, volume)
    }

    pub fn withdrawal_cost(&self, period: TimePeriod, inventory: f64, volume: f64) -> f64 {
        self.withdrawal_cost.cost(period, inventory, volume)
    }

    /// Injection or withdrawal cost for a signed decision.
    #[inline]
    pub fn decision_cost(&self, period: TimePeriod, inventory: f64, volume: f64) -> f64 {
        if volume > 0.0 {
            self.injection_cost(period, inventory, volume)
        } else if volume < 0.0 {
            self.withdrawal_cost(period, inventory, volume)
        } else {
            0.0
        }
    }

    pub fn cmdty_consumed_on_inject(&self, _period: TimePeriod, _inventory: f64, volume: f64) -> f64 {
        self.consumed_on_inject * volume.abs()
    }

    pub fn cmdty_consumed_on_withdraw(
        &self,
        _period: TimePeriod,
        _inventory: f64,
        volume: f64,
    ) -> f64 {
        self.consumed_on_withdraw * volume.abs()
    }

    /// Commodity consumed by a signed decision.
    #[inline]
    pub fn cmdty_consumed(&self, period: TimePeriod, inventory: f64, volume: f64) -> f64 {
        if volume >= 0.0 {
            self.cmdty_consumed_on_inject(period, inventory, volume)
        } else {
            self.cmdty_consumed_on_withdraw(period, inventory, volume)
        }
    }

    /// Fraction of inventory lost in `period`.
    pub fn inventory_pct_loss(&self, _period: TimePeriod) -> f64 {
        self.inventory_loss
    }

    /// Holding cost of `inventory` units for `period`.
    pub fn inventory_cost(&self, _period: TimePeriod, inventory: f64) -> f64 {
        self.inventory_cost * inventory
    }

    /// Inventory entering the next period after loss and the decision `volume`.
    #[inline]
    pub fn next_inventory(&self, period: TimePeriod, inventory: f64, volume: f64) -> f64 {
        inventory * (1.0 - self.inventory_pct_loss(period)) + volume
    }

    /// Undiscounted terminal value at the end period.
    pub fn terminal_value(&self, price: f64, inventory: f64) -> f64 {
        self.terminal_value.value(price, inventory)
    }

    pub fn must_be_empty_at_end(&self) -> bool {
        self.terminal_value.must_be_empty()
    }

    /// Whether both decision costs are linear in volume.
    pub fn has_per_unit_costs(&self) -> bool {
        self.injection_cost.is_per_unit() && self.withdrawal_cost.is_per_unit()
    }
}

#[derive(Debug, Clone, Copy)]
struct ConstantLimits {
    min_inventory: f64,
    max_inventory: f64,
    max_withdrawal_rate: f64,
    max_injection_rate: f64,
}

/// Builder for [`CmdtyStorage`].
#[derive(Debug, Clone, Default)]
pub struct CmdtyStorageBuilder {
    start: Option<TimePeriod>,
    end: Option<TimePeriod>,
    constant: Option<ConstantLimits>,
    ratchets: Option<Vec<Ratchet>>,
    injection_cost: CostRule,
    withdrawal_cost: CostRule,
    consumed_on_inject: f64,
    consumed_on_withdraw: f64,
    inventory_loss: f64,
    inventory_cost: f64,
    terminal_value: TerminalValue,
}

impl CmdtyStorageBuilder {
    /// Sets the commitment window `[start, end)`; the granularity is taken from `start`.
    pub fn active_period(mut self, start: TimePeriod, end: TimePeriod) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// Uses one inventory-independent rate range for the whole window.
    pub fn constant_limits(
        mut self,
        min_inventory: f64,
        max_inventory: f64,
        max_withdrawal_rate: f64,
        max_injection_rate: f64,
    ) -> Self {
        self.constant = Some(ConstantLimits {
            min_inventory,
            max_inventory,
            max_withdrawal_rate,
            max_injection_rate,
        });
        self.ratchets = None;
        self
    }

    /// Uses calendar-indexed ratchets; replaces any constant limits.
    pub fn ratchets(mut self, ratchets: Vec<Ratchet>) -> Self {
        self.ratchets = Some(ratchets);
        self.constant = None;
        self
    }

    pub fn injection_cost(mut self, rule: CostRule) -> Self {
        self.injection_cost = rule;
        self
    }

    pub fn withdrawal_cost(mut self, rule: CostRule) -> Self {
        self.withdrawal_cost = rule;
        self
    }

    /// Per-unit injection and withdrawal costs.
    pub fn unit_costs(self, injection: f64, withdrawal: f64) -> Self {
        self.injection_cost(CostRule::PerUnit(injection))
            .withdrawal_cost(CostRule::PerUnit(withdrawal))
    }

    /// Fractions of the injected and withdrawn volume consumed in operation.
    pub fn cmdty_consumed(mut self, on_inject: f64, on_withdraw: f64) -> Self {
        self.consumed_on_inject = on_inject;
        self.consumed_on_withdraw = on_withdraw;
        self
    }

    /// Fraction of inventory lost each period.
    pub fn inventory_loss(mut self, pct: f64) -> Self {
        self.inventory_loss = pct;
        self
    }

    /// Holding cost per unit of closing inventory per period.
    pub fn inventory_cost(mut self, per_unit: f64) -> Self {
        self.inventory_cost = per_unit;
        self
    }

    pub fn terminal_value(mut self, rule: TerminalValue) -> Self {
        self.terminal_value = rule;
        self
    }

    pub fn must_be_empty_at_end(self) -> Self {
        self.terminal_value(TerminalValue::MustBeEmpty)
    }

    /// Validates and builds the storage.
    pub fn build(self) -> Result<CmdtyStorage, ValuationError> {
        let start = self
            .start
            .ok_or_else(|| ValuationError::Validation("storage start is required".to_string()))?;
        let end = self
            .end
            .ok_or_else(|| ValuationError::Validation("storage end is required".to_string()))?;
        if start.granularity() != end.granularity() {
            return Err(ValuationError::Validation(format!(
                "storage start {start} and end {end} have different granularity"
            )));
        }
        if start >= end {
            return Err(ValuationError::Validation(format!(
                "storage start {start} must be before end {end}"
            )));
        }

        let ratchets = match (self.ratchets, self.constant) {
            (Some(ratchets), _) => ratchets,
            (None, Some(limits)) => vec![constant_ratchet(start, limits)?],
            (None, None) => {
                return Err(ValuationError::Validation(
                    "storage needs constant limits or ratchets".to_string(),
                ));
            }
        };
        validate_ratchets(start, &ratchets)?;

        for (name, pct) in [
            ("cmdty consumed on inject", self.consumed_on_inject),
            ("cmdty consumed on withdraw", self.consumed_on_withdraw),
            ("inventory loss", self.inventory_loss),
        ] {
            if !pct.is_finite() || !(0.0..1.0).contains(&pct) {
                return Err(ValuationError::Validation(format!(
                    "{name} must be in [0, 1), got {pct}"
                )));
            }
        }
        if !self.inventory_cost.is_finite() {
            return Err(ValuationError::Validation(
                "inventory cost must be finite".to_string(),
            ));
        }
        for (name, rule) in [
            ("injection", &self.injection_cost),
            ("withdrawal", &self.withdrawal_cost),
        ] {
            match rule {
                CostRule::PerUnit(rate) if !rate.is_finite() => {
                    return Err(ValuationError::Validation(format!(
                        "{name} cost must be finite, got {rate}"
                    )));
                }
                _ => {}
            }
        }

        Ok(CmdtyStorage {
            start,
            end,
            ratchets: ratchets.iter().map(RatchetCurve::from_ratchet).collect(),
            injection_cost: self.injection_cost,
            withdrawal_cost: self.withdrawal_cost,
            consumed_on_inject: self.consumed_on_inject,
            consumed_on_withdraw: self.consumed_on_withdraw,
            inventory_loss: self.inventory_loss,
            inventory_cost: self.inventory_cost,
            terminal_value: self.terminal_value,
        })
    }
}

fn constant_ratchet(start: TimePeriod, limits: ConstantLimits) -> Result<Ratchet, ValuationError> {
    if limits.min_inventory > limits.max_inventory {
        return Err(ValuationError::Validation(format!(
            "min inventory {} exceeds max inventory {}",
            limits.min_inventory, limits.max_inventory
        )));
    }
    if limits.max_withdrawal_rate < 0.0 || limits.max_injection_rate < 0.0 {
        return Err(ValuationError::Validation(
            "max withdrawal and injection rates must be non-negative magnitudes".to_string(),
        ));
    }
    let min_rate = -limits.max_withdrawal_rate;
    let max_rate = limits.max_injection_rate;
    let mut points = vec![InventoryRatePoint::new(limits.min_inventory, min_rate, max_rate)];
    if limits.max_inventory > limits.min_inventory {
        points.push(InventoryRatePoint::new(limits.max_inventory, min_rate, max_rate));
    }
    Ok(Ratchet::new(start, points))
}

fn validate_ratchets(start: TimePeriod, ratchets: &[Ratchet]) -> Result<(), ValuationError> {
    let Some(first) = ratchets.first() else {
        return Err(ValuationError::Validation(
            "at least one ratchet is required".to_string(),
        ));
    };
    for ratchet in ratchets {
        if ratchet.period.granularity() != start.granularity() {
            return Err(ValuationError::Validation(format!(
                "ratchet at {} does not have storage granularity {}",
                ratchet.period,
                start.granularity()
            )));
        }
        ratchet.validate()?;
    }
    if ratchets.windows(2).any(|w| w[1].period <= w[0].period) {
        return Err(ValuationError::Validation(
            "ratchets must be sorted by strictly increasing period".to_string(),
        ));
    }
    if first.period > start {
        return Err(ValuationError::Validation(format!(
            "first ratchet {} is after storage start {start}",
            first.period
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn day(y: i32, m: u32, d: u32) -> TimePeriod {
        TimePeriod::day(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn ratchet_storage() -> CmdtyStorage {
        CmdtyStorage::builder()
            .active_period(day(2019, 8, 28), day(2019, 9, 25))
            .ratchets(vec![Ratchet::new(
                day(2019, 8, 28),
                vec![
                    InventoryRatePoint::new(0.0, -150.0, 255.2),
                    InventoryRatePoint::new(2000.0, -200.0, 175.0),
                ],
            )])
            .unit_costs(1.1, 1.3)
            .build()
            .unwrap()
    }

    #[test]
    fn midpoint_between_breakpoints_interpolates() {
        let storage = ratchet_storage();
        let range = storage.inject_withdraw_range(day(2019, 8, 29), 1000.0);
        assert_eq!(range.min_rate, -175.0);
        assert!((range.max_rate - 215.1).abs() < 1e-10);
    }

    #[test]
    fn breakpoints_are_exact() {
        let storage = ratchet_storage();
        let p = day(2019, 9, 3);
        assert_eq!(
            storage.inject_withdraw_range(p, 0.0),
            InjectWithdrawRange::new(-150.0, 255.2)
        );
        assert_eq!(
            storage.inject_withdraw_range(p, 2000.0),
            InjectWithdrawRange::new(-200.0, 175.0)
        );
        assert_eq!(storage.min_inventory(p), 0.0);
        assert_eq!(storage.max_inventory(p), 2000.0);
    }

    #[test]
    fn later_ratchet_supersedes_earlier() {
        let storage = CmdtyStorage::builder()
            .active_period(day(2020, 1, 1), day(2020, 3, 1))
            .ratchets(vec![
                Ratchet::new(day(2019, 12, 1), vec![InventoryRatePoint::new(0.0, -10.0, 10.0)]),
                Ratchet::new(
                    day(2020, 2, 1),
                    vec![
                        InventoryRatePoint::new(0.0, -5.0, 20.0),
                        InventoryRatePoint::new(100.0, -5.0, 20.0),
                    ],
                ),
            ])
            .build()
            .unwrap();
        assert_eq!(storage.max_inventory(day(2020, 1, 31)), 0.0);
        assert_eq!(storage.max_inventory(day(2020, 2, 1)), 100.0);
        assert_eq!(
            storage.inject_withdraw_range(day(2020, 2, 15), 50.0),
            InjectWithdrawRange::new(-5.0, 20.0)
        );
    }

    #[test]
    fn rejects_invalid_configuration() {
        let base = || {
            CmdtyStorage::builder()
                .active_period(day(2020, 1, 1), day(2020, 2, 1))
                .constant_limits(0.0, 100.0, 10.0, 10.0)
        };
        assert!(base().build().is_ok());
        assert!(
            base()
                .active_period(day(2020, 2, 1), day(2020, 2, 1))
                .build()
                .is_err()
        );
        assert!(base().constant_limits(100.0, 0.0, 10.0, 10.0).build().is_err());
        assert!(base().inventory_loss(1.5).build().is_err());
        assert!(
            base()
                .ratchets(vec![Ratchet::new(
                    day(2020, 1, 10),
                    vec![InventoryRatePoint::new(0.0, -1.0, 1.0)]
                )])
                .build()
                .is_err()
        );
        let month = TimePeriod::month(2020, 1).unwrap();
        assert!(
            base()
                .ratchets(vec![Ratchet::new(
                    month,
                    vec![InventoryRatePoint::new(0.0, -1.0, 1.0)]
                )])
                .build()
                .is_err()
        );
        assert!(CmdtyStorage::builder().build().is_err());
    }

    #[test]
    fn decision_cost_and_consumption_follow_sign() {
        let storage = CmdtyStorage::builder()
            .active_period(day(2020, 1, 1), day(2020, 2, 1))
            .constant_limits(0.0, 100.0, 10.0, 10.0)
            .unit_costs(1.0, 2.0)
            .cmdty_consumed(0.01, 0.02)
            .inventory_loss(0.1)
            .inventory_cost(0.5)
            .build()
            .unwrap();
        let p = day(2020, 1, 5);
        assert_eq!(storage.decision_cost(p, 50.0, 4.0), 4.0);
        assert_eq!(storage.decision_cost(p, 50.0, -4.0), 8.0);
        assert_eq!(storage.decision_cost(p, 50.0, 0.0), 0.0);
        assert!((storage.cmdty_consumed(p, 50.0, -4.0) - 0.08).abs() < 1e-15);
        assert!((storage.next_inventory(p, 50.0, 5.0) - 50.0).abs() < 1e-12);
        assert_eq!(storage.inventory_cost(p, 10.0), 5.0);
    }

    proptest! {
        #[test]
        fn single_regime_range_is_flat_in_inventory(
            min_rate in -500.0..0.0f64,
            max_rate in 0.0..500.0f64,
            max_inventory in 1.0..1.0e6f64,
            frac in 0.0..=1.0f64,
        ) {
            let storage = CmdtyStorage::builder()
                .active_period(day(2020, 1, 1), day(2020, 1, 10))
                .ratchets(vec![Ratchet::new(
                    day(2020, 1, 1),
                    vec![
                        InventoryRatePoint::new(0.0, min_rate, max_rate),
                        InventoryRatePoint::new(max_inventory, min_rate, max_rate),
                    ],
                )])
                .build()
                .unwrap();
            let range = storage.inject_withdraw_range(day(2020, 1, 4), frac * max_inventory);
            prop_assert_eq!(range, InjectWithdrawRange::new(min_rate, max_rate));
        }
    }
}
