//! Inventory-dependent injection and withdrawal rate tables.

use serde::{Deserialize, Serialize};

use crate::core::ValuationError;
use crate::math::interpolate_clamped;
use crate::time::TimePeriod;

/// Feasible net volume for one period: negative is withdrawal, positive is injection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InjectWithdrawRange {
    pub min_rate: f64,
    pub max_rate: f64,
}

impl InjectWithdrawRange {
    pub fn new(min_rate: f64, max_rate: f64) -> Self {
        Self { min_rate, max_rate }
    }
}

/// Rates available when inventory equals `inventory`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InventoryRatePoint {
    pub inventory: f64,
    pub min_rate: f64,
    pub max_rate: f64,
}

impl InventoryRatePoint {
    pub fn new(inventory: f64, min_rate: f64, max_rate: f64) -> Self {
        Self {
            inventory,
            min_rate,
            max_rate,
        }
    }
}

/// Rate table in force from `period` until the next ratchet.
///
/// The lowest and highest breakpoint inventories are the minimum and maximum inventory for
/// every period the ratchet covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ratchet {
    pub period: TimePeriod,
    pub points: Vec<InventoryRatePoint>,
}

impl Ratchet {
    pub fn new(period: TimePeriod, points: Vec<InventoryRatePoint>) -> Self {
        Self { period, points }
    }

    /// Validates breakpoint ordering and rate bounds.
    pub fn validate(&self) -> Result<(), ValuationError> {
        if self.points.is_empty() {
            return Err(ValuationError::Validation(format!(
                "ratchet at {} has no inventory breakpoints",
                self.period
            )));
        }
        for point in &self.points {
            if !point.inventory.is_finite() || !point.min_rate.is_finite() || !point.max_rate.is_finite()
            {
                return Err(ValuationError::Validation(format!(
                    "ratchet at {} has a non-finite breakpoint",
                    self.period
                )));
            }
            if point.min_rate > point.max_rate {
                return Err(ValuationError::Validation(format!(
                    "ratchet at {} inventory {}: min rate {} exceeds max rate {}",
                    self.period, point.inventory, point.min_rate, point.max_rate
                )));
            }
        }
        if self
            .points
            .windows(2)
            .any(|w| w[1].inventory <= w[0].inventory)
        {
            return Err(ValuationError::Validation(format!(
                "ratchet at {} breakpoints must be strictly increasing in inventory",
                self.period
            )));
        }
        Ok(())
    }
}

/// Column-split copy of a validated [`Ratchet`] for fast clamped lookups.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RatchetCurve {
    pub(crate) period: TimePeriod,
    pub(crate) inventories: Vec<f64>,
    min_rates: Vec<f64>,
    max_rates: Vec<f64>,
}

impl RatchetCurve {
    pub(crate) fn from_ratchet(ratchet: &Ratchet) -> Self {
        Self {
            period: ratchet.period,
            inventories: ratchet.points.iter().map(|p| p.inventory).collect(),
            min_rates: ratchet.points.iter().map(|p| p.min_rate).collect(),
            max_rates: ratchet.points.iter().map(|p| p.max_rate).collect(),
        }
    }

    #[inline]
    pub(crate) fn range(&self, inventory: f64) -> InjectWithdrawRange {
        InjectWithdrawRange {
            min_rate: interpolate_clamped(&self.inventories, &self.min_rates, inventory),
            max_rate: interpolate_clamped(&self.inventories, &self.max_rates, inventory),
        }
    }

    pub(crate) fn min_inventory(&self) -> f64 {
        self.inventories[0]
    }

    pub(crate) fn max_inventory(&self) -> f64 {
        self.inventories[self.inventories.len() - 1]
    }
}
