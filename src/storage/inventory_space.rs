//! Feasible inventory bounds per period.
//!
//! The bounds are the forward-reachable inventories from the starting inventory, narrowed
//! backwards to those from which the end constraint can still be met. Rate limits are
//! piecewise linear in inventory, so both passes evaluate the ratchet breakpoints and are
//! exact.

use crate::core::ValuationError;
use crate::storage::CmdtyStorage;
use crate::time::TimePeriod;

/// Closed inventory interval.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InventoryBounds {
    pub min: f64,
    pub max: f64,
}

/// Feasible inventory bounds for every period from the first decision period to the end.
#[derive(Debug, Clone, PartialEq)]
pub struct InventorySpace {
    first: TimePeriod,
    bounds: Vec<InventoryBounds>,
}

#[inline]
fn slack(a: f64, b: f64) -> f64 {
    1.0e-9 * a.abs().max(b.abs()).max(1.0)
}

/// Ratchet breakpoints inside `(lo, hi)` plus both ends.
fn knots(storage: &CmdtyStorage, period: TimePeriod, lo: f64, hi: f64) -> Vec<f64> {
    let mut out = vec![lo];
    out.extend(
        storage
            .inventory_breakpoints(period)
            .iter()
            .copied()
            .filter(|&b| b > lo && b < hi),
    );
    if hi > lo {
        out.push(hi);
    }
    out
}

/// `{x in [x0, x1] : h0 + slope * (x - x0) <= c}`, as an interval if non-empty.
fn below_on_segment(x0: f64, x1: f64, h0: f64, h1: f64, c: f64) -> Option<(f64, f64)> {
    if x1 <= x0 {
        return (h0 <= c).then_some((x0, x0));
    }
    let slope = (h1 - h0) / (x1 - x0);
    if slope == 0.0 {
        return (h0 <= c).then_some((x0, x1));
    }
    let cross = x0 + (c - h0) / slope;
    let (lo, hi) = if slope > 0.0 {
        (x0, cross.min(x1))
    } else {
        (cross.max(x0), x1)
    };
    (lo <= hi).then_some((lo, hi))
}

/// Inventories in `within` from which some decision at `period` lands in `target`.
fn backward_feasible(
    storage: &CmdtyStorage,
    period: TimePeriod,
    within: InventoryBounds,
    target: InventoryBounds,
    tol: f64,
) -> Option<(f64, f64)> {
    let xs = knots(storage, period, within.min, within.max);
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    let mut visit = |x0: f64, x1: f64| {
        let (r0, r1) = (
            storage.inject_withdraw_range(period, x0),
            storage.inject_withdraw_range(period, x1),
        );
        // Lowest reachable next inventory must not exceed the target max.
        let low_ok = below_on_segment(
            x0,
            x1,
            storage.next_inventory(period, x0, r0.min_rate),
            storage.next_inventory(period, x1, r1.min_rate),
            target.max + tol,
        );
        // Highest reachable next inventory must reach the target min.
        let high_ok = below_on_segment(
            x0,
            x1,
            -storage.next_inventory(period, x0, r0.max_rate),
            -storage.next_inventory(period, x1, r1.max_rate),
            tol - target.min,
        );
        if let (Some((l0, h0)), Some((l1, h1))) = (low_ok, high_ok) {
            let (l, h) = (l0.max(l1), h0.min(h1));
            if l <= h {
                lo = lo.min(l);
                hi = hi.max(h);
            }
        }
    };
    if xs.len() == 1 {
        visit(xs[0], xs[0]);
    } else {
        for w in xs.windows(2) {
            visit(w[0], w[1]);
        }
    }
    (lo <= hi).then_some((lo, hi))
}

impl InventorySpace {
    /// Computes bounds for `[first, storage.end()]` starting from `inventory` at `first`.
    pub fn compute(
        storage: &CmdtyStorage,
        first: TimePeriod,
        inventory: f64,
    ) -> Result<Self, ValuationError> {
        let end = storage.end();
        let num_decisions = usize::try_from(first.periods_until(&end)).unwrap_or(0);

        let (phys_min, phys_max) = (storage.min_inventory(first), storage.max_inventory(first));
        let tol = slack(phys_min, phys_max);
        if !inventory.is_finite() || inventory < phys_min - tol || inventory > phys_max + tol {
            return Err(ValuationError::Domain(format!(
                "starting inventory {inventory} is outside [{phys_min}, {phys_max}] at {first}"
            )));
        }

        let mut forward = Vec::with_capacity(num_decisions + 1);
        forward.push(InventoryBounds {
            min: inventory,
            max: inventory,
        });
        for k in 0..num_decisions {
            let period = first.offset(k as i64);
            let next = period.successor();
            let InventoryBounds { min: lo, max: hi } = forward[k];
            let mut next_lo = f64::INFINITY;
            let mut next_hi = f64::NEG_INFINITY;
            for x in knots(storage, period, lo, hi) {
                let range = storage.inject_withdraw_range(period, x);
                next_lo = next_lo.min(storage.next_inventory(period, x, range.min_rate));
                next_hi = next_hi.max(storage.next_inventory(period, x, range.max_rate));
            }
            let min = next_lo.max(storage.min_inventory(next));
            let max = next_hi.min(storage.max_inventory(next));
            if min > max + slack(min, max) {
                return Err(ValuationError::Domain(format!(
                    "no physically feasible inventory is reachable at {next}"
                )));
            }
            forward.push(InventoryBounds {
                min,
                max: max.max(min),
            });
        }

        let mut bounds = forward.clone();
        if storage.must_be_empty_at_end() {
            let at_end = forward[num_decisions];
            if at_end.min > slack(at_end.min, 0.0) || at_end.max < -slack(at_end.max, 0.0) {
                return Err(ValuationError::Domain(format!(
                    "storage cannot be emptied by {end}; reachable inventory is [{}, {}]",
                    at_end.min, at_end.max
                )));
            }
            bounds[num_decisions] = InventoryBounds { min: 0.0, max: 0.0 };
        }

        for k in (0..num_decisions).rev() {
            let period = first.offset(k as i64);
            let target = bounds[k + 1];
            let forward_k = forward[k];
            let feasible = backward_feasible(storage, period, forward_k, target, 0.0).or_else(|| {
                let tol = slack(target.min, target.max);
                backward_feasible(storage, period, forward_k, target, tol)
            });
            let Some((min, max)) = feasible else {
                return Err(ValuationError::Domain(format!(
                    "no inventory at {period} can satisfy the constraints of later periods"
                )));
            };
            bounds[k] = InventoryBounds { min, max };
        }

        let start = bounds[0];
        let tol = slack(start.min, start.max);
        if inventory < start.min - tol || inventory > start.max + tol {
            return Err(ValuationError::Domain(format!(
                "starting inventory {inventory} cannot meet the end constraint at {end}"
            )));
        }
        bounds[0] = InventoryBounds {
            min: inventory,
            max: inventory,
        };

        Ok(Self { first, bounds })
    }

    pub fn first(&self) -> TimePeriod {
        self.first
    }

    /// Bounds at `period`, for periods from `first` through the storage end.
    pub fn bounds(&self, period: TimePeriod) -> Option<InventoryBounds> {
        let offset = self.first.periods_until(&period);
        usize::try_from(offset)
            .ok()
            .and_then(|k| self.bounds.get(k))
            .copied()
    }

    /// Bounds by offset from `first`.
    pub fn bounds_at(&self, k: usize) -> InventoryBounds {
        self.bounds[k]
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }
}
