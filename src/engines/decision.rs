//! Period decision rule shared by the engines.
//!
//! The objective `cashflow(d) + continuation(i * (1 - loss) + d)` is piecewise linear in `d`
//! when costs are per unit and the continuation is interpolated linearly on the next grid, so
//! its maximum sits on a rate bound, at zero, or on a decision landing exactly on a next-grid
//! node. Only those candidates are evaluated.

use crate::core::ValuationError;
use crate::math::{InventoryGrid, InventoryGridInterpolator};
use crate::storage::CmdtyStorage;
use crate::time::TimePeriod;

/// Economics of one decision period at a given commodity price.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PeriodEconomics<'a> {
    pub storage: &'a CmdtyStorage,
    pub period: TimePeriod,
    pub price: f64,
    pub discount_factor: f64,
}

impl PeriodEconomics<'_> {
    /// Commodity bought (negative: sold) for a decision, including consumption.
    #[inline]
    pub fn net_volume(&self, inventory: f64, volume: f64) -> f64 {
        volume + self.storage.cmdty_consumed(self.period, inventory, volume)
    }

    /// Discounted cashflow of injecting (`volume > 0`) or withdrawing at `inventory`.
    #[inline]
    pub fn cashflow(&self, inventory: f64, volume: f64) -> f64 {
        let storage = self.storage;
        let closing = storage.next_inventory(self.period, inventory, volume);
        let undiscounted = -self.net_volume(inventory, volume) * self.price
            - storage.decision_cost(self.period, inventory, volume)
            - storage.inventory_cost(self.period, closing);
        undiscounted * self.discount_factor
    }
}

/// A decision volume, with the next-grid node it lands on when exact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Candidate {
    pub volume: f64,
    pub node: Option<usize>,
}

/// Continuation at `inventory`, or the stored value at `node` when a decision lands on it.
#[inline]
pub(crate) fn continuation_value(
    continuation: &InventoryGridInterpolator<'_>,
    inventory: f64,
    node: Option<usize>,
) -> f64 {
    match node {
        Some(k) => continuation.node_value(k),
        None => continuation.value(inventory),
    }
}

#[inline]
fn feasibility_slack(a: f64, b: f64) -> f64 {
    1.0e-9 * a.abs().max(b.abs()).max(1.0)
}

/// Writes the candidate decisions at `inventory` into `out`.
pub(crate) fn candidates(
    storage: &CmdtyStorage,
    period: TimePeriod,
    inventory: f64,
    next_grid: &InventoryGrid,
    out: &mut Vec<Candidate>,
) -> Result<(), ValuationError> {
    out.clear();
    let retained = storage.next_inventory(period, inventory, 0.0);
    let range = storage.inject_withdraw_range(period, inventory);
    let mut lo = range.min_rate.max(next_grid.min() - retained);
    let mut hi = range.max_rate.min(next_grid.max() - retained);
    if lo > hi {
        if lo - hi > feasibility_slack(lo, hi) {
            return Err(ValuationError::Domain(format!(
                "no feasible decision at inventory {inventory} in {period}: rates allow \
                 [{}, {}] but next inventory must lie in [{}, {}]",
                range.min_rate,
                range.max_rate,
                next_grid.min(),
                next_grid.max()
            )));
        }
        let mid = 0.5 * (lo + hi);
        lo = mid;
        hi = mid;
    }

    let nodes = next_grid.nodes();
    let first = nodes.partition_point(|n| n - retained < lo);
    for (k, node) in nodes.iter().enumerate().skip(first) {
        let volume = node - retained;
        if volume > hi {
            break;
        }
        out.push(Candidate {
            volume,
            node: Some(k),
        });
    }
    for volume in [lo, hi, 0.0] {
        if volume >= lo && volume <= hi && !out.iter().any(|c| c.volume == volume) {
            out.push(Candidate { volume, node: None });
        }
    }
    Ok(())
}

/// Best candidate under `objective`; values within `tolerance` (relative) of the maximum are
/// ties, resolved towards the smallest absolute volume.
pub(crate) fn best_candidate(
    candidates: &[Candidate],
    tolerance: f64,
    scratch: &mut Vec<f64>,
    objective: impl Fn(&Candidate) -> f64,
) -> Candidate {
    scratch.clear();
    scratch.extend(candidates.iter().map(&objective));
    let best = scratch.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let threshold = best - tolerance * best.abs().max(1.0);
    let mut chosen = candidates[0];
    let mut chosen_abs = f64::INFINITY;
    for (c, v) in candidates.iter().zip(scratch.iter()) {
        if *v >= threshold && c.volume.abs() < chosen_abs {
            chosen = *c;
            chosen_abs = c.volume.abs();
        }
    }
    chosen
}

/// Reusable buffers for the decision search.
#[derive(Debug, Default)]
pub(crate) struct DecisionScratch {
    pub candidates: Vec<Candidate>,
    pub objective: Vec<f64>,
}

/// Optimal decision at `inventory` given continuation values on the next grid.
///
/// Returns the candidate and its objective `cashflow + continuation`.
#[inline]
pub(crate) fn optimal_decision(
    economics: &PeriodEconomics<'_>,
    inventory: f64,
    continuation: InventoryGridInterpolator<'_>,
    tolerance: f64,
    scratch: &mut DecisionScratch,
) -> Result<(Candidate, f64), ValuationError> {
    candidates(
        economics.storage,
        economics.period,
        inventory,
        continuation.grid(),
        &mut scratch.candidates,
    )?;
    let storage = economics.storage;
    let period = economics.period;
    let objective = |c: &Candidate| {
        let next = storage.next_inventory(period, inventory, c.volume);
        economics.cashflow(inventory, c.volume) + continuation_value(&continuation, next, c.node)
    };
    let chosen = best_candidate(
        &scratch.candidates,
        tolerance,
        &mut scratch.objective,
        &objective,
    );
    let value = objective(&chosen);
    Ok((chosen, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn day(d: u32) -> TimePeriod {
        TimePeriod::day(NaiveDate::from_ymd_opt(2023, 3, d).unwrap())
    }

    fn storage() -> CmdtyStorage {
        CmdtyStorage::builder()
            .active_period(day(1), day(10))
            .constant_limits(0.0, 100.0, 20.0, 10.0)
            .unit_costs(0.5, 0.25)
            .build()
            .unwrap()
    }

    #[test]
    fn candidates_cover_bounds_zero_and_nodes() {
        let s = storage();
        let grid = InventoryGrid::uniform(0.0, 100.0, 11).unwrap();
        let mut out = Vec::new();
        candidates(&s, day(2), 35.0, &grid, &mut out).unwrap();
        let volumes: Vec<f64> = out.iter().map(|c| c.volume).collect();
        // Nodes 20, 30, 40 are reachable from 35 with rates [-20, 10].
        assert_eq!(volumes, vec![-15.0, -5.0, 5.0, -20.0, 10.0, 0.0]);
        assert_eq!(out[0].node, Some(2));
    }

    #[test]
    fn candidates_respect_next_grid_bounds() {
        let s = storage();
        let grid = InventoryGrid::uniform(30.0, 40.0, 2).unwrap();
        let mut out = Vec::new();
        candidates(&s, day(2), 35.0, &grid, &mut out).unwrap();
        assert!(out.iter().all(|c| (-5.0..=5.0).contains(&c.volume)));
        assert!(candidates(&s, day(2), 0.0, &grid, &mut out).is_err());
    }

    #[test]
    fn cashflow_signs_follow_volume() {
        let s = storage();
        let e = PeriodEconomics {
            storage: &s,
            period: day(2),
            price: 10.0,
            discount_factor: 0.5,
        };
        assert_relative_eq!(e.cashflow(50.0, 10.0), (-100.0 - 5.0) * 0.5);
        assert_relative_eq!(e.cashflow(50.0, -10.0), (100.0 - 2.5) * 0.5);
        assert_eq!(e.cashflow(50.0, 0.0), 0.0);
    }

    #[test]
    fn ties_prefer_smallest_volume() {
        let cands = [
            Candidate {
                volume: -10.0,
                node: None,
            },
            Candidate {
                volume: 0.0,
                node: None,
            },
            Candidate {
                volume: 10.0,
                node: None,
            },
        ];
        let mut scratch = Vec::new();
        let chosen = best_candidate(&cands, 1e-10, &mut scratch, |_| 1.0);
        assert_eq!(chosen.volume, 0.0);
        let chosen = best_candidate(&cands, 1e-10, &mut scratch, |c| c.volume);
        assert_eq!(chosen.volume, 10.0);
    }

    #[test]
    fn optimal_decision_buys_low_sells_high() {
        let s = storage();
        let grid = InventoryGrid::uniform(0.0, 100.0, 11).unwrap();
        // Next period values inventory at 20 per unit.
        let values: Vec<f64> = grid.nodes().iter().map(|i| 20.0 * i).collect();
        let cont = InventoryGridInterpolator::new(&grid, &values).unwrap();
        let cheap = PeriodEconomics {
            storage: &s,
            period: day(2),
            price: 10.0,
            discount_factor: 1.0,
        };
        let mut scratch = DecisionScratch::default();
        let (c, v) = optimal_decision(&cheap, 50.0, cont, 1e-10, &mut scratch).unwrap();
        assert_eq!(c.volume, 10.0);
        assert_relative_eq!(v, -105.0 + 1200.0);
        let dear = PeriodEconomics { price: 30.0, ..cheap };
        let (c, _) = optimal_decision(&dear, 50.0, cont, 1e-10, &mut scratch).unwrap();
        assert_eq!(c.volume, -20.0);
    }
}
