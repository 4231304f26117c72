//! Intrinsic valuation: optimal operation against the fixed forward curve.
//!
//! A single backward sweep over per-period inventory grids computes the value function; the
//! schedule is then recovered by replaying the optimal decisions forward from the starting
//! inventory. The reported NPV is the discounted cashflow of that replayed schedule. The sweep
//! values inventories between grid nodes by interpolation, while the replay re-optimizes at the
//! inventory actually held, so the two can differ by the interpolation error when rates do not
//! line up with the grid spacing.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::core::{DiagKey, Diagnostics, ValuationEngine, ValuationError, ValuationResult};
use crate::engines::decision::{DecisionScratch, PeriodEconomics, optimal_decision};
use crate::engines::problem::StorageProblem;
use crate::engines::replay::{DecisionPolicy, PathStep, ReplaySummary, replay};
use crate::engines::{DEFAULT_GRID_POINTS, DEFAULT_TOLERANCE, validate_grid_points, validate_tolerance};
use crate::market::StorageMarket;
use crate::math::InventoryGridInterpolator;
use crate::storage::CmdtyStorage;
use crate::time::{TimePeriod, TimeSeries};

/// Technical settings of the intrinsic engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicSettings {
    grid_points: usize,
    tolerance: f64,
}

impl IntrinsicSettings {
    /// Settings with `grid_points` inventory nodes per period (at least 2).
    pub fn new(grid_points: usize) -> Result<Self, ValuationError> {
        validate_grid_points(grid_points)?;
        Ok(Self {
            grid_points,
            tolerance: DEFAULT_TOLERANCE,
        })
    }

    /// Relative tolerance under which decisions are treated as equally good.
    pub fn with_tolerance(mut self, tolerance: f64) -> Result<Self, ValuationError> {
        validate_tolerance(tolerance)?;
        self.tolerance = tolerance;
        Ok(self)
    }

    pub fn grid_points(&self) -> usize {
        self.grid_points
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }
}

impl Default for IntrinsicSettings {
    fn default() -> Self {
        Self {
            grid_points: DEFAULT_GRID_POINTS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Operation of the storage in one period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StorageProfile {
    /// Opening inventory.
    pub inventory: f64,
    /// Net injected (positive) or withdrawn volume.
    pub inject_withdraw_volume: f64,
    pub cmdty_consumed: f64,
    pub inventory_loss: f64,
    pub closing_inventory: f64,
    /// Commodity bought (positive) or sold: `-(volume + consumed)` as seen by the market.
    pub net_position: f64,
    /// Discounted cashflow of the period.
    pub period_pv: f64,
}

/// Intrinsic NPV and the optimal schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicValuationResult {
    pub npv: f64,
    pub profile: TimeSeries<StorageProfile>,
    /// Discounted terminal value of the inventory left at the end.
    pub terminal_pv: f64,
}

/// Deterministic backward-induction engine.
#[derive(Debug, Clone, Default)]
pub struct IntrinsicEngine {
    settings: IntrinsicSettings,
}

/// Forward-curve policy with the value function from the backward sweep.
struct IntrinsicPolicy<'a> {
    forwards: &'a [f64],
    values: &'a [Vec<f64>],
}

impl DecisionPolicy for IntrinsicPolicy<'_> {
    fn num_paths(&self) -> usize {
        1
    }

    fn price(&self, k: usize, _path: usize) -> f64 {
        self.forwards[k]
    }

    fn continuation(&self, k: usize, _path: usize, out: &mut Vec<f64>) {
        out.clear();
        out.extend_from_slice(&self.values[k + 1]);
    }

    fn terminal_price(&self, _path: usize) -> f64 {
        self.forwards[self.forwards.len() - 1]
    }
}

struct IntrinsicRun {
    summary: ReplaySummary,
    first: TimePeriod,
    num_decisions: usize,
}

/// Value function on every grid, offsets `0..=num_decisions`.
fn backward_values(
    problem: &StorageProblem<'_>,
    tolerance: f64,
) -> Result<Vec<Vec<f64>>, ValuationError> {
    let n = problem.num_decisions;
    let mut values = vec![Vec::new(); n + 1];
    values[n] = problem.grids[n]
        .nodes()
        .iter()
        .map(|&inventory| problem.terminal_pv(problem.forwards[n], inventory))
        .collect();

    let mut scratch = DecisionScratch::default();
    for k in (0..n).rev() {
        let economics = PeriodEconomics {
            storage: problem.storage,
            period: problem.period(k),
            price: problem.forwards[k],
            discount_factor: problem.discount_factors[k],
        };
        let next = InventoryGridInterpolator::new(&problem.grids[k + 1], &values[k + 1])?;
        let current = problem.grids[k]
            .nodes()
            .iter()
            .map(|&inventory| {
                optimal_decision(&economics, inventory, next, tolerance, &mut scratch)
                    .map(|(_, value)| value)
            })
            .collect::<Result<Vec<_>, _>>()?;
        trace!(period = %economics.period, nodes = current.len(), "intrinsic period solved");
        values[k] = current;
    }
    Ok(values)
}

/// Optimal schedule against the forward curve, replayed from the starting inventory.
///
/// `pv_mean` of the summary is the intrinsic NPV.
pub(crate) fn intrinsic_replay(
    problem: &StorageProblem<'_>,
    tolerance: f64,
) -> Result<ReplaySummary, ValuationError> {
    let values = backward_values(problem, tolerance)?;
    let policy = IntrinsicPolicy {
        forwards: &problem.forwards,
        values: &values,
    };
    let summary = replay(problem, &policy, problem.grids[0].min(), tolerance)?;
    trace!(
        grid_value = values[0][0],
        replayed = summary.pv_mean,
        "intrinsic schedule replayed"
    );
    Ok(summary)
}

impl IntrinsicEngine {
    pub fn new(settings: IntrinsicSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &IntrinsicSettings {
        &self.settings
    }

    fn solve(
        &self,
        storage: &CmdtyStorage,
        market: &StorageMarket,
        inventory: f64,
    ) -> Result<Option<IntrinsicRun>, ValuationError> {
        let Some(problem) =
            StorageProblem::prepare(storage, market, inventory, self.settings.grid_points)?
        else {
            debug!("valuation date is on or after storage end; intrinsic value is zero");
            return Ok(None);
        };
        debug!(
            first = %problem.first,
            periods = problem.num_decisions,
            grid_points = self.settings.grid_points,
            "intrinsic valuation started"
        );
        let summary = intrinsic_replay(&problem, self.settings.tolerance)?;
        debug!(npv = summary.pv_mean, "intrinsic valuation finished");
        Ok(Some(IntrinsicRun {
            summary,
            first: problem.first,
            num_decisions: problem.num_decisions,
        }))
    }

    /// Intrinsic NPV and the period-by-period schedule.
    pub fn value_intrinsic(
        &self,
        storage: &CmdtyStorage,
        market: &StorageMarket,
        inventory: f64,
    ) -> Result<IntrinsicValuationResult, ValuationError> {
        let Some(run) = self.solve(storage, market, inventory)? else {
            return Ok(IntrinsicValuationResult {
                npv: 0.0,
                profile: TimeSeries::empty(storage.end()),
                terminal_pv: 0.0,
            });
        };
        let profile = run
            .summary
            .steps
            .iter()
            .map(|s| StorageProfile {
                inventory: s.opening,
                inject_withdraw_volume: s.volume,
                cmdty_consumed: s.consumed,
                inventory_loss: s.loss,
                closing_inventory: s.closing,
                net_position: -(s.volume + s.consumed),
                period_pv: s.pv,
            })
            .collect();
        Ok(IntrinsicValuationResult {
            npv: run.summary.pv_mean,
            profile: TimeSeries::new(run.first, profile),
            terminal_pv: run.summary.terminal_pv,
        })
    }
}

/// Builds the engine-neutral result from a replayed schedule.
pub(crate) fn result_from_summary(
    first: TimePeriod,
    npv: f64,
    intrinsic_npv: f64,
    summary: &ReplaySummary,
    diagnostics: Diagnostics,
) -> ValuationResult {
    let series = |f: fn(&PathStep) -> f64| {
        TimeSeries::new(first, summary.steps.iter().map(f).collect())
    };
    ValuationResult {
        npv,
        intrinsic_npv,
        extrinsic_npv: npv - intrinsic_npv,
        decision_profile: series(|s| s.volume),
        deltas: series(|s| s.delta),
        cmdty_consumed: series(|s| s.consumed),
        inventory_profile: series(|s| s.opening),
        diagnostics,
    }
}

/// Zero result for a valuation date at or after the storage end.
pub(crate) fn expired_result(storage: &CmdtyStorage) -> ValuationResult {
    let empty = || TimeSeries::empty(storage.end());
    ValuationResult {
        npv: 0.0,
        intrinsic_npv: 0.0,
        extrinsic_npv: 0.0,
        decision_profile: empty(),
        deltas: empty(),
        cmdty_consumed: empty(),
        inventory_profile: empty(),
        diagnostics: Diagnostics::new(),
    }
}

impl ValuationEngine for IntrinsicEngine {
    fn value(
        &self,
        storage: &CmdtyStorage,
        market: &StorageMarket,
        inventory: f64,
    ) -> Result<ValuationResult, ValuationError> {
        let Some(run) = self.solve(storage, market, inventory)? else {
            return Ok(expired_result(storage));
        };
        let mut diagnostics = Diagnostics::new();
        diagnostics.insert(DiagKey::GridPoints, self.settings.grid_points as f64);
        diagnostics.insert(DiagKey::NumPeriods, run.num_decisions as f64);
        diagnostics.insert(DiagKey::Tolerance, self.settings.tolerance);
        let npv = run.summary.pv_mean;
        Ok(result_from_summary(
            run.first,
            npv,
            npv,
            &run.summary,
            diagnostics,
        ))
    }
}
