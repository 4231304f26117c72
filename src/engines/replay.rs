//! Forward application of a stored decision policy.
//!
//! Each engine exposes its policy as prices plus continuation values on the next grid per
//! path; the replay walks every path from the starting inventory, re-optimizing at the
//! inventory actually reached, and aggregates the schedule, cashflows and pathwise deltas.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::core::ValuationError;
use crate::engines::decision::{DecisionScratch, PeriodEconomics, optimal_decision};
use crate::engines::problem::StorageProblem;
use crate::math::InventoryGridInterpolator;

/// Prices and continuation values for each path of a policy.
pub(crate) trait DecisionPolicy: Sync {
    fn num_paths(&self) -> usize;

    /// Commodity price at offset `k` on `path`.
    fn price(&self, k: usize, path: usize) -> f64;

    /// Values on grid `k + 1` that guide the decision at offset `k` on `path`.
    fn continuation(&self, k: usize, path: usize, out: &mut Vec<f64>);

    /// Price at the storage end on `path`, used by the terminal value.
    fn terminal_price(&self, path: usize) -> f64;
}

/// One period of one path, or the cross-path mean of it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct PathStep {
    pub opening: f64,
    pub volume: f64,
    pub consumed: f64,
    pub loss: f64,
    pub closing: f64,
    /// Discounted cashflow of the period.
    pub pv: f64,
    /// `-(volume + consumed) * df * S / F`.
    pub delta: f64,
}

impl PathStep {
    fn accumulate(&mut self, other: &PathStep) {
        self.opening += other.opening;
        self.volume += other.volume;
        self.consumed += other.consumed;
        self.loss += other.loss;
        self.closing += other.closing;
        self.pv += other.pv;
        self.delta += other.delta;
    }

    fn scale(&mut self, factor: f64) {
        self.opening *= factor;
        self.volume *= factor;
        self.consumed *= factor;
        self.loss *= factor;
        self.closing *= factor;
        self.pv *= factor;
        self.delta *= factor;
    }
}

/// Cross-path results of a replay.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ReplaySummary {
    /// Mean step per decision period.
    pub steps: Vec<PathStep>,
    /// Mean discounted terminal value.
    pub terminal_pv: f64,
    /// Mean total discounted value per path.
    pub pv_mean: f64,
    /// Standard error of `pv_mean`.
    pub pv_stderr: f64,
}

fn replay_path(
    problem: &StorageProblem<'_>,
    policy: &dyn DecisionPolicy,
    path: usize,
    inventory: f64,
    tolerance: f64,
) -> Result<(Vec<PathStep>, f64), ValuationError> {
    let storage = problem.storage;
    let mut steps = Vec::with_capacity(problem.num_decisions);
    let mut scratch = DecisionScratch::default();
    let mut continuation = Vec::new();
    let mut opening = inventory;
    for k in 0..problem.num_decisions {
        let period = problem.period(k);
        let price = policy.price(k, path);
        let economics = PeriodEconomics {
            storage,
            period,
            price,
            discount_factor: problem.discount_factors[k],
        };
        policy.continuation(k, path, &mut continuation);
        let next = InventoryGridInterpolator::new(&problem.grids[k + 1], &continuation)?;
        let (decision, _) = optimal_decision(&economics, opening, next, tolerance, &mut scratch)?;
        let volume = decision.volume;
        let retained = storage.next_inventory(period, opening, 0.0);
        let closing = match decision.node {
            Some(node) => problem.grids[k + 1].nodes()[node],
            None => storage.next_inventory(period, opening, volume),
        };
        let consumed = storage.cmdty_consumed(period, opening, volume);
        let forward = problem.forwards[k];
        let price_ratio = if forward != 0.0 { price / forward } else { 1.0 };
        steps.push(PathStep {
            opening,
            volume,
            consumed,
            loss: opening - retained,
            closing,
            pv: economics.cashflow(opening, volume),
            delta: -(volume + consumed) * economics.discount_factor * price_ratio,
        });
        opening = closing;
    }
    let terminal = problem.terminal_pv(policy.terminal_price(path), opening);
    Ok((steps, terminal))
}

/// Replays `policy` on every path from `inventory`.
pub(crate) fn replay(
    problem: &StorageProblem<'_>,
    policy: &dyn DecisionPolicy,
    inventory: f64,
    tolerance: f64,
) -> Result<ReplaySummary, ValuationError> {
    let num_paths = policy.num_paths();

    #[cfg(feature = "parallel")]
    let paths: Vec<(Vec<PathStep>, f64)> = (0..num_paths)
        .into_par_iter()
        .map(|path| replay_path(problem, policy, path, inventory, tolerance))
        .collect::<Result<_, _>>()?;
    #[cfg(not(feature = "parallel"))]
    let paths: Vec<(Vec<PathStep>, f64)> = (0..num_paths)
        .map(|path| replay_path(problem, policy, path, inventory, tolerance))
        .collect::<Result<_, _>>()?;

    let mut steps = vec![PathStep::default(); problem.num_decisions];
    let mut terminal_pv = 0.0;
    let mut totals = Vec::with_capacity(num_paths);
    for (path_steps, terminal) in &paths {
        for (acc, step) in steps.iter_mut().zip(path_steps) {
            acc.accumulate(step);
        }
        terminal_pv += terminal;
        totals.push(terminal + path_steps.iter().map(|s| s.pv).sum::<f64>());
    }
    let n = num_paths as f64;
    for step in &mut steps {
        step.scale(1.0 / n);
    }
    let pv_mean = totals.iter().sum::<f64>() / n;
    let variance = if num_paths > 1 {
        totals.iter().map(|t| (t - pv_mean).powi(2)).sum::<f64>() / (n - 1.0)
    } else {
        0.0
    };

    Ok(ReplaySummary {
        steps,
        terminal_pv: terminal_pv / n,
        pv_mean,
        pv_stderr: (variance / n).sqrt(),
    })
}
