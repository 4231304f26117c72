//! Storage valuation on a recombining trinomial tree for a one-factor mean-reverting spot.
//!
//! The log spot deviation `X` follows `dX = -kappa X dt + sigma dW` from `X(0) = 0`. Level
//! `l >= 1` of the tree sits at the start of the `(l - 1)`-th decision period; level 0 is the
//! valuation date. Node spacing is `sigma * sqrt(3 dt_max)` and the tree stops widening at
//! `j_max = ceil(0.1835 / (kappa dt_max))`, after Hull and White (1994). Branch probabilities
//! match the exact OU transition mean and variance, and each level is shifted so the expected
//! spot equals the forward price.
//!
//! The NPV is the tree expectation at the root. Profiles and deltas come from replaying the
//! tree policy along sampled node paths.

use chrono::NaiveTime;
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::core::{DiagKey, Diagnostics, ValuationEngine, ValuationError, ValuationResult};
use crate::engines::decision::{DecisionScratch, PeriodEconomics, optimal_decision};
use crate::engines::intrinsic::{expired_result, intrinsic_replay, result_from_summary};
use crate::engines::problem::StorageProblem;
use crate::engines::replay::{DecisionPolicy, replay};
use crate::engines::{
    DEFAULT_GRID_POINTS, DEFAULT_NUM_SIMS, DEFAULT_TOLERANCE, validate_grid_points,
    validate_tolerance,
};
use crate::market::StorageMarket;
use crate::math::InventoryGridInterpolator;
use crate::models::OneFactorMeanReverting;
use crate::models::simulation::stream_seed;
use crate::rates::{DayCountConvention, year_fraction_at};
use crate::storage::CmdtyStorage;

const HULL_WHITE_JMAX_FACTOR: f64 = 0.1835;

/// Technical settings of the trinomial engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrinomialSettings {
    grid_points: usize,
    tolerance: f64,
    /// Sampled tree paths for the expected profiles and deltas.
    profile_paths: usize,
    seed: Option<u64>,
}

impl TrinomialSettings {
    pub fn new(grid_points: usize) -> Result<Self, ValuationError> {
        validate_grid_points(grid_points)?;
        Ok(Self {
            grid_points,
            ..Self::default()
        })
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Result<Self, ValuationError> {
        validate_tolerance(tolerance)?;
        self.tolerance = tolerance;
        Ok(self)
    }

    pub fn with_profile_paths(mut self, paths: usize) -> Result<Self, ValuationError> {
        if paths == 0 {
            return Err(ValuationError::Validation(
                "number of profile paths must be positive".to_string(),
            ));
        }
        self.profile_paths = paths;
        Ok(self)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn grid_points(&self) -> usize {
        self.grid_points
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn profile_paths(&self) -> usize {
        self.profile_paths
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}

impl Default for TrinomialSettings {
    fn default() -> Self {
        Self {
            grid_points: DEFAULT_GRID_POINTS,
            tolerance: DEFAULT_TOLERANCE,
            profile_paths: DEFAULT_NUM_SIMS,
            seed: None,
        }
    }
}

/// Down, middle and up moves from one node, as node indices on the next level.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Branch {
    targets: [usize; 3],
    probs: [f64; 3],
}

impl Branch {
    fn stay(node: usize) -> Self {
        Self {
            targets: [node; 3],
            probs: [0.0, 1.0, 0.0],
        }
    }

    /// Probability-weighted next-level values, one entry per inventory node.
    fn expectation_into(&self, next: &[Vec<f64>], out: &mut Vec<f64>) {
        let [a, b, c] = self.targets;
        let [pa, pb, pc] = self.probs;
        out.clear();
        out.extend(
            next[a]
                .iter()
                .zip(&next[b])
                .zip(&next[c])
                .map(|((va, vb), vc)| pa * va + pb * vb + pc * vc),
        );
    }
}

/// Recombining tree of spot prices. Node `i` of a level with half-width `J` is `j = i - J`.
#[derive(Debug, Clone)]
struct SpotTree {
    dx: f64,
    half_widths: Vec<usize>,
    /// Branching from every node of level `l` into level `l + 1`.
    branches: Vec<Vec<Branch>>,
    /// Spot prices per node; empty for the root level.
    spots: Vec<Vec<f64>>,
}

/// Exact OU transition moments over `dt`, per unit of starting value and absolute variance.
fn ou_moments(kappa: f64, sigma: f64, dt: f64) -> (f64, f64) {
    if kappa > 0.0 {
        let decay = (-kappa * dt).exp();
        let var = sigma * sigma * (1.0 - (-2.0 * kappa * dt).exp()) / (2.0 * kappa);
        (decay, var)
    } else {
        (1.0, sigma * sigma * dt)
    }
}

/// Hull-White branch probabilities around a center at offset `eta` from the expected value.
fn branch_probs(var: f64, eta: f64, dx: f64) -> [f64; 3] {
    let dx2 = dx * dx;
    let base = (var + eta * eta) / (2.0 * dx2);
    let tilt = eta / (2.0 * dx);
    let mut probs = [base - tilt, 1.0 - 2.0 * base, base + tilt];
    for p in probs.iter_mut() {
        *p = p.max(0.0);
    }
    let total: f64 = probs.iter().sum();
    probs.map(|p| p / total)
}

impl SpotTree {
    /// Builds the tree through `times` (years from valuation, non-decreasing) with `forwards`
    /// giving the expected spot at each of those times.
    fn build(model: &OneFactorMeanReverting, times: &[f64], forwards: &[f64]) -> Self {
        let kappa = model.mean_reversion;
        let sigma = model.spot_vol;
        let level_times: Vec<f64> = std::iter::once(0.0).chain(times.iter().copied()).collect();
        let dts: Vec<f64> = level_times.windows(2).map(|w| (w[1] - w[0]).max(0.0)).collect();
        let dt_max = dts.iter().copied().fold(0.0, f64::max);
        let degenerate = sigma == 0.0 || dt_max == 0.0;
        let dx = if degenerate {
            0.0
        } else {
            sigma * (3.0 * dt_max).sqrt()
        };
        let j_cap = if degenerate {
            0
        } else if kappa > 0.0 {
            (HULL_WHITE_JMAX_FACTOR / (kappa * dt_max)).ceil() as usize
        } else {
            usize::MAX
        };

        let mut half_widths = Vec::with_capacity(level_times.len());
        half_widths.push(0usize);
        let mut branches = Vec::with_capacity(dts.len());
        for &dt in &dts {
            let width = half_widths[half_widths.len() - 1];
            let nodes = 2 * width + 1;
            if degenerate || dt == 0.0 {
                branches.push((0..nodes).map(Branch::stay).collect());
                half_widths.push(width);
                continue;
            }
            let next_width = (width + 1).min(j_cap).max(1);
            let (decay, var) = ou_moments(kappa, sigma, dt);
            let reach = next_width as i64 - 1;
            let level: Vec<Branch> = (0..nodes)
                .map(|i| {
                    let j = i as i64 - width as i64;
                    let mean = j as f64 * dx * decay;
                    let center = ((mean / dx).round() as i64).clamp(-reach, reach);
                    let eta = mean - center as f64 * dx;
                    let mid = (center + next_width as i64) as usize;
                    Branch {
                        targets: [mid - 1, mid, mid + 1],
                        probs: branch_probs(var, eta, dx),
                    }
                })
                .collect();
            branches.push(level);
            half_widths.push(next_width);
        }

        // Forward induction of state probabilities, then a level shift matching E[S] = F.
        let mut spots = Vec::with_capacity(level_times.len());
        spots.push(Vec::new());
        let mut probs = vec![1.0];
        for (l, level) in branches.iter().enumerate() {
            let next_width = half_widths[l + 1];
            let mut next = vec![0.0; 2 * next_width + 1];
            for (q, branch) in probs.iter().zip(level) {
                for (t, p) in branch.targets.iter().zip(branch.probs) {
                    next[*t] += q * p;
                }
            }
            let offsets: Vec<f64> = (0..next.len())
                .map(|i| (i as f64 - next_width as f64) * dx)
                .collect();
            let mean_growth: f64 = next
                .iter()
                .zip(&offsets)
                .map(|(q, x)| q * x.exp())
                .sum();
            let shift = -mean_growth.ln();
            let forward = forwards[l];
            spots.push(offsets.iter().map(|x| forward * (shift + x).exp()).collect());
            probs = next;
        }

        Self {
            dx,
            half_widths,
            branches,
            spots,
        }
    }

    fn num_levels(&self) -> usize {
        self.half_widths.len()
    }

    fn max_nodes(&self) -> usize {
        self.half_widths.iter().map(|w| 2 * w + 1).max().unwrap_or(1)
    }

    fn is_degenerate(&self) -> bool {
        self.max_nodes() == 1
    }

    /// Node index on every level for one randomly walked path.
    fn sample_path(&self, rng: &mut StdRng) -> Vec<usize> {
        let mut node = 0;
        let mut path = Vec::with_capacity(self.num_levels());
        path.push(node);
        for level in &self.branches {
            let branch = &level[node];
            let u: f64 = rng.random();
            node = if u < branch.probs[0] {
                branch.targets[0]
            } else if u < branch.probs[0] + branch.probs[1] {
                branch.targets[1]
            } else {
                branch.targets[2]
            };
            path.push(node);
        }
        path
    }
}

/// Tree policy replayed along sampled node paths.
struct TreePolicy<'a> {
    tree: &'a SpotTree,
    values: &'a [Vec<Vec<f64>>],
    paths: &'a [Vec<usize>],
}

impl DecisionPolicy for TreePolicy<'_> {
    fn num_paths(&self) -> usize {
        self.paths.len()
    }

    fn price(&self, k: usize, path: usize) -> f64 {
        self.tree.spots[k + 1][self.paths[path][k + 1]]
    }

    fn continuation(&self, k: usize, path: usize, out: &mut Vec<f64>) {
        let node = self.paths[path][k + 1];
        self.tree.branches[k + 1][node].expectation_into(&self.values[k + 2], out);
    }

    fn terminal_price(&self, path: usize) -> f64 {
        let last = self.tree.num_levels() - 1;
        self.tree.spots[last][self.paths[path][last]]
    }
}

/// Backward induction over (tree node, inventory) under a one-factor mean-reverting model.
#[derive(Debug, Clone)]
pub struct TrinomialEngine {
    model: OneFactorMeanReverting,
    settings: TrinomialSettings,
}

impl TrinomialEngine {
    pub fn new(
        model: OneFactorMeanReverting,
        settings: TrinomialSettings,
    ) -> Result<Self, ValuationError> {
        model.validate()?;
        Ok(Self { model, settings })
    }

    pub fn model(&self) -> &OneFactorMeanReverting {
        &self.model
    }

    pub fn settings(&self) -> &TrinomialSettings {
        &self.settings
    }

    /// Tree values for levels `1..`; level `l` holds one row per node over grid `l - 1`.
    fn backward(
        &self,
        problem: &StorageProblem<'_>,
        tree: &SpotTree,
    ) -> Result<Vec<Vec<Vec<f64>>>, ValuationError> {
        let n = problem.num_decisions;
        let storage = problem.storage;
        let tolerance = self.settings.tolerance;
        let mut values: Vec<Vec<Vec<f64>>> = vec![Vec::new(); n + 2];
        values[n + 1] = tree.spots[n + 1]
            .iter()
            .map(|&spot| {
                problem.grids[n]
                    .nodes()
                    .iter()
                    .map(|&inventory| problem.terminal_pv(spot, inventory))
                    .collect()
            })
            .collect();

        for l in (1..=n).rev() {
            let k = l - 1;
            let period = problem.period(k);
            let next = &values[l + 1];
            let next_grid = &problem.grids[k + 1];
            let inventories = problem.grids[k].nodes();
            let solve_node = |node: usize| -> Result<Vec<f64>, ValuationError> {
                let mut scratch = DecisionScratch::default();
                let mut continuation = Vec::with_capacity(next_grid.len());
                tree.branches[l][node].expectation_into(next, &mut continuation);
                let economics = PeriodEconomics {
                    storage,
                    period,
                    price: tree.spots[l][node],
                    discount_factor: problem.discount_factors[k],
                };
                let guide = InventoryGridInterpolator::new(next_grid, &continuation)?;
                inventories
                    .iter()
                    .map(|&inventory| {
                        optimal_decision(&economics, inventory, guide, tolerance, &mut scratch)
                            .map(|(_, value)| value)
                    })
                    .collect()
            };

            let num_nodes = tree.spots[l].len();
            #[cfg(feature = "parallel")]
            let level: Vec<Vec<f64>> = (0..num_nodes)
                .into_par_iter()
                .map(solve_node)
                .collect::<Result<_, _>>()?;
            #[cfg(not(feature = "parallel"))]
            let level: Vec<Vec<f64>> = (0..num_nodes)
                .map(solve_node)
                .collect::<Result<_, _>>()?;

            trace!(period = %period, tree_nodes = num_nodes, "trinomial level solved");
            values[l] = level;
        }
        Ok(values)
    }
}

impl ValuationEngine for TrinomialEngine {
    fn value(
        &self,
        storage: &CmdtyStorage,
        market: &StorageMarket,
        inventory: f64,
    ) -> Result<ValuationResult, ValuationError> {
        let Some(problem) =
            StorageProblem::prepare(storage, market, inventory, self.settings.grid_points)?
        else {
            debug!("valuation date is on or after storage end; value is zero");
            return Ok(expired_result(storage));
        };
        let n = problem.num_decisions;
        let valuation = market.valuation_date().and_time(NaiveTime::MIN);
        let times: Vec<f64> = (0..=n)
            .map(|k| {
                year_fraction_at(
                    valuation,
                    problem.period(k).start(),
                    DayCountConvention::Act365Fixed,
                )
                .max(0.0)
            })
            .collect();
        let tree = SpotTree::build(&self.model, &times, &problem.forwards);
        debug!(
            first = %problem.first,
            periods = n,
            tree_width = tree.max_nodes(),
            dx = tree.dx,
            grid_points = self.settings.grid_points,
            "trinomial valuation started"
        );

        let intrinsic_npv = intrinsic_replay(&problem, self.settings.tolerance)?.pv_mean;
        let values = self.backward(&problem, &tree)?;
        let mut root = Vec::new();
        tree.branches[0][0].expectation_into(&values[1], &mut root);

        let num_paths = if tree.is_degenerate() {
            1
        } else {
            self.settings.profile_paths
        };
        let base_seed = self
            .settings
            .seed
            .unwrap_or_else(|| rand::rng().random::<u64>());
        let paths: Vec<Vec<usize>> = (0..num_paths)
            .map(|i| tree.sample_path(&mut StdRng::seed_from_u64(stream_seed(base_seed, i))))
            .collect();
        let policy = TreePolicy {
            tree: &tree,
            values: &values,
            paths: &paths,
        };
        let summary = replay(&problem, &policy, inventory, self.settings.tolerance)?;
        // A single-node tree has one deterministic path, whose replay is the exact policy value.
        let npv = if tree.is_degenerate() {
            summary.pv_mean
        } else {
            root[0]
        };
        debug!(npv, intrinsic_npv, tree_value = root[0], "trinomial valuation finished");

        let mut diagnostics = Diagnostics::new();
        diagnostics.insert(DiagKey::TreeWidth, tree.max_nodes() as f64);
        diagnostics.insert(DiagKey::GridPoints, self.settings.grid_points as f64);
        diagnostics.insert(DiagKey::NumPeriods, n as f64);
        diagnostics.insert(DiagKey::NumPaths, num_paths as f64);
        diagnostics.insert(DiagKey::StdErr, summary.pv_stderr);
        diagnostics.insert(DiagKey::Tolerance, self.settings.tolerance);
        Ok(result_from_summary(
            problem.first,
            npv,
            intrinsic_npv,
            &summary,
            diagnostics,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::{IntrinsicEngine, IntrinsicSettings};
    use crate::time::{TimePeriod, TimeSeries};
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use chrono::NaiveDate;

    fn day(d: u32) -> TimePeriod {
        TimePeriod::day(NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
    }

    fn storage() -> CmdtyStorage {
        CmdtyStorage::builder()
            .active_period(day(2), day(12))
            .constant_limits(0.0, 100.0, 20.0, 10.0)
            .unit_costs(0.05, 0.05)
            .build()
            .unwrap()
    }

    fn market() -> StorageMarket {
        let prices = vec![10.0, 10.0, 9.5, 9.0, 9.5, 10.0, 11.0, 11.5, 11.0, 10.5, 10.0, 10.0];
        StorageMarket::builder()
            .valuation_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .forward_curve(TimeSeries::new(day(1), prices))
            .flat_rate(0.02)
            .build()
            .unwrap()
    }

    #[test]
    fn probabilities_are_valid_and_levels_match_forwards() {
        let model = OneFactorMeanReverting::new(20.0, 0.8);
        let times: Vec<f64> = (1..=30).map(|d| d as f64 / 365.0).collect();
        let forwards: Vec<f64> = (0..30).map(|d| 10.0 + d as f64 * 0.1).collect();
        let tree = SpotTree::build(&model, &times, &forwards);
        for level in &tree.branches {
            for branch in level {
                let total: f64 = branch.probs.iter().sum();
                assert_abs_diff_eq!(total, 1.0, epsilon = 1e-12);
                assert!(branch.probs.iter().all(|p| *p >= 0.0));
            }
        }

        let mut probs = vec![1.0];
        for (l, level) in tree.branches.iter().enumerate() {
            let mut next = vec![0.0; tree.spots[l + 1].len()];
            for (q, branch) in probs.iter().zip(level) {
                for (t, p) in branch.targets.iter().zip(branch.probs) {
                    next[*t] += q * p;
                }
            }
            let mean: f64 = next.iter().zip(&tree.spots[l + 1]).map(|(q, s)| q * s).sum();
            assert_relative_eq!(mean, forwards[l], max_relative = 1e-12);
            probs = next;
        }
    }

    #[test]
    fn width_stops_at_hull_white_cap() {
        let model = OneFactorMeanReverting::new(30.0, 0.5);
        let times: Vec<f64> = (1..=60).map(|d| d as f64 / 365.0).collect();
        let tree = SpotTree::build(&model, &times, &[10.0; 60]);
        let j_max = (HULL_WHITE_JMAX_FACTOR * 365.0 / 30.0).ceil() as usize;
        assert_eq!(*tree.half_widths.iter().max().unwrap(), j_max);
        assert_eq!(tree.max_nodes(), 2 * j_max + 1);
    }

    #[test]
    fn zero_vol_tree_is_a_single_node() {
        let model = OneFactorMeanReverting::new(5.0, 0.0);
        let tree = SpotTree::build(&model, &[0.1, 0.2], &[7.0, 8.0]);
        assert!(tree.is_degenerate());
        assert_eq!(tree.spots[2], vec![8.0]);
    }

    #[test]
    fn zero_vol_matches_intrinsic() {
        let engine = TrinomialEngine::new(
            OneFactorMeanReverting::new(5.0, 0.0),
            TrinomialSettings::new(21).unwrap(),
        )
        .unwrap();
        let result = engine.value(&storage(), &market(), 0.0).unwrap();
        let intrinsic = IntrinsicEngine::new(IntrinsicSettings::new(21).unwrap())
            .value(&storage(), &market(), 0.0)
            .unwrap();
        assert_relative_eq!(result.npv, intrinsic.npv, max_relative = 1e-12);
        assert_eq!(result.decision_profile, intrinsic.decision_profile);
        assert_eq!(result.diagnostics.get("tree_width"), Some(1.0));
    }

    #[test]
    fn volatility_adds_extrinsic_value() {
        let settings = TrinomialSettings::new(21).unwrap().with_seed(4);
        let engine =
            TrinomialEngine::new(OneFactorMeanReverting::new(15.0, 0.9), settings).unwrap();
        let result = engine.value(&storage(), &market(), 0.0).unwrap();
        assert!(result.npv > result.intrinsic_npv);
        assert_eq!(result.decision_profile.len(), 10);
        assert_eq!(result.diagnostics.get("num_paths"), Some(1000.0));
    }

    #[test]
    fn invalid_model_is_rejected() {
        let err = TrinomialEngine::new(
            OneFactorMeanReverting::new(-1.0, 0.3),
            TrinomialSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ValuationError::Validation(_)));
        assert!(TrinomialSettings::default().with_profile_paths(0).is_err());
    }
}
