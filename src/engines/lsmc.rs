//! Least-squares Monte Carlo storage valuation.
//!
//! Spot paths come from [`MultiFactorSpotSim`]. Walking backwards from the storage end, the
//! realized path values on the next period's inventory grid are regressed on the basis
//! functions evaluated at each path's current state. The fitted continuation drives the
//! decision at every (path, inventory) node, while the value carried backwards is the realized
//! one, which keeps the regression targets free of fitting noise.
//!
//! The NPV is the mean discounted cashflow of the fitted policy replayed forward along the
//! same paths from the starting inventory, so it matches the reported profile exactly.
//!
//! Numerical considerations: the NPV is an in-sample estimate; its standard error is reported
//! in the diagnostics. A singular regression falls back once to the reduced basis `1 + s`.
//!
//! References: Longstaff and Schwartz (2001); Boogert and de Jong (2008) for storage.

use std::time::Instant;

use nalgebra::DMatrix;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::basis::BasisFunctions;
use crate::core::{DiagKey, Diagnostics, ValuationEngine, ValuationError, ValuationResult};
use crate::engines::control::RunControl;
use crate::engines::decision::{
    DecisionScratch, PeriodEconomics, continuation_value, optimal_decision,
};
use crate::engines::intrinsic::{expired_result, intrinsic_replay, result_from_summary};
use crate::engines::problem::StorageProblem;
use crate::engines::replay::{DecisionPolicy, replay};
use crate::engines::{
    DEFAULT_BASIS, DEFAULT_GRID_POINTS, DEFAULT_NUM_SIMS, DEFAULT_TOLERANCE,
    validate_grid_points, validate_tolerance,
};
use crate::market::StorageMarket;
use crate::math::{InventoryGridInterpolator, RegressionError, least_squares};
use crate::models::{MultiFactorModel, MultiFactorSpotSim, SimulatedPaths, ThreeFactorSeasonal};
use crate::storage::CmdtyStorage;
use crate::time::TimePeriod;

const MIN_RCOND: f64 = 1.0e-13;
const REDUCED_BASIS: &str = "1 + s";

/// Technical settings of the LSMC engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LsmcSettings {
    num_sims: usize,
    grid_points: usize,
    seed: Option<u64>,
    basis: String,
    tolerance: f64,
    #[serde(skip)]
    deadline: Option<Instant>,
}

impl LsmcSettings {
    pub fn new(num_sims: usize, grid_points: usize) -> Result<Self, ValuationError> {
        if num_sims == 0 {
            return Err(ValuationError::Validation(
                "number of simulations must be positive".to_string(),
            ));
        }
        validate_grid_points(grid_points)?;
        Ok(Self {
            num_sims,
            grid_points,
            seed: None,
            basis: DEFAULT_BASIS.to_string(),
            tolerance: DEFAULT_TOLERANCE,
            deadline: None,
        })
    }

    /// Fixes the base seed; without it every call draws one from OS entropy.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Basis expression over `s` and the model's factor names, e.g. `1 + s + x_st**2`.
    pub fn with_basis(mut self, basis: impl Into<String>) -> Self {
        self.basis = basis.into();
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Result<Self, ValuationError> {
        validate_tolerance(tolerance)?;
        self.tolerance = tolerance;
        Ok(self)
    }

    /// Valuations still running at `deadline` fail with `Timeout`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn num_sims(&self) -> usize {
        self.num_sims
    }

    pub fn grid_points(&self) -> usize {
        self.grid_points
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn basis(&self) -> &str {
        &self.basis
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

impl Default for LsmcSettings {
    fn default() -> Self {
        Self {
            num_sims: DEFAULT_NUM_SIMS,
            grid_points: DEFAULT_GRID_POINTS,
            seed: None,
            basis: DEFAULT_BASIS.to_string(),
            tolerance: DEFAULT_TOLERANCE,
            deadline: None,
        }
    }
}

/// Continuation estimate for one period, one column per next-grid node.
#[derive(Debug, Clone)]
enum PeriodFit {
    /// All paths share the same state.
    Mean(Vec<f64>),
    Basis {
        reduced: bool,
        coefficients: DMatrix<f64>,
    },
}

struct BackwardPass {
    /// Fits for offsets `0..num_decisions`.
    fits: Vec<PeriodFit>,
    fallbacks: usize,
}

/// Regression-based valuation under a [`MultiFactorModel`].
#[derive(Debug, Clone)]
pub struct LsmcEngine {
    model: MultiFactorModel,
    settings: LsmcSettings,
    basis: BasisFunctions,
    reduced_basis: BasisFunctions,
}

impl LsmcEngine {
    /// Compiles the settings' basis against `s` and the model's factor names.
    pub fn new(model: MultiFactorModel, settings: LsmcSettings) -> Result<Self, ValuationError> {
        let variables = model.basis_variables();
        let basis = BasisFunctions::parse(&settings.basis, &variables)?;
        if basis.is_empty() {
            return Err(ValuationError::Validation(
                "basis must contain at least one function".to_string(),
            ));
        }
        let reduced_basis = BasisFunctions::parse(REDUCED_BASIS, &variables)?;
        Ok(Self {
            model,
            settings,
            basis,
            reduced_basis,
        })
    }

    pub fn three_factor(
        model: ThreeFactorSeasonal,
        settings: LsmcSettings,
    ) -> Result<Self, ValuationError> {
        Self::new(model.to_multi_factor()?, settings)
    }

    pub fn model(&self) -> &MultiFactorModel {
        &self.model
    }

    pub fn settings(&self) -> &LsmcSettings {
        &self.settings
    }

    /// Values the storage, reporting the completed fraction to `progress`.
    pub fn value_with_progress(
        &self,
        storage: &CmdtyStorage,
        market: &StorageMarket,
        inventory: f64,
        progress: Option<&dyn Fn(f64)>,
    ) -> Result<ValuationResult, ValuationError> {
        let control = RunControl::new(self.settings.deadline, progress);
        let Some(problem) =
            StorageProblem::prepare(storage, market, inventory, self.settings.grid_points)?
        else {
            debug!("valuation date is on or after storage end; value is zero");
            control.finish();
            return Ok(expired_result(storage));
        };
        let n = problem.num_decisions;
        let tolerance = self.settings.tolerance;
        debug!(
            first = %problem.first,
            periods = n,
            num_sims = self.settings.num_sims,
            grid_points = self.settings.grid_points,
            basis = %self.basis.source(),
            "lsmc valuation started"
        );

        let intrinsic_npv = intrinsic_replay(&problem, tolerance)?.pv_mean;

        // The end price only matters when inventory may be left over.
        let num_simulated = if storage.must_be_empty_at_end() { n } else { n + 1 };
        let periods: Vec<TimePeriod> = (0..num_simulated).map(|k| problem.period(k)).collect();
        let sim = MultiFactorSpotSim::new(
            &self.model,
            market.valuation_date(),
            market.forward_curve(),
            &periods,
        )?;
        let paths = sim.simulate(self.settings.num_sims, self.settings.seed)?;
        control.report(0.1);
        control.check_deadline()?;

        let pass = self.backward(&problem, &paths, &control)?;
        control.check_deadline()?;

        let policy = LsmcPolicy {
            engine: self,
            paths: &paths,
            fits: &pass.fits,
            terminal_forward: problem.forwards[n],
            num_decisions: n,
        };
        let summary = replay(&problem, &policy, inventory, tolerance)?;
        let (npv, std_err) = (summary.pv_mean, summary.pv_stderr);
        control.finish();
        debug!(
            npv,
            intrinsic_npv,
            std_err,
            fallbacks = pass.fallbacks,
            "lsmc valuation finished"
        );

        let mut diagnostics = Diagnostics::new();
        diagnostics.insert(DiagKey::NumPaths, self.settings.num_sims as f64);
        diagnostics.insert(DiagKey::GridPoints, self.settings.grid_points as f64);
        diagnostics.insert(DiagKey::NumPeriods, n as f64);
        diagnostics.insert(DiagKey::BasisFunctions, self.basis.len() as f64);
        diagnostics.insert(DiagKey::RegressionFallbacks, pass.fallbacks as f64);
        diagnostics.insert(DiagKey::StdErr, std_err);
        diagnostics.insert(DiagKey::Tolerance, tolerance);
        Ok(result_from_summary(
            problem.first,
            npv,
            intrinsic_npv,
            &summary,
            diagnostics,
        ))
    }

    fn backward(
        &self,
        problem: &StorageProblem<'_>,
        paths: &SimulatedPaths,
        control: &RunControl<'_>,
    ) -> Result<BackwardPass, ValuationError> {
        let n = problem.num_decisions;
        let storage = problem.storage;
        let tolerance = self.settings.tolerance;
        let num_paths = paths.num_paths();

        let terminal_nodes = problem.grids[n].nodes();
        let mut next_values: Vec<Vec<f64>> = (0..num_paths)
            .map(|path| {
                let price = if paths.num_periods() > n {
                    paths.spot(n)[path]
                } else {
                    problem.forwards[n]
                };
                terminal_nodes
                    .iter()
                    .map(|&inv| problem.terminal_pv(price, inv))
                    .collect()
            })
            .collect();

        let mut fits = Vec::with_capacity(n);
        let mut fallbacks = 0;
        for k in (0..n).rev() {
            control.check_deadline()?;
            let period = problem.period(k);
            let next_grid = &problem.grids[k + 1];
            let (fit, fell_back) = self.fit_period(period, k, paths, &next_values)?;
            if fell_back {
                fallbacks += 1;
            }

            let discount_factor = problem.discount_factors[k];
            let nodes = problem.grids[k].nodes();
            let fit_ref = &fit;
            let realized_rows = &next_values;
            let solve_path = |path: usize| -> Result<Vec<f64>, ValuationError> {
                let mut scratch = DecisionScratch::default();
                let mut fitted = Vec::with_capacity(next_grid.len());
                self.continuation_into(fit_ref, paths, k, path, &mut fitted);
                let economics = PeriodEconomics {
                    storage,
                    period,
                    price: paths.spot(k)[path],
                    discount_factor,
                };
                let guide = InventoryGridInterpolator::new(next_grid, &fitted)?;
                let realized = InventoryGridInterpolator::new(next_grid, &realized_rows[path])?;
                nodes
                    .iter()
                    .map(|&inventory| {
                        let (decision, _) =
                            optimal_decision(&economics, inventory, guide, tolerance, &mut scratch)?;
                        let next = storage.next_inventory(period, inventory, decision.volume);
                        Ok(economics.cashflow(inventory, decision.volume)
                            + continuation_value(&realized, next, decision.node))
                    })
                    .collect()
            };

            #[cfg(feature = "parallel")]
            let values: Vec<Vec<f64>> = (0..num_paths)
                .into_par_iter()
                .map(solve_path)
                .collect::<Result<_, _>>()?;
            #[cfg(not(feature = "parallel"))]
            let values: Vec<Vec<f64>> = (0..num_paths)
                .map(solve_path)
                .collect::<Result<_, _>>()?;

            trace!(period = %period, nodes = nodes.len(), fell_back, "lsmc period solved");
            next_values = values;
            fits.push(fit);
            control.report(0.1 + 0.8 * (n - k) as f64 / n as f64);
        }
        fits.reverse();

        Ok(BackwardPass { fits, fallbacks })
    }

    /// Regresses next-period path values on the state at offset `k`.
    fn fit_period(
        &self,
        period: TimePeriod,
        k: usize,
        paths: &SimulatedPaths,
        next_values: &[Vec<f64>],
    ) -> Result<(PeriodFit, bool), ValuationError> {
        let num_paths = paths.num_paths();
        let num_nodes = next_values.first().map_or(0, Vec::len);
        if states_identical(paths, k) {
            let means = (0..num_nodes)
                .map(|c| next_values.iter().map(|row| row[c]).sum::<f64>() / num_paths as f64)
                .collect();
            return Ok((PeriodFit::Mean(means), false));
        }

        let targets = DMatrix::from_fn(num_paths, num_nodes, |r, c| next_values[r][c]);
        let design = design_matrix(&self.basis, paths, k);
        match least_squares(&design, &targets, MIN_RCOND) {
            Ok(coefficients) => Ok((
                PeriodFit::Basis {
                    reduced: false,
                    coefficients,
                },
                false,
            )),
            Err(err @ (RegressionError::Singular { .. } | RegressionError::NonFinite)) => {
                warn!(period = %period, error = %err, "regression failed; falling back to reduced basis");
                let design = design_matrix(&self.reduced_basis, paths, k);
                let coefficients = least_squares(&design, &targets, MIN_RCOND).map_err(|e| {
                    ValuationError::NumericalInstability(format!(
                        "regression at {period} failed with the reduced basis: {e}"
                    ))
                })?;
                Ok((
                    PeriodFit::Basis {
                        reduced: true,
                        coefficients,
                    },
                    true,
                ))
            }
            Err(err) => Err(ValuationError::NumericalInstability(format!(
                "regression at {period}: {err}"
            ))),
        }
    }

    /// Fitted continuation values on the next grid for one path.
    fn continuation_into(
        &self,
        fit: &PeriodFit,
        paths: &SimulatedPaths,
        k: usize,
        path: usize,
        out: &mut Vec<f64>,
    ) {
        out.clear();
        match fit {
            PeriodFit::Mean(values) => out.extend_from_slice(values),
            PeriodFit::Basis {
                reduced,
                coefficients,
            } => {
                let basis = if *reduced {
                    &self.reduced_basis
                } else {
                    &self.basis
                };
                let mut state = vec![0.0; 1 + paths.num_factors()];
                paths.state_into(k, path, &mut state);
                let mut terms = vec![0.0; basis.len()];
                basis.evaluate_into(&state, &mut terms);
                out.extend((0..coefficients.ncols()).map(|c| {
                    terms
                        .iter()
                        .enumerate()
                        .map(|(j, t)| t * coefficients[(j, c)])
                        .sum::<f64>()
                }));
            }
        }
    }
}

impl ValuationEngine for LsmcEngine {
    fn value(
        &self,
        storage: &CmdtyStorage,
        market: &StorageMarket,
        inventory: f64,
    ) -> Result<ValuationResult, ValuationError> {
        self.value_with_progress(storage, market, inventory, None)
    }
}

/// Stored regression policy applied along the simulated paths.
struct LsmcPolicy<'a> {
    engine: &'a LsmcEngine,
    paths: &'a SimulatedPaths,
    fits: &'a [PeriodFit],
    terminal_forward: f64,
    num_decisions: usize,
}

impl DecisionPolicy for LsmcPolicy<'_> {
    fn num_paths(&self) -> usize {
        self.paths.num_paths()
    }

    fn price(&self, k: usize, path: usize) -> f64 {
        self.paths.spot(k)[path]
    }

    fn continuation(&self, k: usize, path: usize, out: &mut Vec<f64>) {
        self.engine
            .continuation_into(&self.fits[k], self.paths, k, path, out);
    }

    fn terminal_price(&self, path: usize) -> f64 {
        if self.paths.num_periods() > self.num_decisions {
            self.paths.spot(self.num_decisions)[path]
        } else {
            self.terminal_forward
        }
    }
}

fn states_identical(paths: &SimulatedPaths, k: usize) -> bool {
    let same = |xs: &[f64]| xs.iter().all(|x| *x == xs[0]);
    same(paths.spot(k)) && (0..paths.num_factors()).all(|f| same(paths.factor(k, f)))
}

fn design_matrix(basis: &BasisFunctions, paths: &SimulatedPaths, k: usize) -> DMatrix<f64> {
    let mut state = vec![0.0; 1 + paths.num_factors()];
    let mut terms = vec![0.0; basis.len()];
    let mut design = DMatrix::zeros(paths.num_paths(), basis.len());
    for path in 0..paths.num_paths() {
        paths.state_into(k, path, &mut state);
        basis.evaluate_into(&state, &mut terms);
        for (j, t) in terms.iter().enumerate() {
            design[(path, j)] = *t;
        }
    }
    design
}
