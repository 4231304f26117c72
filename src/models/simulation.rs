//! Spot price path simulation for the multi-factor model.
//!
//! Factors are stepped with the exact OU transition between consecutive simulated periods, and
//! the spot is rebuilt as `F(T) * exp(sum_i sigma_i(T) Z_i(T) - 0.5 Var(T))` so that the sample
//! mean reproduces the forward curve in expectation.
//!
//! Every path draws from its own `StdRng` seeded from the base seed and the path index, which
//! makes results independent of the number of threads used.

use chrono::{NaiveDate, NaiveTime};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::core::ValuationError;
use crate::models::MultiFactorModel;
use crate::models::multi_factor::correlate_normals;
use crate::rates::{DayCountConvention, year_fraction_at};
use crate::time::{TimePeriod, TimeSeries};

/// Seed of the generator for path `path_index`.
#[inline]
pub fn stream_seed(base_seed: u64, path_index: usize) -> u64 {
    base_seed.wrapping_add((path_index as u64).wrapping_mul(7_919))
}

/// Simulated spot prices and factor values, stored period-major.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedPaths {
    periods: Vec<TimePeriod>,
    num_paths: usize,
    num_factors: usize,
    spot: Vec<f64>,
    factors: Vec<f64>,
}

impl SimulatedPaths {
    pub fn periods(&self) -> &[TimePeriod] {
        &self.periods
    }

    pub fn num_periods(&self) -> usize {
        self.periods.len()
    }

    pub fn num_paths(&self) -> usize {
        self.num_paths
    }

    pub fn num_factors(&self) -> usize {
        self.num_factors
    }

    /// Spot prices of every path at the `k`-th simulated period.
    #[inline]
    pub fn spot(&self, k: usize) -> &[f64] {
        &self.spot[k * self.num_paths..(k + 1) * self.num_paths]
    }

    /// Values `sigma_f(T) Z_f(T)` of factor `f` for every path at the `k`-th period.
    #[inline]
    pub fn factor(&self, k: usize, f: usize) -> &[f64] {
        let row = k * self.num_factors + f;
        &self.factors[row * self.num_paths..(row + 1) * self.num_paths]
    }

    /// Writes `[s, x_1, .., x_n]` for one path and period into `out`.
    #[inline]
    pub fn state_into(&self, k: usize, path: usize, out: &mut [f64]) {
        out[0] = self.spot(k)[path];
        for f in 0..self.num_factors {
            out[f + 1] = self.factor(k, f)[path];
        }
    }

    /// Sample mean of the spot at each period.
    pub fn spot_means(&self) -> Vec<f64> {
        (0..self.periods.len())
            .map(|k| self.spot(k).iter().sum::<f64>() / self.num_paths as f64)
            .collect()
    }
}

/// Per-period quantities shared by all paths.
#[derive(Debug, Clone)]
struct Step {
    forward: f64,
    vols: Vec<f64>,
    half_variance: f64,
    /// `exp(-alpha_i dt)` from the previous simulated period.
    decay: Vec<f64>,
    /// Cholesky factor of the innovation covariance; empty when no time elapses.
    innovation: Vec<Vec<f64>>,
}

/// Multi-factor spot simulator calibrated to a forward curve.
#[derive(Debug, Clone)]
pub struct MultiFactorSpotSim {
    periods: Vec<TimePeriod>,
    num_factors: usize,
    steps: Vec<Step>,
}

impl MultiFactorSpotSim {
    /// Prepares a simulation of `periods` (strictly increasing) as of `valuation_date`.
    ///
    /// Time to each period is the Act/365 year fraction from the valuation date to the period
    /// start; periods starting before the valuation date are treated as already fixed.
    pub fn new(
        model: &MultiFactorModel,
        valuation_date: NaiveDate,
        forward_curve: &TimeSeries<f64>,
        periods: &[TimePeriod],
    ) -> Result<Self, ValuationError> {
        if periods.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ValuationError::Validation(
                "simulated periods must be strictly increasing".to_string(),
            ));
        }
        let valuation = valuation_date.and_time(NaiveTime::MIN);
        let mut steps = Vec::with_capacity(periods.len());
        let mut prev_t = 0.0;
        for &period in periods {
            if period.granularity() != forward_curve.granularity() {
                return Err(ValuationError::FrequencyMismatch {
                    storage: period.granularity(),
                    curve: forward_curve.granularity(),
                });
            }
            let forward = match forward_curve.get(period) {
                Some(f) if f.is_finite() && *f > 0.0 => *f,
                Some(f) => {
                    return Err(ValuationError::Domain(format!(
                        "forward price {f} at {period} must be positive to simulate log spot"
                    )));
                }
                None => {
                    return Err(ValuationError::Validation(format!(
                        "forward curve has no price for simulated period {period}"
                    )));
                }
            };
            let t = year_fraction_at(valuation, period.start(), DayCountConvention::Act365Fixed)
                .max(0.0);
            let dt = t - prev_t;
            let vols = model.vols(period)?;
            let half_variance = 0.5 * model.spot_variance(&vols, t);
            let decay = model
                .factors()
                .iter()
                .map(|f| (-f.mean_reversion * dt).exp())
                .collect();
            let innovation = if dt > 0.0 {
                model.step_cholesky(dt)?
            } else {
                Vec::new()
            };
            steps.push(Step {
                forward,
                vols,
                half_variance,
                decay,
                innovation,
            });
            prev_t = t;
        }
        Ok(Self {
            periods: periods.to_vec(),
            num_factors: model.num_factors(),
            steps,
        })
    }

    pub fn periods(&self) -> &[TimePeriod] {
        &self.periods
    }

    /// One path laid out `[k * (1 + n) ..]` as `[spot, x_1, .., x_n]`.
    fn simulate_path(&self, seed: u64) -> Vec<f64> {
        let n = self.num_factors;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut z = vec![0.0; n];
        let mut indep = vec![0.0; n];
        let mut shock = vec![0.0; n];
        let mut out = Vec::with_capacity(self.steps.len() * (n + 1));
        for step in &self.steps {
            if !step.innovation.is_empty() {
                for e in indep.iter_mut() {
                    *e = StandardNormal.sample(&mut rng);
                }
                correlate_normals(&step.innovation, &indep, &mut shock);
                for i in 0..n {
                    z[i] = step.decay[i] * z[i] + shock[i];
                }
            }
            let slot = out.len();
            out.push(0.0);
            let mut log_ratio = -step.half_variance;
            for i in 0..n {
                let x = step.vols[i] * z[i];
                log_ratio += x;
                out.push(x);
            }
            out[slot] = step.forward * log_ratio.exp();
        }
        out
    }

    /// Simulates `num_sims` paths. `None` draws the base seed from OS entropy.
    pub fn simulate(&self, num_sims: usize, seed: Option<u64>) -> Result<SimulatedPaths, ValuationError> {
        if num_sims == 0 {
            return Err(ValuationError::Validation(
                "number of simulations must be positive".to_string(),
            ));
        }
        let base_seed = seed.unwrap_or_else(|| rand::rng().random::<u64>());

        #[cfg(feature = "parallel")]
        let by_path: Vec<Vec<f64>> = (0..num_sims)
            .into_par_iter()
            .map(|i| self.simulate_path(stream_seed(base_seed, i)))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let by_path: Vec<Vec<f64>> = (0..num_sims)
            .map(|i| self.simulate_path(stream_seed(base_seed, i)))
            .collect();

        let n = self.num_factors;
        let num_periods = self.steps.len();
        let mut spot = vec![0.0; num_periods * num_sims];
        let mut factors = vec![0.0; num_periods * n * num_sims];
        for (path, values) in by_path.iter().enumerate() {
            for k in 0..num_periods {
                let row = &values[k * (n + 1)..(k + 1) * (n + 1)];
                spot[k * num_sims + path] = row[0];
                for f in 0..n {
                    factors[(k * n + f) * num_sims + path] = row[f + 1];
                }
            }
        }
        if spot.iter().any(|s| !s.is_finite()) {
            return Err(ValuationError::NumericalInstability(
                "simulated spot price overflowed".to_string(),
            ));
        }

        Ok(SimulatedPaths {
            periods: self.periods.clone(),
            num_paths: num_sims,
            num_factors: n,
            spot,
            factors,
        })
    }
}
