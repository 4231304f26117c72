//! Multi-factor mean-reverting spot price model.
//!
//! The log spot for delivery period `T` is driven by `n` Ornstein-Uhlenbeck factors:
//! `ln S(T) = ln F(0, T) + sum_i sigma_i(T) Z_i(T) - 0.5 Var(T)` where
//! `dZ_i = -alpha_i Z_i dt + dW_i` and `d<W_i, W_j> = rho_ij dt`.
//! The same dynamics give the forward price `F(t, T)` for every `t <= T`, which is what the
//! implied volatility and integrated correlation helpers below describe.

use chrono::NaiveDate;
use nalgebra::{DMatrix, SymmetricEigen};
use serde::{Deserialize, Serialize};

use crate::models::ModelError;
use crate::rates::{DayCountConvention, year_fraction_at};
use crate::time::{TimePeriod, TimeSeries};

const CORRELATION_TOL: f64 = 1.0e-10;
const PSD_TOL: f64 = 1.0e-12;

/// Instantaneous volatility of one factor as a function of the delivery period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FactorVol {
    Constant(f64),
    /// `amplitude * cos(2 pi * day_of_year / 365.25)` of the period start.
    Seasonal(f64),
    /// One volatility per delivery period.
    Curve(TimeSeries<f64>),
}

impl FactorVol {
    /// Volatility for delivery in `period`.
    pub fn vol(&self, period: TimePeriod) -> Option<f64> {
        match self {
            Self::Constant(v) => Some(*v),
            Self::Seasonal(amplitude) => {
                let day_of_year = chrono::Datelike::ordinal(&period.start_date()) as f64;
                Some(amplitude * (2.0 * std::f64::consts::PI * day_of_year / 365.25).cos())
            }
            Self::Curve(curve) => curve.get(period).copied(),
        }
    }

    fn validate(&self, name: &str) -> Result<(), ModelError> {
        let bad = match self {
            Self::Constant(v) => !v.is_finite() || *v < 0.0,
            Self::Seasonal(a) => !a.is_finite(),
            Self::Curve(curve) => curve.values().iter().any(|v| !v.is_finite() || *v < 0.0),
        };
        if bad {
            return Err(ModelError::InvalidParameter(format!(
                "factor {name} volatility must be finite and non-negative"
            )));
        }
        Ok(())
    }
}

/// One model factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    /// Variable name the factor value is exposed under in regression bases.
    pub name: String,
    pub mean_reversion: f64,
    pub vol: FactorVol,
}

impl Factor {
    pub fn new(name: impl Into<String>, mean_reversion: f64, vol: FactorVol) -> Self {
        Self {
            name: name.into(),
            mean_reversion,
            vol,
        }
    }
}

/// Correlated multi-factor spot model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ModelSpec", into = "ModelSpec")]
pub struct MultiFactorModel {
    factors: Vec<Factor>,
    correlation: Vec<Vec<f64>>,
}

/// Serialized form; deserializing re-runs validation.
#[derive(Serialize, Deserialize)]
struct ModelSpec {
    factors: Vec<Factor>,
    correlation: Vec<Vec<f64>>,
}

impl TryFrom<ModelSpec> for MultiFactorModel {
    type Error = ModelError;

    fn try_from(spec: ModelSpec) -> Result<Self, Self::Error> {
        Self::new(spec.factors, spec.correlation)
    }
}

impl From<MultiFactorModel> for ModelSpec {
    fn from(model: MultiFactorModel) -> Self {
        Self {
            factors: model.factors,
            correlation: model.correlation,
        }
    }
}

impl MultiFactorModel {
    /// Validates factors and their correlation matrix.
    pub fn new(factors: Vec<Factor>, correlation: Vec<Vec<f64>>) -> Result<Self, ModelError> {
        if factors.is_empty() {
            return Err(ModelError::InvalidParameter(
                "model needs at least one factor".to_string(),
            ));
        }
        for (i, f) in factors.iter().enumerate() {
            if f.name.is_empty() || f.name == "s" {
                return Err(ModelError::InvalidParameter(format!(
                    "factor {i} needs a name other than `s`"
                )));
            }
            if factors[..i].iter().any(|g| g.name == f.name) {
                return Err(ModelError::InvalidParameter(format!(
                    "duplicate factor name `{}`",
                    f.name
                )));
            }
            if !f.mean_reversion.is_finite() || f.mean_reversion < 0.0 {
                return Err(ModelError::InvalidParameter(format!(
                    "factor {} mean reversion must be finite and >= 0",
                    f.name
                )));
            }
            f.vol.validate(&f.name)?;
        }
        validate_correlation_matrix(&correlation, factors.len())?;
        Ok(Self {
            factors,
            correlation,
        })
    }

    /// Independent factors.
    pub fn uncorrelated(factors: Vec<Factor>) -> Result<Self, ModelError> {
        let n = factors.len();
        let identity = (0..n)
            .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
            .collect();
        Self::new(factors, identity)
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    pub fn num_factors(&self) -> usize {
        self.factors.len()
    }

    pub fn correlation(&self) -> &[Vec<f64>] {
        &self.correlation
    }

    /// `["s", factor names...]`, the variables available to regression bases.
    pub fn basis_variables(&self) -> Vec<&str> {
        std::iter::once("s")
            .chain(self.factors.iter().map(|f| f.name.as_str()))
            .collect()
    }

    /// Factor volatilities for delivery in `period`.
    pub fn vols(&self, period: TimePeriod) -> Result<Vec<f64>, ModelError> {
        self.factors
            .iter()
            .map(|f| {
                f.vol.vol(period).ok_or_else(|| ModelError::MissingVol {
                    factor: f.name.clone(),
                    period,
                })
            })
            .collect()
    }

    /// `Var(ln F)` accrued over observation times whose distances to delivery run from
    /// `tau_start` down to `tau_end` (years, `tau_start >= tau_end >= 0`).
    fn integrated_covariance(
        &self,
        vols_a: &[f64],
        vols_b: &[f64],
        tau_a: (f64, f64),
        tau_b: (f64, f64),
    ) -> f64 {
        let mut total = 0.0;
        for (i, fi) in self.factors.iter().enumerate() {
            for (j, fj) in self.factors.iter().enumerate() {
                let rho = self.correlation[i][j];
                if rho == 0.0 {
                    continue;
                }
                let (ai, aj) = (fi.mean_reversion, fj.mean_reversion);
                // Observation window length is the same for both legs.
                let window = tau_a.0 - tau_a.1;
                let integral = if ai + aj == 0.0 {
                    window
                } else {
                    ((-ai * tau_a.1 - aj * tau_b.1).exp() - (-ai * tau_a.0 - aj * tau_b.0).exp())
                        / (ai + aj)
                };
                total += rho * vols_a[i] * vols_b[j] * integral;
            }
        }
        total
    }

    /// Variance of `ln F(t, T)` accumulated between `obs_start` and `obs_end`, for delivery
    /// in `fwd_contract`.
    pub fn variance(
        &self,
        obs_start: NaiveDate,
        obs_end: NaiveDate,
        fwd_contract: TimePeriod,
    ) -> Result<f64, ModelError> {
        let tau = observation_taus(obs_start, obs_end, fwd_contract)?;
        let vols = self.vols(fwd_contract)?;
        Ok(self.integrated_covariance(&vols, &vols, tau, tau).max(0.0))
    }

    /// Black volatility of the forward for `fwd_contract` between the observation dates.
    pub fn implied_vol(
        &self,
        obs_start: NaiveDate,
        obs_end: NaiveDate,
        fwd_contract: TimePeriod,
    ) -> Result<f64, ModelError> {
        let variance = self.variance(obs_start, obs_end, fwd_contract)?;
        let t = year_fraction_at(
            obs_start.and_time(chrono::NaiveTime::MIN),
            obs_end.and_time(chrono::NaiveTime::MIN),
            DayCountConvention::Act365Fixed,
        );
        Ok((variance / t).sqrt())
    }

    /// Correlation of log returns of two forward contracts over the observation window.
    pub fn integrated_correlation(
        &self,
        obs_start: NaiveDate,
        obs_end: NaiveDate,
        fwd_contract_a: TimePeriod,
        fwd_contract_b: TimePeriod,
    ) -> Result<f64, ModelError> {
        let tau_a = observation_taus(obs_start, obs_end, fwd_contract_a)?;
        let tau_b = observation_taus(obs_start, obs_end, fwd_contract_b)?;
        let vols_a = self.vols(fwd_contract_a)?;
        let vols_b = self.vols(fwd_contract_b)?;
        let cov = self.integrated_covariance(&vols_a, &vols_b, tau_a, tau_b);
        let var_a = self.integrated_covariance(&vols_a, &vols_a, tau_a, tau_a);
        let var_b = self.integrated_covariance(&vols_b, &vols_b, tau_b, tau_b);
        Ok(cov / (var_a * var_b).sqrt())
    }

    /// Total variance of `ln S(T)` seen from time zero when delivery is `t` years away.
    pub(crate) fn spot_variance(&self, vols: &[f64], t: f64) -> f64 {
        self.integrated_covariance(vols, vols, (t, 0.0), (t, 0.0))
            .max(0.0)
    }

    /// Lower Cholesky factor of the covariance of the unit-vol OU innovations over `dt`.
    pub(crate) fn step_cholesky(&self, dt: f64) -> Result<Vec<Vec<f64>>, ModelError> {
        let cov: Vec<Vec<f64>> = self
            .factors
            .iter()
            .enumerate()
            .map(|(i, fi)| {
                self.factors
                    .iter()
                    .enumerate()
                    .map(|(j, fj)| {
                        let a = fi.mean_reversion + fj.mean_reversion;
                        let integral = if a == 0.0 {
                            dt
                        } else {
                            -(-a * dt).exp_m1() / a
                        };
                        self.correlation[i][j] * integral
                    })
                    .collect()
            })
            .collect();
        cholesky_lower_psd(&cov, PSD_TOL * dt.max(f64::MIN_POSITIVE)).ok_or_else(|| {
            ModelError::Correlation(format!(
                "factor innovation covariance over {dt} years is not positive semi-definite"
            ))
        })
    }
}

fn observation_taus(
    obs_start: NaiveDate,
    obs_end: NaiveDate,
    fwd_contract: TimePeriod,
) -> Result<(f64, f64), ModelError> {
    if obs_end <= obs_start {
        return Err(ModelError::InvalidParameter(format!(
            "observation end {obs_end} must be after start {obs_start}"
        )));
    }
    let delivery = fwd_contract.start();
    let obs_end_at = obs_end.and_time(chrono::NaiveTime::MIN);
    if obs_end_at > delivery {
        return Err(ModelError::InvalidParameter(format!(
            "observation end {obs_end} is after delivery of {fwd_contract}"
        )));
    }
    let tau = |d: NaiveDate| {
        year_fraction_at(
            d.and_time(chrono::NaiveTime::MIN),
            delivery,
            DayCountConvention::Act365Fixed,
        )
    };
    Ok((tau(obs_start), tau(obs_end)))
}

/// Checks dimensions, finiteness, unit diagonal, bounds and symmetry.
fn validate_correlation_matrix(corr: &[Vec<f64>], n: usize) -> Result<(), ModelError> {
    if corr.len() != n || corr.iter().any(|row| row.len() != n) {
        return Err(ModelError::Correlation(format!(
            "correlation matrix must be {n} x {n}"
        )));
    }
    for (i, row) in corr.iter().enumerate() {
        if !row[i].is_finite() || (row[i] - 1.0).abs() > CORRELATION_TOL {
            return Err(ModelError::Correlation(
                "correlation matrix diagonal must be 1".to_string(),
            ));
        }
        for (j, rho) in row.iter().copied().enumerate() {
            if !rho.is_finite() || !(-1.0..=1.0).contains(&rho) {
                return Err(ModelError::Correlation(
                    "correlation entries must be finite and in [-1, 1]".to_string(),
                ));
            }
            if (rho - corr[j][i]).abs() > CORRELATION_TOL {
                return Err(ModelError::Correlation(
                    "correlation matrix must be symmetric".to_string(),
                ));
            }
        }
    }
    let m = DMatrix::from_fn(n, n, |i, j| corr[i][j]);
    let min_eigen = SymmetricEigen::new(m)
        .eigenvalues
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min);
    if min_eigen < -1.0e-10 {
        return Err(ModelError::Correlation(format!(
            "correlation matrix is not positive semi-definite (min eigenvalue {min_eigen:e})"
        )));
    }
    Ok(())
}

/// Lower Cholesky factor of a positive semi-definite matrix; zero pivots give zero columns.
pub(crate) fn cholesky_lower_psd(matrix: &[Vec<f64>], tol: f64) -> Option<Vec<Vec<f64>>> {
    let n = matrix.len();
    let mut l = vec![vec![0.0_f64; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = matrix[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if sum < -1.0e-10 {
                    return None;
                }
                l[i][i] = if sum > tol { sum.sqrt() } else { 0.0 };
            } else if l[j][j] > 0.0 {
                l[i][j] = sum / l[j][j];
            }
        }
    }
    Some(l)
}

/// `out = L * indep` for a lower-triangular `L`.
#[inline]
pub(crate) fn correlate_normals(chol: &[Vec<f64>], indep: &[f64], out: &mut [f64]) {
    for (i, row) in chol.iter().enumerate() {
        out[i] = row
            .iter()
            .zip(indep)
            .take(i + 1)
            .map(|(l, z)| l * z)
            .sum();
    }
}
