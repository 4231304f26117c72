//! Stochastic spot price models used by the simulation-based engines.
//!
//! [`MultiFactorModel`] is the general correlated OU factor model; [`ThreeFactorSeasonal`] and
//! [`OneFactorMeanReverting`] are the common configurations of it. [`MultiFactorSpotSim`]
//! generates spot and factor paths calibrated to a forward curve.

pub mod multi_factor;
pub mod simulation;
pub mod three_factor;

pub use multi_factor::{Factor, FactorVol, MultiFactorModel};
pub use simulation::{MultiFactorSpotSim, SimulatedPaths};
pub use three_factor::{OneFactorMeanReverting, ThreeFactorSeasonal};

use crate::core::ValuationError;
use crate::time::TimePeriod;

/// Invalid model parameters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("invalid model parameter: {0}")]
    InvalidParameter(String),
    #[error("invalid factor correlation: {0}")]
    Correlation(String),
    #[error("factor {factor} has no volatility for {period}")]
    MissingVol { factor: String, period: TimePeriod },
}

impl From<ModelError> for ValuationError {
    fn from(err: ModelError) -> Self {
        ValuationError::Validation(err.to_string())
    }
}
