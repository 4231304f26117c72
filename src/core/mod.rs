//! Core traits, the error taxonomy, and result structures shared by every valuation engine.

use std::time::Duration;

use crate::market::StorageMarket;
use crate::storage::CmdtyStorage;
use crate::time::{Granularity, TimeSeries};

pub mod diagnostics;

pub use diagnostics::{DiagKey, Diagnostics};

/// Valuation engine abstraction over a storage facility.
pub trait ValuationEngine {
    /// Values `storage` holding `inventory` on the market's valuation date.
    fn value(
        &self,
        storage: &CmdtyStorage,
        market: &StorageMarket,
        inventory: f64,
    ) -> Result<ValuationResult, ValuationError>;
}

/// Unified engine result payload.
///
/// Every series starts at the first period still open for decisions and ends before the
/// storage end period.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuationResult {
    /// Full present value.
    pub npv: f64,
    /// Present value of optimal operation against the fixed forward curve.
    pub intrinsic_npv: f64,
    /// `npv - intrinsic_npv`.
    pub extrinsic_npv: f64,
    /// Expected net inject (positive) or withdraw (negative) volume per period.
    pub decision_profile: TimeSeries<f64>,
    /// Sensitivity of `npv` to each forward price point.
    pub deltas: TimeSeries<f64>,
    /// Expected commodity consumed by injection and withdrawal per period.
    pub cmdty_consumed: TimeSeries<f64>,
    /// Expected opening inventory per period.
    pub inventory_profile: TimeSeries<f64>,
    /// Engine-specific scalar diagnostics.
    pub diagnostics: Diagnostics,
}

/// Engine and model errors surfaced by the API.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValuationError {
    /// Malformed configuration, raised before any valuation work starts.
    #[error("validation error: {0}")]
    Validation(String),
    /// Forward curve granularity disagrees with the storage.
    #[error("frequency mismatch: storage is {storage} but forward curve is {curve}")]
    FrequencyMismatch {
        storage: Granularity,
        curve: Granularity,
    },
    /// Inventory or decision outside the feasible region.
    #[error("domain error: {0}")]
    Domain(String),
    /// Singular regression or another unrecoverable numerical state.
    #[error("numerical instability: {0}")]
    NumericalInstability(String),
    /// Caller deadline passed before the valuation finished.
    #[error("valuation timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
}
