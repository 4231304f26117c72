//! Storage valuation engines.
//!
//! - [`intrinsic`]: backward induction against the fixed forward curve.
//! - [`lsmc`]: least-squares Monte Carlo over multi-factor spot paths.
//! - [`trinomial`]: one-factor mean-reverting recombining tree.
//!
//! All engines share the valuation window setup, the per-period decision rule and the forward
//! replay that produces profiles and deltas.

mod control;
mod decision;
mod problem;
mod replay;

pub mod intrinsic;
pub mod lsmc;
pub mod trinomial;

pub use intrinsic::{IntrinsicEngine, IntrinsicSettings, IntrinsicValuationResult, StorageProfile};
pub use lsmc::{LsmcEngine, LsmcSettings};
pub use trinomial::{TrinomialEngine, TrinomialSettings};

use crate::core::ValuationError;

/// Inventory grid points per period.
pub const DEFAULT_GRID_POINTS: usize = 100;
/// Relative tolerance for treating decisions as equally valuable.
pub const DEFAULT_TOLERANCE: f64 = 1.0e-10;
/// Simulated paths for Monte Carlo engines.
pub const DEFAULT_NUM_SIMS: usize = 1_000;
/// Cubic polynomial in each factor of the three-factor seasonal model.
pub const DEFAULT_BASIS: &str =
    "1 + x_st + x_sw + x_lt + x_st**2 + x_sw**2 + x_lt**2 + x_st**3 + x_sw**3 + x_lt**3";

pub(crate) fn validate_grid_points(grid_points: usize) -> Result<(), ValuationError> {
    if grid_points < 2 {
        return Err(ValuationError::Validation(format!(
            "inventory grid needs at least 2 points, got {grid_points}"
        )));
    }
    Ok(())
}

pub(crate) fn validate_tolerance(tolerance: f64) -> Result<(), ValuationError> {
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(ValuationError::Validation(format!(
            "tolerance must be finite and >= 0, got {tolerance}"
        )));
    }
    Ok(())
}
