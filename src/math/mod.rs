//! Numerical building blocks: interpolation, inventory grids and least squares.

pub mod interpolation;
pub mod inventory_grid;
pub mod regression;

pub use interpolation::{InterpolationError, LinearInterpolator, interpolate_clamped};
pub use inventory_grid::{InventoryGrid, InventoryGridInterpolator};
pub use regression::{RegressionError, least_squares};
