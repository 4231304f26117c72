//! Uniform inventory grids and linear interpolation of values sampled on them.

use crate::core::ValuationError;
use crate::math::interpolation::interpolate_clamped;

/// Grid nodes closer than this (relative to the range) collapse to a single node.
const DEGENERATE_RANGE: f64 = 1.0e-12;

/// Equally spaced inventory nodes spanning `[min, max]` at one period.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryGrid {
    nodes: Vec<f64>,
}

impl InventoryGrid {
    /// Builds `num_points` nodes over `[min, max]`; a zero-width range yields one node.
    pub fn uniform(min: f64, max: f64, num_points: usize) -> Result<Self, ValuationError> {
        if num_points < 2 {
            return Err(ValuationError::Validation(format!(
                "inventory grid needs at least 2 points, got {num_points}"
            )));
        }
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(ValuationError::Domain(format!(
                "invalid inventory range [{min}, {max}]"
            )));
        }
        if max - min <= DEGENERATE_RANGE * max.abs().max(1.0) {
            return Ok(Self { nodes: vec![min] });
        }
        let step = (max - min) / (num_points - 1) as f64;
        let mut nodes: Vec<f64> = (0..num_points).map(|k| min + step * k as f64).collect();
        nodes[num_points - 1] = max;
        Ok(Self { nodes })
    }

    /// Grid consisting of exactly `inventory`.
    pub fn single(inventory: f64) -> Self {
        Self {
            nodes: vec![inventory],
        }
    }

    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn min(&self) -> f64 {
        self.nodes[0]
    }

    pub fn max(&self) -> f64 {
        self.nodes[self.nodes.len() - 1]
    }
}

/// Value function sampled on an [`InventoryGrid`].
#[derive(Debug, Clone, Copy)]
pub struct InventoryGridInterpolator<'a> {
    grid: &'a InventoryGrid,
    values: &'a [f64],
}

impl<'a> InventoryGridInterpolator<'a> {
    pub fn new(grid: &'a InventoryGrid, values: &'a [f64]) -> Result<Self, ValuationError> {
        if values.len() != grid.len() {
            return Err(ValuationError::Validation(format!(
                "{} values supplied for {} grid nodes",
                values.len(),
                grid.len()
            )));
        }
        Ok(Self { grid, values })
    }

    pub fn grid(&self) -> &'a InventoryGrid {
        self.grid
    }

    /// Value at `inventory`; clamps at or outside the grid extremes.
    #[inline]
    pub fn value(&self, inventory: f64) -> f64 {
        interpolate_clamped(self.grid.nodes(), self.values, inventory)
    }

    /// Value stored at grid node `node`.
    #[inline]
    pub fn node_value(&self, node: usize) -> f64 {
        self.values[node]
    }
}
