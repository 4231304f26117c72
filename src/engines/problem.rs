//! Valuation window shared by every engine: periods still open for decisions, their forward
//! prices and settlement discount factors, feasible inventory bounds and per-period grids.

use tracing::{debug, trace};

use crate::core::ValuationError;
use crate::engines::validate_grid_points;
use crate::market::StorageMarket;
use crate::math::InventoryGrid;
use crate::storage::{CmdtyStorage, InventorySpace};
use crate::time::TimePeriod;

/// Inputs of one valuation, offsets counted from the first open period.
///
/// Offsets `0..num_decisions` are decision periods and offset `num_decisions` is the storage
/// end, where the terminal value is assessed.
#[derive(Debug)]
pub(crate) struct StorageProblem<'a> {
    pub storage: &'a CmdtyStorage,
    pub first: TimePeriod,
    pub num_decisions: usize,
    /// Forward prices for offsets `0..=num_decisions`.
    pub forwards: Vec<f64>,
    /// Settlement discount factors for offsets `0..=num_decisions`.
    pub discount_factors: Vec<f64>,
    /// Inventory grids for offsets `0..=num_decisions`; offset 0 is the starting inventory.
    pub grids: Vec<InventoryGrid>,
}

impl<'a> StorageProblem<'a> {
    /// Builds the problem, or `None` when the valuation date is at or after the storage end.
    pub fn prepare(
        storage: &'a CmdtyStorage,
        market: &StorageMarket,
        inventory: f64,
        grid_points: usize,
    ) -> Result<Option<Self>, ValuationError> {
        validate_grid_points(grid_points)?;
        let current = market.current_period(storage.granularity());
        if current >= storage.end() {
            return Ok(None);
        }
        let first = current.max(storage.start());
        let num_decisions = usize::try_from(first.periods_until(&storage.end())).unwrap_or(0);

        let forwards = market.forwards_for(storage, first)?;
        let discount_factors = market
            .discounter()
            .period_discount_factors(first, storage.end().successor())?;
        let space = InventorySpace::compute(storage, first, inventory)?;

        let mut grids = Vec::with_capacity(num_decisions + 1);
        grids.push(InventoryGrid::single(inventory));
        for k in 1..=num_decisions {
            let bounds = space.bounds_at(k);
            let grid = if k == num_decisions && storage.must_be_empty_at_end() {
                InventoryGrid::single(0.0)
            } else {
                InventoryGrid::uniform(bounds.min, bounds.max, grid_points)?
            };
            grids.push(grid);
        }
        if !storage.has_per_unit_costs() {
            debug!("state-dependent decision costs; optimum is searched over grid nodes and rate bounds only");
        }
        trace!(
            first = %first,
            num_decisions,
            grid_points,
            "prepared storage valuation window"
        );

        Ok(Some(Self {
            storage,
            first,
            num_decisions,
            forwards,
            discount_factors,
            grids,
        }))
    }

    #[inline]
    pub fn period(&self, k: usize) -> TimePeriod {
        self.first.offset(k as i64)
    }

    /// Discounted terminal value of holding `inventory` at the end with price `price`.
    #[inline]
    pub fn terminal_pv(&self, price: f64, inventory: f64) -> f64 {
        self.storage.terminal_value(price, inventory) * self.discount_factors[self.num_decisions]
    }
}
