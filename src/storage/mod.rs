//! Storage facility model: ratchets, costs, terminal value and feasible inventory space.

pub mod costs;
pub mod inventory_space;
pub mod model;
pub mod ratchet;

pub use costs::{CostFn, CostRule, TerminalFn, TerminalValue};
pub use inventory_space::{InventoryBounds, InventorySpace};
pub use model::{CmdtyStorage, CmdtyStorageBuilder};
pub use ratchet::{InjectWithdrawRange, InventoryRatePoint, Ratchet};
