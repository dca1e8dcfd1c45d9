// Order lifecycle management
pub mod fill_poll;
pub mod instance;
pub mod sizing;

pub use fill_poll::spawn_fill_poll;
pub use instance::{ExitReason, OrderIntent, StrategyInstance};
pub use sizing::{round_to_lot, round_to_tick, size_from_balance};
