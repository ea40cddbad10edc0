//! Position management module
//!
//! Tracks open trades through trailing stops, partial take-profit,
//! breakeven promotion, pyramiding and exit detection

mod manager;
mod types;

pub use manager::PositionManager;
pub use types::{ExitResult, Position, PositionError, TickOutcome};
