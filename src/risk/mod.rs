//! Risk management module
//!
//! Position sizing, protective price levels, capital limits and trade
//! bookkeeping

mod correlation;
mod kelly;
mod limits;
mod manager;
mod sizing;
mod types;

pub use correlation::{check_correlation, pearson, returns, CorrelationCheck};
pub use kelly::{KellyCalculator, TradeSample};
pub use limits::{CapitalLedger, RiskLimits};
pub use manager::RiskManager;
pub use sizing::{quantity_for, FixedFractionalSizer, PositionSizer, StreakReduction};
pub use types::{ExitReason, RiskError, RiskStats, TradeRecord, TradeStatus};
