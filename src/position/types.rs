//! Position types

use crate::risk::{ExitReason, RiskError, TradeRecord};
use crate::signal::Direction;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// An open position. Owned by the position manager; callers only ever see
/// copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Shared with the position's trade records
    pub id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    /// Volume-weighted across scale-ins
    pub entry_price: Decimal,
    /// Remaining quantity
    pub quantity: Decimal,
    /// Quantity before any partial close
    pub initial_quantity: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    /// Ratchets toward price, never loosens
    pub trailing_stop: Decimal,
    /// Highest price seen for longs, lowest for shorts
    pub best_price: Decimal,
    /// Entry-to-stop distance at open
    pub initial_risk: Decimal,
    pub partial_taken: bool,
    pub scale_in_count: u32,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Price move in the position's favor (negative when against)
    pub fn favorable_move(&self, price: Decimal) -> Decimal {
        (price - self.entry_price) * self.direction.sign()
    }

    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        self.favorable_move(price) * self.quantity
    }

    /// The tighter of the static and trailing stops
    pub fn effective_stop(&self) -> Decimal {
        match self.direction {
            Direction::Long => self.stop_loss.max(self.trailing_stop),
            Direction::Short => self.stop_loss.min(self.trailing_stop),
        }
    }

    /// Trailing stop strictly tighter than the static stop
    pub fn trailing_is_tighter(&self) -> bool {
        match self.direction {
            Direction::Long => self.trailing_stop > self.stop_loss,
            Direction::Short => self.trailing_stop < self.stop_loss,
        }
    }

    pub fn notional(&self) -> Decimal {
        self.entry_price * self.quantity
    }
}

/// Why an open or scale-in was refused
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PositionError {
    #[error("Trade rejected: {0}")]
    Rejected(#[from] RiskError),
    #[error("Position already open for {0}")]
    AlreadyOpen(String),
    #[error("Sizing yielded zero quantity for {0}")]
    ZeroQuantity(String),
    #[error("Invalid price {price} for {symbol}")]
    InvalidPrice { symbol: String, price: Decimal },
    #[error("No open position for {0}")]
    NotFound(String),
    #[error("Scale-in refused for {symbol}: {reason}")]
    ScaleInRefused { symbol: String, reason: String },
}

/// A completed exit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExitResult {
    /// Position as it stood when it closed
    pub position: Position,
    /// Closed record already booked with the risk manager
    pub record: TradeRecord,
}

impl ExitResult {
    pub fn reason(&self) -> ExitReason {
        self.record.exit_reason.unwrap_or(ExitReason::Manual)
    }
}

/// Everything that happened to one position in one monitoring tick
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickOutcome {
    /// Partial take-profit fill, if it fired this tick
    pub partial: Option<TradeRecord>,
    pub exit: Option<ExitResult>,
}
