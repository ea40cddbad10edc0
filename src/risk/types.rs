//! Risk management types

use crate::signal::Direction;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Reasons a new trade may not be opened. These are ordinary outcomes that
/// callers branch on, never panics.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RiskError {
    /// Circuit breaker refuses trading
    #[error("Circuit breaker: {0}")]
    CircuitOpen(String),
    /// Internal halt flag set by an earlier limit breach
    #[error("Trading halted: {0}")]
    TradingHalted(String),
    /// Realized loss for the day reached its limit
    #[error("Daily loss limit reached: {loss} >= {limit}")]
    DailyLossLimit { loss: Decimal, limit: Decimal },
    /// Drawdown from peak reached its limit
    #[error("Max drawdown reached: {drawdown} >= {limit}")]
    MaxDrawdown { drawdown: Decimal, limit: Decimal },
    /// Maximum concurrent positions open
    #[error("Maximum positions reached: {open}/{max}")]
    MaxPositionsReached { open: usize, max: usize },
    /// Candidate moves with an open position
    #[error("Correlation with {symbol} is {correlation:.2}")]
    CorrelationTooHigh { symbol: String, correlation: f64 },
}

/// Why a position (or part of one) was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TrailingStop,
    /// Stop hit after it was promoted to entry
    BreakevenStop,
    TakeProfit,
    /// Partial close at the first target
    PartialTakeProfit,
    /// Operator or shutdown close
    Manual,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::BreakevenStop => "breakeven_stop",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::PartialTakeProfit => "partial_take_profit",
            ExitReason::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// Trade record lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Closed,
}

/// Immutable record of a trade (or a partial fill of one)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Shared by the open record and every fill of the same position
    pub id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub exit_price: Option<Decimal>,
    pub quantity: Decimal,
    pub gross_pnl: Decimal,
    /// Entry plus exit leg fees
    pub fees: Decimal,
    pub net_pnl: Decimal,
    /// Net P&L over entry notional, as a fraction
    pub pnl_pct: Decimal,
    pub exit_reason: Option<ExitReason>,
    pub status: TradeStatus,
    /// Partial take-profit fill; the position stays open
    pub is_partial: bool,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl TradeRecord {
    /// Record for a freshly opened position
    pub fn open(
        id: Uuid,
        symbol: impl Into<String>,
        direction: Direction,
        entry_price: Decimal,
        quantity: Decimal,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            direction,
            entry_price,
            exit_price: None,
            quantity,
            gross_pnl: Decimal::ZERO,
            fees: Decimal::ZERO,
            net_pnl: Decimal::ZERO,
            pnl_pct: Decimal::ZERO,
            exit_reason: None,
            status: TradeStatus::Open,
            is_partial: false,
            opened_at,
            closed_at: None,
        }
    }

    /// Closed (or partially closed) record with P&L computed from prices.
    /// `fee_rate` applies to both legs.
    #[allow(clippy::too_many_arguments)]
    pub fn closed(
        id: Uuid,
        symbol: impl Into<String>,
        direction: Direction,
        entry_price: Decimal,
        exit_price: Decimal,
        quantity: Decimal,
        fee_rate: Decimal,
        reason: ExitReason,
        opened_at: DateTime<Utc>,
        closed_at: DateTime<Utc>,
    ) -> Self {
        let gross_pnl = (exit_price - entry_price) * quantity * direction.sign();
        let fees = (entry_price + exit_price) * quantity * fee_rate;
        let net_pnl = gross_pnl - fees;
        let notional = entry_price * quantity;
        let pnl_pct = if notional.is_zero() {
            Decimal::ZERO
        } else {
            net_pnl / notional
        };

        Self {
            id,
            symbol: symbol.into(),
            direction,
            entry_price,
            exit_price: Some(exit_price),
            quantity,
            gross_pnl,
            fees,
            net_pnl,
            pnl_pct,
            exit_reason: Some(reason),
            status: TradeStatus::Closed,
            is_partial: reason == ExitReason::PartialTakeProfit,
            opened_at,
            closed_at: Some(closed_at),
        }
    }

    pub fn is_win(&self) -> bool {
        self.net_pnl > Decimal::ZERO
    }
}

/// Snapshot of running performance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskStats {
    pub initial_capital: Decimal,
    pub capital: Decimal,
    pub peak_capital: Decimal,
    /// Return on initial capital, as a fraction
    pub roi: Decimal,
    pub total_pnl: Decimal,
    pub daily_pnl: Decimal,
    pub total_fees: Decimal,
    /// Closed, non-partial trades
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: Decimal,
    pub avg_win_pct: Decimal,
    pub avg_loss_pct: Decimal,
    pub drawdown: Decimal,
    pub consecutive_losses: u32,
    pub open_trades: usize,
    pub halted: bool,
}
