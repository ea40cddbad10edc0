//! Circuit breaker types

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Automatic trip causes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TripReason {
    ConsecutiveLosses { count: u32 },
    HourlyLoss { loss: Decimal },
    DailyLoss { loss: Decimal },
    MarketDump { change: Decimal },
}

impl fmt::Display for TripReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TripReason::ConsecutiveLosses { count } => write!(f, "{} consecutive losses", count),
            TripReason::HourlyLoss { loss } => write!(f, "hourly loss {}", loss),
            TripReason::DailyLoss { loss } => write!(f, "daily loss {}", loss),
            TripReason::MarketDump { change } => write!(f, "market-wide dump {}", change),
        }
    }
}

/// Why the breaker refuses trading
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CircuitHalt {
    #[error("manual halt")]
    Manual,
    #[error("news blackout: {0}")]
    News(String),
    #[error("volatility halt: {0}")]
    Volatility(String),
    #[error("circuit open ({reason}), {remaining_mins}m remaining")]
    Tripped {
        reason: TripReason,
        remaining_mins: i64,
    },
}

/// Live breaker state. Only the breaker mutates it.
#[derive(Debug, Clone, Default)]
pub struct CircuitState {
    pub open: bool,
    pub trigger_reason: Option<TripReason>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub cooldown: Option<Duration>,
    pub consecutive_losses: u32,
    pub manual_halt: bool,
    /// Event name while a news halt is active
    pub news_halt: Option<String>,
    /// Reason while a volatility halt is active
    pub volatility_halt: Option<String>,
    pub total_trips: u32,
}

impl CircuitState {
    /// Time left on an automatic trip
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        match (self.open, self.triggered_at, self.cooldown) {
            (true, Some(at), Some(cooldown)) => (at + cooldown - now).max(Duration::zero()),
            _ => Duration::zero(),
        }
    }
}

/// Snapshot returned to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitStatus {
    pub can_trade: bool,
    /// Halt reason when trading is refused
    pub reason: Option<String>,
    pub open: bool,
    pub trigger_reason: Option<TripReason>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub cooldown_mins: Option<i64>,
    pub remaining_mins: i64,
    pub consecutive_losses: u32,
    pub manual_halt: bool,
    pub news_halt: bool,
    pub volatility_halt: bool,
    pub total_trips: u32,
    /// Summed loss fractions over the last hour
    pub hourly_loss: Decimal,
    /// Summed loss fractions over the last 24 hours
    pub daily_loss: Decimal,
}
