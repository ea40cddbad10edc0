//! Capital ledger and limit checks

use super::types::RiskError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Capital, peak and daily counters. Mutated only through `apply`.
#[derive(Debug, Clone)]
pub struct CapitalLedger {
    pub initial: Decimal,
    pub capital: Decimal,
    pub peak: Decimal,
    pub total_pnl: Decimal,
    pub total_fees: Decimal,
    /// Realized P&L since the start of `day`
    pub daily_pnl: Decimal,
    pub day: NaiveDate,
}

impl CapitalLedger {
    pub fn new(initial: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            initial,
            capital: initial,
            peak: initial,
            total_pnl: dec!(0),
            total_fees: dec!(0),
            daily_pnl: dec!(0),
            day: now.date_naive(),
        }
    }

    /// Reset daily counters on UTC date change. Returns true if it rolled.
    pub fn roll_day(&mut self, now: DateTime<Utc>) -> bool {
        let today = now.date_naive();
        if today == self.day {
            return false;
        }
        self.day = today;
        self.daily_pnl = dec!(0);
        true
    }

    /// Book a realized result
    pub fn apply(&mut self, net_pnl: Decimal, fees: Decimal, now: DateTime<Utc>) {
        self.roll_day(now);
        self.capital += net_pnl;
        self.total_pnl += net_pnl;
        self.total_fees += fees;
        self.daily_pnl += net_pnl;
        if self.capital > self.peak {
            self.peak = self.capital;
        }
    }

    /// Decline from peak, as a fraction
    pub fn drawdown(&self) -> Decimal {
        if self.peak <= dec!(0) {
            return dec!(0);
        }
        ((self.peak - self.capital) / self.peak).max(dec!(0))
    }

    pub fn roi(&self) -> Decimal {
        if self.initial.is_zero() {
            return dec!(0);
        }
        (self.capital - self.initial) / self.initial
    }
}

/// Capital-preservation limits
#[derive(Debug, Clone)]
pub struct RiskLimits {
    pub max_daily_loss_pct: Decimal,
    pub max_drawdown_pct: Decimal,
    pub max_concurrent_positions: usize,
}

impl RiskLimits {
    /// Breaches that halt trading until an explicit resume
    pub fn check_halting(&self, ledger: &CapitalLedger) -> Result<(), RiskError> {
        let daily_limit = ledger.capital * self.max_daily_loss_pct;
        if ledger.daily_pnl < dec!(0) && ledger.daily_pnl.abs() >= daily_limit {
            return Err(RiskError::DailyLossLimit {
                loss: ledger.daily_pnl.abs(),
                limit: daily_limit,
            });
        }

        let drawdown = ledger.drawdown();
        if drawdown >= self.max_drawdown_pct {
            return Err(RiskError::MaxDrawdown {
                drawdown,
                limit: self.max_drawdown_pct,
            });
        }

        Ok(())
    }

    /// Position cap. Rejects without halting.
    pub fn check_capacity(&self, open: usize) -> Result<(), RiskError> {
        if open >= self.max_concurrent_positions {
            return Err(RiskError::MaxPositionsReached {
                open,
                max: self.max_concurrent_positions,
            });
        }
        Ok(())
    }
}
