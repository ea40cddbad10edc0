//! Position sizing
//!
//! Sizers return the fraction of capital to commit. Quantity follows from
//! that fraction and the entry price; a zero risk distance always sizes to 0.

use super::kelly::{KellyCalculator, TradeSample};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Trait for position sizing implementations
pub trait PositionSizer: Send + Sync {
    /// Capital fraction to commit, `None` if this sizer has no opinion yet
    fn capital_pct(&self, sample: &TradeSample) -> Option<Decimal>;

    /// Get the sizing mode name
    fn mode_name(&self) -> &'static str;
}

/// Fixed fraction of capital per trade
#[derive(Debug, Clone)]
pub struct FixedFractionalSizer {
    /// Capital fraction per trade (e.g., 0.05 = 5%)
    pub pct: Decimal,
}

impl FixedFractionalSizer {
    pub fn new(pct: Decimal) -> Self {
        Self { pct }
    }
}

impl PositionSizer for FixedFractionalSizer {
    fn capital_pct(&self, _sample: &TradeSample) -> Option<Decimal> {
        Some(self.pct)
    }

    fn mode_name(&self) -> &'static str {
        "fixed"
    }
}

impl PositionSizer for KellyCalculator {
    fn capital_pct(&self, sample: &TradeSample) -> Option<Decimal> {
        self.position_pct(sample)
    }

    fn mode_name(&self) -> &'static str {
        "kelly"
    }
}

/// Losing-streak size reduction
#[derive(Debug, Clone)]
pub struct StreakReduction {
    /// Consecutive losses at which reduction starts
    pub threshold: u32,
    /// Multiplier applied once the streak is reached
    pub factor: Decimal,
}

impl StreakReduction {
    pub fn apply(&self, pct: Decimal, consecutive_losses: u32) -> Decimal {
        if self.threshold > 0 && consecutive_losses >= self.threshold {
            pct * self.factor
        } else {
            pct
        }
    }
}

/// Quantity for a capital fraction. Never negative; zero for any degenerate input.
pub fn quantity_for(capital: Decimal, pct: Decimal, entry: Decimal, stop: Decimal) -> Decimal {
    if capital <= dec!(0) || pct <= dec!(0) || entry <= dec!(0) {
        return dec!(0);
    }
    if (entry - stop).is_zero() {
        return dec!(0);
    }
    capital * pct / entry
}
