//! Kelly criterion position sizing

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Win/loss summary of closed trades, the input to Kelly
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TradeSample {
    pub wins: usize,
    pub losses: usize,
    /// Mean winning pnl_pct
    pub avg_win_pct: Decimal,
    /// Mean absolute losing pnl_pct
    pub avg_loss_pct: Decimal,
}

impl TradeSample {
    pub fn total(&self) -> usize {
        self.wins + self.losses
    }

    pub fn win_rate(&self) -> Decimal {
        if self.total() == 0 {
            return dec!(0);
        }
        Decimal::from(self.wins as u64) / Decimal::from(self.total() as u64)
    }
}

/// Kelly criterion calculator from realized trade statistics
#[derive(Debug, Clone)]
pub struct KellyCalculator {
    /// Kelly fraction (e.g., 0.5 for half Kelly)
    pub fraction: Decimal,
    /// Maximum position as a fraction of capital
    pub max_pct: Decimal,
    /// Closed trades needed before the estimate is trusted
    pub min_trades: usize,
}

impl KellyCalculator {
    pub fn new(fraction: Decimal, max_pct: Decimal, min_trades: usize) -> Self {
        Self {
            fraction,
            max_pct,
            min_trades,
        }
    }

    /// Raw Kelly fraction `f = (b·p − q) / b` with `b = avgWin / avgLoss`.
    /// `None` when the odds are undefined (no losses or no loss size).
    pub fn raw_fraction(&self, sample: &TradeSample) -> Option<Decimal> {
        if sample.total() == 0 || sample.losses == 0 || sample.avg_loss_pct <= dec!(0) {
            return None;
        }
        let b = sample.avg_win_pct / sample.avg_loss_pct;
        let p = sample.win_rate();
        let q = Decimal::ONE - p;

        if b.is_zero() {
            // Winners that win nothing: no edge
            return Some(-q);
        }
        Some((b * p - q) / b)
    }

    /// Capital fraction to commit. `None` means "fall back to fixed sizing";
    /// `Some(0)` means the edge is non-positive and no trade should be taken.
    pub fn position_pct(&self, sample: &TradeSample) -> Option<Decimal> {
        if sample.total() < self.min_trades {
            return None;
        }
        let kelly = self.raw_fraction(sample)?;
        if kelly <= dec!(0) {
            return Some(dec!(0));
        }
        Some((kelly * self.fraction).min(self.max_pct))
    }
}

impl Default for KellyCalculator {
    fn default() -> Self {
        Self::new(dec!(0.5), dec!(0.10), 20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(wins: usize, losses: usize, avg_win: Decimal, avg_loss: Decimal) -> TradeSample {
        TradeSample {
            wins,
            losses,
            avg_win_pct: avg_win,
            avg_loss_pct: avg_loss,
        }
    }

    #[test]
    fn test_kelly_calculation() {
        let calc = KellyCalculator::default();
        // p = 0.6, b = 2 -> f = (1.2 - 0.4) / 2 = 0.4, half = 0.2, capped 0.10
        let s = sample(12, 8, dec!(0.04), dec!(0.02));
        assert_eq!(calc.raw_fraction(&s), Some(dec!(0.4)));
        assert_eq!(calc.position_pct(&s), Some(dec!(0.10)));
    }

    #[test]
    fn test_kelly_below_cap() {
        let calc = KellyCalculator::default();
        // p = 0.5, b = 1.25 -> f = (0.625 - 0.5) / 1.25 = 0.1, half = 0.05
        let s = sample(10, 10, dec!(0.025), dec!(0.02));
        assert_eq!(calc.position_pct(&s), Some(dec!(0.05)));
    }

    #[test]
    fn test_kelly_no_edge_is_zero() {
        let calc = KellyCalculator::default();
        let s = sample(8, 12, dec!(0.02), dec!(0.02));
        assert_eq!(calc.position_pct(&s), Some(dec!(0)));
    }

    #[test]
    fn test_kelly_insufficient_history() {
        let calc = KellyCalculator::default();
        let s = sample(10, 9, dec!(0.04), dec!(0.02));
        assert_eq!(calc.position_pct(&s), None);
    }

    #[test]
    fn test_kelly_no_losses_falls_back() {
        let calc = KellyCalculator::default();
        let s = sample(25, 0, dec!(0.03), dec!(0));
        assert_eq!(calc.position_pct(&s), None);
    }

    #[test]
    fn test_kelly_all_losses_is_zero() {
        let calc = KellyCalculator::default();
        let s = sample(0, 20, dec!(0), dec!(0.02));
        assert_eq!(calc.position_pct(&s), Some(dec!(0)));
    }
}
