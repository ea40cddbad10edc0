//! Market data types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// True range against the previous close
    pub fn true_range(&self, prev_close: Decimal) -> Decimal {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

/// Live top-of-book quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    /// Trading symbol (e.g., "BTCUSDT")
    pub symbol: String,
    /// Last traded price
    pub last: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    /// Percentage change over the last 24 hours, as a fraction
    pub change_24h: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Ticker {
    /// Bid/ask spread relative to the bid, `None` for an unusable book
    pub fn spread_pct(&self) -> Option<Decimal> {
        if self.bid <= Decimal::ZERO || self.ask <= Decimal::ZERO {
            return None;
        }
        Some((self.ask - self.bid) / self.bid)
    }
}

/// Result of an external price check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceCheck {
    /// Price the verifier observed
    pub verified_price: Decimal,
    /// Whether the price may be acted on
    pub verified: bool,
    /// Deviation from the reference price, as a fraction
    pub deviation_pct: Decimal,
}
