//! Ticker-based price verification

use super::{MarketDataSource, PriceCheck, PriceVerifier, Ticker};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

/// Verifies a reference price against the live ticker of a market data source
pub struct TickerVerifier<S: MarketDataSource + ?Sized> {
    source: Arc<S>,
    /// Widest acceptable bid/ask spread, as a fraction
    max_spread_pct: Decimal,
    /// Largest acceptable deviation from the reference, as a fraction
    max_deviation_pct: Decimal,
}

impl<S: MarketDataSource + ?Sized> TickerVerifier<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            max_spread_pct: dec!(0.05),
            max_deviation_pct: dec!(0.005),
        }
    }

    pub fn with_limits(mut self, max_spread_pct: Decimal, max_deviation_pct: Decimal) -> Self {
        self.max_spread_pct = max_spread_pct;
        self.max_deviation_pct = max_deviation_pct;
        self
    }

    /// Reason the quote itself cannot be trusted, if any
    fn quote_problem(&self, ticker: &Ticker) -> Option<String> {
        if ticker.last <= Decimal::ZERO {
            return Some(format!("non-positive last price {}", ticker.last));
        }
        if ticker.bid > ticker.ask {
            return Some(format!("crossed book bid {} > ask {}", ticker.bid, ticker.ask));
        }
        match ticker.spread_pct() {
            Some(spread) if spread > self.max_spread_pct => {
                Some(format!("spread {} above {}", spread, self.max_spread_pct))
            }
            _ => None,
        }
    }

    /// Pure check of a ticker against a reference price
    pub fn check(&self, ticker: &Ticker, reference_price: Decimal) -> PriceCheck {
        if let Some(problem) = self.quote_problem(ticker) {
            tracing::warn!(symbol = %ticker.symbol, problem = %problem, "Rejecting quote");
            return PriceCheck {
                verified_price: ticker.last,
                verified: false,
                deviation_pct: Decimal::ZERO,
            };
        }

        if reference_price <= Decimal::ZERO {
            return PriceCheck {
                verified_price: ticker.last,
                verified: false,
                deviation_pct: Decimal::ZERO,
            };
        }

        let deviation = ((ticker.last - reference_price) / reference_price).abs();
        PriceCheck {
            verified_price: ticker.last,
            verified: deviation <= self.max_deviation_pct,
            deviation_pct: deviation,
        }
    }
}

#[async_trait]
impl<S: MarketDataSource + ?Sized> PriceVerifier for TickerVerifier<S> {
    async fn verify(&self, symbol: &str, reference_price: Decimal) -> anyhow::Result<PriceCheck> {
        let ticker = self.source.ticker(symbol).await?;
        Ok(self.check(&ticker, reference_price))
    }
}
