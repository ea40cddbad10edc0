//! Market data interfaces
//!
//! Acquisition (polling, reconnects, retries) lives outside the crate; the
//! engine only sees these traits.

mod types;
mod verifier;

pub use types::{Candle, PriceCheck, Ticker};
pub use verifier::TickerVerifier;

use async_trait::async_trait;
use rust_decimal::Decimal;

/// Trait for market data sources
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Most recent `limit` candles for a symbol, oldest first
    async fn candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<Candle>>;

    /// Live ticker for a symbol
    async fn ticker(&self, symbol: &str) -> anyhow::Result<Ticker>;
}

/// Trait for independent price checks made before acting on a decision
#[async_trait]
pub trait PriceVerifier: Send + Sync {
    /// Compare `reference_price` against an independent quote
    async fn verify(&self, symbol: &str, reference_price: Decimal) -> anyhow::Result<PriceCheck>;
}
