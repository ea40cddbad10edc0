//! Shared fixtures for integration tests

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use confluence::circuit::CircuitBreaker;
use confluence::config::{CircuitConfig, Config, PositionConfig, RiskConfig};
use confluence::feed::{Candle, MarketDataSource, Ticker};
use confluence::position::PositionManager;
use confluence::risk::RiskManager;
use confluence::signal::{Opinion, ProviderError, ProviderId, SignalProvider, Stance};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Tuesday 14:00 UTC, inside the London/New York overlap
pub fn market_hours() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 18, 14, 0, 0).unwrap()
}

pub fn create_test_services(
    risk: RiskConfig,
    position: PositionConfig,
) -> (Arc<CircuitBreaker>, Arc<RiskManager>, PositionManager) {
    let circuit = Arc::new(CircuitBreaker::new(CircuitConfig::default()));
    let risk = Arc::new(RiskManager::starting_at(risk, circuit.clone(), market_hours()));
    let positions = PositionManager::new(position, risk.clone());
    (circuit, risk, positions)
}

/// Config that only leaves the session, news and dedup filters on
pub fn create_test_config(symbols: &[&str]) -> Config {
    let mut config = Config::default();
    config.runtime.symbols = symbols.iter().map(|s| s.to_string()).collect();
    config.filters.trend_enabled = false;
    config.filters.regime_enabled = false;
    config
}

/// Wiggle that depends only on the distance from the newest bar, so every
/// symbol's series has the same shape and any tail lines up with a shorter fetch
fn wiggle(bars_from_end: usize) -> Decimal {
    Decimal::from(((bars_from_end * 37) % 11) as i64) / dec!(1000)
}

/// In-memory market keyed by symbol. Tickers are stamped `as_of` and the
/// newest candle opens one bar before it.
pub struct MockMarket {
    prices: Mutex<HashMap<String, Decimal>>,
    change_24h: Mutex<Decimal>,
    as_of: Mutex<DateTime<Utc>>,
}

impl MockMarket {
    pub fn new(prices: &[(&str, Decimal)]) -> Self {
        Self {
            prices: Mutex::new(
                prices
                    .iter()
                    .map(|(symbol, price)| (symbol.to_string(), *price))
                    .collect(),
            ),
            change_24h: Mutex::new(dec!(0.01)),
            as_of: Mutex::new(market_hours()),
        }
    }

    pub fn set_as_of(&self, as_of: DateTime<Utc>) {
        *self.as_of.lock().unwrap() = as_of;
    }

    fn as_of(&self) -> DateTime<Utc> {
        *self.as_of.lock().unwrap()
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    pub fn set_change_24h(&self, change: Decimal) {
        *self.change_24h.lock().unwrap() = change;
    }

    fn price(&self, symbol: &str) -> anyhow::Result<Decimal> {
        self.prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("unknown symbol {}", symbol))
    }
}

#[async_trait]
impl MarketDataSource for MockMarket {
    async fn candles(&self, symbol: &str, _: &str, limit: usize) -> anyhow::Result<Vec<Candle>> {
        let price = self.price(symbol)?;
        let count = limit.min(150);
        let start = self.as_of() - Duration::minutes(15 * count as i64);
        Ok((0..count)
            .map(|i| {
                let from_end = count - 1 - i;
                let close = price * (Decimal::ONE + wiggle(from_end));
                Candle {
                    open_time: start + Duration::minutes(15 * i as i64),
                    open: close,
                    high: close * dec!(1.01),
                    low: close * dec!(0.99),
                    close,
                    volume: dec!(1000),
                }
            })
            .collect())
    }

    async fn ticker(&self, symbol: &str) -> anyhow::Result<Ticker> {
        let last = self.price(symbol)?;
        Ok(Ticker {
            symbol: symbol.to_string(),
            last,
            bid: last * dec!(0.99995),
            ask: last * dec!(1.00005),
            change_24h: *self.change_24h.lock().unwrap(),
            timestamp: self.as_of(),
        })
    }
}

pub struct FixedProvider {
    pub id: ProviderId,
    pub stance: Stance,
    pub strength: Decimal,
}

impl SignalProvider for FixedProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn evaluate(&self, candles: &[Candle], symbol: &str) -> Result<Opinion, ProviderError> {
        let price = candles.last().map(|c| c.close).unwrap_or_default();
        Ok(Opinion::new(self.id, symbol, self.stance, self.strength, price, "fixed"))
    }
}

/// Three agreeing providers strong enough to clear the default thresholds
pub fn agreeing_providers(stance: Stance) -> Vec<Box<dyn SignalProvider>> {
    [ProviderId::Rsi, ProviderId::Macd, ProviderId::EmaCrossover]
        .into_iter()
        .map(|id| {
            Box::new(FixedProvider {
                id,
                stance,
                strength: dec!(0.6),
            }) as Box<dyn SignalProvider>
        })
        .collect()
}
