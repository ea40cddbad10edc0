//! Signal provider interface
//!
//! Indicator and pattern detectors live outside the crate. Each one is a pure
//! function of the candle series that yields one opinion per cycle.

use super::types::{Opinion, ProviderId};
use crate::feed::Candle;
use crate::telemetry::{self, CounterMetric};
use thiserror::Error;

/// Provider failures. All of them mean "no opinion this cycle".
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Not enough candles for the indicator's lookback
    #[error("Insufficient history: need {needed}, have {have}")]
    InsufficientHistory { needed: usize, have: usize },
    /// Candle data failed a sanity check
    #[error("Malformed data: {0}")]
    MalformedData(String),
    /// Anything else the provider could not recover from
    #[error("Provider failed: {0}")]
    Failed(String),
}

/// Trait for signal providers
pub trait SignalProvider: Send + Sync {
    /// Stable identifier used for weight lookup
    fn id(&self) -> ProviderId;

    /// Evaluate a candle series. Deterministic for identical input.
    fn evaluate(&self, candles: &[Candle], symbol: &str) -> Result<Opinion, ProviderError>;
}

/// Run every provider, dropping the ones that fail
pub fn collect_opinions(
    providers: &[Box<dyn SignalProvider>],
    candles: &[Candle],
    symbol: &str,
) -> Vec<Opinion> {
    providers
        .iter()
        .filter_map(|provider| match provider.evaluate(candles, symbol) {
            Ok(opinion) if opinion.provider == provider.id() => Some(opinion),
            Ok(opinion) => {
                tracing::warn!(
                    provider = %provider.id(),
                    reported = %opinion.provider,
                    symbol,
                    "Provider reported a foreign id, dropping opinion"
                );
                None
            }
            Err(e) => {
                telemetry::increment_counter(CounterMetric::ProviderErrors);
                tracing::warn!(
                    provider = %provider.id(),
                    symbol,
                    error = %e,
                    "Provider failed, excluding from fusion"
                );
                None
            }
        })
        .collect()
}
