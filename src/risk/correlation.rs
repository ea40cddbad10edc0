//! Return correlation between symbols

use super::types::RiskError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Outcome of a correlation check
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationCheck {
    pub allowed: bool,
    /// Highest absolute correlation seen against an open symbol
    pub max_correlation: f64,
    /// Open symbol that produced the maximum
    pub against: Option<String>,
}

impl CorrelationCheck {
    /// Check that lets everything through
    pub fn allow_all() -> Self {
        Self {
            allowed: true,
            max_correlation: 0.0,
            against: None,
        }
    }

    /// The rejection as a risk error, if the candidate was refused
    pub fn rejection(&self) -> Option<RiskError> {
        if self.allowed {
            return None;
        }
        Some(RiskError::CorrelationTooHigh {
            symbol: self.against.clone().unwrap_or_default(),
            correlation: self.max_correlation,
        })
    }
}

/// Simple returns of a price series
pub fn returns(prices: &[Decimal]) -> Vec<f64> {
    prices
        .windows(2)
        .filter_map(|w| {
            if w[0].is_zero() {
                return None;
            }
            ((w[1] - w[0]) / w[0]).to_f64()
        })
        .collect()
}

/// Pearson correlation of two equal-length series
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let (a, b) = (&a[a.len() - n..], &b[b.len() - n..]);
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denom = (var_a * var_b).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    Some(cov / denom)
}

/// Compare a candidate against every open symbol. Pairs with fewer than
/// `min_samples` overlapping returns are skipped.
pub fn check_correlation(
    candidate: &str,
    open_symbols: &[String],
    histories: &HashMap<String, Vec<Decimal>>,
    ceiling: f64,
    min_samples: usize,
) -> CorrelationCheck {
    let mut result = CorrelationCheck::allow_all();

    let Some(candidate_prices) = histories.get(candidate) else {
        return result;
    };
    let candidate_returns = returns(candidate_prices);

    for symbol in open_symbols.iter().filter(|s| s.as_str() != candidate) {
        let Some(prices) = histories.get(symbol) else {
            continue;
        };
        let other = returns(prices);
        if candidate_returns.len().min(other.len()) < min_samples {
            continue;
        }
        let Some(corr) = pearson(&candidate_returns, &other).map(f64::abs) else {
            continue;
        };
        if corr > result.max_correlation {
            result.max_correlation = corr;
            result.against = Some(symbol.clone());
        }
    }

    result.allowed = result.max_correlation <= ceiling;
    result
}
