//! Weighted fusion of provider opinions

use super::types::{Opinion, ProviderWeights, Stance};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Neutral composite score
pub const NEUTRAL: Decimal = dec!(0.5);

/// Score thresholds and quorum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Score at or above this is a long candidate
    pub buy: Decimal,
    /// Score at or below this is a short candidate
    pub sell: Decimal,
    /// Minimum providers agreeing on the direction
    pub min_agreeing: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            buy: dec!(0.60),
            sell: dec!(0.40),
            min_agreeing: 3,
        }
    }
}

/// Output of fusion, before any filter runs
#[derive(Debug, Clone, PartialEq)]
pub struct Fusion {
    pub score: Decimal,
    pub long_votes: usize,
    pub short_votes: usize,
    pub stance: Stance,
}

/// Weight-normalized average of opinion sub-scores, always in [0, 1]
pub fn composite_score(opinions: &[Opinion], weights: &ProviderWeights) -> Decimal {
    let (weighted, total) = opinions.iter().fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(weighted, total), opinion| {
            let weight = weights.get(opinion.provider).max(Decimal::ZERO);
            (weighted + weight * opinion.sub_score(), total + weight)
        },
    );

    if total.is_zero() {
        return NEUTRAL;
    }
    (weighted / total).clamp(Decimal::ZERO, Decimal::ONE)
}

/// Score the opinions and apply the threshold/quorum rule
pub fn fuse(opinions: &[Opinion], weights: &ProviderWeights, thresholds: &Thresholds) -> Fusion {
    let score = composite_score(opinions, weights);
    let long_votes = opinions.iter().filter(|o| o.stance == Stance::Long).count();
    let short_votes = opinions.iter().filter(|o| o.stance == Stance::Short).count();

    let long = score >= thresholds.buy && long_votes >= thresholds.min_agreeing;
    let short = score <= thresholds.sell && short_votes >= thresholds.min_agreeing;

    let stance = match (long, short) {
        (true, false) => Stance::Long,
        (false, true) => Stance::Short,
        // Both crossed only with degenerate thresholds; flat wins
        _ => Stance::Flat,
    };

    Fusion {
        score,
        long_votes,
        short_votes,
        stance,
    }
}
