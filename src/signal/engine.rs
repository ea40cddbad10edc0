//! Decision engine: fusion followed by the filter chain

use super::context::FilterContext;
use super::filter::{FilterChain, PriorDecision};
use super::fusion::{fuse, Thresholds};
use super::types::{Decision, Opinion, ProviderWeights};
use crate::telemetry::{self, CounterMetric};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Fuses opinions into decisions. The only state it owns is the per-symbol
/// last-decision cache read by the dedup filter.
pub struct DecisionEngine {
    weights: ProviderWeights,
    thresholds: Thresholds,
    chain: FilterChain,
    last: Mutex<HashMap<String, PriorDecision>>,
}

impl DecisionEngine {
    pub fn new(weights: ProviderWeights, thresholds: Thresholds, chain: FilterChain) -> Self {
        Self {
            weights,
            thresholds,
            chain,
            last: Mutex::new(HashMap::new()),
        }
    }

    pub fn weights(&self) -> &ProviderWeights {
        &self.weights
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Evaluate one symbol for one cycle
    pub fn evaluate(&self, symbol: &str, opinions: Vec<Opinion>, ctx: &FilterContext) -> Decision {
        let fusion = fuse(&opinions, &self.weights, &self.thresholds);

        let mut last = self.last.lock().expect("decision cache lock poisoned");
        let prior = last.get(symbol).copied();
        let (stance, filters) = self
            .chain
            .apply(fusion.stance, fusion.score, ctx, prior.as_ref());

        if let Some(direction) = stance.direction() {
            last.insert(
                symbol.to_string(),
                PriorDecision {
                    direction,
                    score: fusion.score,
                    at: ctx.now,
                },
            );
        }
        drop(last);

        let decision = Decision {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            stance,
            candidate: fusion.stance,
            score: fusion.score,
            long_votes: fusion.long_votes,
            short_votes: fusion.short_votes,
            opinions,
            filters,
            created_at: ctx.now,
        };

        telemetry::increment_counter(CounterMetric::Decisions);
        if decision.is_actionable() {
            tracing::info!(
                symbol,
                stance = %decision.stance,
                score = %decision.score,
                long_votes = decision.long_votes,
                short_votes = decision.short_votes,
                "Decision"
            );
        } else if let Some(reason) = decision.veto_reason() {
            telemetry::increment_counter(CounterMetric::Vetoes);
            tracing::info!(
                symbol,
                candidate = %decision.candidate,
                score = %decision.score,
                reason,
                "Decision vetoed"
            );
        } else {
            tracing::debug!(symbol, score = %decision.score, "No decision");
        }

        decision
    }

    /// Forget the cached decision for a symbol
    pub fn forget(&self, symbol: &str) {
        self.last
            .lock()
            .expect("decision cache lock poisoned")
            .remove(symbol);
    }
}
