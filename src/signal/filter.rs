//! Contextual filter chain
//!
//! Filters run in a fixed order and can only demote a candidate to flat.
//! Each one is a pure predicate over the candidate and its context.

use super::context::{FilterContext, Regime, Trend};
use super::types::{Direction, FilterKind, FilterOutcome, FilterVerdict, Stance};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Configuration for the filter chain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Reject decisions against the higher-timeframe trend
    pub trend_enabled: bool,
    /// Reject decisions in thin sessions
    pub session_enabled: bool,
    /// Minimum session quality (1-6)
    pub min_session_quality: u8,
    /// Reject decisions in a quiet regime
    pub regime_enabled: bool,
    /// Reject decisions around high-impact events
    pub news_enabled: bool,
    /// Reject repeats of a recent decision
    pub dedup_enabled: bool,
    /// Window in which a repeat is suppressed (minutes)
    pub dedup_cooldown_mins: i64,
    /// Conviction gain that lets a repeat through
    pub dedup_min_improvement: Decimal,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            trend_enabled: true,
            session_enabled: true,
            min_session_quality: 3,
            regime_enabled: true,
            news_enabled: true,
            dedup_enabled: true,
            dedup_cooldown_mins: 60,
            dedup_min_improvement: dec!(0.10),
        }
    }
}

/// Last accepted decision for a symbol, as seen by the dedup filter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorDecision {
    pub direction: Direction,
    pub score: Decimal,
    pub at: DateTime<Utc>,
}

/// Ordered filter chain
#[derive(Debug, Clone)]
pub struct FilterChain {
    config: FilterConfig,
}

impl FilterChain {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    fn enabled(&self, kind: FilterKind) -> bool {
        match kind {
            FilterKind::Trend => self.config.trend_enabled,
            FilterKind::Session => self.config.session_enabled,
            FilterKind::Regime => self.config.regime_enabled,
            FilterKind::News => self.config.news_enabled,
            FilterKind::Dedup => self.config.dedup_enabled,
        }
    }

    /// Run the chain. Returns the surviving stance and one outcome per filter.
    pub fn apply(
        &self,
        candidate: Stance,
        score: Decimal,
        ctx: &FilterContext,
        prior: Option<&PriorDecision>,
    ) -> (Stance, Vec<FilterOutcome>) {
        let mut outcomes = Vec::with_capacity(FilterKind::CHAIN.len());
        let mut stance = candidate;

        for kind in FilterKind::CHAIN {
            let verdict = match stance.direction() {
                None => FilterVerdict::NotEvaluated,
                Some(_) if !self.enabled(kind) => FilterVerdict::Disabled,
                Some(direction) => {
                    let veto = match kind {
                        FilterKind::Trend => trend_veto(direction, ctx.trend),
                        FilterKind::Session => {
                            session_veto(ctx, self.config.min_session_quality)
                        }
                        FilterKind::Regime => regime_veto(ctx.regime),
                        FilterKind::News => ctx
                            .news_event
                            .as_ref()
                            .map(|event| format!("news blackout: {}", event)),
                        FilterKind::Dedup => self.dedup_veto(direction, score, ctx.now, prior),
                    };
                    match veto {
                        Some(reason) => {
                            stance = Stance::Flat;
                            FilterVerdict::Vetoed(reason)
                        }
                        None => FilterVerdict::Passed,
                    }
                }
            };
            outcomes.push(FilterOutcome {
                filter: kind,
                verdict,
            });
        }

        (stance, outcomes)
    }

    fn dedup_veto(
        &self,
        direction: Direction,
        score: Decimal,
        now: DateTime<Utc>,
        prior: Option<&PriorDecision>,
    ) -> Option<String> {
        let prior = prior?;
        if prior.direction != direction {
            return None;
        }
        let age = now - prior.at;
        if age >= Duration::minutes(self.config.dedup_cooldown_mins) {
            return None;
        }
        let improvement = conviction_gain(direction, prior.score, score);
        if improvement > self.config.dedup_min_improvement {
            return None;
        }
        Some(format!(
            "repeat {} within {}m (improvement {} <= {})",
            direction,
            age.num_minutes(),
            improvement,
            self.config.dedup_min_improvement
        ))
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new(FilterConfig::default())
    }
}

/// Score movement in the direction's favor
fn conviction_gain(direction: Direction, previous: Decimal, current: Decimal) -> Decimal {
    match direction {
        Direction::Long => current - previous,
        Direction::Short => previous - current,
    }
}

fn trend_veto(direction: Direction, trend: Option<Trend>) -> Option<String> {
    match (direction, trend?) {
        (Direction::Long, Trend::Bearish) => Some("long against bearish trend".to_string()),
        (Direction::Short, Trend::Bullish) => Some("short against bullish trend".to_string()),
        _ => None,
    }
}

fn session_veto(ctx: &FilterContext, floor: u8) -> Option<String> {
    (ctx.session.quality < floor).then(|| {
        format!(
            "session {} quality {} below {}",
            ctx.session.name, ctx.session.quality, floor
        )
    })
}

fn regime_veto(regime: Regime) -> Option<String> {
    (regime == Regime::Quiet).then(|| "quiet regime".to_string())
}
