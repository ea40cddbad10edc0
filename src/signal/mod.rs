//! Signal fusion module
//!
//! Provider opinions, weighted fusion, and the contextual filter chain

mod calendar;
mod context;
mod engine;
mod filter;
mod fusion;
pub(crate) mod indicators;
mod provider;
mod types;

pub use calendar::{Impact, NewsCalendar, ScheduledEvent};
pub use context::{FilterContext, Regime, RegimeThresholds, Session, Trend};
pub use engine::DecisionEngine;
pub use filter::{FilterChain, FilterConfig, PriorDecision};
pub use fusion::{composite_score, fuse, Fusion, Thresholds, NEUTRAL};
pub use provider::{collect_opinions, ProviderError, SignalProvider};
pub use types::{
    Decision, Direction, FilterKind, FilterOutcome, FilterVerdict, Opinion, ProviderId,
    ProviderWeights, Stance,
};
