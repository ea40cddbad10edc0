//! confluence: composite decision and risk control engine
//!
//! This library provides the core components for:
//! - Weighted fusion of independent strategy opinions
//! - Contextual filtering (trend, session, regime, news, dedup)
//! - Position sizing, protective levels and capital limits
//! - Position lifecycle (partial take-profit, breakeven, trailing, pyramiding)
//! - Escalating, self-expiring circuit breaker
//! - Concurrent scan/monitor/report runtime
//! - Audit journal to Parquet
//! - Full observability stack

pub mod circuit;
pub mod cli;
pub mod config;
pub mod feed;
pub mod journal;
pub mod position;
pub mod risk;
pub mod runtime;
pub mod signal;
pub mod telemetry;
