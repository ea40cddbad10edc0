//! Circuit breaker module
//!
//! Supervisory halts driven by realized outcomes and market conditions

mod breaker;
mod types;

pub use breaker::CircuitBreaker;
pub use types::{CircuitHalt, CircuitState, CircuitStatus, TripReason};
