//! Runtime module
//!
//! The concurrent scan, monitor and report loops

mod engine;

pub use engine::{EngineReport, MonitorReport, ScanOutcome, TradingEngine};
