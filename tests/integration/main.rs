//! Integration tests for confluence

mod common;
mod property_test;
mod runtime_test;
mod scenario_test;
