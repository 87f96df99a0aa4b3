//! Polybot backend library: multi-tenant prediction-market and crypto/stock
//! arbitrage trading platform.
//!
//! Exposes the core modules so both `main.rs` and `tests/` can drive the
//! system end to end without duplicating wiring.

pub mod config;
pub mod error;
pub mod executor;
pub mod models;
pub mod runtime;
pub mod scanners;
pub mod simulator;
pub mod store;
pub mod supervisor;
pub mod vault;
pub mod venues;
