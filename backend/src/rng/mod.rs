//! Deterministic random number generation
//!
//! Uses xorshift64* for fast, deterministic draws.
//! CRITICAL: every stochastic household decision MUST draw from the one
//! `RngManager` owned by the orchestrator, in household-id order.

mod xorshift;

pub use xorshift::{RngManager, RngState};
