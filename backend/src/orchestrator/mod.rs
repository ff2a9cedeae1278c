//! Orchestrator - main simulation loop
//!
//! Runs the monthly loop over the regulator, the bank and the household
//! population, and routes market completions and demographic transfers.
//!
//! See `engine.rs` for full implementation.

pub mod engine;

// Re-export main types for convenience
pub use engine::{MonthResult, Orchestrator, RentalCompletion, SaleCompletion, SimulationError};
