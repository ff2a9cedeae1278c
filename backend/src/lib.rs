//! Housing Credit Core - Rust Engine
//!
//! Credit-underwriting and household-financial-state engine of an
//! agent-based housing market model, with deterministic execution.
//!
//! # Architecture
//!
//! - **central_bank**: Macroprudential thresholds and the regime switch
//! - **bank**: Mortgage underwriting, the book and the rate controller
//! - **household**: Per-agent balance sheet and monthly state machine
//! - **behaviour**: Household decision rules and consumption
//! - **income** / **government**: Employment income, income tax and NICs
//! - **market**: Interfaces to the (external) housing and rental markets
//! - **collectors**: Sinks for loan and sale records
//! - **orchestrator**: Main simulation loop
//! - **models**: Contracts, identifiers and events
//! - **rng**: Deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. Household balances are never negative at the end of a step
//! 2. All randomness is deterministic (one seeded RNG, fixed call order)
//! 3. Mortgages are created only by the bank and live in its book
//! 4. Precondition violations abort the run; financial events never do

// Module declarations
pub mod bank;
pub mod behaviour;
pub mod central_bank;
pub mod collectors;
pub mod config;
pub mod core;
pub mod government;
pub mod household;
pub mod income;
pub mod market;
pub mod models;
pub mod orchestrator;
pub mod rng;

// Re-exports for convenience
pub use bank::{Bank, CreditError};
pub use central_bank::{CentralBank, PolicyError};
pub use config::{Config, ConfigError};
pub use core::time::TimeManager;
pub use household::{Household, HouseholdError};
pub use models::{
    event::{Event, EventLog},
    HouseId, HouseholdId, MortgageId,
};
pub use orchestrator::{MonthResult, Orchestrator, RentalCompletion, SaleCompletion, SimulationError};
pub use rng::{RngManager, RngState};
