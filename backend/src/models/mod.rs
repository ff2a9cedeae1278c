//! Domain models for the housing credit simulator

pub mod event;
pub mod mortgage;
pub mod rental;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Household identifier, assigned in increasing order and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HouseholdId(pub u64);

/// House identifier issued by the housing stock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HouseId(pub u64);

impl fmt::Display for HouseholdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "household#{}", self.0)
    }
}

impl fmt::Display for HouseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "house#{}", self.0)
    }
}

// Re-exports
pub use event::{Event, EventLog};
pub use mortgage::{
    monthly_payment_factor, MortgageAgreement, MortgageApproval, MortgageBook, MortgageId,
    Repayment,
};
pub use rental::{Letting, RentalAgreement};
