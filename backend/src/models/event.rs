//! Event logging for simulation replay and auditing.
//!
//! Every first-class financial transition (loan origination, bankruptcy,
//! residual debt, inheritance write-off, regime switches) is captured as an
//! [`Event`]. Events are the observable record of expected financial
//! events; fatal invariant violations are errors, never events.
//!
//! # Event Types
//!
//! - **Credit**: loans, cash purchases, repayments, write-offs
//! - **Household**: bankruptcy, vulnerability, births and deaths
//! - **Housing**: sales, tenancy endings and evictions
//! - **Policy**: mortgage rate updates and macroprudential switches
//!
//! # Example
//!
//! ```rust
//! use housing_credit_core_rs::models::{Event, HouseholdId};
//!
//! let event = Event::Bankruptcy {
//!     month: 10,
//!     household: HouseholdId(42),
//!     cash_injection: 315.0,
//! };
//!
//! assert_eq!(event.month(), 10);
//! assert_eq!(event.event_type(), "Bankruptcy");
//! ```

use serde::Serialize;

use super::mortgage::MortgageId;
use super::{HouseId, HouseholdId};

/// Simulation event capturing a state change.
///
/// Events are logged in the order they occur within a month.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Bank originated a mortgage with positive principal
    LoanOriginated {
        month: u32,
        household: HouseholdId,
        mortgage: MortgageId,
        principal: f64,
        down_payment: f64,
        is_buy_to_let: bool,
        is_first_time_buyer: bool,
    },

    /// Purchase settled without credit
    CashPurchase {
        month: u32,
        household: HouseholdId,
        price: f64,
    },

    /// Mortgage reached zero principal through scheduled payments
    MortgageRepaid {
        month: u32,
        household: HouseholdId,
        mortgage: MortgageId,
    },

    /// Balance went negative and was replenished
    Bankruptcy {
        month: u32,
        household: HouseholdId,
        cash_injection: f64,
    },

    /// Household entered the vulnerable state this month
    BecameVulnerable {
        month: u32,
        household: HouseholdId,
        exposure_at_default: f64,
    },

    /// Sale completed; residual debt stays on the seller's books
    HouseSold {
        month: u32,
        seller: HouseholdId,
        house: HouseId,
        price: f64,
        residual_debt: f64,
    },

    /// Residual debt from an earlier sale fully repaid
    ResidualDebtCleared {
        month: u32,
        household: HouseholdId,
        mortgage: MortgageId,
    },

    /// Debt of a deceased household relieved for lack of funds
    DebtWrittenOff {
        month: u32,
        deceased: HouseholdId,
        beneficiary: HouseholdId,
        mortgage: MortgageId,
        amount: f64,
    },

    /// Tenant left at the end of the agreement or to buy
    TenancyEnded {
        month: u32,
        tenant: HouseholdId,
        landlord: HouseholdId,
        house: HouseId,
    },

    /// Tenant evicted because the landlord sold or died
    TenantEvicted {
        month: u32,
        tenant: HouseholdId,
        house: HouseId,
    },

    /// Household entered the population
    HouseholdBorn {
        month: u32,
        household: HouseholdId,
        age: f64,
    },

    /// Household left the population, estate transferred
    HouseholdDied {
        month: u32,
        household: HouseholdId,
        beneficiary: HouseholdId,
    },

    /// Bank set its mortgage rate for the month
    MortgageRateSet {
        month: u32,
        rate: f64,
        supply: f64,
        target: f64,
    },

    /// Regulator switched macroprudential LTV caps on or off
    MacroprudentialSwitch { month: u32, active: bool },
}

impl Event {
    /// Month in which this event occurred
    pub fn month(&self) -> u32 {
        match self {
            Event::LoanOriginated { month, .. } => *month,
            Event::CashPurchase { month, .. } => *month,
            Event::MortgageRepaid { month, .. } => *month,
            Event::Bankruptcy { month, .. } => *month,
            Event::BecameVulnerable { month, .. } => *month,
            Event::HouseSold { month, .. } => *month,
            Event::ResidualDebtCleared { month, .. } => *month,
            Event::DebtWrittenOff { month, .. } => *month,
            Event::TenancyEnded { month, .. } => *month,
            Event::TenantEvicted { month, .. } => *month,
            Event::HouseholdBorn { month, .. } => *month,
            Event::HouseholdDied { month, .. } => *month,
            Event::MortgageRateSet { month, .. } => *month,
            Event::MacroprudentialSwitch { month, .. } => *month,
        }
    }

    /// Short description of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::LoanOriginated { .. } => "LoanOriginated",
            Event::CashPurchase { .. } => "CashPurchase",
            Event::MortgageRepaid { .. } => "MortgageRepaid",
            Event::Bankruptcy { .. } => "Bankruptcy",
            Event::BecameVulnerable { .. } => "BecameVulnerable",
            Event::HouseSold { .. } => "HouseSold",
            Event::ResidualDebtCleared { .. } => "ResidualDebtCleared",
            Event::DebtWrittenOff { .. } => "DebtWrittenOff",
            Event::TenancyEnded { .. } => "TenancyEnded",
            Event::TenantEvicted { .. } => "TenantEvicted",
            Event::HouseholdBorn { .. } => "HouseholdBorn",
            Event::HouseholdDied { .. } => "HouseholdDied",
            Event::MortgageRateSet { .. } => "MortgageRateSet",
            Event::MacroprudentialSwitch { .. } => "MacroprudentialSwitch",
        }
    }

    /// Household the event is about, if any
    pub fn household(&self) -> Option<HouseholdId> {
        match self {
            Event::LoanOriginated { household, .. } => Some(*household),
            Event::CashPurchase { household, .. } => Some(*household),
            Event::MortgageRepaid { household, .. } => Some(*household),
            Event::Bankruptcy { household, .. } => Some(*household),
            Event::BecameVulnerable { household, .. } => Some(*household),
            Event::HouseSold { seller, .. } => Some(*seller),
            Event::ResidualDebtCleared { household, .. } => Some(*household),
            Event::DebtWrittenOff { deceased, .. } => Some(*deceased),
            Event::TenancyEnded { tenant, .. } => Some(*tenant),
            Event::TenantEvicted { tenant, .. } => Some(*tenant),
            Event::HouseholdBorn { household, .. } => Some(*household),
            Event::HouseholdDied { household, .. } => Some(*household),
            _ => None,
        }
    }
}

/// Event log for storing and querying simulation events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the log
    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Events logged in a given month
    pub fn events_in_month(&self, month: u32) -> Vec<&Event> {
        self.events.iter().filter(|e| e.month() == month).collect()
    }

    /// Events of a specific type
    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Events concerning one household
    pub fn events_for_household(&self, household: HouseholdId) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.household() == Some(household))
            .collect()
    }

    /// Count events of a type within a month
    pub fn count_in_month(&self, month: u32, event_type: &str) -> usize {
        self.events
            .iter()
            .filter(|e| e.month() == month && e.event_type() == event_type)
            .count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_queries() {
        let mut log = EventLog::new();
        log.log(Event::Bankruptcy {
            month: 3,
            household: HouseholdId(1),
            cash_injection: 10.0,
        });
        log.log(Event::CashPurchase {
            month: 3,
            household: HouseholdId(2),
            price: 90_000.0,
        });
        log.log(Event::MacroprudentialSwitch {
            month: 4,
            active: true,
        });

        assert_eq!(log.len(), 3);
        assert_eq!(log.events_in_month(3).len(), 2);
        assert_eq!(log.events_of_type("Bankruptcy").len(), 1);
        assert_eq!(log.events_for_household(HouseholdId(2)).len(), 1);
        assert_eq!(log.count_in_month(4, "MacroprudentialSwitch"), 1);
        assert_eq!(log.events()[2].household(), None);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = Event::MortgageRateSet {
            month: 1,
            rate: 0.03,
            supply: 1.0,
            target: 2.0,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"MortgageRateSet\""));
    }
}
