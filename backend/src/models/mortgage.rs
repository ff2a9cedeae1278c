//! Mortgage contracts and the bank's book
//!
//! Mortgages live in a single arena, the [`MortgageBook`], owned by the
//! bank. Households hold [`MortgageId`] handles, so both sides of a
//! contract always see the same record.
//!
//! # Critical Invariants
//!
//! - `purchase_price == principal + down_payment` at origination
//! - `principal` never increases after origination
//! - `principal` is exactly 0.0 once `n_payments` reaches 0
//! - A record leaves the book only when extinguished or written off

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{HouseId, HouseholdId};

/// Handle into the [`MortgageBook`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MortgageId(pub u64);

impl fmt::Display for MortgageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mortgage#{}", self.0)
    }
}

/// Monthly payment per unit of principal for `n_payments` at monthly rate `r`
///
/// Annuity factor r/(1 − (1 + r)^−N); with a zero rate the principal is
/// simply spread evenly. Returns 0.0 for a zero-payment loan.
///
/// # Example
/// ```
/// use housing_credit_core_rs::models::monthly_payment_factor;
///
/// assert_eq!(monthly_payment_factor(0.0, 10), 0.1);
/// assert_eq!(monthly_payment_factor(0.01, 0), 0.0);
/// let f = monthly_payment_factor(0.003, 300);
/// assert!(f > 0.005 && f < 0.0051);
/// ```
pub fn monthly_payment_factor(monthly_rate: f64, n_payments: u32) -> f64 {
    if n_payments == 0 {
        return 0.0;
    }
    if monthly_rate.abs() < f64::EPSILON {
        return 1.0 / n_payments as f64;
    }
    monthly_rate / (1.0 - (1.0 + monthly_rate).powi(-(n_payments as i32)))
}

/// Terms the bank is willing to offer, before any record exists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MortgageApproval {
    pub principal: f64,
    pub down_payment: f64,
    pub monthly_payment: f64,
    pub monthly_interest_rate: f64,
    pub n_payments: u32,
    pub purchase_price: f64,
    pub is_first_time_buyer: bool,
    pub is_buy_to_let: bool,
}

impl MortgageApproval {
    /// Loan-to-value of the approved terms
    pub fn loan_to_value(&self) -> f64 {
        if self.purchase_price > 0.0 {
            self.principal / self.purchase_price
        } else {
            0.0
        }
    }

    /// True when the purchase is settled entirely in cash
    pub fn is_cash_purchase(&self) -> bool {
        self.principal <= 0.0
    }

    /// First instalment the approved loan would require
    pub fn next_payment(&self) -> f64 {
        match self.n_payments {
            0 => 0.0,
            1 => self.principal * (1.0 + self.monthly_interest_rate),
            _ => self.monthly_payment,
        }
    }
}

/// Split of one monthly instalment
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Repayment {
    pub interest: f64,
    pub principal: f64,
}

impl Repayment {
    pub fn total(&self) -> f64 {
        self.interest + self.principal
    }
}

/// A live mortgage contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MortgageAgreement {
    id: MortgageId,
    household: HouseholdId,
    house: HouseId,
    principal: f64,
    down_payment: f64,
    monthly_payment: f64,
    monthly_interest_rate: f64,
    n_payments: u32,
    purchase_price: f64,
    is_first_time_buyer: bool,
    is_buy_to_let: bool,
    interest_only: bool,
}

impl MortgageAgreement {
    pub fn id(&self) -> MortgageId {
        self.id
    }

    pub fn household(&self) -> HouseholdId {
        self.household
    }

    pub fn house(&self) -> HouseId {
        self.house
    }

    pub fn principal(&self) -> f64 {
        self.principal
    }

    pub fn down_payment(&self) -> f64 {
        self.down_payment
    }

    pub fn monthly_payment(&self) -> f64 {
        self.monthly_payment
    }

    pub fn monthly_interest_rate(&self) -> f64 {
        self.monthly_interest_rate
    }

    pub fn n_payments(&self) -> u32 {
        self.n_payments
    }

    pub fn purchase_price(&self) -> f64 {
        self.purchase_price
    }

    pub fn is_first_time_buyer(&self) -> bool {
        self.is_first_time_buyer
    }

    pub fn is_buy_to_let(&self) -> bool {
        self.is_buy_to_let
    }

    /// Next instalment due, without applying it
    pub fn next_payment(&self) -> f64 {
        if self.n_payments == 0 {
            0.0
        } else if self.n_payments == 1 {
            self.principal * (1.0 + self.monthly_interest_rate)
        } else {
            self.monthly_payment
        }
    }

    /// True once the debt is fully repaid
    pub fn is_extinguished(&self) -> bool {
        self.n_payments == 0 && self.principal == 0.0
    }

    /// Apply one monthly instalment
    ///
    /// The final instalment settles whatever principal remains, which
    /// covers both rounding drift on repayment loans and the balloon of an
    /// interest-only loan.
    pub fn make_monthly_payment(&mut self) -> Repayment {
        if self.n_payments == 0 {
            return Repayment::default();
        }
        let interest = self.principal * self.monthly_interest_rate;
        self.n_payments -= 1;
        let principal_part = if self.n_payments == 0 {
            self.principal
        } else {
            (self.monthly_payment - interest).clamp(0.0, self.principal)
        };
        self.principal -= principal_part;
        if self.n_payments == 0 {
            self.principal = 0.0;
            self.monthly_payment = 0.0;
        }
        Repayment {
            interest,
            principal: principal_part,
        }
    }

    /// Repay up to `available` of the outstanding principal
    ///
    /// Returns the amount actually paid. A partial payoff re-amortises the
    /// remainder over the payments left; a full payoff extinguishes the
    /// contract.
    pub fn payoff(&mut self, available: f64) -> f64 {
        let paid = available.max(0.0).min(self.principal);
        self.principal -= paid;
        if self.principal <= 0.0 || self.n_payments == 0 {
            self.principal = 0.0;
            self.n_payments = 0;
            self.monthly_payment = 0.0;
        } else if self.interest_only {
            self.monthly_payment = self.principal * self.monthly_interest_rate;
        } else {
            self.monthly_payment =
                self.principal * monthly_payment_factor(self.monthly_interest_rate, self.n_payments);
        }
        paid
    }
}

/// Arena of all live mortgages, keyed by handle
///
/// Iteration is in handle order, so aggregate queries are deterministic.
///
/// # Example
/// ```
/// use housing_credit_core_rs::models::{HouseId, HouseholdId, MortgageApproval, MortgageBook};
///
/// let mut book = MortgageBook::new();
/// let approval = MortgageApproval {
///     principal: 90_000.0,
///     down_payment: 10_000.0,
///     monthly_payment: 500.0,
///     monthly_interest_rate: 0.0025,
///     n_payments: 300,
///     purchase_price: 100_000.0,
///     is_first_time_buyer: true,
///     is_buy_to_let: false,
/// };
/// let id = book.originate(&approval, HouseholdId(1), HouseId(7), false);
/// assert_eq!(book.get(id).unwrap().principal(), 90_000.0);
/// assert_eq!(book.total_principal(), 90_000.0);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MortgageBook {
    mortgages: BTreeMap<MortgageId, MortgageAgreement>,
    next_id: u64,
}

impl MortgageBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record from approved terms and return its handle
    pub fn originate(
        &mut self,
        approval: &MortgageApproval,
        household: HouseholdId,
        house: HouseId,
        interest_only: bool,
    ) -> MortgageId {
        let id = MortgageId(self.next_id);
        self.next_id += 1;
        let agreement = MortgageAgreement {
            id,
            household,
            house,
            principal: approval.principal,
            down_payment: approval.down_payment,
            monthly_payment: approval.monthly_payment,
            monthly_interest_rate: approval.monthly_interest_rate,
            n_payments: approval.n_payments,
            purchase_price: approval.principal + approval.down_payment,
            is_first_time_buyer: approval.is_first_time_buyer,
            is_buy_to_let: approval.is_buy_to_let,
            interest_only,
        };
        self.mortgages.insert(id, agreement);
        id
    }

    pub fn get(&self, id: MortgageId) -> Option<&MortgageAgreement> {
        self.mortgages.get(&id)
    }

    pub fn get_mut(&mut self, id: MortgageId) -> Option<&mut MortgageAgreement> {
        self.mortgages.get_mut(&id)
    }

    /// Remove a record from the book
    pub fn remove(&mut self, id: MortgageId) -> Option<MortgageAgreement> {
        self.mortgages.remove(&id)
    }

    pub fn contains(&self, id: MortgageId) -> bool {
        self.mortgages.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.mortgages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mortgages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MortgageAgreement> {
        self.mortgages.values()
    }

    /// Outstanding principal across the book
    pub fn total_principal(&self) -> f64 {
        self.mortgages.values().map(|m| m.principal).sum()
    }

    /// Mortgages owed by one household
    pub fn for_household(&self, household: HouseholdId) -> impl Iterator<Item = &MortgageAgreement> {
        self.mortgages
            .values()
            .filter(move |m| m.household == household)
    }
}
