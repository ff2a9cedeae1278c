//! Credit and transaction collectors
//!
//! The core reports every originated loan, cash purchase and completed
//! sale exactly once through [`CreditCollector`]. [`CreditLedger`] keeps
//! the records in memory.

use serde::Serialize;

use crate::models::{HouseId, HouseholdId};

/// One originated mortgage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoanRecord {
    pub month: u32,
    pub household: HouseholdId,
    pub principal: f64,
    pub down_payment: f64,
    pub is_buy_to_let: bool,
    pub is_first_time_buyer: bool,
    /// Monthly payment over monthly gross employment income
    pub affordability: f64,
    pub loan_to_value: f64,
}

/// One completed house sale
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaleRecord {
    pub month: u32,
    pub house: HouseId,
    pub quality: usize,
    pub price: f64,
    pub buyer: HouseholdId,
    /// None when the house comes from new construction
    pub seller: Option<HouseholdId>,
}

/// Sink for credit and sale records
pub trait CreditCollector {
    fn record_loan(&mut self, record: &LoanRecord);

    fn record_cash_purchase(&mut self, month: u32, household: HouseholdId, price: f64);

    fn record_sale(&mut self, record: &SaleRecord);
}

/// In-memory collector
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreditLedger {
    pub loans: Vec<LoanRecord>,
    pub cash_purchases: Vec<(u32, HouseholdId, f64)>,
    pub sales: Vec<SaleRecord>,
}

impl CreditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// New credit extended in `month`
    pub fn credit_in_month(&self, month: u32) -> f64 {
        self.loans
            .iter()
            .filter(|l| l.month == month)
            .map(|l| l.principal)
            .sum()
    }

    pub fn loans_in_month(&self, month: u32) -> usize {
        self.loans.iter().filter(|l| l.month == month).count()
    }
}

impl CreditCollector for CreditLedger {
    fn record_loan(&mut self, record: &LoanRecord) {
        self.loans.push(record.clone());
    }

    fn record_cash_purchase(&mut self, month: u32, household: HouseholdId, price: f64) {
        self.cash_purchases.push((month, household, price));
    }

    fn record_sale(&mut self, record: &SaleRecord) {
        self.sales.push(record.clone());
    }
}
