//! Bank - mortgage underwriting and rate control
//!
//! The bank owns the [`MortgageBook`] arena and the monthly lending
//! counters that make the regulator's soft caps path dependent. Approval
//! queries borrow the bank immutably; only origination, repayment and the
//! monthly [`Bank::step`] mutate it.
//!
//! # Critical Invariants
//!
//! - The mortgage rate never falls below the regulator's base rate
//! - `request_approval` never mutates the bank
//! - Every `request_loan` reports exactly one record to the collector
//! - Counters describe the current month only and reset in `step`

mod underwriting;

pub use underwriting::{
    BorrowerProfile, ConstraintPrincipals, CreditContext, LoanOutcome, LoanPurpose, LoanRequest,
};

use log::debug;
use serde::Serialize;
use thiserror::Error;

use crate::central_bank::{BorrowerClass, CentralBank, PolicyError};
use crate::config::{BankConfig, IncomeGrowthConfig};
use crate::core::time::MONTHS_IN_YEAR;
use crate::models::{
    Event, EventLog, HouseholdId, MortgageAgreement, MortgageApproval, MortgageBook, MortgageId,
    Repayment,
};

/// Underwriting and book-keeping failures
///
/// All variants are precondition violations: they indicate a defect
/// upstream of the bank, never an expected market outcome.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CreditError {
    #[error("{household} requested a loan for non-positive price {price}")]
    NonPositivePrice { household: HouseholdId, price: f64 },

    #[error(
        "{household} cannot fund required down payment {down_payment:.2} from liquid wealth {liquid_wealth:.2}"
    )]
    DownPaymentExceedsLiquidWealth {
        household: HouseholdId,
        down_payment: f64,
        liquid_wealth: f64,
    },

    #[error(
        "{household} offered down payment {desired:.2} above liquid wealth {liquid_wealth:.2}"
    )]
    DesiredDownPaymentExceedsLiquidWealth {
        household: HouseholdId,
        desired: f64,
        liquid_wealth: f64,
    },

    #[error("Unknown mortgage {0}")]
    UnknownMortgage(MortgageId),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Lending this month, used by the soft-cap rules and the rate controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LendingCounters {
    /// Principal extended this month, cash purchases included at zero
    pub supply: f64,
    pub n_mortgages: u32,
    pub n_owner_occupier: u32,
    pub n_owner_occupier_over_lti: u32,
    pub n_first_time_buyer_over_ltv: u32,
    pub n_mover_over_ltv: u32,
    pub n_buy_to_let_over_ltv: u32,
}

impl LendingCounters {
    /// Share of loans over the regulator's LTV caps if one more were written
    fn prospective_fraction_over_ltv(&self) -> f64 {
        let over = self.n_first_time_buyer_over_ltv + self.n_mover_over_ltv + self.n_buy_to_let_over_ltv;
        (over as f64 + 1.0) / (self.n_mortgages as f64 + 1.0)
    }

    /// Share of owner-occupier loans over the regulator's LTI cap if one more were written
    fn prospective_fraction_over_lti(&self) -> f64 {
        (self.n_owner_occupier_over_lti as f64 + 1.0) / (self.n_owner_occupier as f64 + 1.0)
    }
}

/// The single mortgage lender
#[derive(Debug, Clone)]
pub struct Bank {
    config: BankConfig,
    supply_trend: IncomeGrowthConfig,
    rate: f64,
    supply_target: f64,
    counters: LendingCounters,
    book: MortgageBook,
}

impl Bank {
    /// Lender at its initial rate with an empty book
    ///
    /// `supply_trend` scales the credit supply target the same way the
    /// income trend scales employment income.
    pub fn new(config: &BankConfig, supply_trend: &IncomeGrowthConfig) -> Self {
        Self {
            config: config.clone(),
            supply_trend: supply_trend.clone(),
            rate: config.initial_rate,
            supply_target: 0.0,
            counters: LendingCounters::default(),
            book: MortgageBook::new(),
        }
    }

    /// Annual mortgage rate
    pub fn mortgage_rate(&self) -> f64 {
        self.rate
    }

    pub fn monthly_rate(&self) -> f64 {
        self.rate / MONTHS_IN_YEAR as f64
    }

    pub fn supply_target(&self) -> f64 {
        self.supply_target
    }

    pub fn counters(&self) -> &LendingCounters {
        &self.counters
    }

    pub fn book(&self) -> &MortgageBook {
        &self.book
    }

    pub fn config(&self) -> &BankConfig {
        &self.config
    }

    pub fn mortgage(&self, id: MortgageId) -> Result<&MortgageAgreement, CreditError> {
        self.book.get(id).ok_or(CreditError::UnknownMortgage(id))
    }

    /// Lending target for the month given the current population
    pub fn credit_supply_target(&self, population: usize, month: u32) -> f64 {
        self.config.credit_supply_target_per_household
            * population as f64
            * self.supply_trend.multiplier(month, 1.0)
    }

    /// Set next month's rate and reset the monthly counters
    ///
    /// In fixed mode the rate is the base rate plus the configured spread.
    /// Otherwise a proportional controller moves the rate by
    /// `gain × (supply − target) / dDemand/dInterest`, floored at the base
    /// rate.
    ///
    /// # Example
    /// ```
    /// use housing_credit_core_rs::bank::Bank;
    /// use housing_credit_core_rs::central_bank::CentralBank;
    /// use housing_credit_core_rs::models::EventLog;
    /// use housing_credit_core_rs::Config;
    ///
    /// let config = Config::baseline().unwrap();
    /// let cb = CentralBank::new(&config.central_bank);
    /// let mut bank = Bank::new(&config.bank, &config.income.trend);
    /// let mut events = EventLog::new();
    ///
    /// // Nothing lent against a positive target: the rate falls
    /// let rate = bank.step(1000, 1, &cb, &mut events);
    /// assert!(rate < config.bank.initial_rate);
    /// assert!(rate >= cb.base_rate());
    /// ```
    pub fn step(
        &mut self,
        population: usize,
        month: u32,
        central_bank: &CentralBank,
        events: &mut EventLog,
    ) -> f64 {
        let base = central_bank.base_rate();
        self.supply_target = self.credit_supply_target(population, month);
        if self.config.fixed_interest_rates {
            self.rate = base + self.config.mortgage_interest_spread;
        } else {
            let adjusted = self.rate
                + self.config.rate_adjustment_gain * (self.counters.supply - self.supply_target)
                    / self.config.d_demand_d_interest;
            self.rate = adjusted.max(base);
        }

        debug!(
            "Month {}: mortgage rate {:.5} (supply {:.0}, target {:.0})",
            month, self.rate, self.counters.supply, self.supply_target
        );
        events.log(Event::MortgageRateSet {
            month,
            rate: self.rate,
            supply: self.counters.supply,
            target: self.supply_target,
        });

        self.counters = LendingCounters::default();
        self.rate
    }

    // ========================================================================
    // Servicing
    // ========================================================================

    /// Apply one scheduled instalment
    pub fn collect_monthly_payment(&mut self, id: MortgageId) -> Result<Repayment, CreditError> {
        let mortgage = self.book.get_mut(id).ok_or(CreditError::UnknownMortgage(id))?;
        Ok(mortgage.make_monthly_payment())
    }

    /// Repay up to `available`; returns the amount applied
    pub fn payoff(&mut self, id: MortgageId, available: f64) -> Result<f64, CreditError> {
        let mortgage = self.book.get_mut(id).ok_or(CreditError::UnknownMortgage(id))?;
        Ok(mortgage.payoff(available))
    }

    /// Remove a contract from the book
    pub fn end_mortgage_contract(&mut self, id: MortgageId) -> Result<MortgageAgreement, CreditError> {
        self.book.remove(id).ok_or(CreditError::UnknownMortgage(id))
    }

    /// Settle a deceased borrower's mortgage from `available` funds
    ///
    /// Returns `(repaid, written_off)`. The record leaves the book either
    /// way.
    pub fn settle_estate(&mut self, id: MortgageId, available: f64) -> Result<(f64, f64), CreditError> {
        let mortgage = self.end_mortgage_contract(id)?;
        let repaid = mortgage.principal().min(available.max(0.0));
        Ok((repaid, mortgage.principal() - repaid))
    }

    fn record_origination(
        &mut self,
        approval: &MortgageApproval,
        profile: &BorrowerProfile,
        purpose: LoanPurpose,
        central_bank: &CentralBank,
    ) -> Result<(), CreditError> {
        let class = BorrowerClass::classify(profile.is_first_time_buyer, purpose.is_home())?;
        let ltv = approval.loan_to_value();
        if class.is_home() {
            self.counters.n_owner_occupier += 1;
            let lti_cap = central_bank.loan_to_income_limit(class)?;
            let annual = profile.annual_gross_employment_income;
            if annual <= 0.0 || approval.principal / annual > lti_cap {
                self.counters.n_owner_occupier_over_lti += 1;
            }
        }
        if ltv > central_bank.loan_to_value_limit(class) {
            match class {
                BorrowerClass::FirstTimeBuyer => self.counters.n_first_time_buyer_over_ltv += 1,
                BorrowerClass::HomeMover => self.counters.n_mover_over_ltv += 1,
                BorrowerClass::BuyToLet => self.counters.n_buy_to_let_over_ltv += 1,
            }
        }
        self.counters.n_mortgages += 1;
        Ok(())
    }
}
