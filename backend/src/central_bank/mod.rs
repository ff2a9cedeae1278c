//! Central bank - macroprudential policy store
//!
//! Holds the regulator's LTV, LTI and ICR thresholds, the fractions of
//! loans tolerated above them, and the base rate. All queries are pure
//! reads; thresholds only change in [`CentralBank::step`].
//!
//! # Hysteresis
//!
//! With anticyclical LTVs enabled the regulator runs a two-state machine:
//!
//! - **Active → Inactive** once annual HPA falls below the deactivation
//!   threshold (a crash)
//! - **Inactive → Active** once quarter-on-quarter growth rises above the
//!   activation threshold (recovery)
//!
//! While Inactive every class faces the relaxed LTV cap. Without
//! anticyclical LTVs the state stays Active for the whole run.

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CentralBankConfig;
use crate::market::MarketStatistics;

/// Errors from misclassified policy queries
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PolicyError {
    #[error("Invalid borrower classification: a buy-to-let purchase cannot be a first-time purchase")]
    FirstTimeBuyerBuyToLet,

    #[error("Loan-to-income limits do not apply to buy-to-let borrowers")]
    LoanToIncomeForBuyToLet,

    #[error("Interest-cover-ratio limits do not apply to owner-occupier borrowers")]
    InterestCoverForOwnerOccupier,
}

/// Regulatory class of a mortgage applicant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BorrowerClass {
    /// Buying a first home
    FirstTimeBuyer,
    /// Owner-occupier who has owned before
    HomeMover,
    /// Investor buying a property to let
    BuyToLet,
}

impl BorrowerClass {
    /// Classify from the two flags used throughout the model
    ///
    /// # Errors
    /// A first-time buyer cannot be buying to let.
    ///
    /// # Example
    /// ```
    /// use housing_credit_core_rs::central_bank::BorrowerClass;
    ///
    /// assert_eq!(BorrowerClass::classify(true, true).unwrap(), BorrowerClass::FirstTimeBuyer);
    /// assert_eq!(BorrowerClass::classify(false, false).unwrap(), BorrowerClass::BuyToLet);
    /// assert!(BorrowerClass::classify(true, false).is_err());
    /// ```
    pub fn classify(is_first_time_buyer: bool, is_home: bool) -> Result<Self, PolicyError> {
        match (is_first_time_buyer, is_home) {
            (true, true) => Ok(BorrowerClass::FirstTimeBuyer),
            (false, true) => Ok(BorrowerClass::HomeMover),
            (false, false) => Ok(BorrowerClass::BuyToLet),
            (true, false) => Err(PolicyError::FirstTimeBuyerBuyToLet),
        }
    }

    pub fn is_home(&self) -> bool {
        !matches!(self, BorrowerClass::BuyToLet)
    }

    pub fn is_first_time_buyer(&self) -> bool {
        matches!(self, BorrowerClass::FirstTimeBuyer)
    }
}

/// Whether the regulator's LTV caps currently bind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacroprudentialState {
    Active,
    Inactive,
}

/// Kind of ratio whose over-limit tolerance is queried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    LoanToValue,
    LoanToIncome,
}

/// Aggregate indicators the regulator reacts to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketIndicators {
    pub qoq_house_price_growth: f64,
    pub annual_hpa: f64,
}

impl MarketIndicators {
    pub fn from_stats(stats: &dyn MarketStatistics) -> Self {
        Self {
            qoq_house_price_growth: stats.qoq_house_price_growth(),
            annual_hpa: stats.annual_hpa(),
        }
    }
}

/// The regulator
#[derive(Debug, Clone)]
pub struct CentralBank {
    config: CentralBankConfig,
    base_rate: f64,
    state: MacroprudentialState,
    first_time_buyer_ltv_limit: f64,
    owner_occupier_ltv_limit: f64,
    buy_to_let_ltv_limit: f64,
}

impl CentralBank {
    /// Regulator with the configured thresholds
    ///
    /// Under anticyclical policy the regulator starts Inactive and the first
    /// `step` decides whether the caps bind.
    pub fn new(config: &CentralBankConfig) -> Self {
        let state = if config.anticyclical_ltv {
            MacroprudentialState::Inactive
        } else {
            MacroprudentialState::Active
        };
        let mut cb = Self {
            config: config.clone(),
            base_rate: config.initial_base_rate,
            state,
            first_time_buyer_ltv_limit: config.first_time_buyer_ltv_limit,
            owner_occupier_ltv_limit: config.owner_occupier_ltv_limit,
            buy_to_let_ltv_limit: config.buy_to_let_ltv_limit,
        };
        if config.anticyclical_ltv {
            cb.apply_state();
        }
        cb
    }

    /// Update thresholds from this month's indicators
    ///
    /// Returns the new state when a switch happened.
    pub fn step(&mut self, indicators: &MarketIndicators) -> Option<MacroprudentialState> {
        if !self.config.anticyclical_ltv {
            return None;
        }
        let next = match self.state {
            MacroprudentialState::Active
                if indicators.annual_hpa < self.config.deactivation_annual_hpa =>
            {
                MacroprudentialState::Inactive
            }
            MacroprudentialState::Inactive
                if indicators.qoq_house_price_growth > self.config.activation_qoq_growth =>
            {
                MacroprudentialState::Active
            }
            current => current,
        };
        let switched = next != self.state;
        self.state = next;
        self.apply_state();
        if switched {
            info!(
                "Macroprudential LTV caps {:?} (annual HPA {:.4}, QoQ growth {:.4})",
                next, indicators.annual_hpa, indicators.qoq_house_price_growth
            );
            Some(next)
        } else {
            None
        }
    }

    fn apply_state(&mut self) {
        match self.state {
            MacroprudentialState::Active => {
                self.first_time_buyer_ltv_limit = self.config.first_time_buyer_ltv_limit;
                self.owner_occupier_ltv_limit = self.config.owner_occupier_ltv_limit;
                self.buy_to_let_ltv_limit = self.config.buy_to_let_ltv_limit;
            }
            MacroprudentialState::Inactive => {
                self.first_time_buyer_ltv_limit = self.config.inactive_ltv_limit;
                self.owner_occupier_ltv_limit = self.config.inactive_ltv_limit;
                self.buy_to_let_ltv_limit = self.config.inactive_ltv_limit;
            }
        }
    }

    pub fn base_rate(&self) -> f64 {
        self.base_rate
    }

    pub fn state(&self) -> MacroprudentialState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == MacroprudentialState::Active
    }

    /// Regulator's LTV cap for a borrower class
    pub fn loan_to_value_limit(&self, class: BorrowerClass) -> f64 {
        match class {
            BorrowerClass::FirstTimeBuyer => self.first_time_buyer_ltv_limit,
            BorrowerClass::HomeMover => self.owner_occupier_ltv_limit,
            BorrowerClass::BuyToLet => self.buy_to_let_ltv_limit,
        }
    }

    /// Regulator's LTI cap; owner-occupiers only
    pub fn loan_to_income_limit(&self, class: BorrowerClass) -> Result<f64, PolicyError> {
        match class {
            BorrowerClass::FirstTimeBuyer => Ok(self.config.first_time_buyer_lti_limit),
            BorrowerClass::HomeMover => Ok(self.config.owner_occupier_lti_limit),
            BorrowerClass::BuyToLet => Err(PolicyError::LoanToIncomeForBuyToLet),
        }
    }

    /// ICR floor; buy-to-let only
    pub fn interest_cover_ratio_limit(&self, class: BorrowerClass) -> Result<f64, PolicyError> {
        match class {
            BorrowerClass::BuyToLet => Ok(self.config.interest_cover_ratio_limit),
            _ => Err(PolicyError::InterestCoverForOwnerOccupier),
        }
    }

    /// Annual rate used in the ICR stress test; buy-to-let only
    pub fn interest_cover_ratio_stressed_rate(&self, class: BorrowerClass) -> Result<f64, PolicyError> {
        match class {
            BorrowerClass::BuyToLet => Ok(self.config.interest_cover_ratio_stressed_rate),
            _ => Err(PolicyError::InterestCoverForOwnerOccupier),
        }
    }

    /// Tolerated fraction of loans above the regulator's cap
    pub fn max_fraction_over_limit(&self, kind: LimitKind) -> f64 {
        match kind {
            LimitKind::LoanToValue => self.config.max_fraction_over_ltv_limit,
            LimitKind::LoanToIncome => self.config.max_fraction_owner_occupier_over_lti_limit,
        }
    }
}
