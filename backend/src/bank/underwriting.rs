//! Mortgage approval, origination and purchase-price ceilings
//!
//! The approved principal is the minimum of independently computed
//! constraint principals:
//!
//! - **LTV**: price × LTV limit (all loans)
//! - **Affordability**: coefficient × monthly income ÷ payment factor (home loans)
//! - **LTI**: annual gross employment income × LTI limit (home loans)
//! - **ICR**: flow yield × price ÷ (ICR limit × stressed rate) (buy-to-let)
//!
//! Limits combine the bank's own hard caps with the regulator's soft caps.
//! A soft cap binds once the share of this month's loans already above it
//! (counting the loan being assessed) exceeds the regulator's tolerance.

use serde::Serialize;

use super::{Bank, CreditError};
use crate::central_bank::{BorrowerClass, CentralBank, LimitKind, PolicyError};
use crate::collectors::{CreditCollector, LoanRecord};
use crate::config::AffordabilityBasis;
use crate::core::time::MONTHS_IN_YEAR;
use crate::market::MarketStatistics;
use crate::models::{
    monthly_payment_factor, Event, EventLog, HouseId, HouseholdId, MortgageApproval, MortgageId,
};

/// Cents kept back from the maximum down payment to absorb rounding
const DOWN_PAYMENT_MARGIN: f64 = 0.01;

/// What the bank knows about an applicant
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BorrowerProfile {
    pub household: HouseholdId,
    pub age: f64,
    pub is_first_time_buyer: bool,
    pub bank_balance: f64,
    /// Mark-to-market equity in the current home, 0.0 when not an owner
    pub home_equity: f64,
    pub monthly_gross_employment_income: f64,
    pub annual_gross_employment_income: f64,
    pub monthly_net_employment_income: f64,
}

/// Owner-occupation or investment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoanPurpose {
    Home,
    BuyToLet,
}

impl LoanPurpose {
    pub fn is_home(self) -> bool {
        self == LoanPurpose::Home
    }
}

/// A purchase the applicant wants financed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoanRequest {
    pub price: f64,
    /// Voluntary down payment; only amounts above the default one matter
    pub desired_down_payment: f64,
    pub purpose: LoanPurpose,
}

/// Read-only collaborators of an underwriting decision
#[derive(Clone, Copy)]
pub struct CreditContext<'a> {
    pub central_bank: &'a CentralBank,
    pub stats: &'a dyn MarketStatistics,
    pub month: u32,
}

/// Principal allowed by each constraint; `None` when it does not apply
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConstraintPrincipals {
    pub n_payments: u32,
    pub loan_to_value: f64,
    pub affordability: Option<f64>,
    pub loan_to_income: Option<f64>,
    pub interest_cover: Option<f64>,
}

impl ConstraintPrincipals {
    /// Minimum over the applicable constraints; 0.0 when no payments are allowed
    pub fn binding(&self) -> f64 {
        if self.n_payments == 0 {
            return 0.0;
        }
        [self.affordability, self.loan_to_income, self.interest_cover]
            .iter()
            .flatten()
            .fold(self.loan_to_value, |acc, p| acc.min(*p))
            .max(0.0)
    }
}

/// Result of a granted loan request
#[derive(Debug, Clone, PartialEq)]
pub struct LoanOutcome {
    pub approval: MortgageApproval,
    /// Book handle; `None` for a cash purchase
    pub mortgage: Option<MortgageId>,
}

impl Bank {
    /// Number of monthly payments the bank will offer at `age`
    ///
    /// Home loans are shortened so they end by the age limit; buy-to-let
    /// loans keep the full term but stop at the buy-to-let age limit.
    pub fn n_payments(&self, purpose: LoanPurpose, age: f64) -> u32 {
        let full_term = self.config.full_term_payments();
        match purpose {
            LoanPurpose::Home => {
                let limit = self.config.age_limit;
                if age <= limit - self.config.mortgage_duration_years as f64 {
                    full_term
                } else if age <= limit {
                    ((limit - age) * MONTHS_IN_YEAR as f64).floor() as u32
                } else {
                    0
                }
            }
            LoanPurpose::BuyToLet => {
                if age <= self.config.buy_to_let_age_limit {
                    full_term
                } else {
                    0
                }
            }
        }
    }

    /// Monthly payment per unit of principal
    pub fn payment_factor(&self, purpose: LoanPurpose, age: f64) -> f64 {
        let r = self.monthly_rate();
        match purpose {
            LoanPurpose::Home => monthly_payment_factor(r, self.n_payments(purpose, age)),
            LoanPurpose::BuyToLet if self.config.buy_to_let_interest_only => r,
            LoanPurpose::BuyToLet => monthly_payment_factor(r, self.config.full_term_payments()),
        }
    }

    /// LTV limit the bank applies to the next loan of `class`
    pub fn loan_to_value_limit(&self, class: BorrowerClass, ctx: &CreditContext<'_>) -> f64 {
        let mut limit = match class {
            BorrowerClass::FirstTimeBuyer => self.config.first_time_buyer_ltv_limit,
            BorrowerClass::HomeMover => self.config.owner_occupier_ltv_limit,
            BorrowerClass::BuyToLet => self.config.buy_to_let_ltv_limit,
        };
        let procyclical = &self.config.procyclical_ltv;
        if procyclical.enabled {
            limit = (ctx.stats.long_term_hpa() * procyclical.ltv_adjustment_factor + limit)
                .min(procyclical.max_ltv);
        }
        let cb = ctx.central_bank;
        if self.counters.prospective_fraction_over_ltv() > cb.max_fraction_over_limit(LimitKind::LoanToValue) {
            limit = limit.min(cb.loan_to_value_limit(class));
        }
        limit
    }

    /// LTI limit the bank applies to the next owner-occupier loan of `class`
    pub fn loan_to_income_limit(
        &self,
        class: BorrowerClass,
        central_bank: &CentralBank,
    ) -> Result<f64, CreditError> {
        let hard = match class {
            BorrowerClass::FirstTimeBuyer => self.config.first_time_buyer_lti_limit,
            BorrowerClass::HomeMover => self.config.owner_occupier_lti_limit,
            BorrowerClass::BuyToLet => return Err(PolicyError::LoanToIncomeForBuyToLet.into()),
        };
        if self.counters.prospective_fraction_over_lti()
            > central_bank.max_fraction_over_limit(LimitKind::LoanToIncome)
        {
            Ok(hard.min(central_bank.loan_to_income_limit(class)?))
        } else {
            Ok(hard)
        }
    }

    fn affordability_income(&self, profile: &BorrowerProfile) -> f64 {
        match self.config.affordability_basis {
            AffordabilityBasis::GrossEmployment => profile.monthly_gross_employment_income,
            AffordabilityBasis::NetEmployment => profile.monthly_net_employment_income,
        }
    }

    /// ICR stress ratio flow_yield ÷ (ICR limit × stressed rate)
    fn interest_cover_ratio(&self, ctx: &CreditContext<'_>) -> Result<f64, CreditError> {
        let class = BorrowerClass::BuyToLet;
        let cb = ctx.central_bank;
        let stressed = cb.interest_cover_ratio_limit(class)? * cb.interest_cover_ratio_stressed_rate(class)?;
        Ok(ctx.stats.exp_av_flow_yield() / stressed)
    }

    /// Principal allowed by each constraint for a purchase at `price`
    pub fn constraint_principals(
        &self,
        profile: &BorrowerProfile,
        price: f64,
        purpose: LoanPurpose,
        ctx: &CreditContext<'_>,
    ) -> Result<ConstraintPrincipals, CreditError> {
        let class = BorrowerClass::classify(profile.is_first_time_buyer, purpose.is_home())?;
        let n_payments = self.n_payments(purpose, profile.age);
        let mut principals = ConstraintPrincipals {
            n_payments,
            loan_to_value: price * self.loan_to_value_limit(class, ctx),
            affordability: None,
            loan_to_income: None,
            interest_cover: None,
        };
        if n_payments == 0 || !self.config.all_credit_constraints_active {
            return Ok(principals);
        }

        match purpose {
            LoanPurpose::Home => {
                let factor = self.payment_factor(purpose, profile.age);
                let income = self.affordability_income(profile).max(0.0);
                principals.affordability =
                    Some(self.config.affordability_coefficient * income / factor);
                principals.loan_to_income = Some(
                    profile.annual_gross_employment_income
                        * self.loan_to_income_limit(class, ctx.central_bank)?,
                );
            }
            LoanPurpose::BuyToLet => {
                principals.interest_cover = Some((self.interest_cover_ratio(ctx)? * price).max(0.0));
            }
        }
        Ok(principals)
    }

    /// Terms the bank would offer, without committing to them
    ///
    /// Never mutates the bank. Zero principal is a valid answer: the
    /// purchase must then be paid in cash.
    ///
    /// # Errors
    /// - `NonPositivePrice` for a price ≤ 0
    /// - `DownPaymentExceedsLiquidWealth` when the applicant cannot fund
    ///   the down payment the constraints require
    /// - `DesiredDownPaymentExceedsLiquidWealth` when the applicant offers
    ///   more than it has
    /// - `Policy` for a first-time buyer applying for buy-to-let
    pub fn request_approval(
        &self,
        profile: &BorrowerProfile,
        request: &LoanRequest,
        ctx: &CreditContext<'_>,
    ) -> Result<MortgageApproval, CreditError> {
        let price = request.price;
        if !(price > 0.0) {
            return Err(CreditError::NonPositivePrice {
                household: profile.household,
                price,
            });
        }
        let mut liquid_wealth = profile.bank_balance;
        if request.purpose.is_home() {
            liquid_wealth += profile.home_equity;
        }

        let principals = self.constraint_principals(profile, price, request.purpose, ctx)?;
        let mut principal = principals.binding().min(price);
        let mut down_payment = price - principal;
        if down_payment > liquid_wealth {
            return Err(CreditError::DownPaymentExceedsLiquidWealth {
                household: profile.household,
                down_payment,
                liquid_wealth,
            });
        }
        if request.desired_down_payment > liquid_wealth {
            return Err(CreditError::DesiredDownPaymentExceedsLiquidWealth {
                household: profile.household,
                desired: request.desired_down_payment,
                liquid_wealth,
            });
        }
        let desired = request.desired_down_payment.clamp(0.0, price);
        if desired > down_payment {
            down_payment = desired;
            principal = price - desired;
        }

        let n_payments = principals.n_payments;
        let monthly_payment = if n_payments > 0 {
            principal * self.payment_factor(request.purpose, profile.age)
        } else {
            0.0
        };
        Ok(MortgageApproval {
            principal,
            down_payment,
            monthly_payment,
            monthly_interest_rate: self.monthly_rate(),
            n_payments,
            purchase_price: principal + down_payment,
            is_first_time_buyer: profile.is_first_time_buyer,
            is_buy_to_let: !request.purpose.is_home(),
        })
    }

    /// Approve and originate a loan for `house`
    ///
    /// Adds the principal to this month's supply, books positive principal
    /// in the arena, updates the over-limit counters and reports exactly one
    /// record to `collector`.
    pub fn request_loan(
        &mut self,
        profile: &BorrowerProfile,
        request: &LoanRequest,
        house: HouseId,
        ctx: &CreditContext<'_>,
        collector: &mut dyn CreditCollector,
        events: &mut EventLog,
    ) -> Result<LoanOutcome, CreditError> {
        let approval = self.request_approval(profile, request, ctx)?;
        self.counters.supply += approval.principal;

        if approval.is_cash_purchase() {
            collector.record_cash_purchase(ctx.month, profile.household, approval.purchase_price);
            events.log(Event::CashPurchase {
                month: ctx.month,
                household: profile.household,
                price: approval.purchase_price,
            });
            return Ok(LoanOutcome {
                approval,
                mortgage: None,
            });
        }

        self.record_origination(&approval, profile, request.purpose, ctx.central_bank)?;
        let interest_only = !request.purpose.is_home() && self.config.buy_to_let_interest_only;
        let id = self.book.originate(&approval, profile.household, house, interest_only);

        let affordability = if profile.monthly_gross_employment_income > 0.0 {
            approval.monthly_payment / profile.monthly_gross_employment_income
        } else {
            0.0
        };
        collector.record_loan(&LoanRecord {
            month: ctx.month,
            household: profile.household,
            principal: approval.principal,
            down_payment: approval.down_payment,
            is_buy_to_let: approval.is_buy_to_let,
            is_first_time_buyer: approval.is_first_time_buyer,
            affordability,
            loan_to_value: approval.loan_to_value(),
        });
        events.log(Event::LoanOriginated {
            month: ctx.month,
            household: profile.household,
            mortgage: id,
            principal: approval.principal,
            down_payment: approval.down_payment,
            is_buy_to_let: approval.is_buy_to_let,
            is_first_time_buyer: approval.is_first_time_buyer,
        });

        Ok(LoanOutcome {
            approval,
            mortgage: Some(id),
        })
    }

    /// Highest price the bank would finance given the applicant's balance
    ///
    /// The whole balance (less a cent) is the maximum down payment. With no
    /// payments allowed only cash can be used. An ICR ceiling that would be
    /// negative or infinite does not constrain.
    pub fn max_purchase_price(
        &self,
        profile: &BorrowerProfile,
        purpose: LoanPurpose,
        ctx: &CreditContext<'_>,
    ) -> Result<f64, CreditError> {
        let class = BorrowerClass::classify(profile.is_first_time_buyer, purpose.is_home())?;
        let max_down_payment = profile.bank_balance - DOWN_PAYMENT_MARGIN;
        if self.n_payments(purpose, profile.age) == 0 {
            return Ok(max_down_payment);
        }

        let mut max_price = max_down_payment / (1.0 - self.loan_to_value_limit(class, ctx));
        if !self.config.all_credit_constraints_active {
            return Ok(max_price);
        }

        match purpose {
            LoanPurpose::Home => {
                let factor = self.payment_factor(purpose, profile.age);
                let income = self.affordability_income(profile).max(0.0);
                let affordability =
                    max_down_payment + self.config.affordability_coefficient * income / factor;
                let lti = profile.annual_gross_employment_income
                    * self.loan_to_income_limit(class, ctx.central_bank)?
                    + max_down_payment;
                max_price = max_price.min(affordability).min(lti);
            }
            LoanPurpose::BuyToLet => {
                let denominator = 1.0 - self.interest_cover_ratio(ctx)?;
                if denominator > 0.0 {
                    let icr = max_down_payment / denominator;
                    if icr >= 0.0 {
                        max_price = max_price.min(icr);
                    }
                }
            }
        }
        Ok(max_price)
    }
}
