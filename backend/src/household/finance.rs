//! Monthly financial state machine
//!
//! Order within a step:
//!
//! 1. reset flows and the bankrupt flag, age one month
//! 2. redraw employment income, add rental income and dividends
//! 3. pay income tax and NICs
//! 4. service mortgages, rent or social-housing rent
//! 5. add disposable income to the balance and consume
//! 6. replenish a negative balance (bankruptcy)
//! 7. reassess financial vulnerability

use serde::Serialize;

use super::{Holding, Household, HouseholdError, Services, StepContext};
use crate::behaviour::{ConsumptionBreakdown, ConsumptionInput};
use crate::core::time::MONTHS_IN_YEAR;
use crate::government::{class1_nics_due, income_tax_due};
use crate::models::Event;

/// Floor on total beginning balances in the dividend share
const MIN_TOTAL_BALANCES: f64 = 0.01;

/// Flows of the current month, zeroed at the start of each step
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MonthlyFlows {
    pub gross_employment_income: f64,
    pub rental_income: f64,
    pub dividend_income: f64,
    pub income_tax: f64,
    pub national_insurance: f64,
    pub interest_paid: f64,
    pub principal_paid: f64,
    pub rent_paid: f64,
    pub disposable_income: f64,
    pub consumption: ConsumptionBreakdown,
    pub cash_injection: f64,
    /// Sale proceeds less down payments
    pub net_house_transaction_revenue: f64,
    pub new_credit: f64,
}

/// House purchases and sales completed between two steps
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub(super) struct PendingSettlements {
    pub(super) new_credit: f64,
    pub(super) net_house_transaction_revenue: f64,
}

impl MonthlyFlows {
    pub fn gross_total_income(&self) -> f64 {
        self.gross_employment_income + self.rental_income + self.dividend_income
    }

    pub fn net_total_income(&self) -> f64 {
        self.gross_total_income() - self.income_tax - self.national_insurance
    }

    /// Mortgage principal plus interest paid
    pub fn debt_service(&self) -> f64 {
        self.interest_paid + self.principal_paid
    }

    /// Everything paid for housing this month
    pub fn housing_payments(&self) -> f64 {
        self.debt_service() + self.rent_paid
    }
}

impl Household {
    pub(super) fn update_finances(
        &mut self,
        ctx: &StepContext<'_>,
        svc: &mut Services<'_>,
    ) -> Result<(), HouseholdError> {
        let env = ctx.env;
        let months = MONTHS_IN_YEAR as f64;
        let beginning_balance = self.bank_balance;

        let settled = std::mem::take(&mut self.pending_settlements);
        self.flows = MonthlyFlows {
            new_credit: settled.new_credit,
            net_house_transaction_revenue: settled.net_house_transaction_revenue,
            ..MonthlyFlows::default()
        };
        self.is_bankrupt = false;
        self.age += 1.0 / months;

        // Income
        self.annual_gross_employment_income =
            env.income
                .annual_gross_employment_income(self.age, self.income_percentile, ctx.month);
        self.flows.gross_employment_income = self.monthly_gross_employment_income();
        self.flows.rental_income = self
            .owned()
            .filter_map(|(_, property)| property.letting.as_ref())
            .map(|letting| letting.monthly_rent)
            .sum();
        if env.config.dividend_payments {
            let aggregates = ctx.aggregates;
            self.flows.dividend_income = aggregates.total_interest_paid * beginning_balance
                / aggregates.total_beginning_balances.max(MIN_TOTAL_BALANCES);
        }

        // Taxes
        self.flows.income_tax = income_tax_due(&env.tax, self.flows.gross_total_income() * months) / months;
        self.flows.national_insurance = class1_nics_due(&env.tax, self.annual_gross_employment_income) / months;

        // Housing payments
        self.pay_mortgages(ctx, svc)?;
        self.flows.rent_paid = match self.home {
            None => env.config.social_housing_rent,
            Some(house) => match self.holdings.get_mut(&house) {
                Some(Holding::Tenancy { agreement, .. }) => agreement.make_monthly_payment(),
                _ => 0.0,
            },
        };

        // Spending
        self.flows.disposable_income = self.flows.net_total_income() - self.flows.housing_payments();
        self.bank_balance += self.flows.disposable_income;
        let input = ConsumptionInput {
            income_percentile: self.income_percentile,
            is_first_time_buyer: self.is_first_time_buyer,
            bank_balance: self.bank_balance,
            monthly_disposable_income: self.flows.disposable_income,
            monthly_net_total_income: self.flows.net_total_income(),
            monthly_gross_total_income: self.flows.gross_total_income(),
            monthly_debt_service: self.flows.debt_service(),
            property_value: self.property_value(ctx.stats),
            total_debt: self.total_debt(svc.bank)?,
            median_monthly_gross_income: ctx.aggregates.median_monthly_gross_income,
            median_debt_service_ratio: ctx.aggregates.median_debt_service_ratio,
        };
        self.flows.consumption = ctx.behaviour().desired_consumption(&self.behaviour, &input);
        self.bank_balance -= self.flows.consumption.total;

        if self.bank_balance < 0.0 {
            self.flows.cash_injection = -self.bank_balance;
            self.bank_balance = env.config.bankruptcy_balance_floor;
            self.is_bankrupt = true;
            svc.events.log(Event::Bankruptcy {
                month: ctx.month,
                household: self.id,
                cash_injection: self.flows.cash_injection,
            });
        }

        let debt = self.total_debt(svc.bank)?;
        self.update_vulnerability(ctx, debt, svc);
        Ok(())
    }

    /// Apply this month's instalment on every mortgage
    ///
    /// Contracts that reach zero leave the book: a repaid mortgage frees
    /// the house, a repaid residual debt is dropped.
    fn pay_mortgages(&mut self, ctx: &StepContext<'_>, svc: &mut Services<'_>) -> Result<(), HouseholdError> {
        let houses: Vec<_> = self
            .owned()
            .filter_map(|(house, property)| property.mortgage.map(|m| (house, m)))
            .collect();
        for (house, mortgage) in houses {
            let repayment = svc.bank.collect_monthly_payment(mortgage)?;
            self.flows.interest_paid += repayment.interest;
            self.flows.principal_paid += repayment.principal;
            if svc.bank.mortgage(mortgage)?.is_extinguished() {
                svc.bank.end_mortgage_contract(mortgage)?;
                if let Some(Holding::Owned(property)) = self.holdings.get_mut(&house) {
                    property.mortgage = None;
                }
                svc.events.log(Event::MortgageRepaid {
                    month: ctx.month,
                    household: self.id,
                    mortgage,
                });
            }
        }

        let mut outstanding = Vec::with_capacity(self.residual_debts.len());
        for debt in std::mem::take(&mut self.residual_debts) {
            let repayment = svc.bank.collect_monthly_payment(debt.mortgage)?;
            self.flows.interest_paid += repayment.interest;
            self.flows.principal_paid += repayment.principal;
            if svc.bank.mortgage(debt.mortgage)?.is_extinguished() {
                svc.bank.end_mortgage_contract(debt.mortgage)?;
                svc.events.log(Event::ResidualDebtCleared {
                    month: ctx.month,
                    household: self.id,
                    mortgage: debt.mortgage,
                });
            } else {
                outstanding.push(debt);
            }
        }
        self.residual_debts = outstanding;
        Ok(())
    }

    /// Disposable income had gross income fallen by the configured shock
    pub fn shocked_disposable_income(&self, ctx: &StepContext<'_>) -> f64 {
        let env = ctx.env;
        let months = MONTHS_IN_YEAR as f64;
        let keep = 1.0 - env.config.income_shock;
        let gross = self.flows.gross_total_income() * keep;
        let tax = income_tax_due(&env.tax, gross * months) / months;
        let nics = class1_nics_due(&env.tax, self.annual_gross_employment_income * keep) / months;
        gross - tax - nics - self.flows.housing_payments()
    }

    /// Vulnerable when indebted and unable to cover the income shortfall
    /// for the required number of months
    fn update_vulnerability(&mut self, ctx: &StepContext<'_>, debt: f64, svc: &mut Services<'_>) {
        let config = &ctx.env.config;
        let reference = if config.income_shock > 0.0 {
            self.shocked_disposable_income(ctx)
        } else {
            self.flows.disposable_income
        };
        let margin = reference - config.poverty_line_fraction * ctx.aggregates.median_monthly_gross_income;
        let months_covered = self.bank_balance / margin;
        let months_to_cover = config.vulnerability_months_to_cover;

        self.vulnerable_one_month_ago = self.is_vulnerable;
        // Classified on the margin sign: zero deposits give a months-covered of -0.0
        let (vulnerable, factor) = if margin == 0.0 || !months_covered.is_finite() {
            (false, 0.0)
        } else {
            (
                debt > 0.0 && margin < 0.0 && self.bank_balance < months_to_cover * -margin,
                (1.0 + months_covered / months_to_cover).clamp(0.0, 1.0),
            )
        };
        self.is_vulnerable = vulnerable;
        self.exposure_at_default = if vulnerable { factor * debt } else { 0.0 };

        if vulnerable && !self.vulnerable_one_month_ago {
            self.vulnerable_since = Some(ctx.month);
            svc.events.log(Event::BecameVulnerable {
                month: ctx.month,
                household: self.id,
                exposure_at_default: self.exposure_at_default,
            });
        } else if !vulnerable {
            self.vulnerable_since = None;
        }
    }
}
