//! Consumption functions
//!
//! Two rules are available, chosen by [`ConsumptionConfig`](crate::config::ConsumptionConfig):
//!
//! - **Wealth effect** (default): a band-specific share of disposable income
//!   plus a wealth effect on deposits. Households whose debt-service ratio
//!   is at or above the population median also consume out of net housing
//!   wealth. A liquidity check falls back to income-only consumption and a
//!   floor keeps consumption near a fraction of median income.
//! - **Legacy**: essential spending plus a fixed share of the balance in
//!   excess of a desired buffer.
//!
//! # Critical Invariants
//!
//! - Consumption is never negative
//! - The breakdown components sum to the total

use serde::Serialize;

use crate::config::{LegacyConsumption, WealthEffectConsumption};

/// Household position at the point of the consumption decision
///
/// `bank_balance` already includes this month's disposable income.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsumptionInput {
    pub income_percentile: f64,
    pub is_first_time_buyer: bool,
    pub bank_balance: f64,
    pub monthly_disposable_income: f64,
    pub monthly_net_total_income: f64,
    pub monthly_gross_total_income: f64,
    /// Mortgage principal plus interest paid this month
    pub monthly_debt_service: f64,
    pub property_value: f64,
    pub total_debt: f64,
    /// Population median, fixed at the start of the month
    pub median_monthly_gross_income: f64,
    /// Population median, fixed at the start of the month
    pub median_debt_service_ratio: f64,
}

/// Desired consumption split by source
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ConsumptionBreakdown {
    pub total: f64,
    pub income: f64,
    pub financial_wealth: f64,
    pub housing_wealth: f64,
    pub debt: f64,
}

impl ConsumptionBreakdown {
    fn component_sum(&self) -> f64 {
        self.income + self.financial_wealth + self.housing_wealth + self.debt
    }

    /// Scale the components so they add up to `total`
    fn rescale_to(&mut self, total: f64) {
        self.total = total;
        let sum = self.component_sum();
        if sum == 0.0 {
            self.income = total;
            self.financial_wealth = 0.0;
            self.housing_wealth = 0.0;
            self.debt = 0.0;
            return;
        }
        let factor = total / sum;
        if factor.is_finite() {
            self.income *= factor;
            self.financial_wealth *= factor;
            self.housing_wealth *= factor;
            self.debt *= factor;
        }
    }
}

/// Debt-service-aware consumption with wealth effects
pub fn wealth_effect(params: &WealthEffectConsumption, input: &ConsumptionInput) -> ConsumptionBreakdown {
    let band = params
        .bands
        .iter()
        .find(|band| input.income_percentile < band.upper_percentile)
        .or_else(|| params.bands.last());
    let (mut fraction, mut wealth_effect) = band
        .map(|band| (band.consumption_fraction, band.wealth_effect))
        .unwrap_or((0.0, 0.0));

    // Saving for a deposit
    if params.ftb_saving_motive
        && input.is_first_time_buyer
        && input.income_percentile > params.ftb_saving_min_income_percentile
    {
        wealth_effect = 0.0;
        fraction = fraction.min(params.mpc_for_first_time_buyers);
    }

    let debt_service_ratio = if input.monthly_gross_total_income > 0.0 {
        input.monthly_debt_service / input.monthly_gross_total_income
    } else {
        0.0
    };
    let disposable = input.monthly_disposable_income;
    let deposits = input.bank_balance - disposable;
    let nhw = params.net_housing_wealth_coefficient;

    let mut breakdown = ConsumptionBreakdown {
        income: fraction * disposable,
        financial_wealth: wealth_effect * deposits,
        ..Default::default()
    };
    let mut total = breakdown.income + breakdown.financial_wealth;
    if debt_service_ratio >= input.median_debt_service_ratio {
        total += nhw * (input.property_value - input.total_debt);
    }

    let mut liquidity_preference = params.liquidity_preference;
    if debt_service_ratio > input.median_debt_service_ratio {
        breakdown.housing_wealth = nhw * input.property_value;
        breakdown.debt = -nhw * input.total_debt;
        liquidity_preference = 0.0;
    }

    if deposits + disposable - total < liquidity_preference * input.monthly_net_total_income {
        total = breakdown.income.max(0.0);
    }

    let minimum = params.minimum_consumption_fraction_of_median * input.median_monthly_gross_income;
    if total < minimum {
        total = if disposable < minimum {
            if deposits + disposable - minimum >= 0.0 {
                minimum
            } else {
                (deposits + disposable).max(0.0)
            }
        } else {
            minimum
        };
    }

    breakdown.rescale_to(total.max(0.0));
    breakdown
}

/// Balance a household aims to hold, given its annual gross income
pub fn desired_bank_balance(params: &LegacyConsumption, annual_gross_income: f64, propensity_to_save: f64) -> f64 {
    if annual_gross_income <= 0.0 {
        return 0.0;
    }
    (params.desired_balance_alpha
        + params.desired_balance_beta * annual_gross_income.ln()
        + params.desired_balance_epsilon * propensity_to_save)
        .exp()
}

/// Essential spending plus a share of excess balance
pub fn legacy(params: &LegacyConsumption, input: &ConsumptionInput, propensity_to_save: f64) -> ConsumptionBreakdown {
    let desired = desired_bank_balance(
        params,
        input.monthly_gross_total_income * crate::core::time::MONTHS_IN_YEAR as f64,
        propensity_to_save,
    );
    let total = params.essential_consumption_fraction * params.government_monthly_income_support
        + params.consumption_fraction * (input.bank_balance - desired).max(0.0);
    ConsumptionBreakdown {
        total,
        income: total,
        ..Default::default()
    }
}
