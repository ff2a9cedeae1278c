//! Household decision rules
//!
//! Each household carries fixed [`HouseholdBehaviour`] traits drawn at
//! birth. The shared [`BehaviourModel`] turns traits, market statistics
//! and the household's own position into decisions. Every stochastic
//! choice draws from the run's single [`RngManager`]; the number and
//! order of draws per decision is fixed, so replacing a formula changes
//! the draw sequence only where a draw is added or removed.
//!
//! # Decisions
//!
//! | Decision | Rule |
//! |---|---|
//! | Rent or buy | logistic in (annual rent − annual cost of owning) |
//! | Sell investment property | keep with probability σ(k·yield)^(1/12) |
//! | Buy investment property | buy with probability 1 − (1 − σ(k·yield))^(1/12) |
//! | Sell home | constant monthly hazard 1 / (hold period × 12) |
//! | Consumption | see [`consumption`] |

pub mod consumption;

pub use consumption::{ConsumptionBreakdown, ConsumptionInput};

use log::warn;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::config::{BehaviourConfig, ConfigError, ConsumptionConfig};
use crate::core::time::MONTHS_IN_YEAR;
use crate::market::MarketStatistics;
use crate::models::MortgageApproval;
use crate::rng::RngManager;

/// Percentiles are kept inside (0, 1) before the normal inverse
const PERCENTILE_EPSILON: f64 = 1e-6;

/// Equity floor in leverage calculations
const MIN_EQUITY: f64 = 0.01;

/// Cap on the HPA term of the desired purchase price
const MAX_HPA_FACTOR: f64 = 0.9;

/// Investors hold at least a home and one let property
const MIN_PROPERTIES_TO_SELL_INVESTMENT: usize = 3;

/// Logistic function 1 / (1 + e^−x)
pub fn sigma(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Fixed per-household traits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HouseholdBehaviour {
    propensity_to_save: f64,
    property_investor: bool,
    /// 0.0 weighs only rental yield, 1.0 only capital gain
    cap_gain_coefficient: f64,
}

impl HouseholdBehaviour {
    pub fn new(propensity_to_save: f64, property_investor: bool, cap_gain_coefficient: f64) -> Self {
        Self {
            propensity_to_save,
            property_investor,
            cap_gain_coefficient,
        }
    }

    /// Draw traits for a newborn household
    ///
    /// Only households above the minimum investor percentile can get the
    /// buy-to-let gene; the conditional probability is scaled so that the
    /// unconditional share of investors is `p_investor`. Investors are then
    /// split into fundamentalists and trend followers.
    pub fn draw(income_percentile: f64, config: &BehaviourConfig, rng: &mut RngManager) -> Self {
        let propensity_to_save = rng.next_f64();
        let mut traits = Self::new(propensity_to_save, false, 0.0);
        if income_percentile > config.min_investor_percentile
            && rng.next_f64() < config.p_investor / config.min_investor_percentile
        {
            traits.property_investor = true;
            traits.cap_gain_coefficient = if rng.next_f64() < config.p_fundamentalist {
                config.fundamentalist_cap_gain_coefficient
            } else {
                config.trend_cap_gain_coefficient
            };
        }
        traits
    }

    pub fn propensity_to_save(&self) -> f64 {
        self.propensity_to_save
    }

    pub fn is_property_investor(&self) -> bool {
        self.property_investor
    }

    pub fn cap_gain_coefficient(&self) -> f64 {
        self.cap_gain_coefficient
    }
}

/// Buyer facts relevant to the down payment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownPaymentInput {
    pub bank_balance: f64,
    pub is_first_time_buyer: bool,
    pub income_percentile: f64,
}

/// A let property being considered for sale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvestmentProperty {
    /// Houses owned, home included
    pub n_properties: usize,
    pub quality: usize,
    pub principal: f64,
    pub next_payment: f64,
    /// Asking rent if the house is on the rental market
    pub rental_offer: Option<f64>,
}

/// An investor's capacity for another purchase
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvestorPosition {
    pub monthly_payments: f64,
    pub monthly_net_total_income: f64,
    pub bank_balance: f64,
    pub annual_gross_total_income: f64,
    /// Price ceiling for a buy-to-let purchase
    pub max_price: f64,
}

/// Decision rules shared by the population
#[derive(Debug, Clone)]
pub struct BehaviourModel {
    config: BehaviourConfig,
    consumption: ConsumptionConfig,
    standard_normal: Normal,
}

impl BehaviourModel {
    pub fn new(config: &BehaviourConfig, consumption: &ConsumptionConfig) -> Result<Self, ConfigError> {
        let standard_normal = Normal::new(0.0, 1.0).map_err(|e| ConfigError::Invalid {
            field: "behaviour".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            config: config.clone(),
            consumption: consumption.clone(),
            standard_normal,
        })
    }

    pub fn config(&self) -> &BehaviourConfig {
        &self.config
    }

    pub fn consumption_config(&self) -> &ConsumptionConfig {
        &self.consumption
    }

    /// Expected annual house price appreciation
    pub fn hpa_expectation(&self, stats: &dyn MarketStatistics) -> f64 {
        stats.long_term_hpa() * self.config.hpa_expectation_factor + self.config.hpa_expectation_const
    }

    /// Price a household would like to pay for a home
    pub fn desired_purchase_price(
        &self,
        annual_gross_employment_income: f64,
        stats: &dyn MarketStatistics,
        rng: &mut RngManager,
    ) -> f64 {
        let hpa_factor = (self.config.buy_weight_hpa * self.hpa_expectation(stats)).min(MAX_HPA_FACTOR);
        let noise = (self.config.buy_mu + self.config.buy_sigma * rng.next_gaussian()).exp();
        self.config.buy_scale * annual_gross_employment_income.max(0.0).powf(self.config.buy_exponent) * noise
            / (1.0 - hpa_factor)
    }

    /// Asking price of a newly listed house, never below the debt on it
    pub fn initial_sale_price(
        &self,
        quality: usize,
        principal: f64,
        stats: &dyn MarketStatistics,
        rng: &mut RngManager,
    ) -> f64 {
        let markup = (self.config.sale_markup_mu + self.config.sale_markup_sigma * rng.next_gaussian()).exp();
        (markup * stats.exp_av_sale_price(quality)).max(principal)
    }

    /// Asking rent of a newly listed rental
    pub fn initial_rent(&self, quality: usize, stats: &dyn MarketStatistics, rng: &mut RngManager) -> f64 {
        let markup = (self.config.rent_markup_mu + self.config.rent_markup_sigma * rng.next_gaussian()).exp();
        markup * stats.exp_av_rent(quality)
    }

    /// Asking price after another unsold month
    pub fn rethink_sale_price(&self, current_price: f64, rng: &mut RngManager) -> f64 {
        if rng.chance(self.config.p_sale_price_reduce) {
            let log_reduction = self.config.reduction_mu + self.config.reduction_sigma * rng.next_gaussian();
            current_price * (1.0 - log_reduction.exp() / 100.0)
        } else {
            current_price
        }
    }

    /// Asking rent after another unlet month
    pub fn rethink_rent(&self, current_rent: f64) -> f64 {
        (1.0 - self.config.rent_reduction) * current_rent
    }

    /// Owner-occupiers list their home at a constant monthly hazard
    pub fn decide_to_sell_home(&self, traits: &HouseholdBehaviour, rng: &mut RngManager) -> bool {
        !traits.property_investor && rng.chance(self.config.monthly_p_sell())
    }

    /// Voluntary down payment for a purchase at `price`, capped at the balance
    pub fn decide_down_payment(
        &self,
        traits: &HouseholdBehaviour,
        buyer: &DownPaymentInput,
        price: f64,
        stats: &dyn MarketStatistics,
        rng: &mut RngManager,
    ) -> f64 {
        if buyer.bank_balance > price * self.config.downpayment_bank_balance_for_cash_sale {
            return price;
        }
        let down_payment = if buyer.is_first_time_buyer {
            self.log_normal_down_payment(
                buyer.income_percentile,
                self.config.downpayment_ftb_scale,
                self.config.downpayment_ftb_shape,
                stats,
            )
        } else if traits.property_investor {
            let fraction = self.config.downpayment_btl_mean + self.config.downpayment_btl_epsilon * rng.next_gaussian();
            price * fraction.max(0.0)
        } else {
            self.log_normal_down_payment(
                buyer.income_percentile,
                self.config.downpayment_oo_scale,
                self.config.downpayment_oo_shape,
                stats,
            )
        };
        down_payment.min(buyer.bank_balance).max(0.0)
    }

    /// HPI × log-normal quantile at the income percentile
    fn log_normal_down_payment(
        &self,
        percentile: f64,
        scale: f64,
        shape: f64,
        stats: &dyn MarketStatistics,
    ) -> f64 {
        if percentile < self.config.downpayment_min_income_percentile {
            return 0.0;
        }
        let p = percentile.clamp(PERCENTILE_EPSILON, 1.0 - PERCENTILE_EPSILON);
        stats.hpi() * (scale + shape * self.standard_normal.inverse_cdf(p)).exp()
    }

    /// Decide between bidding for a house at `price` and renting
    ///
    /// `monthly_payment` quotes the mortgage payment at `price`; it is only
    /// called when some quality is affordable. Investors always buy.
    pub fn decide_rent_or_purchase<E>(
        &self,
        traits: &HouseholdBehaviour,
        price: f64,
        stats: &dyn MarketStatistics,
        rng: &mut RngManager,
        monthly_payment: impl FnOnce(&mut RngManager) -> Result<f64, E>,
    ) -> Result<bool, E> {
        if traits.property_investor {
            return Ok(true);
        }
        let quality = match stats.max_quality_for_price(price) {
            Some(quality) => quality,
            None => return Ok(false),
        };
        let months = MONTHS_IN_YEAR as f64;
        let cost_of_house = monthly_payment(rng)? * months
            - price * self.hpa_expectation(stats) / self.config.hold_period_years;
        let cost_of_rent = stats.exp_av_rent(quality) * months;
        if !cost_of_house.is_finite() || !cost_of_rent.is_finite() {
            warn!("Rent-or-buy at price {:.2} with degenerate costs, renting", price);
            return Ok(false);
        }
        let p_buy = sigma(self.config.sensitivity_rent_or_purchase * (cost_of_rent - cost_of_house));
        Ok(rng.chance(p_buy))
    }

    /// Rent bid on the rental market
    pub fn desired_rent(&self, monthly_gross_employment_income: f64) -> f64 {
        monthly_gross_employment_income * self.config.desired_rent_income_fraction
    }

    /// Levered expected equity yield of a let property
    fn expected_equity_yield(
        &self,
        traits: &HouseholdBehaviour,
        leverage: f64,
        rental_yield: f64,
        annual_finance_cost: f64,
        stats: &dyn MarketStatistics,
    ) -> f64 {
        let c = traits.cap_gain_coefficient;
        leverage * ((1.0 - c) * rental_yield + c * self.hpa_expectation(stats)) - annual_finance_cost
    }

    /// Decide whether to list a let property for sale
    ///
    /// Investors never sell their last investment property, nor a house
    /// that is not on the rental market.
    pub fn decide_to_sell_investment_property(
        &self,
        traits: &HouseholdBehaviour,
        property: &InvestmentProperty,
        stats: &dyn MarketStatistics,
        rng: &mut RngManager,
    ) -> bool {
        if property.n_properties < MIN_PROPERTIES_TO_SELL_INVESTMENT {
            return false;
        }
        let asking_rent = match property.rental_offer {
            Some(rent) => rent,
            None => return false,
        };
        let months = MONTHS_IN_YEAR as f64;
        let market_price = stats.exp_av_sale_price(property.quality);
        let equity = (market_price - property.principal).max(MIN_EQUITY);
        let leverage = market_price / equity;
        let rental_yield = asking_rent * months * stats.av_occupancy(property.quality) / market_price;
        let finance_cost = property.next_payment * months / equity;
        let expected = self.expected_equity_yield(traits, leverage, rental_yield, finance_cost, stats);
        let p_keep = sigma(self.config.btl_choice_intensity * expected).powf(1.0 / months);
        rng.chance(1.0 - p_keep)
    }

    /// Decide whether an investor bids for another property
    ///
    /// `approval` quotes a buy-to-let loan at the given price with no extra
    /// down payment; it is only called once the affordability screens pass.
    pub fn decide_to_buy_investment_property<E>(
        &self,
        traits: &HouseholdBehaviour,
        position: &InvestorPosition,
        stats: &dyn MarketStatistics,
        rng: &mut RngManager,
        approval: impl FnOnce(f64) -> Result<MortgageApproval, E>,
    ) -> Result<bool, E> {
        match &self.consumption {
            ConsumptionConfig::WealthEffect(_) => {
                if position.monthly_payments > self.config.payments_to_income * position.monthly_net_total_income {
                    return Ok(false);
                }
            }
            ConsumptionConfig::Legacy(legacy) => {
                let desired = consumption::desired_bank_balance(
                    legacy,
                    position.annual_gross_total_income,
                    traits.propensity_to_save,
                );
                if position.bank_balance < desired * self.config.btl_min_bank_balance_ratio {
                    return Ok(false);
                }
            }
        }
        if position.max_price <= 0.0 || position.max_price < stats.exp_av_sale_price(0) {
            return Ok(false);
        }

        let quote = approval(position.max_price)?;
        let months = MONTHS_IN_YEAR as f64;
        let equity = quote.down_payment.max(MIN_EQUITY);
        let leverage = quote.purchase_price / equity;
        let finance_cost = quote.next_payment() * months / equity;
        let expected =
            self.expected_equity_yield(traits, leverage, stats.exp_av_flow_yield(), finance_cost, stats);
        let p_buy = 1.0 - (1.0 - sigma(self.config.btl_choice_intensity * expected)).powf(1.0 / months);
        Ok(rng.chance(p_buy))
    }

    /// Monthly consumption and its decomposition
    pub fn desired_consumption(
        &self,
        traits: &HouseholdBehaviour,
        input: &ConsumptionInput,
    ) -> ConsumptionBreakdown {
        match &self.consumption {
            ConsumptionConfig::WealthEffect(params) => consumption::wealth_effect(params, input),
            ConsumptionConfig::Legacy(params) => consumption::legacy(params, input, traits.propensity_to_save),
        }
    }
}
