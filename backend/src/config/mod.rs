//! Simulation configuration
//!
//! Every parameter is required. Sections deny unknown fields and carry no
//! serde defaults, so a missing or misspelled key aborts loading instead of
//! silently falling back to a built-in value. Optional model features are
//! switched with explicit `enabled` flags rather than absent keys.
//!
//! # Critical Invariants
//!
//! - LTV caps lie in (0, 1); a cap of 1 would make the price ceiling infinite
//! - Tax bands are sorted by threshold
//! - Consumption bands are sorted and the last one reaches percentile 1.0

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::core::time::MONTHS_IN_YEAR;

/// Baseline calibration shipped with the crate
const BASELINE_JSON: &str = include_str!("../../configs/baseline.json");

/// Errors raised while loading or validating a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid parameter {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Complete parameter set of one simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub simulation: SimulationConfig,
    pub central_bank: CentralBankConfig,
    pub bank: BankConfig,
    pub household: HouseholdConfig,
    pub behaviour: BehaviourConfig,
    pub consumption: ConsumptionConfig,
    pub income: IncomeConfig,
    pub tax: TaxConfig,
    pub demographics: DemographicsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// Seed of the single shared generator
    pub seed: u64,
    /// Number of months to run
    pub n_months: u32,
    /// Households created at month 0; also the demographic target
    pub initial_population: usize,
    /// Housing decisions are skipped from this month onwards
    pub housing_transactions_until_month: u32,
}

/// Regulator thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CentralBankConfig {
    pub initial_base_rate: f64,
    pub first_time_buyer_ltv_limit: f64,
    pub owner_occupier_ltv_limit: f64,
    pub buy_to_let_ltv_limit: f64,
    /// Fraction of all mortgages allowed above the regulator's LTV cap
    pub max_fraction_over_ltv_limit: f64,
    pub first_time_buyer_lti_limit: f64,
    pub owner_occupier_lti_limit: f64,
    /// Fraction of owner-occupier mortgages allowed above the LTI cap
    pub max_fraction_owner_occupier_over_lti_limit: f64,
    pub interest_cover_ratio_limit: f64,
    /// Annual rate used in the ICR stress test
    pub interest_cover_ratio_stressed_rate: f64,
    /// Enables the Active/Inactive hysteresis on LTV caps
    pub anticyclical_ltv: bool,
    /// LTV cap applied to every class while Inactive
    pub inactive_ltv_limit: f64,
    /// Active → Inactive when annual HPA falls below this
    pub deactivation_annual_hpa: f64,
    /// Inactive → Active when quarter-on-quarter growth exceeds this
    pub activation_qoq_growth: f64,
}

/// Which monthly income feeds the affordability constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffordabilityBasis {
    GrossEmployment,
    NetEmployment,
}

/// Procyclical loosening of the bank's own LTV caps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcyclicalLtvConfig {
    pub enabled: bool,
    /// Multiplier on long-term HPA added to each hard cap
    pub ltv_adjustment_factor: f64,
    /// Ceiling on the adjusted cap
    pub max_ltv: f64,
}

/// Private lender parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BankConfig {
    /// Annual mortgage rate at month 0
    pub initial_rate: f64,
    /// Pin the rate to base rate + spread instead of running the controller
    pub fixed_interest_rates: bool,
    pub mortgage_interest_spread: f64,
    pub first_time_buyer_ltv_limit: f64,
    pub owner_occupier_ltv_limit: f64,
    pub buy_to_let_ltv_limit: f64,
    pub first_time_buyer_lti_limit: f64,
    pub owner_occupier_lti_limit: f64,
    /// Maximum share of monthly income that may go to mortgage payments
    pub affordability_coefficient: f64,
    pub affordability_basis: AffordabilityBasis,
    pub mortgage_duration_years: u32,
    /// Owner-occupier loans must be repaid by this age
    pub age_limit: f64,
    /// No buy-to-let origination past this age
    pub buy_to_let_age_limit: f64,
    pub buy_to_let_interest_only: bool,
    /// When false only the LTV constraint binds
    pub all_credit_constraints_active: bool,
    /// Monthly lending target per household
    pub credit_supply_target_per_household: f64,
    /// Sensitivity of monthly lending volume to the annual rate
    pub d_demand_d_interest: f64,
    /// Proportional gain of the rate controller
    pub rate_adjustment_gain: f64,
    pub procyclical_ltv: ProcyclicalLtvConfig,
}

impl BankConfig {
    /// Full mortgage term in months
    pub fn full_term_payments(&self) -> u32 {
        self.mortgage_duration_years * MONTHS_IN_YEAR
    }
}

/// Household accounting parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HouseholdConfig {
    pub initial_bank_balance: f64,
    /// Balance a bankrupt household is reset to
    pub bankruptcy_balance_floor: f64,
    /// Monthly rent paid by households without a home
    pub social_housing_rent: f64,
    pub tenancy_length_average: u32,
    pub tenancy_length_epsilon: u32,
    /// Poverty line as a fraction of median monthly income
    pub poverty_line_fraction: f64,
    /// Months of negative margin the deposits must cover
    pub vulnerability_months_to_cover: f64,
    /// Fractional income loss used in the stressed vulnerability test
    pub income_shock: f64,
    /// Redistribute last month's interest income pro rata to balances
    pub dividend_payments: bool,
}

/// Decision-rule parameters shared by all households
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BehaviourConfig {
    pub min_investor_percentile: f64,
    pub p_investor: f64,
    pub p_fundamentalist: f64,
    pub fundamentalist_cap_gain_coefficient: f64,
    pub trend_cap_gain_coefficient: f64,
    pub hpa_expectation_factor: f64,
    pub hpa_expectation_const: f64,
    /// Average years a home is held before selling
    pub hold_period_years: f64,
    pub buy_scale: f64,
    pub buy_exponent: f64,
    pub buy_mu: f64,
    pub buy_sigma: f64,
    pub buy_weight_hpa: f64,
    pub sale_markup_mu: f64,
    pub sale_markup_sigma: f64,
    pub rent_markup_mu: f64,
    pub rent_markup_sigma: f64,
    pub p_sale_price_reduce: f64,
    pub reduction_mu: f64,
    pub reduction_sigma: f64,
    pub rent_reduction: f64,
    pub downpayment_bank_balance_for_cash_sale: f64,
    pub downpayment_min_income_percentile: f64,
    pub downpayment_ftb_scale: f64,
    pub downpayment_ftb_shape: f64,
    pub downpayment_oo_scale: f64,
    pub downpayment_oo_shape: f64,
    pub downpayment_btl_mean: f64,
    pub downpayment_btl_epsilon: f64,
    pub sensitivity_rent_or_purchase: f64,
    pub desired_rent_income_fraction: f64,
    pub btl_choice_intensity: f64,
    /// Investors stop buying once payments exceed this share of net income
    pub payments_to_income: f64,
    /// Legacy consumption only: minimum balance relative to desired balance
    pub btl_min_bank_balance_ratio: f64,
}

impl BehaviourConfig {
    /// Monthly probability an owner-occupier lists their home
    pub fn monthly_p_sell(&self) -> f64 {
        1.0 / (self.hold_period_years * MONTHS_IN_YEAR as f64)
    }
}

/// Consumption fraction and wealth effect for one income-percentile band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsumptionBand {
    /// Exclusive upper percentile of the band (the last band includes 1.0)
    pub upper_percentile: f64,
    pub consumption_fraction: f64,
    pub wealth_effect: f64,
}

/// Debt-service-ratio aware consumption with wealth effects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WealthEffectConsumption {
    pub bands: Vec<ConsumptionBand>,
    pub net_housing_wealth_coefficient: f64,
    pub liquidity_preference: f64,
    pub ftb_saving_motive: bool,
    pub mpc_for_first_time_buyers: f64,
    pub ftb_saving_min_income_percentile: f64,
    pub minimum_consumption_fraction_of_median: f64,
}

/// Essential spending plus a fraction of wealth above a desired buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegacyConsumption {
    pub essential_consumption_fraction: f64,
    pub government_monthly_income_support: f64,
    pub consumption_fraction: f64,
    pub desired_balance_alpha: f64,
    pub desired_balance_beta: f64,
    pub desired_balance_epsilon: f64,
}

/// Choice of consumption function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ConsumptionConfig {
    WealthEffect(WealthEffectConsumption),
    Legacy(LegacyConsumption),
}

/// Multiplicative income growth switched on from a given month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IncomeGrowthConfig {
    pub enabled: bool,
    pub start_month: u32,
    pub yearly_increase: f64,
    /// Percentiles at or above this grow; 0.0 applies growth to everyone
    pub min_percentile: f64,
}

impl IncomeGrowthConfig {
    /// Growth multiplier at `month`, 1.0 when disabled or not yet started
    pub fn multiplier(&self, month: u32, percentile: f64) -> f64 {
        if !self.enabled || month < self.start_month || percentile < self.min_percentile {
            return 1.0;
        }
        let monthly = 1.0 + self.yearly_increase / MONTHS_IN_YEAR as f64;
        monthly.powi((month - self.start_month) as i32)
    }
}

/// Log-normal age profile of gross employment income
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IncomeConfig {
    pub entry_age: f64,
    pub log_income_at_entry: f64,
    pub age_growth: f64,
    pub age_curvature: f64,
    pub log_sigma: f64,
    pub min_annual_income: f64,
    pub trend: IncomeGrowthConfig,
    pub rising_inequality: IncomeGrowthConfig,
}

/// Marginal rate applying above `threshold`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaxBand {
    pub threshold: f64,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaxConfig {
    pub personal_allowance: f64,
    /// Allowance shrinks by one pound per two pounds above this income
    pub allowance_taper_threshold: f64,
    /// Thresholds measured in taxable income (above the allowance)
    pub income_tax_bands: Vec<TaxBand>,
    /// Thresholds measured in annual employment income
    pub national_insurance_bands: Vec<TaxBand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DemographicsConfig {
    pub enabled: bool,
    /// Age of households entering through population inflow
    pub entry_age: f64,
    /// Initial population ages are uniform in [min, max)
    pub initial_age_min: f64,
    pub initial_age_max: f64,
    pub mortality_onset_age: f64,
    pub annual_mortality_at_onset: f64,
    pub mortality_doubling_years: f64,
    /// Households reaching this age die with certainty
    pub max_age: f64,
}

impl Config {
    /// Parse and validate a JSON document
    ///
    /// # Example
    /// ```
    /// use housing_credit_core_rs::Config;
    ///
    /// let err = Config::from_json_str("{\"simulation\": {}}").unwrap_err();
    /// assert!(err.to_string().contains("missing field"));
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Baseline calibration bundled with the crate
    pub fn baseline() -> Result<Self, ConfigError> {
        Self::from_json_str(BASELINE_JSON)
    }

    /// SHA-256 of the canonical JSON form, hex encoded
    pub fn fingerprint(&self) -> Result<String, ConfigError> {
        let json = serde_json::to_string(self)?;
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(hasher
            .finalize()
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect())
    }

    /// Range checks that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if sim.n_months == 0 {
            return Err(ConfigError::invalid("simulation.n_months", "must be > 0"));
        }
        if sim.initial_population == 0 {
            return Err(ConfigError::invalid(
                "simulation.initial_population",
                "must be > 0",
            ));
        }

        let cb = &self.central_bank;
        for (field, value) in [
            ("central_bank.first_time_buyer_ltv_limit", cb.first_time_buyer_ltv_limit),
            ("central_bank.owner_occupier_ltv_limit", cb.owner_occupier_ltv_limit),
            ("central_bank.buy_to_let_ltv_limit", cb.buy_to_let_ltv_limit),
            ("central_bank.inactive_ltv_limit", cb.inactive_ltv_limit),
        ] {
            check_open_unit(field, value)?;
        }
        for (field, value) in [
            ("central_bank.max_fraction_over_ltv_limit", cb.max_fraction_over_ltv_limit),
            (
                "central_bank.max_fraction_owner_occupier_over_lti_limit",
                cb.max_fraction_owner_occupier_over_lti_limit,
            ),
        ] {
            check_probability(field, value)?;
        }
        for (field, value) in [
            ("central_bank.first_time_buyer_lti_limit", cb.first_time_buyer_lti_limit),
            ("central_bank.owner_occupier_lti_limit", cb.owner_occupier_lti_limit),
            ("central_bank.interest_cover_ratio_limit", cb.interest_cover_ratio_limit),
            (
                "central_bank.interest_cover_ratio_stressed_rate",
                cb.interest_cover_ratio_stressed_rate,
            ),
        ] {
            check_positive(field, value)?;
        }
        if cb.initial_base_rate < 0.0 {
            return Err(ConfigError::invalid(
                "central_bank.initial_base_rate",
                "must be >= 0",
            ));
        }

        let bank = &self.bank;
        for (field, value) in [
            ("bank.first_time_buyer_ltv_limit", bank.first_time_buyer_ltv_limit),
            ("bank.owner_occupier_ltv_limit", bank.owner_occupier_ltv_limit),
            ("bank.buy_to_let_ltv_limit", bank.buy_to_let_ltv_limit),
            ("bank.procyclical_ltv.max_ltv", bank.procyclical_ltv.max_ltv),
        ] {
            check_open_unit(field, value)?;
        }
        for (field, value) in [
            ("bank.first_time_buyer_lti_limit", bank.first_time_buyer_lti_limit),
            ("bank.owner_occupier_lti_limit", bank.owner_occupier_lti_limit),
            ("bank.affordability_coefficient", bank.affordability_coefficient),
            ("bank.d_demand_d_interest", bank.d_demand_d_interest),
            ("bank.age_limit", bank.age_limit),
            ("bank.buy_to_let_age_limit", bank.buy_to_let_age_limit),
        ] {
            check_positive(field, value)?;
        }
        if bank.mortgage_duration_years == 0 {
            return Err(ConfigError::invalid(
                "bank.mortgage_duration_years",
                "must be > 0",
            ));
        }
        if bank.initial_rate < cb.initial_base_rate {
            return Err(ConfigError::invalid(
                "bank.initial_rate",
                "must not be below central_bank.initial_base_rate",
            ));
        }

        let hh = &self.household;
        if hh.initial_bank_balance < 0.0 {
            return Err(ConfigError::invalid(
                "household.initial_bank_balance",
                "must be >= 0",
            ));
        }
        check_positive("household.bankruptcy_balance_floor", hh.bankruptcy_balance_floor)?;
        check_positive(
            "household.vulnerability_months_to_cover",
            hh.vulnerability_months_to_cover,
        )?;
        check_probability("household.income_shock", hh.income_shock)?;
        if hh.tenancy_length_epsilon > hh.tenancy_length_average {
            return Err(ConfigError::invalid(
                "household.tenancy_length_epsilon",
                "must not exceed tenancy_length_average",
            ));
        }

        let bh = &self.behaviour;
        for (field, value) in [
            ("behaviour.min_investor_percentile", bh.min_investor_percentile),
            ("behaviour.p_investor", bh.p_investor),
            ("behaviour.p_fundamentalist", bh.p_fundamentalist),
            ("behaviour.p_sale_price_reduce", bh.p_sale_price_reduce),
            ("behaviour.rent_reduction", bh.rent_reduction),
            ("behaviour.downpayment_min_income_percentile", bh.downpayment_min_income_percentile),
        ] {
            check_probability(field, value)?;
        }
        for (field, value) in [
            ("behaviour.hold_period_years", bh.hold_period_years),
            ("behaviour.downpayment_ftb_shape", bh.downpayment_ftb_shape),
            ("behaviour.downpayment_oo_shape", bh.downpayment_oo_shape),
            ("behaviour.min_investor_percentile", bh.min_investor_percentile),
        ] {
            check_positive(field, value)?;
        }

        if let ConsumptionConfig::WealthEffect(we) = &self.consumption {
            if we.bands.is_empty() {
                return Err(ConfigError::invalid("consumption.bands", "must not be empty"));
            }
            let mut previous = 0.0;
            for band in &we.bands {
                if band.upper_percentile <= previous {
                    return Err(ConfigError::invalid(
                        "consumption.bands",
                        "upper_percentile must be strictly increasing",
                    ));
                }
                previous = band.upper_percentile;
            }
            if previous < 1.0 {
                return Err(ConfigError::invalid(
                    "consumption.bands",
                    "last band must reach percentile 1.0",
                ));
            }
        }

        check_positive("income.log_sigma", self.income.log_sigma)?;

        check_bands("tax.income_tax_bands", &self.tax.income_tax_bands)?;
        check_bands("tax.national_insurance_bands", &self.tax.national_insurance_bands)?;

        let demo = &self.demographics;
        if demo.initial_age_min >= demo.initial_age_max {
            return Err(ConfigError::invalid(
                "demographics.initial_age_min",
                "must be below initial_age_max",
            ));
        }
        if demo.max_age <= demo.initial_age_max {
            return Err(ConfigError::invalid(
                "demographics.max_age",
                "must exceed initial_age_max",
            ));
        }
        check_positive(
            "demographics.mortality_doubling_years",
            demo.mortality_doubling_years,
        )?;

        Ok(())
    }
}

fn check_positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must be > 0, got {}", value)))
    }
}

fn check_probability(field: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must lie in [0, 1], got {}", value)))
    }
}

fn check_open_unit(field: &str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must lie in (0, 1), got {}", value)))
    }
}

fn check_bands(field: &str, bands: &[TaxBand]) -> Result<(), ConfigError> {
    let mut previous = f64::NEG_INFINITY;
    for band in bands {
        if band.threshold < previous {
            return Err(ConfigError::invalid(field, "thresholds must be ascending"));
        }
        if !(0.0..=1.0).contains(&band.rate) {
            return Err(ConfigError::invalid(field, "rates must lie in [0, 1]"));
        }
        previous = band.threshold;
    }
    Ok(())
}
