//! Employment income process
//!
//! Gross employment income is log-normal across the population with an
//! age-dependent location. A household keeps its income percentile for
//! life, so its income follows one quantile of the age profile.

use statrs::distribution::{ContinuousCDF, Normal};

use crate::config::{ConfigError, IncomeConfig};

/// Percentiles are clamped away from 0 and 1 before the normal inverse
const PERCENTILE_EPSILON: f64 = 1e-6;

/// Age/percentile income model
#[derive(Debug, Clone)]
pub struct EmploymentIncome {
    config: IncomeConfig,
    standard_normal: Normal,
}

impl EmploymentIncome {
    pub fn new(config: &IncomeConfig) -> Result<Self, ConfigError> {
        let standard_normal = Normal::new(0.0, 1.0).map_err(|e| ConfigError::Invalid {
            field: "income".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            config: config.clone(),
            standard_normal,
        })
    }

    /// Log-income location at `age`
    fn log_location(&self, age: f64) -> f64 {
        let years = (age - self.config.entry_age).max(0.0);
        self.config.log_income_at_entry + self.config.age_growth * years
            - self.config.age_curvature * years * years
    }

    /// Annual gross employment income at `age` for a fixed `percentile`
    ///
    /// # Example
    /// ```
    /// use housing_credit_core_rs::Config;
    /// use housing_credit_core_rs::income::EmploymentIncome;
    ///
    /// let config = Config::baseline().unwrap();
    /// let income = EmploymentIncome::new(&config.income).unwrap();
    /// let poor = income.annual_gross_employment_income(40.0, 0.1, 0);
    /// let rich = income.annual_gross_employment_income(40.0, 0.9, 0);
    /// assert!(rich > poor);
    /// ```
    pub fn annual_gross_employment_income(&self, age: f64, percentile: f64, month: u32) -> f64 {
        let p = percentile.clamp(PERCENTILE_EPSILON, 1.0 - PERCENTILE_EPSILON);
        let z = self.standard_normal.inverse_cdf(p);
        let base = (self.log_location(age) + self.config.log_sigma * z)
            .exp()
            .max(self.config.min_annual_income);
        let trend = self.config.trend.multiplier(month, percentile);
        let inequality = if self.config.trend.enabled {
            1.0
        } else {
            self.config.rising_inequality.multiplier(month, percentile)
        };
        base * trend * inequality
    }
}
