//! Constant market statistics
//!
//! A frozen set of indicators, used by the command-line runner and by
//! tests that need a fixed market backdrop.

use serde::{Deserialize, Serialize};

use super::MarketStatistics;
use crate::config::ConfigError;

/// Indicators that stay constant across months
///
/// # Example
/// ```
/// use housing_credit_core_rs::market::{MarketSnapshot, MarketStatistics};
///
/// let market = MarketSnapshot::graded(5, 100_000.0, 25_000.0, 0.004);
/// assert_eq!(market.max_quality_for_price(99_000.0), None);
/// assert_eq!(market.max_quality_for_price(160_000.0), Some(2));
/// assert!((market.exp_av_rent(0) - 400.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarketSnapshot {
    /// Exp-avg sale price per quality, ascending
    pub sale_prices: Vec<f64>,
    /// Exp-avg monthly rent per quality
    pub rents: Vec<f64>,
    /// Average occupancy per quality
    pub occupancy: Vec<f64>,
    pub flow_yield: f64,
    pub qoq_growth: f64,
    pub annual_hpa: f64,
    pub long_term_hpa: f64,
    pub hpi: f64,
}

impl MarketSnapshot {
    /// Evenly spaced quality ladder with rents at a fixed fraction of price
    pub fn graded(n_qualities: usize, lowest_price: f64, price_step: f64, rent_to_price: f64) -> Self {
        let sale_prices: Vec<f64> = (0..n_qualities)
            .map(|q| lowest_price + q as f64 * price_step)
            .collect();
        let rents = sale_prices.iter().map(|p| p * rent_to_price).collect();
        Self {
            sale_prices,
            rents,
            occupancy: vec![0.95; n_qualities],
            flow_yield: rent_to_price * 12.0 * 0.95,
            qoq_growth: 0.0,
            annual_hpa: 0.0,
            long_term_hpa: 0.0,
            hpi: 1.0,
        }
    }

    /// Parse and check a snapshot from JSON
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let snapshot: MarketSnapshot = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let n = self.sale_prices.len();
        if n == 0 || self.rents.len() != n || self.occupancy.len() != n {
            return Err(ConfigError::Invalid {
                field: "market".to_string(),
                reason: "sale_prices, rents and occupancy must be non-empty and equally long"
                    .to_string(),
            });
        }
        if self.sale_prices.windows(2).any(|w| w[1] < w[0]) {
            return Err(ConfigError::Invalid {
                field: "market.sale_prices".to_string(),
                reason: "must be ascending in quality".to_string(),
            });
        }
        Ok(())
    }

    fn clamp_quality(&self, quality: usize) -> usize {
        quality.min(self.sale_prices.len().saturating_sub(1))
    }
}

impl MarketStatistics for MarketSnapshot {
    fn exp_av_sale_price(&self, quality: usize) -> f64 {
        self.sale_prices[self.clamp_quality(quality)]
    }

    fn exp_av_rent(&self, quality: usize) -> f64 {
        self.rents[self.clamp_quality(quality)]
    }

    fn exp_av_flow_yield(&self) -> f64 {
        self.flow_yield
    }

    fn av_occupancy(&self, quality: usize) -> f64 {
        self.occupancy[self.clamp_quality(quality)]
    }

    fn qoq_house_price_growth(&self) -> f64 {
        self.qoq_growth
    }

    fn annual_hpa(&self) -> f64 {
        self.annual_hpa
    }

    fn long_term_hpa(&self) -> f64 {
        self.long_term_hpa
    }

    fn hpi(&self) -> f64 {
        self.hpi
    }

    fn max_quality_for_price(&self, price: f64) -> Option<usize> {
        self.sale_prices
            .iter()
            .rposition(|&p| p <= price)
    }
}
