//! Government - income tax and national insurance
//!
//! Both levies are pure functions of annual gross income and the band
//! tables in [`TaxConfig`]. Households call them once per step.

use crate::config::{TaxBand, TaxConfig};

/// Annual income tax due on `annual_gross_income`
///
/// The personal allowance is withdrawn at one pound per two pounds of
/// income above the taper threshold. Band thresholds are measured in
/// taxable income, i.e. above the remaining allowance.
///
/// # Example
/// ```
/// use housing_credit_core_rs::config::{TaxBand, TaxConfig};
/// use housing_credit_core_rs::government::income_tax_due;
///
/// let tax = TaxConfig {
///     personal_allowance: 10_000.0,
///     allowance_taper_threshold: 100_000.0,
///     income_tax_bands: vec![TaxBand { threshold: 0.0, rate: 0.2 }],
///     national_insurance_bands: vec![],
/// };
/// assert_eq!(income_tax_due(&tax, 30_000.0), 4_000.0);
/// ```
pub fn income_tax_due(tax: &TaxConfig, annual_gross_income: f64) -> f64 {
    if annual_gross_income <= 0.0 {
        return 0.0;
    }
    let taper = ((annual_gross_income - tax.allowance_taper_threshold) / 2.0).max(0.0);
    let allowance = (tax.personal_allowance - taper).max(0.0);
    let taxable = (annual_gross_income - allowance).max(0.0);
    banded_levy(&tax.income_tax_bands, taxable)
}

/// Annual class 1 national insurance contributions on employment income
pub fn class1_nics_due(tax: &TaxConfig, annual_employment_income: f64) -> f64 {
    if annual_employment_income <= 0.0 {
        return 0.0;
    }
    banded_levy(&tax.national_insurance_bands, annual_employment_income)
}

/// Sum of marginal rates over ascending bands
fn banded_levy(bands: &[TaxBand], amount: f64) -> f64 {
    bands
        .iter()
        .enumerate()
        .map(|(i, band)| {
            let upper = bands
                .get(i + 1)
                .map(|next| next.threshold)
                .unwrap_or(f64::INFINITY);
            let slice = (amount.min(upper) - band.threshold).max(0.0);
            slice * band.rate
        })
        .sum()
}
