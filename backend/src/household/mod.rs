//! Household agents
//!
//! A [`Household`] owns its balance, its holdings (owned houses and at most
//! one tenancy) and handles to its mortgages in the bank's book. Each month
//! the orchestrator calls [`Household::step`], which runs the financial
//! state machine in [`finance`] and then, until the transactions cut-off,
//! the housing decisions in [`housing`].
//!
//! Households never touch each other. Anything that affects another
//! household (a tenancy ending, an eviction) is returned as a
//! [`HousingNotice`] for the orchestrator to deliver.
//!
//! # Critical Invariants
//!
//! - `bank_balance >= 0.0` at the end of every step
//! - At most one holding per house; `home` always names a held house
//! - `is_first_time_buyer` only ever goes from true to false
//! - Every mortgage handle the household holds exists in the bank's book

mod finance;
mod housing;

pub use finance::MonthlyFlows;
use finance::PendingSettlements;

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::bank::{Bank, BorrowerProfile, CreditContext, CreditError};
use crate::behaviour::{BehaviourModel, HouseholdBehaviour};
use crate::central_bank::CentralBank;
use crate::config::{Config, ConfigError, HouseholdConfig, TaxConfig};
use crate::core::time::MONTHS_IN_YEAR;
use crate::government::{class1_nics_due, income_tax_due};
use crate::income::EmploymentIncome;
use crate::market::{HousingMarket, MarketStatistics};
use crate::models::{EventLog, HouseId, HouseholdId, Letting, MortgageId, RentalAgreement};
use crate::rng::RngManager;

// ============================================================================
// Errors
// ============================================================================

/// Precondition violations in household transactions
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HouseholdError {
    #[error("{household} holds nothing at {house}")]
    UnknownHouse { household: HouseholdId, house: HouseId },

    #[error("{household} does not own {house}")]
    HouseNotOwned { household: HouseholdId, house: HouseId },

    #[error("{household} already holds {house}")]
    HouseAlreadyHeld { household: HouseholdId, house: HouseId },

    #[error("{household} already has a home and cannot rent {house}")]
    AlreadyHoused { household: HouseholdId, house: HouseId },

    #[error(transparent)]
    Credit(#[from] CreditError),
}

// ============================================================================
// Holdings
// ============================================================================

/// A house the household owns
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnedProperty {
    pub quality: usize,
    /// `None` once repaid, or when bought in cash or inherited
    pub mortgage: Option<MortgageId>,
    pub purchase_price: f64,
    /// Current tenant, for let investment properties
    pub letting: Option<Letting>,
}

/// What the household holds at one house
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Holding {
    Owned(OwnedProperty),
    Tenancy { quality: usize, agreement: RentalAgreement },
}

impl Holding {
    pub fn quality(&self) -> usize {
        match self {
            Holding::Owned(property) => property.quality,
            Holding::Tenancy { quality, .. } => *quality,
        }
    }

    pub fn as_owned(&self) -> Option<&OwnedProperty> {
        match self {
            Holding::Owned(property) => Some(property),
            Holding::Tenancy { .. } => None,
        }
    }
}

/// Mortgage left over after a sale that did not cover it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResidualDebt {
    pub house: HouseId,
    pub mortgage: MortgageId,
}

/// Cross-household effect, delivered by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HousingNotice {
    /// The tenant left; the landlord gets the house back
    TenancyEnded {
        landlord: HouseholdId,
        tenant: HouseholdId,
        house: HouseId,
    },
    /// The landlord sold or died; the tenant must leave
    TenantEvicted { tenant: HouseholdId, house: HouseId },
}

impl HousingNotice {
    /// Household the notice is addressed to
    pub fn recipient(&self) -> HouseholdId {
        match self {
            HousingNotice::TenancyEnded { landlord, .. } => *landlord,
            HousingNotice::TenantEvicted { tenant, .. } => *tenant,
        }
    }
}

// ============================================================================
// Step context
// ============================================================================

/// Population-level figures from the previous month
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PopulationAggregates {
    pub median_monthly_gross_income: f64,
    pub median_debt_service_ratio: f64,
    pub total_interest_paid: f64,
    pub total_beginning_balances: f64,
}

/// Models and parameters shared by every household
#[derive(Debug, Clone)]
pub struct HouseholdEnvironment {
    pub config: HouseholdConfig,
    pub tax: TaxConfig,
    pub income: EmploymentIncome,
    pub behaviour: BehaviourModel,
    /// Housing decisions are skipped from this month on
    pub housing_transactions_until_month: u32,
}

impl HouseholdEnvironment {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            config: config.household.clone(),
            tax: config.tax.clone(),
            income: EmploymentIncome::new(&config.income)?,
            behaviour: BehaviourModel::new(&config.behaviour, &config.consumption)?,
            housing_transactions_until_month: config.simulation.housing_transactions_until_month,
        })
    }

    /// Monthly net employment income for an annual gross figure
    pub fn monthly_net_employment_income(&self, annual_gross_employment_income: f64) -> f64 {
        let annual = annual_gross_employment_income;
        (annual - income_tax_due(&self.tax, annual) - class1_nics_due(&self.tax, annual))
            / MONTHS_IN_YEAR as f64
    }
}

/// Read-only inputs of one month
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub month: u32,
    pub env: &'a HouseholdEnvironment,
    pub aggregates: &'a PopulationAggregates,
    pub stats: &'a dyn MarketStatistics,
    pub central_bank: &'a CentralBank,
}

impl<'a> StepContext<'a> {
    pub fn credit(&self) -> CreditContext<'a> {
        CreditContext {
            central_bank: self.central_bank,
            stats: self.stats,
            month: self.month,
        }
    }

    fn behaviour(&self) -> &'a BehaviourModel {
        &self.env.behaviour
    }
}

/// Mutable collaborators of one month
pub struct Services<'a> {
    pub bank: &'a mut Bank,
    pub market: &'a mut dyn HousingMarket,
    pub rng: &'a mut RngManager,
    pub events: &'a mut EventLog,
    pub notices: &'a mut Vec<HousingNotice>,
}

// ============================================================================
// Household
// ============================================================================

/// One household agent
#[derive(Debug, Clone, Serialize)]
pub struct Household {
    id: HouseholdId,
    age: f64,
    income_percentile: f64,
    behaviour: HouseholdBehaviour,
    bank_balance: f64,
    annual_gross_employment_income: f64,
    holdings: BTreeMap<HouseId, Holding>,
    home: Option<HouseId>,
    residual_debts: Vec<ResidualDebt>,
    is_first_time_buyer: bool,
    is_bankrupt: bool,
    is_vulnerable: bool,
    vulnerable_one_month_ago: bool,
    vulnerable_since: Option<u32>,
    exposure_at_default: f64,
    flows: MonthlyFlows,
    /// Completions settled since the last step, booked into the next month's flows
    pending_settlements: PendingSettlements,
}

impl Household {
    /// Newborn household in social housing
    ///
    /// # Example
    /// ```
    /// use housing_credit_core_rs::behaviour::HouseholdBehaviour;
    /// use housing_credit_core_rs::household::Household;
    /// use housing_credit_core_rs::models::HouseholdId;
    ///
    /// let traits = HouseholdBehaviour::new(0.5, false, 0.0);
    /// let household = Household::new(HouseholdId(7), 25.0, 0.6, traits, 1_000.0);
    /// assert!(household.is_in_social_housing());
    /// assert!(household.is_first_time_buyer());
    /// assert_eq!(household.n_properties(), 0);
    /// ```
    pub fn new(
        id: HouseholdId,
        age: f64,
        income_percentile: f64,
        behaviour: HouseholdBehaviour,
        bank_balance: f64,
    ) -> Self {
        Self {
            id,
            age,
            income_percentile,
            behaviour,
            bank_balance,
            annual_gross_employment_income: 0.0,
            holdings: BTreeMap::new(),
            home: None,
            residual_debts: Vec::new(),
            is_first_time_buyer: true,
            is_bankrupt: false,
            is_vulnerable: false,
            vulnerable_one_month_ago: false,
            vulnerable_since: None,
            exposure_at_default: 0.0,
            flows: MonthlyFlows::default(),
            pending_settlements: PendingSettlements::default(),
        }
    }

    /// Run one month: finances, then housing decisions until the cut-off
    pub fn step(&mut self, ctx: &StepContext<'_>, svc: &mut Services<'_>) -> Result<(), HouseholdError> {
        self.update_finances(ctx, svc)?;
        if ctx.month < ctx.env.housing_transactions_until_month {
            self.make_housing_decisions(ctx, svc)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn id(&self) -> HouseholdId {
        self.id
    }

    pub fn age(&self) -> f64 {
        self.age
    }

    pub fn income_percentile(&self) -> f64 {
        self.income_percentile
    }

    pub fn behaviour(&self) -> &HouseholdBehaviour {
        &self.behaviour
    }

    pub fn bank_balance(&self) -> f64 {
        self.bank_balance
    }

    pub fn annual_gross_employment_income(&self) -> f64 {
        self.annual_gross_employment_income
    }

    pub fn monthly_gross_employment_income(&self) -> f64 {
        self.annual_gross_employment_income / MONTHS_IN_YEAR as f64
    }

    pub fn flows(&self) -> &MonthlyFlows {
        &self.flows
    }

    pub fn holdings(&self) -> &BTreeMap<HouseId, Holding> {
        &self.holdings
    }

    pub fn home(&self) -> Option<HouseId> {
        self.home
    }

    pub fn residual_debts(&self) -> &[ResidualDebt] {
        &self.residual_debts
    }

    pub fn is_first_time_buyer(&self) -> bool {
        self.is_first_time_buyer
    }

    pub fn is_bankrupt(&self) -> bool {
        self.is_bankrupt
    }

    pub fn is_vulnerable(&self) -> bool {
        self.is_vulnerable
    }

    pub fn was_vulnerable_one_month_ago(&self) -> bool {
        self.vulnerable_one_month_ago
    }

    pub fn vulnerable_since(&self) -> Option<u32> {
        self.vulnerable_since
    }

    /// Debt at risk this month, 0.0 unless vulnerable
    pub fn exposure_at_default(&self) -> f64 {
        self.exposure_at_default
    }

    pub fn is_in_social_housing(&self) -> bool {
        self.home.is_none()
    }

    pub fn is_homeowner(&self) -> bool {
        self.home_property().is_some()
    }

    pub fn is_renting(&self) -> bool {
        self.tenancy().is_some()
    }

    fn home_property(&self) -> Option<&OwnedProperty> {
        self.home
            .and_then(|house| self.holdings.get(&house))
            .and_then(Holding::as_owned)
    }

    fn tenancy(&self) -> Option<(HouseId, &RentalAgreement)> {
        let house = self.home?;
        match self.holdings.get(&house) {
            Some(Holding::Tenancy { agreement, .. }) => Some((house, agreement)),
            _ => None,
        }
    }

    fn owned(&self) -> impl Iterator<Item = (HouseId, &OwnedProperty)> {
        self.holdings
            .iter()
            .filter_map(|(house, holding)| holding.as_owned().map(|p| (*house, p)))
    }

    /// Handles of every mortgage still owed, residual debts included
    pub fn mortgages(&self) -> Vec<MortgageId> {
        self.owned()
            .filter_map(|(_, property)| property.mortgage)
            .chain(self.residual_debts.iter().map(|debt| debt.mortgage))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Balance-sheet queries
    // ------------------------------------------------------------------------

    /// Houses owned, home included
    pub fn n_properties(&self) -> usize {
        self.owned().count()
    }

    /// Mark-to-market value of owned houses
    pub fn property_value(&self, stats: &dyn MarketStatistics) -> f64 {
        self.owned()
            .map(|(_, property)| stats.exp_av_sale_price(property.quality))
            .sum()
    }

    /// Outstanding principal across all mortgages
    pub fn total_debt(&self, bank: &Bank) -> Result<f64, CreditError> {
        self.mortgages()
            .into_iter()
            .map(|id| bank.mortgage(id).map(|m| m.principal()))
            .sum()
    }

    /// Instalments due next month across all mortgages
    pub fn monthly_payments(&self, bank: &Bank) -> Result<f64, CreditError> {
        self.mortgages()
            .into_iter()
            .map(|id| bank.mortgage(id).map(|m| m.next_payment()))
            .sum()
    }

    fn equity_of(&self, property: &OwnedProperty, stats: &dyn MarketStatistics, bank: &Bank) -> Result<f64, CreditError> {
        let principal = match property.mortgage {
            Some(id) => bank.mortgage(id)?.principal(),
            None => 0.0,
        };
        Ok(stats.exp_av_sale_price(property.quality) - principal)
    }

    /// Equity in the home, 0.0 when not an owner-occupier
    pub fn home_equity(&self, stats: &dyn MarketStatistics, bank: &Bank) -> Result<f64, CreditError> {
        match self.home_property() {
            Some(property) => self.equity_of(property, stats, bank),
            None => Ok(0.0),
        }
    }

    /// Equity across owned houses other than the home
    pub fn investment_equity(&self, stats: &dyn MarketStatistics, bank: &Bank) -> Result<f64, CreditError> {
        self.owned()
            .filter(|(house, _)| Some(*house) != self.home)
            .map(|(_, property)| self.equity_of(property, stats, bank))
            .sum()
    }

    /// Property value net of all mortgage debt
    pub fn equity_position(&self, stats: &dyn MarketStatistics, bank: &Bank) -> Result<f64, CreditError> {
        Ok(self.property_value(stats) - self.total_debt(bank)?)
    }

    /// Debt service over gross total income this month, 0.0 without income
    pub fn debt_service_ratio(&self) -> f64 {
        let gross = self.flows.gross_total_income();
        if gross > 0.0 {
            self.flows.debt_service() / gross
        } else {
            0.0
        }
    }

    /// What the bank sees when this household applies for credit
    pub fn borrower_profile(
        &self,
        env: &HouseholdEnvironment,
        stats: &dyn MarketStatistics,
        bank: &Bank,
    ) -> Result<BorrowerProfile, CreditError> {
        Ok(BorrowerProfile {
            household: self.id,
            age: self.age,
            is_first_time_buyer: self.is_first_time_buyer,
            bank_balance: self.bank_balance,
            home_equity: self.home_equity(stats, bank)?,
            monthly_gross_employment_income: self.monthly_gross_employment_income(),
            annual_gross_employment_income: self.annual_gross_employment_income,
            monthly_net_employment_income: env
                .monthly_net_employment_income(self.annual_gross_employment_income),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_recipient() {
        let ended = HousingNotice::TenancyEnded {
            landlord: HouseholdId(1),
            tenant: HouseholdId(2),
            house: HouseId(3),
        };
        let evicted = HousingNotice::TenantEvicted { tenant: HouseholdId(2), house: HouseId(3) };
        assert_eq!(ended.recipient(), HouseholdId(1));
        assert_eq!(evicted.recipient(), HouseholdId(2));
    }

    #[test]
    fn test_net_employment_income_is_below_gross() {
        let env = HouseholdEnvironment::new(&Config::baseline().unwrap()).unwrap();
        let net = env.monthly_net_employment_income(36_000.0);
        assert!(net < 3_000.0);
        assert!(net > 2_000.0);
    }
}
