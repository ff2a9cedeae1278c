//! Orchestrator Engine - monthly simulation loop
//!
//! Owns every piece of mutable simulation state (regulator, bank,
//! households, generator, clock, event log) and advances it one month per
//! [`Orchestrator::tick`].
//!
//! # Architecture
//!
//! ```text
//! For each month t:
//! 1. Regulator reviews market indicators (macroprudential regime)
//! 2. Bank sets the mortgage rate from last month's lending, resets counters
//! 3. Households step in ascending id order, notices delivered after each
//! 4. Demographics: deaths with estate transfer, then inflow to target size
//! 5. Aggregates for month t + 1 (medians, interest paid, balances)
//! 6. Advance time
//! ```
//!
//! Market clearing happens outside the loop. Between two ticks a market
//! reports matched trades through [`Orchestrator::complete_sale`] and
//! [`Orchestrator::complete_rental`]; those completions are dated with the
//! upcoming month and their loans feed the next rate decision.
//!
//! # Example
//!
//! ```rust
//! use housing_credit_core_rs::market::{MarketSnapshot, OfferBook};
//! use housing_credit_core_rs::{Config, Orchestrator};
//!
//! let mut config = Config::baseline().unwrap();
//! config.simulation.initial_population = 50;
//!
//! let mut orchestrator = Orchestrator::new(config).unwrap();
//! let market = MarketSnapshot::graded(10, 100_000.0, 25_000.0, 0.004);
//! let mut book = OfferBook::new();
//!
//! let result = orchestrator.tick(&market, &mut book).unwrap();
//! assert_eq!(result.month, 0);
//! assert_eq!(orchestrator.current_month(), 1);
//! assert!(orchestrator.households().all(|h| h.bank_balance() >= 0.0));
//! ```

use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::bank::{Bank, CreditError};
use crate::behaviour::HouseholdBehaviour;
use crate::central_bank::{CentralBank, MarketIndicators, MacroprudentialState, PolicyError};
use crate::collectors::{CreditCollector, SaleRecord};
use crate::config::{Config, ConfigError};
use crate::core::time::{TimeManager, MONTHS_IN_YEAR};
use crate::household::{
    Household, HouseholdEnvironment, HouseholdError, HousingNotice, PopulationAggregates, Services,
    StepContext,
};
use crate::market::{HousingMarket, MarketStatistics};
use crate::models::{Event, EventLog, HouseId, HouseholdId};
use crate::rng::{RngManager, RngState};

// ============================================================================
// Results and completions
// ============================================================================

/// Summary of one simulated month
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthResult {
    pub month: u32,
    /// Households alive at the end of the month
    pub population: usize,
    pub bankruptcies: usize,
    pub cash_injected: f64,
    pub vulnerable_households: usize,
    /// Mortgages originated since the previous tick
    pub new_loans: u32,
    /// Principal extended since the previous tick
    pub new_credit: f64,
    pub mortgage_rate: f64,
    pub macroprudential_active: bool,
    pub births: usize,
    /// Households that died this month; their bids are void
    pub deceased: Vec<HouseholdId>,
}

/// A trade matched by the sale market
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SaleCompletion {
    pub house: HouseId,
    pub quality: usize,
    pub price: f64,
    pub buyer: HouseholdId,
    /// `None` for newly built houses
    pub seller: Option<HouseholdId>,
}

/// A tenancy matched by the rental market
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RentalCompletion {
    pub house: HouseId,
    pub quality: usize,
    pub monthly_rent: f64,
    pub tenant: HouseholdId,
    pub landlord: HouseholdId,
}

// ============================================================================
// Errors
// ============================================================================

/// Simulation error types
///
/// Every variant aborts the run.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// Configuration validation error
    InvalidConfig(String),

    /// No live household with this id
    HouseholdNotFound(HouseholdId),

    /// An estate cannot pass to the deceased
    SelfInheritance(HouseholdId),

    /// Household transaction precondition violated
    Household(HouseholdError),

    /// Bank precondition violated
    Credit(CreditError),

    /// Invalid regulator query
    Policy(PolicyError),
}

impl std::fmt::Display for SimulationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimulationError::InvalidConfig(msg) => write!(f, "Invalid config: {}", msg),
            SimulationError::HouseholdNotFound(id) => write!(f, "Household not found: {}", id),
            SimulationError::SelfInheritance(id) => {
                write!(f, "Self-inheritance: {} cannot bequeath to itself", id)
            }
            SimulationError::Household(e) => write!(f, "Household error: {}", e),
            SimulationError::Credit(e) => write!(f, "Credit error: {}", e),
            SimulationError::Policy(e) => write!(f, "Policy error: {}", e),
        }
    }
}

impl std::error::Error for SimulationError {}

impl From<ConfigError> for SimulationError {
    fn from(e: ConfigError) -> Self {
        SimulationError::InvalidConfig(e.to_string())
    }
}

impl From<HouseholdError> for SimulationError {
    fn from(e: HouseholdError) -> Self {
        SimulationError::Household(e)
    }
}

impl From<CreditError> for SimulationError {
    fn from(e: CreditError) -> Self {
        SimulationError::Credit(e)
    }
}

impl From<PolicyError> for SimulationError {
    fn from(e: PolicyError) -> Self {
        SimulationError::Policy(e)
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Main orchestrator managing simulation state and the monthly loop
///
/// # Determinism
///
/// All randomness is via `rng_manager` with seeded xorshift64*.
/// Same seed + same config + same market inputs = identical results.
pub struct Orchestrator {
    config: Config,

    time_manager: TimeManager,

    rng_manager: RngManager,

    central_bank: CentralBank,

    bank: Bank,

    /// Income, tax and behaviour models shared by households
    environment: HouseholdEnvironment,

    /// Households keyed by id; iteration order is the step order
    households: BTreeMap<HouseholdId, Household>,

    /// Figures of the previous month, read by this month's steps
    aggregates: PopulationAggregates,

    event_log: EventLog,

    next_household_id: u64,
}

impl Orchestrator {
    /// Create an orchestrator with the initial population
    ///
    /// Households start in social housing with the configured balance,
    /// ages uniform over the initial age range.
    pub fn new(config: Config) -> Result<Self, SimulationError> {
        config.validate()?;

        let environment = HouseholdEnvironment::new(&config)?;
        let mut orchestrator = Self {
            time_manager: TimeManager::new(),
            rng_manager: RngManager::new(config.simulation.seed),
            central_bank: CentralBank::new(&config.central_bank),
            bank: Bank::new(&config.bank, &config.income.trend),
            environment,
            households: BTreeMap::new(),
            aggregates: PopulationAggregates::default(),
            event_log: EventLog::new(),
            next_household_id: 0,
            config,
        };

        let demographics = orchestrator.config.demographics.clone();
        for _ in 0..orchestrator.config.simulation.initial_population {
            let span = demographics.initial_age_max - demographics.initial_age_min;
            let age = demographics.initial_age_min + span * orchestrator.rng_manager.next_f64();
            orchestrator.spawn_household(age);
        }
        orchestrator.aggregates.median_monthly_gross_income = orchestrator.initial_median_income();

        Ok(orchestrator)
    }

    fn spawn_household(&mut self, age: f64) -> HouseholdId {
        let id = HouseholdId(self.next_household_id);
        self.next_household_id += 1;
        let percentile = self.rng_manager.next_f64();
        let traits = HouseholdBehaviour::draw(percentile, &self.config.behaviour, &mut self.rng_manager);
        let household = Household::new(id, age, percentile, traits, self.config.household.initial_bank_balance);
        self.households.insert(id, household);
        id
    }

    fn initial_median_income(&self) -> f64 {
        let incomes: Vec<f64> = self
            .households
            .values()
            .map(|h| {
                self.environment
                    .income
                    .annual_gross_employment_income(h.age(), h.income_percentile(), 0)
                    / MONTHS_IN_YEAR as f64
            })
            .collect();
        median(incomes)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn current_month(&self) -> u32 {
        self.time_manager.current_month()
    }

    pub fn central_bank(&self) -> &CentralBank {
        &self.central_bank
    }

    pub fn bank(&self) -> &Bank {
        &self.bank
    }

    pub fn aggregates(&self) -> &PopulationAggregates {
        &self.aggregates
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn household(&self, id: HouseholdId) -> Option<&Household> {
        self.households.get(&id)
    }

    /// Households in id order
    pub fn households(&self) -> impl Iterator<Item = &Household> {
        self.households.values()
    }

    pub fn population(&self) -> usize {
        self.households.len()
    }

    pub fn rng_state(&self) -> RngState {
        self.rng_manager.get_state()
    }

    /// Split borrows for household calls: the population, the read-only
    /// context and the mutable services
    fn household_scope<'s>(
        &'s mut self,
        month: u32,
        stats: &'s dyn MarketStatistics,
        market: &'s mut dyn HousingMarket,
        notices: &'s mut Vec<HousingNotice>,
    ) -> (&'s mut BTreeMap<HouseholdId, Household>, StepContext<'s>, Services<'s>) {
        let ctx = StepContext {
            month,
            env: &self.environment,
            aggregates: &self.aggregates,
            stats,
            central_bank: &self.central_bank,
        };
        let svc = Services {
            bank: &mut self.bank,
            market,
            rng: &mut self.rng_manager,
            events: &mut self.event_log,
            notices,
        };
        (&mut self.households, ctx, svc)
    }

    // ========================================================================
    // Monthly loop
    // ========================================================================

    /// Run one month
    ///
    /// # Errors
    ///
    /// Any precondition violation inside a household, the bank or the
    /// regulator aborts the month; the state is then not meaningful.
    pub fn tick(
        &mut self,
        stats: &dyn MarketStatistics,
        market: &mut dyn HousingMarket,
    ) -> Result<MonthResult, SimulationError> {
        let month = self.current_month();

        // STEP 1: REGULATOR
        if let Some(state) = self.central_bank.step(&MarketIndicators::from_stats(stats)) {
            self.event_log.log(Event::MacroprudentialSwitch {
                month,
                active: state == MacroprudentialState::Active,
            });
        }

        // STEP 2: BANK
        let new_loans = self.bank.counters().n_mortgages;
        let new_credit = self.bank.counters().supply;
        let mortgage_rate = self
            .bank
            .step(self.households.len(), month, &self.central_bank, &mut self.event_log);

        // STEP 3: HOUSEHOLDS
        // Dividend shares are taken against the balances households start this step with
        self.aggregates.total_beginning_balances = self.households.values().map(Household::bank_balance).sum();
        let ids: Vec<HouseholdId> = self.households.keys().copied().collect();
        let mut notices = Vec::new();
        for id in ids {
            {
                let (households, ctx, mut svc) = self.household_scope(month, stats, &mut *market, &mut notices);
                let household = households
                    .get_mut(&id)
                    .ok_or(SimulationError::HouseholdNotFound(id))?;
                household.step(&ctx, &mut svc)?;
            }
            self.deliver_notices(month, stats, &mut *market, &mut notices)?;
        }

        // STEP 4: DEMOGRAPHICS
        let (births, deceased) = self.run_demographics(month, stats, &mut *market)?;

        // STEP 5: AGGREGATES
        self.aggregates = self.compute_aggregates();

        let result = MonthResult {
            month,
            population: self.households.len(),
            bankruptcies: self.households.values().filter(|h| h.is_bankrupt()).count(),
            cash_injected: self.households.values().map(|h| h.flows().cash_injection).sum(),
            vulnerable_households: self.households.values().filter(|h| h.is_vulnerable()).count(),
            new_loans,
            new_credit,
            mortgage_rate,
            macroprudential_active: self.central_bank.is_active(),
            births,
            deceased,
        };
        debug!(
            "Month {}: {} households, {} bankrupt, rate {:.5}",
            month, result.population, result.bankruptcies, result.mortgage_rate
        );

        // STEP 6: ADVANCE TIME
        self.time_manager.advance_month();
        Ok(result)
    }

    /// Hand pending notices to their recipients
    fn deliver_notices(
        &mut self,
        month: u32,
        stats: &dyn MarketStatistics,
        market: &mut dyn HousingMarket,
        notices: &mut Vec<HousingNotice>,
    ) -> Result<(), SimulationError> {
        while !notices.is_empty() {
            let pending: Vec<HousingNotice> = std::mem::take(notices);
            for notice in pending {
                let recipient = notice.recipient();
                let (households, ctx, mut svc) = self.household_scope(month, stats, &mut *market, notices);
                let household = households
                    .get_mut(&recipient)
                    .ok_or(SimulationError::HouseholdNotFound(recipient))?;
                match notice {
                    HousingNotice::TenancyEnded { house, .. } => household.end_of_letting(house, &ctx, &mut svc)?,
                    HousingNotice::TenantEvicted { house, .. } => household.evicted(house),
                }
            }
        }
        Ok(())
    }

    fn compute_aggregates(&self) -> PopulationAggregates {
        let incomes: Vec<f64> = self
            .households
            .values()
            .map(|h| h.flows().gross_total_income())
            .filter(|income| *income > 0.0)
            .collect();
        let ratios: Vec<f64> = self
            .households
            .values()
            .filter(|h| h.flows().debt_service() > 0.0)
            .map(Household::debt_service_ratio)
            .collect();
        PopulationAggregates {
            median_monthly_gross_income: median(incomes),
            median_debt_service_ratio: median(ratios),
            total_interest_paid: self.households.values().map(|h| h.flows().interest_paid).sum(),
            total_beginning_balances: self.households.values().map(Household::bank_balance).sum(),
        }
    }

    // ========================================================================
    // Market completions
    // ========================================================================

    /// Settle a sale reported by the sale market
    ///
    /// The buyer completes first (loan origination, move-in or letting),
    /// then the seller (payoff, residual debt, eviction).
    pub fn complete_sale(
        &mut self,
        sale: &SaleCompletion,
        stats: &dyn MarketStatistics,
        market: &mut dyn HousingMarket,
        collector: &mut dyn CreditCollector,
    ) -> Result<(), SimulationError> {
        let month = self.current_month();
        let mut notices = Vec::new();
        {
            let (households, ctx, mut svc) = self.household_scope(month, stats, &mut *market, &mut notices);
            let buyer = households
                .get_mut(&sale.buyer)
                .ok_or(SimulationError::HouseholdNotFound(sale.buyer))?;
            buyer.complete_house_purchase(sale.house, sale.quality, sale.price, &ctx, &mut svc, collector)?;
        }
        if let Some(seller_id) = sale.seller {
            let (households, ctx, mut svc) = self.household_scope(month, stats, &mut *market, &mut notices);
            let seller = households
                .get_mut(&seller_id)
                .ok_or(SimulationError::HouseholdNotFound(seller_id))?;
            seller.complete_house_sale(sale.house, sale.price, &ctx, &mut svc)?;
        }
        collector.record_sale(&SaleRecord {
            month,
            house: sale.house,
            quality: sale.quality,
            price: sale.price,
            buyer: sale.buyer,
            seller: sale.seller,
        });
        self.deliver_notices(month, stats, market, &mut notices)
    }

    /// Settle a tenancy reported by the rental market
    pub fn complete_rental(
        &mut self,
        rental: &RentalCompletion,
        stats: &dyn MarketStatistics,
        market: &mut dyn HousingMarket,
    ) -> Result<(), SimulationError> {
        let month = self.current_month();
        let mut notices = Vec::new();
        let (households, ctx, mut svc) = self.household_scope(month, stats, &mut *market, &mut notices);
        let tenant = households
            .get_mut(&rental.tenant)
            .ok_or(SimulationError::HouseholdNotFound(rental.tenant))?;
        tenant.start_tenancy(rental.house, rental.quality, rental.landlord, rental.monthly_rent, &ctx, &mut svc)?;
        let landlord = households
            .get_mut(&rental.landlord)
            .ok_or(SimulationError::HouseholdNotFound(rental.landlord))?;
        landlord.let_house(rental.house, rental.tenant, rental.monthly_rent, &mut svc)?;
        Ok(())
    }

    // ========================================================================
    // Demographics
    // ========================================================================

    /// Monthly death probability at `age`
    ///
    /// Gompertz hazard doubling every `mortality_doubling_years` above the
    /// onset age; certain death at the maximum age.
    pub fn monthly_mortality(&self, age: f64) -> f64 {
        let d = &self.config.demographics;
        if age >= d.max_age {
            return 1.0;
        }
        if age < d.mortality_onset_age {
            return 0.0;
        }
        let annual = (d.annual_mortality_at_onset
            * 2f64.powf((age - d.mortality_onset_age) / d.mortality_doubling_years))
            .min(1.0);
        1.0 - (1.0 - annual).powf(1.0 / MONTHS_IN_YEAR as f64)
    }

    fn run_demographics(
        &mut self,
        month: u32,
        stats: &dyn MarketStatistics,
        market: &mut dyn HousingMarket,
    ) -> Result<(usize, Vec<HouseholdId>), SimulationError> {
        if !self.config.demographics.enabled {
            return Ok((0, Vec::new()));
        }

        let ages: Vec<(HouseholdId, f64)> = self.households.values().map(|h| (h.id(), h.age())).collect();
        let mut deceased = Vec::new();
        for (id, age) in ages {
            let p = self.monthly_mortality(age);
            if self.rng_manager.chance(p) {
                deceased.push(id);
            }
        }

        let mut births = 0;
        for &id in &deceased {
            if self.households.len() == 1 {
                // Last one standing: the estate passes to a newcomer
                self.spawn_newcomer(month);
                births += 1;
            }
            let others: Vec<HouseholdId> = self.households.keys().copied().filter(|other| *other != id).collect();
            let pick = self.rng_manager.range(0, others.len() as i64) as usize;
            self.transfer_estate(id, others[pick], stats, &mut *market)?;
        }

        while self.households.len() < self.config.simulation.initial_population {
            self.spawn_newcomer(month);
            births += 1;
        }

        if births > 0 || !deceased.is_empty() {
            info!("Month {}: {} deaths, {} births", month, deceased.len(), births);
        }
        Ok((births, deceased))
    }

    fn spawn_newcomer(&mut self, month: u32) {
        let age = self.config.demographics.entry_age;
        let id = self.spawn_household(age);
        self.event_log.log(Event::HouseholdBorn {
            month,
            household: id,
            age,
        });
    }

    /// Remove `deceased` from the population and pass its estate on
    pub fn transfer_estate(
        &mut self,
        deceased: HouseholdId,
        beneficiary: HouseholdId,
        stats: &dyn MarketStatistics,
        market: &mut dyn HousingMarket,
    ) -> Result<(), SimulationError> {
        if deceased == beneficiary {
            return Err(SimulationError::SelfInheritance(deceased));
        }
        if !self.households.contains_key(&beneficiary) {
            return Err(SimulationError::HouseholdNotFound(beneficiary));
        }
        let month = self.current_month();
        let estate = self
            .households
            .remove(&deceased)
            .ok_or(SimulationError::HouseholdNotFound(deceased))?;
        self.event_log.log(Event::HouseholdDied {
            month,
            household: deceased,
            beneficiary,
        });

        let mut notices = Vec::new();
        {
            let (households, ctx, mut svc) = self.household_scope(month, stats, &mut *market, &mut notices);
            let heir = households
                .get_mut(&beneficiary)
                .ok_or(SimulationError::HouseholdNotFound(beneficiary))?;
            estate.transfer_all_wealth_to(heir, &ctx, &mut svc)?;
        }
        self.deliver_notices(month, stats, market, &mut notices)
    }
}

/// Median of a sample, 0.0 when empty
fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median() {
        assert_eq!(median(vec![]), 0.0);
        assert_eq!(median(vec![3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(vec![4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_mortality_profile() {
        let orchestrator = Orchestrator::new(small_config()).unwrap();
        assert_eq!(orchestrator.monthly_mortality(30.0), 0.0);
        assert_eq!(orchestrator.monthly_mortality(100.0), 1.0);
        let at_onset = orchestrator.monthly_mortality(50.0);
        let later = orchestrator.monthly_mortality(58.0);
        assert!(later > at_onset);
        // Annual hazard doubles over eight years
        let annual = |monthly: f64| 1.0 - (1.0 - monthly).powi(12);
        assert!((annual(later) / annual(at_onset) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_self_inheritance_rejected() {
        let mut orchestrator = Orchestrator::new(small_config()).unwrap();
        let market = crate::market::MarketSnapshot::graded(5, 100_000.0, 25_000.0, 0.004);
        let mut book = crate::market::OfferBook::new();
        let err = orchestrator
            .transfer_estate(HouseholdId(0), HouseholdId(0), &market, &mut book)
            .unwrap_err();
        assert_eq!(err, SimulationError::SelfInheritance(HouseholdId(0)));
        assert!(err.to_string().contains("household#0"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = small_config();
        config.simulation.n_months = 0;
        assert!(matches!(Orchestrator::new(config), Err(SimulationError::InvalidConfig(_))));
    }

    fn small_config() -> Config {
        let mut config = Config::baseline().unwrap();
        config.simulation.initial_population = 10;
        config
    }
}
