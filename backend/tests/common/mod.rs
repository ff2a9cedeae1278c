//! Shared fixtures for household-level tests
//!
//! Builds the context and services a household step needs without an
//! orchestrator, so tests can hand-place households in exact situations.

#![allow(dead_code)]

use housing_credit_core_rs::bank::Bank;
use housing_credit_core_rs::behaviour::HouseholdBehaviour;
use housing_credit_core_rs::central_bank::CentralBank;
use housing_credit_core_rs::collectors::CreditLedger;
use housing_credit_core_rs::household::{
    Household, HouseholdEnvironment, HousingNotice, PopulationAggregates, Services, StepContext,
};
use housing_credit_core_rs::market::{MarketSnapshot, OfferBook};
use housing_credit_core_rs::models::{EventLog, HouseId, HouseholdId};
use housing_credit_core_rs::{Config, HouseholdError, RngManager};

/// Cheapest quality costs 100k, each step up adds 25k
pub const LOWEST_PRICE: f64 = 100_000.0;

/// Everything around a household except the other households
pub struct World {
    pub config: Config,
    pub env: HouseholdEnvironment,
    pub aggregates: PopulationAggregates,
    pub central_bank: CentralBank,
    pub bank: Bank,
    pub market: MarketSnapshot,
    pub book: OfferBook,
    pub rng: RngManager,
    pub events: EventLog,
    pub notices: Vec<HousingNotice>,
    pub ledger: CreditLedger,
}

impl World {
    pub fn new(config: Config) -> Self {
        let env = HouseholdEnvironment::new(&config).unwrap();
        Self {
            env,
            aggregates: PopulationAggregates {
                median_monthly_gross_income: 2_500.0,
                median_debt_service_ratio: 0.1,
                total_interest_paid: 0.0,
                total_beginning_balances: 0.0,
            },
            central_bank: CentralBank::new(&config.central_bank),
            bank: Bank::new(&config.bank, &config.income.trend),
            market: MarketSnapshot::graded(10, LOWEST_PRICE, 25_000.0, 0.004),
            book: OfferBook::new(),
            rng: RngManager::new(config.simulation.seed),
            events: EventLog::new(),
            notices: Vec::new(),
            ledger: CreditLedger::new(),
            config,
        }
    }

    pub fn baseline() -> Self {
        Self::new(Config::baseline().unwrap())
    }

    /// Baseline with housing decisions switched off
    pub fn finances_only() -> Self {
        let mut world = Self::baseline();
        world.env.housing_transactions_until_month = 0;
        world
    }

    pub fn scope(&mut self, month: u32) -> (StepContext<'_>, Services<'_>, &mut CreditLedger) {
        let ctx = StepContext {
            month,
            env: &self.env,
            aggregates: &self.aggregates,
            stats: &self.market,
            central_bank: &self.central_bank,
        };
        let svc = Services {
            bank: &mut self.bank,
            market: &mut self.book,
            rng: &mut self.rng,
            events: &mut self.events,
            notices: &mut self.notices,
        };
        (ctx, svc, &mut self.ledger)
    }

    pub fn step(&mut self, household: &mut Household, month: u32) {
        let (ctx, mut svc, _) = self.scope(month);
        household.step(&ctx, &mut svc).unwrap();
    }

    pub fn buy(
        &mut self,
        household: &mut Household,
        house: HouseId,
        quality: usize,
        price: f64,
        month: u32,
    ) -> Result<(), HouseholdError> {
        let (ctx, mut svc, ledger) = self.scope(month);
        household.complete_house_purchase(house, quality, price, &ctx, &mut svc, ledger)
    }

    pub fn sell(
        &mut self,
        household: &mut Household,
        house: HouseId,
        price: f64,
        month: u32,
    ) -> Result<f64, HouseholdError> {
        let (ctx, mut svc, _) = self.scope(month);
        household.complete_house_sale(house, price, &ctx, &mut svc)
    }

    /// Tenant moves in and the landlord records the letting
    pub fn rent(
        &mut self,
        tenant: &mut Household,
        landlord: &mut Household,
        house: HouseId,
        quality: usize,
        monthly_rent: f64,
        month: u32,
    ) -> Result<(), HouseholdError> {
        let (ctx, mut svc, _) = self.scope(month);
        tenant.start_tenancy(house, quality, landlord.id(), monthly_rent, &ctx, &mut svc)?;
        landlord.let_house(house, tenant.id(), monthly_rent, &mut svc)
    }

    pub fn take_notices(&mut self) -> Vec<HousingNotice> {
        std::mem::take(&mut self.notices)
    }

    /// Outstanding principal of every mortgage the household owes
    pub fn debt_of(&self, household: &Household) -> f64 {
        household.total_debt(&self.bank).unwrap()
    }
}

pub fn owner_occupier(id: u64, age: f64, percentile: f64, balance: f64) -> Household {
    Household::new(HouseholdId(id), age, percentile, HouseholdBehaviour::new(0.5, false, 0.0), balance)
}

pub fn investor(id: u64, age: f64, percentile: f64, balance: f64) -> Household {
    Household::new(HouseholdId(id), age, percentile, HouseholdBehaviour::new(0.5, true, 0.5), balance)
}
