//! Regulator thresholds as seen through the bank and the monthly loop

use approx::assert_relative_eq;
use housing_credit_core_rs::bank::{Bank, BorrowerProfile, CreditContext, LoanPurpose, LoanRequest};
use housing_credit_core_rs::central_bank::{BorrowerClass, CentralBank, MacroprudentialState};
use housing_credit_core_rs::collectors::CreditLedger;
use housing_credit_core_rs::market::{MarketSnapshot, OfferBook};
use housing_credit_core_rs::models::{Event, EventLog, HouseId, HouseholdId};
use housing_credit_core_rs::{Config, Orchestrator};
use proptest::prelude::*;

fn applicant(annual_income: f64, balance: f64) -> BorrowerProfile {
    BorrowerProfile {
        household: HouseholdId(1),
        age: 30.0,
        is_first_time_buyer: true,
        bank_balance: balance,
        home_equity: 0.0,
        monthly_gross_employment_income: annual_income / 12.0,
        annual_gross_employment_income: annual_income,
        monthly_net_employment_income: annual_income * 0.8 / 12.0,
    }
}

fn home(price: f64) -> LoanRequest {
    LoanRequest {
        price,
        desired_down_payment: 0.0,
        purpose: LoanPurpose::Home,
    }
}

#[test]
fn test_regulator_cap_binds_unless_tolerance_allows_more() {
    let mut config = Config::baseline().unwrap();
    let market = MarketSnapshot::graded(5, 100_000.0, 25_000.0, 0.004);
    let bank = Bank::new(&config.bank, &config.income.trend);

    let strict = CentralBank::new(&config.central_bank);
    let ctx = CreditContext { central_bank: &strict, stats: &market, month: 0 };
    assert_eq!(bank.loan_to_value_limit(BorrowerClass::FirstTimeBuyer, &ctx), 0.9);

    config.central_bank.max_fraction_over_ltv_limit = 1.0;
    let tolerant = CentralBank::new(&config.central_bank);
    let ctx = CreditContext { central_bank: &tolerant, stats: &market, month: 0 };
    assert_eq!(bank.loan_to_value_limit(BorrowerClass::FirstTimeBuyer, &ctx), 0.95);
}

#[test]
fn test_over_limit_loans_are_counted_per_constraint() {
    let mut config = Config::baseline().unwrap();
    config.central_bank.max_fraction_over_ltv_limit = 1.0;
    config.central_bank.max_fraction_owner_occupier_over_lti_limit = 1.0;
    let cb = CentralBank::new(&config.central_bank);
    let market = MarketSnapshot::graded(5, 100_000.0, 25_000.0, 0.004);
    let mut bank = Bank::new(&config.bank, &config.income.trend);
    let ctx = CreditContext { central_bank: &cb, stats: &market, month: 0 };
    let mut ledger = CreditLedger::new();
    let mut events = EventLog::new();

    // LTI binds at the bank's 6.0, above the regulator's 4.5
    let outcome = bank
        .request_loan(&applicant(20_000.0, 100_000.0), &home(200_000.0), HouseId(1), &ctx, &mut ledger, &mut events)
        .unwrap();
    assert_relative_eq!(outcome.approval.principal, 120_000.0, epsilon = 1e-6);
    assert_eq!(bank.counters().n_owner_occupier_over_lti, 1);
    assert_eq!(bank.counters().n_first_time_buyer_over_ltv, 0);

    // LTV binds at the bank's 0.95, above the regulator's 0.9
    let outcome = bank
        .request_loan(&applicant(200_000.0, 100_000.0), &home(100_000.0), HouseId(2), &ctx, &mut ledger, &mut events)
        .unwrap();
    assert_relative_eq!(outcome.approval.loan_to_value(), 0.95, epsilon = 1e-9);
    assert_eq!(bank.counters().n_first_time_buyer_over_ltv, 1);
    assert_eq!(bank.counters().n_owner_occupier_over_lti, 1);
    assert_eq!(bank.counters().n_owner_occupier, 2);
    assert_eq!(bank.counters().n_mortgages, 2);
}

#[test]
fn test_counters_tighten_later_loans_in_the_month() {
    let config = Config::baseline().unwrap();
    let mut lenient = config.central_bank.clone();
    lenient.max_fraction_owner_occupier_over_lti_limit = 1.0;
    let market = MarketSnapshot::graded(5, 100_000.0, 25_000.0, 0.004);
    let mut bank = Bank::new(&config.bank, &config.income.trend);
    let mut ledger = CreditLedger::new();
    let mut events = EventLog::new();

    let cb = CentralBank::new(&lenient);
    let ctx = CreditContext { central_bank: &cb, stats: &market, month: 0 };
    bank.request_loan(&applicant(20_000.0, 100_000.0), &home(200_000.0), HouseId(1), &ctx, &mut ledger, &mut events)
        .unwrap();

    // Under the baseline tolerance one over-limit loan in one is already too many
    let strict = CentralBank::new(&config.central_bank);
    assert_eq!(bank.loan_to_income_limit(BorrowerClass::FirstTimeBuyer, &strict).unwrap(), 4.5);
    assert_eq!(bank.loan_to_income_limit(BorrowerClass::FirstTimeBuyer, &cb).unwrap(), 6.0);

    // The monthly reset lifts the restriction again
    bank.step(1000, 1, &strict, &mut events);
    assert_eq!(bank.counters().n_mortgages, 0);
}

#[test]
fn test_anticyclical_switches_are_logged_by_the_loop() {
    let mut config = Config::baseline().unwrap();
    config.simulation.initial_population = 20;
    config.central_bank.anticyclical_ltv = true;
    let mut orchestrator = Orchestrator::new(config).unwrap();
    assert_eq!(orchestrator.central_bank().state(), MacroprudentialState::Inactive);

    let mut booming = MarketSnapshot::graded(5, 100_000.0, 25_000.0, 0.004);
    booming.qoq_growth = 0.02;
    let mut book = OfferBook::new();
    let result = orchestrator.tick(&booming, &mut book).unwrap();
    assert!(result.macroprudential_active);
    assert_eq!(orchestrator.event_log().count_in_month(0, "MacroprudentialSwitch"), 1);

    // Steady growth keeps the caps on without further events
    let result = orchestrator.tick(&booming, &mut book).unwrap();
    assert!(result.macroprudential_active);
    assert_eq!(orchestrator.event_log().count_in_month(1, "MacroprudentialSwitch"), 0);

    let mut crash = booming.clone();
    crash.qoq_growth = -0.05;
    crash.annual_hpa = -0.3;
    let result = orchestrator.tick(&crash, &mut book).unwrap();
    assert!(!result.macroprudential_active);
    let switches = orchestrator.event_log().events_of_type("MacroprudentialSwitch");
    assert_eq!(switches.last(), Some(&&Event::MacroprudentialSwitch { month: 2, active: false }));
}

const CLASSES: [BorrowerClass; 3] = [
    BorrowerClass::FirstTimeBuyer,
    BorrowerClass::HomeMover,
    BorrowerClass::BuyToLet,
];

/// Write one first-time-buyer loan per entry at the given loan-to-value
fn book_loans(bank: &mut Bank, cb: &CentralBank, loan_to_values: &[f64]) {
    let market = MarketSnapshot::graded(5, 100_000.0, 25_000.0, 0.004);
    let ctx = CreditContext { central_bank: cb, stats: &market, month: 0 };
    let mut ledger = CreditLedger::new();
    let mut events = EventLog::new();
    for (i, ltv) in loan_to_values.iter().enumerate() {
        let request = LoanRequest {
            price: 100_000.0,
            desired_down_payment: 100_000.0 * (1.0 - ltv),
            purpose: LoanPurpose::Home,
        };
        bank.request_loan(&applicant(1_000_000.0, 1_000_000.0), &request, HouseId(i as u64), &ctx, &mut ledger, &mut events)
            .unwrap();
    }
}

fn with_regulator_ltv(config: &Config, cap: f64) -> CentralBank {
    let mut cb_config = config.central_bank.clone();
    cb_config.first_time_buyer_ltv_limit = cap;
    cb_config.owner_occupier_ltv_limit = cap;
    cb_config.buy_to_let_ltv_limit = cap;
    CentralBank::new(&cb_config)
}

proptest! {
    /// Loosening the regulator's cap never tightens the bank's limit,
    /// whatever this month's lending looks like
    #[test]
    fn prop_ltv_limit_monotone_in_regulator_cap(
        cap in 0.5f64..0.95,
        raise in 0.0f64..0.04,
        tolerance in 0.0f64..1.0,
        prior in proptest::collection::vec(0.3f64..0.95, 0..6),
    ) {
        let mut config = Config::baseline().unwrap();
        config.central_bank.max_fraction_over_ltv_limit = tolerance;
        let mut bank = Bank::new(&config.bank, &config.income.trend);
        book_loans(&mut bank, &with_regulator_ltv(&config, 0.9), &prior);

        let market = MarketSnapshot::graded(5, 100_000.0, 25_000.0, 0.004);
        let strict = with_regulator_ltv(&config, cap);
        let loose = with_regulator_ltv(&config, cap + raise);
        for class in CLASSES {
            let low = bank.loan_to_value_limit(class, &CreditContext { central_bank: &strict, stats: &market, month: 0 });
            let high = bank.loan_to_value_limit(class, &CreditContext { central_bank: &loose, stats: &market, month: 0 });
            prop_assert!(low <= high, "{:?}: {} > {}", class, low, high);
        }
    }

    /// Raising the bank's own cap never lowers its limit
    #[test]
    fn prop_ltv_limit_monotone_in_bank_cap(
        cap in 0.5f64..0.95,
        raise in 0.0f64..0.04,
        tolerance in 0.0f64..1.0,
        n_prior in 0usize..6,
    ) {
        let mut config = Config::baseline().unwrap();
        config.central_bank.max_fraction_over_ltv_limit = tolerance;
        let cb = CentralBank::new(&config.central_bank);
        let market = MarketSnapshot::graded(5, 100_000.0, 25_000.0, 0.004);
        let prior = vec![0.3; n_prior];

        let mut limits = Vec::new();
        for bank_cap in [cap, cap + raise] {
            let mut bank_config = config.bank.clone();
            bank_config.first_time_buyer_ltv_limit = bank_cap;
            bank_config.owner_occupier_ltv_limit = bank_cap;
            bank_config.buy_to_let_ltv_limit = bank_cap;
            let mut bank = Bank::new(&bank_config, &config.income.trend);
            book_loans(&mut bank, &cb, &prior);
            let ctx = CreditContext { central_bank: &cb, stats: &market, month: 0 };
            limits.push(CLASSES.map(|class| bank.loan_to_value_limit(class, &ctx)));
        }
        for (low, high) in limits[0].iter().zip(limits[1].iter()) {
            prop_assert!(low <= high);
        }
    }
}
