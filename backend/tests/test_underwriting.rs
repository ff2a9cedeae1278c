//! Mortgage approval against the regulator and bank caps

use approx::assert_relative_eq;
use housing_credit_core_rs::bank::{Bank, BorrowerProfile, CreditContext, LoanPurpose, LoanRequest};
use housing_credit_core_rs::central_bank::CentralBank;
use housing_credit_core_rs::market::MarketSnapshot;
use housing_credit_core_rs::models::HouseholdId;
use housing_credit_core_rs::{Config, CreditError};
use proptest::prelude::*;

fn first_time_buyer_config() -> Config {
    let mut config = Config::baseline().unwrap();
    config.bank.initial_rate = 0.036;
    config.bank.first_time_buyer_ltv_limit = 0.95;
    config.bank.first_time_buyer_lti_limit = 4.5;
    config.bank.affordability_coefficient = 0.35;
    config.bank.mortgage_duration_years = 25;
    config.central_bank.first_time_buyer_ltv_limit = 0.95;
    config
}

fn profile(age: f64, annual_income: f64, balance: f64, first_time_buyer: bool) -> BorrowerProfile {
    BorrowerProfile {
        household: HouseholdId(1),
        age,
        is_first_time_buyer: first_time_buyer,
        bank_balance: balance,
        home_equity: 0.0,
        monthly_gross_employment_income: annual_income / 12.0,
        annual_gross_employment_income: annual_income,
        monthly_net_employment_income: annual_income * 0.8 / 12.0,
    }
}

fn home(price: f64, desired_down_payment: f64) -> LoanRequest {
    LoanRequest {
        price,
        desired_down_payment,
        purpose: LoanPurpose::Home,
    }
}

#[test]
fn test_first_time_buyer_is_bound_by_loan_to_income() {
    let config = first_time_buyer_config();
    let cb = CentralBank::new(&config.central_bank);
    let bank = Bank::new(&config.bank, &config.income.trend);
    let market = MarketSnapshot::graded(5, 100_000.0, 25_000.0, 0.004);
    let ctx = CreditContext { central_bank: &cb, stats: &market, month: 0 };
    let buyer = profile(30.0, 30_000.0, 20_000.0, true);

    let principals = bank
        .constraint_principals(&buyer, 150_000.0, LoanPurpose::Home, &ctx)
        .unwrap();
    assert_relative_eq!(principals.loan_to_value, 142_500.0, epsilon = 1e-6);
    assert_relative_eq!(principals.loan_to_income.unwrap(), 135_000.0, epsilon = 1e-6);
    assert!(principals.affordability.unwrap() > 135_000.0);

    let approval = bank.request_approval(&buyer, &home(150_000.0, 0.0), &ctx).unwrap();
    assert_relative_eq!(approval.principal, 135_000.0, epsilon = 1e-6);
    assert_relative_eq!(approval.down_payment, 15_000.0, epsilon = 1e-6);
    assert_eq!(approval.n_payments, 300);
    assert!(approval.is_first_time_buyer);
    assert!(!approval.is_buy_to_let);
    assert_relative_eq!(approval.monthly_interest_rate, 0.003, epsilon = 1e-12);
    // Standard annuity on 135k over 300 months at 0.3% a month
    assert_relative_eq!(approval.monthly_payment, 683.1, epsilon = 0.5);
}

#[test]
fn test_short_horizon_buyers_get_fewer_payments() {
    let config = first_time_buyer_config();
    let cb = CentralBank::new(&config.central_bank);
    let bank = Bank::new(&config.bank, &config.income.trend);
    let market = MarketSnapshot::graded(5, 100_000.0, 25_000.0, 0.004);
    let ctx = CreditContext { central_bank: &cb, stats: &market, month: 0 };

    let approval = bank
        .request_approval(&profile(55.0, 60_000.0, 100_000.0, false), &home(150_000.0, 0.0), &ctx)
        .unwrap();
    assert_eq!(approval.n_payments, 120);
}

#[test]
fn test_net_income_basis_lowers_affordability() {
    let mut config = first_time_buyer_config();
    let cb = CentralBank::new(&config.central_bank);
    let market = MarketSnapshot::graded(5, 100_000.0, 25_000.0, 0.004);
    let ctx = CreditContext { central_bank: &cb, stats: &market, month: 0 };
    let buyer = profile(30.0, 30_000.0, 20_000.0, true);

    let gross = Bank::new(&config.bank, &config.income.trend)
        .constraint_principals(&buyer, 150_000.0, LoanPurpose::Home, &ctx)
        .unwrap();
    config.bank.affordability_basis = housing_credit_core_rs::config::AffordabilityBasis::NetEmployment;
    let net = Bank::new(&config.bank, &config.income.trend)
        .constraint_principals(&buyer, 150_000.0, LoanPurpose::Home, &ctx)
        .unwrap();
    assert_relative_eq!(
        net.affordability.unwrap() / gross.affordability.unwrap(),
        0.8,
        epsilon = 1e-9
    );
}

#[test]
fn test_home_equity_counts_towards_movers_wealth() {
    let config = Config::baseline().unwrap();
    let cb = CentralBank::new(&config.central_bank);
    let bank = Bank::new(&config.bank, &config.income.trend);
    let market = MarketSnapshot::graded(5, 100_000.0, 25_000.0, 0.004);
    let ctx = CreditContext { central_bank: &cb, stats: &market, month: 0 };
    let mut mover = profile(40.0, 40_000.0, 1_000.0, false);

    assert!(matches!(
        bank.request_approval(&mover, &home(200_000.0, 0.0), &ctx),
        Err(CreditError::DownPaymentExceedsLiquidWealth { .. })
    ));
    mover.home_equity = 50_000.0;
    assert!(bank.request_approval(&mover, &home(200_000.0, 0.0), &ctx).is_ok());
}

proptest! {
    /// The principal is the tightest constraint unless the buyer chooses
    /// to put down more
    #[test]
    fn prop_principal_is_minimum_of_constraints(
        price in 50_000.0f64..600_000.0,
        income in 10_000.0f64..200_000.0,
        age in 20.0f64..70.0,
        first_time_buyer in any::<bool>(),
        desired_fraction in 0.0f64..1.0,
    ) {
        let config = Config::baseline().unwrap();
        let cb = CentralBank::new(&config.central_bank);
        let bank = Bank::new(&config.bank, &config.income.trend);
        let market = MarketSnapshot::graded(5, 100_000.0, 25_000.0, 0.004);
        let ctx = CreditContext { central_bank: &cb, stats: &market, month: 0 };
        let buyer = profile(age, income, price, first_time_buyer);
        let desired = desired_fraction * price;

        let principals = bank.constraint_principals(&buyer, price, LoanPurpose::Home, &ctx).unwrap();
        let approval = bank.request_approval(&buyer, &home(price, desired), &ctx).unwrap();

        let required = principals.binding().min(price);
        let expected = required.min(price - desired);
        prop_assert!((approval.principal - expected).abs() < 1e-6);
        prop_assert!((approval.principal + approval.down_payment - price).abs() < 1e-6);
        prop_assert!(approval.principal >= 0.0);
        if approval.n_payments == 0 {
            prop_assert_eq!(approval.monthly_payment, 0.0);
        }
    }

    /// Quotes never change the bank and are reproducible
    #[test]
    fn prop_approval_is_pure(
        price in 50_000.0f64..600_000.0,
        income in 10_000.0f64..200_000.0,
        balance in 0.0f64..400_000.0,
    ) {
        let config = Config::baseline().unwrap();
        let cb = CentralBank::new(&config.central_bank);
        let bank = Bank::new(&config.bank, &config.income.trend);
        let market = MarketSnapshot::graded(5, 100_000.0, 25_000.0, 0.004);
        let ctx = CreditContext { central_bank: &cb, stats: &market, month: 0 };
        let buyer = profile(35.0, income, balance, true);
        let counters = *bank.counters();

        let first = bank.request_approval(&buyer, &home(price, 0.0), &ctx);
        let second = bank.request_approval(&buyer, &home(price, 0.0), &ctx);
        prop_assert_eq!(first, second);
        prop_assert_eq!(*bank.counters(), counters);
        prop_assert!(bank.book().is_empty());
    }

    /// Any price up to the ceiling can be financed from the balance
    #[test]
    fn prop_max_purchase_price_is_financeable(
        income in 10_000.0f64..200_000.0,
        balance in 1_000.0f64..300_000.0,
        age in 20.0f64..64.0,
    ) {
        let config = Config::baseline().unwrap();
        let cb = CentralBank::new(&config.central_bank);
        let bank = Bank::new(&config.bank, &config.income.trend);
        let market = MarketSnapshot::graded(5, 100_000.0, 25_000.0, 0.004);
        let ctx = CreditContext { central_bank: &cb, stats: &market, month: 0 };
        let buyer = profile(age, income, balance, true);

        let ceiling = bank.max_purchase_price(&buyer, LoanPurpose::Home, &ctx).unwrap();
        prop_assert!(ceiling > 0.0);
        let approval = bank.request_approval(&buyer, &home(ceiling, 0.0), &ctx);
        prop_assert!(approval.is_ok());
        prop_assert!(approval.unwrap().down_payment <= balance);
    }
}
