//! Household monthly state machine: flows, bankruptcy, vulnerability

mod common;

use approx::assert_relative_eq;
use common::{investor, owner_occupier, World, LOWEST_PRICE};
use housing_credit_core_rs::models::HouseId;

#[test]
fn test_social_housing_month_accounts_for_every_flow() {
    let mut world = World::finances_only();
    let mut household = owner_occupier(1, 40.0, 0.5, 5_000.0);

    world.step(&mut household, 0);
    let flows = *household.flows();

    assert!(flows.gross_employment_income > 0.0);
    assert_eq!(flows.rental_income, 0.0);
    assert_eq!(flows.rent_paid, world.config.household.social_housing_rent);
    assert_eq!(flows.debt_service(), 0.0);
    assert!(flows.income_tax > 0.0);
    assert!(flows.national_insurance > 0.0);
    assert_relative_eq!(
        flows.disposable_income,
        flows.net_total_income() - flows.housing_payments(),
        epsilon = 1e-9
    );
    assert_relative_eq!(
        household.bank_balance(),
        5_000.0 + flows.disposable_income - flows.consumption.total,
        epsilon = 1e-6
    );
    assert!(!household.is_bankrupt());
    assert_relative_eq!(household.age(), 40.0 + 1.0 / 12.0, epsilon = 1e-12);
}

#[test]
fn test_income_is_redrawn_each_month() {
    let mut world = World::finances_only();
    let mut household = owner_occupier(1, 30.0, 0.5, 5_000.0);

    world.step(&mut household, 0);
    let first = household.annual_gross_employment_income();
    for month in 1..24 {
        world.step(&mut household, month);
    }
    // Two years older on a rising age profile
    assert!(household.annual_gross_employment_income() > first);
}

#[test]
fn test_shortfall_is_replenished_and_flag_clears_next_month() {
    let mut world = World::finances_only();
    world.env.config.social_housing_rent = 50_000.0;
    let mut household = owner_occupier(1, 30.0, 0.6, 100.0);

    world.step(&mut household, 0);
    let flows = *household.flows();
    let shortfall = 100.0 + flows.disposable_income - flows.consumption.total;
    assert!(shortfall < 0.0);
    assert!(household.is_bankrupt());
    assert_relative_eq!(flows.cash_injection, -shortfall, epsilon = 1e-6);
    assert_eq!(household.bank_balance(), world.config.household.bankruptcy_balance_floor);
    assert_eq!(world.events.count_in_month(0, "Bankruptcy"), 1);

    world.env.config.social_housing_rent = 200.0;
    world.step(&mut household, 1);
    assert!(!household.is_bankrupt());
    assert_eq!(household.flows().cash_injection, 0.0);
    assert!(household.bank_balance() >= world.config.household.bankruptcy_balance_floor);
    assert_eq!(world.events.count_in_month(1, "Bankruptcy"), 0);
}

#[test]
fn test_dividends_follow_share_of_balances() {
    let mut world = World::finances_only();
    world.env.config.dividend_payments = true;
    world.aggregates.total_interest_paid = 1_000.0;
    world.aggregates.total_beginning_balances = 100_000.0;
    let mut household = owner_occupier(1, 40.0, 0.5, 10_000.0);

    world.step(&mut household, 0);
    assert_relative_eq!(household.flows().dividend_income, 100.0, epsilon = 1e-9);
    assert_relative_eq!(
        household.flows().gross_total_income(),
        household.flows().gross_employment_income + 100.0,
        epsilon = 1e-9
    );
}

#[test]
fn test_mortgage_service_reduces_debt() {
    let mut world = World::finances_only();
    let mut household = owner_occupier(1, 35.0, 0.2, 30_000.0);
    world.step(&mut household, 0);
    world.buy(&mut household, HouseId(1), 0, LOWEST_PRICE, 0).unwrap();
    let debt = world.debt_of(&household);
    assert!(debt > 0.0);

    world.step(&mut household, 1);
    let flows = *household.flows();
    assert_eq!(flows.rent_paid, 0.0);
    assert!(flows.interest_paid > 0.0);
    assert!(flows.principal_paid > 0.0);
    assert_relative_eq!(world.debt_of(&household), debt - flows.principal_paid, epsilon = 1e-6);
    assert!(household.debt_service_ratio() > 0.0);
}

#[test]
fn test_vulnerability_entry_persistence_and_exit() {
    let mut world = World::finances_only();
    let mut household = owner_occupier(1, 35.0, 0.2, 30_000.0);
    world.step(&mut household, 0);
    world.buy(&mut household, HouseId(1), 0, LOWEST_PRICE, 0).unwrap();
    assert!(!household.is_vulnerable());

    // A poverty line far above income makes the margin hugely negative
    world.env.config.poverty_line_fraction = 100.0;
    world.step(&mut household, 1);
    let debt = world.debt_of(&household);
    assert!(household.is_vulnerable());
    assert_eq!(household.vulnerable_since(), Some(1));
    assert!(household.exposure_at_default() > 0.0);
    assert!(household.exposure_at_default() <= debt);
    assert_eq!(world.events.count_in_month(1, "BecameVulnerable"), 1);

    world.step(&mut household, 2);
    assert!(household.is_vulnerable());
    assert!(household.was_vulnerable_one_month_ago());
    assert_eq!(household.vulnerable_since(), Some(1));
    assert_eq!(world.events.count_in_month(2, "BecameVulnerable"), 0);

    world.env.config.poverty_line_fraction = 0.6;
    world.aggregates.median_monthly_gross_income = 1_000.0;
    world.step(&mut household, 3);
    assert!(!household.is_vulnerable());
    assert!(household.was_vulnerable_one_month_ago());
    assert_eq!(household.vulnerable_since(), None);
    assert_eq!(household.exposure_at_default(), 0.0);
}

#[test]
fn test_drained_deposits_are_fully_exposed() {
    let mut world = World::finances_only();
    let mut household = owner_occupier(1, 35.0, 0.2, 30_000.0);
    world.step(&mut household, 0);
    world.buy(&mut household, HouseId(1), 0, LOWEST_PRICE, 0).unwrap();

    // Minimum consumption at a huge median spends every pound the household has
    world.env.config.poverty_line_fraction = 100.0;
    world.aggregates.median_monthly_gross_income = 1e7;
    world.step(&mut household, 1);

    let debt = world.debt_of(&household);
    assert_eq!(household.bank_balance(), 0.0);
    assert!(!household.is_bankrupt());
    assert!(debt > 0.0);
    assert!(household.is_vulnerable());
    assert_relative_eq!(household.exposure_at_default(), debt, max_relative = 1e-12);
    assert_eq!(world.events.count_in_month(1, "BecameVulnerable"), 1);
}

#[test]
fn test_debt_free_households_are_never_vulnerable() {
    let mut world = World::finances_only();
    world.env.config.poverty_line_fraction = 100.0;
    let mut household = owner_occupier(1, 35.0, 0.2, 100.0);

    world.step(&mut household, 0);
    assert!(!household.is_vulnerable());
    assert_eq!(household.exposure_at_default(), 0.0);
}

#[test]
fn test_income_shock_uses_stressed_disposable_income() {
    let mut world = World::finances_only();
    world.env.config.income_shock = 0.3;
    let mut household = owner_occupier(1, 40.0, 0.5, 5_000.0);

    world.step(&mut household, 0);
    let (ctx, _, _) = world.scope(0);
    let shocked = household.shocked_disposable_income(&ctx);
    assert!(shocked < household.flows().disposable_income);
}

#[test]
fn test_social_renter_places_exactly_one_bid() {
    let mut world = World::baseline();
    let mut household = owner_occupier(1, 30.0, 0.5, 20_000.0);

    world.step(&mut household, 0);
    let bids = world.book.sale_bids().len() + world.book.rental_bids().len();
    assert_eq!(bids, 1);
    if let Some(bid) = world.book.sale_bids().first() {
        assert!(!bid.buy_to_let);
        assert!(bid.price > 0.0);
    }
}

#[test]
fn test_penniless_investor_bids_for_a_rental() {
    let mut world = World::baseline();
    world.aggregates.median_monthly_gross_income = 1e7;
    let mut household = investor(1, 35.0, 0.9, 0.0);

    world.step(&mut household, 0);
    assert_eq!(household.bank_balance(), 0.0);
    assert!(world.book.sale_bids().is_empty());
    assert_eq!(world.book.rental_bids().len(), 1);
}

#[test]
fn test_no_housing_decisions_after_cutoff() {
    let mut world = World::baseline();
    world.env.housing_transactions_until_month = 5;
    let mut household = owner_occupier(1, 30.0, 0.5, 20_000.0);

    world.step(&mut household, 5);
    assert!(world.book.sale_bids().is_empty());
    assert!(world.book.rental_bids().is_empty());
}
