//! Integration tests for the monthly loop with a simple market matcher

use std::collections::{BTreeMap, BTreeSet};

use approx::assert_relative_eq;
use housing_credit_core_rs::collectors::CreditLedger;
use housing_credit_core_rs::household::Holding;
use housing_credit_core_rs::market::{MarketSnapshot, MarketStatistics, OfferBook};
use housing_credit_core_rs::models::{HouseId, HouseholdId};
use housing_credit_core_rs::{
    Config, MonthResult, Orchestrator, RentalCompletion, SaleCompletion, SimulationError,
};

fn config(population: usize) -> Config {
    let mut config = Config::baseline().unwrap();
    config.simulation.initial_population = population;
    config
}

fn market() -> MarketSnapshot {
    MarketSnapshot::graded(10, 80_000.0, 30_000.0, 0.004)
}

/// Naive clearing: sale bids take the cheapest affordable listing or a new
/// build, rental bids take the cheapest affordable rental listing
struct Matcher {
    next_new_build: u64,
}

impl Matcher {
    fn new() -> Self {
        Self { next_new_build: 1_000_000 }
    }

    fn clear(
        &mut self,
        orchestrator: &mut Orchestrator,
        result: &MonthResult,
        stats: &MarketSnapshot,
        book: &mut OfferBook,
        ledger: &mut CreditLedger,
    ) -> Result<(), SimulationError> {
        let dead: BTreeSet<HouseholdId> = result.deceased.iter().copied().collect();
        let mut sold = BTreeSet::new();

        for bid in book.sale_bids().to_vec() {
            let Some(bidder) = orchestrator.household(bid.household) else { continue };
            // Bids from the dead are void; bids placed under another tenure are stale
            let stale = if bid.buy_to_let {
                !bidder.is_homeowner()
            } else {
                !bidder.is_in_social_housing()
            };
            if dead.contains(&bid.household) || stale {
                continue;
            }
            let listing = book
                .sale_offers()
                .filter(|o| o.price <= bid.price && o.owner != bid.household && !sold.contains(&o.house))
                .min_by(|a, b| a.price.total_cmp(&b.price))
                .cloned();
            let sale = match listing {
                Some(offer) => SaleCompletion {
                    house: offer.house,
                    quality: offer.quality,
                    price: offer.price,
                    buyer: bid.household,
                    seller: Some(offer.owner),
                },
                None => {
                    let Some(quality) = stats.max_quality_for_price(bid.price) else { continue };
                    self.next_new_build += 1;
                    SaleCompletion {
                        house: HouseId(self.next_new_build),
                        quality,
                        price: bid.price,
                        buyer: bid.household,
                        seller: None,
                    }
                }
            };
            sold.insert(sale.house);
            orchestrator.complete_sale(&sale, stats, book, ledger)?;
        }

        let mut let_out = BTreeSet::new();
        for bid in book.rental_bids().to_vec() {
            let Some(bidder) = orchestrator.household(bid.household) else { continue };
            if dead.contains(&bid.household) || !bidder.is_in_social_housing() {
                continue;
            }
            let listing = book
                .rental_offers()
                .filter(|o| o.price <= bid.monthly_rent && o.owner != bid.household && !let_out.contains(&o.house))
                .min_by(|a, b| a.price.total_cmp(&b.price))
                .cloned();
            if let Some(offer) = listing {
                let_out.insert(offer.house);
                let rental = RentalCompletion {
                    house: offer.house,
                    quality: offer.quality,
                    monthly_rent: offer.price,
                    tenant: bid.household,
                    landlord: offer.owner,
                };
                orchestrator.complete_rental(&rental, stats, book)?;
            }
        }
        book.clear_bids();
        Ok(())
    }
}

/// Every tenancy is mirrored by a letting and no house has two owners
fn assert_holdings_consistent(orchestrator: &Orchestrator) {
    let mut owners: BTreeMap<HouseId, HouseholdId> = BTreeMap::new();
    for household in orchestrator.households() {
        assert!(household.bank_balance() >= 0.0);
        assert!(household.total_debt(orchestrator.bank()).is_ok());
        if let Some(home) = household.home() {
            assert!(household.holdings().contains_key(&home));
        }
        for (house, holding) in household.holdings() {
            match holding {
                Holding::Owned(_) => {
                    assert!(owners.insert(*house, household.id()).is_none(), "{} owned twice", house);
                }
                Holding::Tenancy { agreement, .. } => {
                    assert_eq!(household.home(), Some(*house));
                    let landlord = orchestrator.household(agreement.landlord).unwrap();
                    let letting = landlord
                        .holdings()
                        .get(house)
                        .and_then(Holding::as_owned)
                        .and_then(|p| p.letting.as_ref())
                        .unwrap();
                    assert_eq!(letting.tenant, household.id());
                }
            }
        }
    }
}

#[test]
fn test_orchestrator_creation() {
    let orchestrator = Orchestrator::new(config(50)).unwrap();
    assert_eq!(orchestrator.current_month(), 0);
    assert_eq!(orchestrator.population(), 50);
    assert!(orchestrator.aggregates().median_monthly_gross_income > 0.0);
    assert!(orchestrator.households().all(|h| h.is_in_social_housing() && h.is_first_time_buyer()));
    let ids: Vec<u64> = orchestrator.households().map(|h| h.id().0).collect();
    assert_eq!(ids, (0..50).collect::<Vec<u64>>());
}

#[test]
fn test_tick_advances_month_and_logs_rate() {
    let mut orchestrator = Orchestrator::new(config(50)).unwrap();
    let stats = market();
    let mut book = OfferBook::new();

    for expected in 0..6 {
        let result = orchestrator.tick(&stats, &mut book).unwrap();
        assert_eq!(result.month, expected);
        assert_eq!(orchestrator.current_month(), expected + 1);
        assert_eq!(orchestrator.event_log().count_in_month(expected, "MortgageRateSet"), 1);
        assert!(result.mortgage_rate >= orchestrator.central_bank().base_rate());
        book.clear_bids();
    }
}

#[test]
fn test_social_renters_bid_every_month() {
    let mut config = config(40);
    config.demographics.enabled = false;
    let mut orchestrator = Orchestrator::new(config).unwrap();
    let stats = market();
    let mut book = OfferBook::new();

    orchestrator.tick(&stats, &mut book).unwrap();
    assert_eq!(book.sale_bids().len() + book.rental_bids().len(), 40);
    assert!(book.sale_bids().iter().all(|bid| !bid.buy_to_let));
}

#[test]
fn test_multi_year_run_with_market_clearing() {
    let mut orchestrator = Orchestrator::new(config(150)).unwrap();
    let stats = market();
    let mut book = OfferBook::new();
    let mut ledger = CreditLedger::new();
    let mut matcher = Matcher::new();

    for _ in 0..36 {
        let result = orchestrator.tick(&stats, &mut book).unwrap();
        assert_eq!(result.population, 150);
        assert_eq!(result.population, orchestrator.population());
        matcher
            .clear(&mut orchestrator, &result, &stats, &mut book, &mut ledger)
            .unwrap();
        assert_holdings_consistent(&orchestrator);
    }

    assert!(!ledger.sales.is_empty());
    assert!(orchestrator.households().any(|h| h.is_homeowner()));
    // The book holds exactly the mortgages households still owe
    let owed: usize = orchestrator.households().map(|h| h.mortgages().len()).sum();
    assert_eq!(owed, orchestrator.bank().book().len());
}

#[test]
fn test_dividends_redistribute_all_interest_paid() {
    let mut config = config(120);
    config.household.dividend_payments = true;
    config.household.initial_bank_balance = 30_000.0;
    config.demographics.enabled = false;
    let mut orchestrator = Orchestrator::new(config).unwrap();
    let stats = market();
    let mut book = OfferBook::new();
    let mut ledger = CreditLedger::new();
    let mut matcher = Matcher::new();

    let mut months_with_interest = 0;
    for _ in 0..24 {
        // Completions between ticks move down payments and proceeds before the next step
        let interest_paid = orchestrator.aggregates().total_interest_paid;
        let result = orchestrator.tick(&stats, &mut book).unwrap();
        let dividends: f64 = orchestrator.households().map(|h| h.flows().dividend_income).sum();
        assert_relative_eq!(dividends, interest_paid, max_relative = 1e-9, epsilon = 1e-9);
        if interest_paid > 0.0 {
            months_with_interest += 1;
        }
        matcher
            .clear(&mut orchestrator, &result, &stats, &mut book, &mut ledger)
            .unwrap();
    }
    assert!(!ledger.loans.is_empty());
    assert!(months_with_interest > 0);
}

#[test]
fn test_demographics_keep_population_at_target() {
    let mut config = config(60);
    config.demographics.initial_age_min = 70.0;
    config.demographics.initial_age_max = 95.0;
    config.demographics.annual_mortality_at_onset = 0.02;
    let mut orchestrator = Orchestrator::new(config).unwrap();
    let stats = market();
    let mut book = OfferBook::new();

    let mut deaths = 0;
    for _ in 0..12 {
        let result = orchestrator.tick(&stats, &mut book).unwrap();
        assert_eq!(result.population, 60);
        assert_eq!(result.births, result.deceased.len());
        for id in &result.deceased {
            assert!(orchestrator.household(*id).is_none());
        }
        deaths += result.deceased.len();
        book.clear_bids();
    }
    assert!(deaths > 0);
    assert_eq!(orchestrator.event_log().events_of_type("HouseholdDied").len(), deaths);
    assert_eq!(orchestrator.event_log().events_of_type("HouseholdBorn").len(), deaths);
    // Newcomers get fresh ids
    assert!(orchestrator.households().any(|h| h.id().0 >= 60));
}

#[test]
fn test_last_household_bequeaths_to_newcomer() {
    let mut config = config(1);
    config.demographics.initial_age_min = 99.95;
    config.demographics.initial_age_max = 99.99;
    let mut orchestrator = Orchestrator::new(config).unwrap();
    let stats = market();
    let mut book = OfferBook::new();

    let result = orchestrator.tick(&stats, &mut book).unwrap();
    assert_eq!(result.deceased, vec![HouseholdId(0)]);
    assert_eq!(result.births, 1);
    assert_eq!(orchestrator.population(), 1);
    let heir = orchestrator.households().next().unwrap();
    assert_eq!(heir.id(), HouseholdId(1));
    assert_eq!(heir.age(), orchestrator.config().demographics.entry_age);
    assert!(heir.bank_balance() > orchestrator.config().household.initial_bank_balance);
}

#[test]
fn test_estate_transfer_to_unknown_household_fails() {
    let mut orchestrator = Orchestrator::new(config(5)).unwrap();
    let stats = market();
    let mut book = OfferBook::new();

    let err = orchestrator
        .transfer_estate(HouseholdId(0), HouseholdId(99), &stats, &mut book)
        .unwrap_err();
    assert_eq!(err, SimulationError::HouseholdNotFound(HouseholdId(99)));
    assert_eq!(orchestrator.population(), 5);

    orchestrator
        .transfer_estate(HouseholdId(0), HouseholdId(1), &stats, &mut book)
        .unwrap();
    assert_eq!(orchestrator.population(), 4);
    assert_eq!(orchestrator.event_log().events_of_type("HouseholdDied").len(), 1);
}

#[test]
fn test_completion_for_unknown_buyer_fails() {
    let mut orchestrator = Orchestrator::new(config(5)).unwrap();
    let stats = market();
    let mut book = OfferBook::new();
    let mut ledger = CreditLedger::new();

    let sale = SaleCompletion {
        house: HouseId(1),
        quality: 0,
        price: 80_000.0,
        buyer: HouseholdId(42),
        seller: None,
    };
    let err = orchestrator.complete_sale(&sale, &stats, &mut book, &mut ledger).unwrap_err();
    assert_eq!(err, SimulationError::HouseholdNotFound(HouseholdId(42)));
    assert!(ledger.sales.is_empty());
}

#[test]
fn test_month_result_serializes() {
    let mut orchestrator = Orchestrator::new(config(10)).unwrap();
    let mut book = OfferBook::new();
    let result = orchestrator.tick(&market(), &mut book).unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["month"], 0);
    assert_eq!(json["population"], 10);
}
