//! Naive market clearing for standalone runs
//!
//! Sale bids take the cheapest listing at or below the bid, falling back
//! to a new build of the best quality the bid affords. Rental bids take
//! the cheapest rental listing at or below the offered rent. Bids are
//! matched in placement order.

use std::collections::BTreeSet;

use housing_credit_core_rs::collectors::CreditLedger;
use housing_credit_core_rs::market::{MarketStatistics, OfferBook};
use housing_credit_core_rs::{
    HouseId, HouseholdId, MonthResult, Orchestrator, RentalCompletion, SaleCompletion,
    SimulationError,
};
use log::debug;

/// Houses built by the runner get ids from here upwards
const FIRST_NEW_BUILD: u64 = 1 << 32;

#[derive(Debug, Default, Clone, Copy)]
pub struct ClearingStats {
    pub sales: usize,
    pub new_builds: usize,
    pub lettings: usize,
}

pub struct NaiveClearing {
    next_house: u64,
}

impl NaiveClearing {
    pub fn new() -> Self {
        Self {
            next_house: FIRST_NEW_BUILD,
        }
    }

    /// Match this month's bids and empty the bid side of the book
    pub fn clear(
        &mut self,
        orchestrator: &mut Orchestrator,
        month: &MonthResult,
        stats: &dyn MarketStatistics,
        book: &mut OfferBook,
        ledger: &mut CreditLedger,
    ) -> Result<ClearingStats, SimulationError> {
        let deceased: BTreeSet<HouseholdId> = month.deceased.iter().copied().collect();
        let mut cleared = ClearingStats::default();
        let mut sold = BTreeSet::new();

        for bid in book.sale_bids().to_vec() {
            if deceased.contains(&bid.household) {
                continue;
            }
            let Some(bidder) = orchestrator.household(bid.household) else {
                continue;
            };
            let still_valid = if bid.buy_to_let {
                bidder.is_homeowner()
            } else {
                bidder.is_in_social_housing()
            };
            if !still_valid {
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
                    let Some(quality) = stats.max_quality_for_price(bid.price) else {
                        continue;
                    };
                    let house = HouseId(self.next_house);
                    self.next_house += 1;
                    cleared.new_builds += 1;
                    SaleCompletion {
                        house,
                        quality,
                        price: bid.price,
                        buyer: bid.household,
                        seller: None,
                    }
                }
            };
            debug!("{} buys {} for {:.0}", sale.buyer, sale.house, sale.price);
            sold.insert(sale.house);
            orchestrator.complete_sale(&sale, stats, book, ledger)?;
            cleared.sales += 1;
        }

        let mut let_out = BTreeSet::new();
        for bid in book.rental_bids().to_vec() {
            if deceased.contains(&bid.household) {
                continue;
            }
            match orchestrator.household(bid.household) {
                Some(bidder) if bidder.is_in_social_housing() => {}
                _ => continue,
            }
            let listing = book
                .rental_offers()
                .filter(|o| {
                    o.price <= bid.monthly_rent && o.owner != bid.household && !let_out.contains(&o.house)
                })
                .min_by(|a, b| a.price.total_cmp(&b.price))
                .cloned();
            if let Some(offer) = listing {
                let rental = RentalCompletion {
                    house: offer.house,
                    quality: offer.quality,
                    monthly_rent: offer.price,
                    tenant: bid.household,
                    landlord: offer.owner,
                };
                let_out.insert(offer.house);
                orchestrator.complete_rental(&rental, stats, book)?;
                cleared.lettings += 1;
            }
        }

        book.clear_bids();
        Ok(cleared)
    }
}
