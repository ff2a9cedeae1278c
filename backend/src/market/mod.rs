//! Interfaces to the housing and rental markets
//!
//! Market clearing lives outside this crate. The core reads aggregate
//! statistics through [`MarketStatistics`] and talks to the matching
//! engines through [`HousingMarket`]: it places bids and offers, revises
//! or withdraws offers, and is told about completed transactions through
//! the orchestrator's completion methods.

mod offer_book;
mod snapshot;

pub use offer_book::{Bid, OfferBook, OfferSnapshot, RentalBid};
pub use snapshot::MarketSnapshot;

use crate::models::{HouseId, HouseholdId};

/// Read-only market indicators (exponential moving averages and HPAs)
pub trait MarketStatistics {
    /// Exp-avg sale price of houses of `quality`
    fn exp_av_sale_price(&self, quality: usize) -> f64;

    /// Exp-avg monthly rent of houses of `quality`
    fn exp_av_rent(&self, quality: usize) -> f64;

    /// Exp-avg gross rental yield across the stock (annual)
    fn exp_av_flow_yield(&self) -> f64;

    /// Average fraction of the year a let house of `quality` is occupied
    fn av_occupancy(&self, quality: usize) -> f64;

    /// Quarter-on-quarter house price growth
    fn qoq_house_price_growth(&self) -> f64;

    /// Year-on-year house price appreciation
    fn annual_hpa(&self) -> f64;

    /// Long-run annualised house price appreciation
    fn long_term_hpa(&self) -> f64;

    /// House price index level
    fn hpi(&self) -> f64;

    /// Best quality whose exp-avg price is within `price`; none if even the
    /// lowest quality is unaffordable
    fn max_quality_for_price(&self, price: f64) -> Option<usize>;
}

/// Order-entry port of the sale and rental markets
pub trait HousingMarket {
    fn bid_for_house(&mut self, household: HouseholdId, price: f64, buy_to_let: bool);

    fn bid_for_rental(&mut self, household: HouseholdId, monthly_rent: f64);

    fn offer_for_sale(
        &mut self,
        house: HouseId,
        quality: usize,
        seller: HouseholdId,
        price: f64,
        month: u32,
    );

    fn offer_for_rent(
        &mut self,
        house: HouseId,
        quality: usize,
        landlord: HouseholdId,
        monthly_rent: f64,
        month: u32,
    );

    /// Current sale listing of `house`, if listed
    fn sale_offer(&self, house: HouseId) -> Option<OfferSnapshot>;

    /// Current rental listing of `house`, if listed
    fn rental_offer(&self, house: HouseId) -> Option<OfferSnapshot>;

    fn update_sale_offer(&mut self, house: HouseId, price: f64);

    fn update_rental_offer(&mut self, house: HouseId, monthly_rent: f64);

    fn remove_sale_offer(&mut self, house: HouseId);

    fn remove_rental_offer(&mut self, house: HouseId);
}
