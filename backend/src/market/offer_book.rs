//! In-memory order book
//!
//! Collects the bids and offers households place during a month. It does
//! not clear anything: a matching engine (or a test) reads the bids, decides
//! the trades and reports them back through the orchestrator.

use serde::Serialize;
use std::collections::BTreeMap;

use super::HousingMarket;
use crate::models::{HouseId, HouseholdId};

/// Bid on the sale market
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bid {
    pub household: HouseholdId,
    pub price: f64,
    pub buy_to_let: bool,
}

/// Bid on the rental market
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RentalBid {
    pub household: HouseholdId,
    pub monthly_rent: f64,
}

/// Listing of a house on either market
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferSnapshot {
    pub house: HouseId,
    pub quality: usize,
    pub owner: HouseholdId,
    pub price: f64,
    pub listed_month: u32,
}

/// Bids of the current month plus standing offers
#[derive(Debug, Clone, Default)]
pub struct OfferBook {
    sale_bids: Vec<Bid>,
    rental_bids: Vec<RentalBid>,
    sale_offers: BTreeMap<HouseId, OfferSnapshot>,
    rental_offers: BTreeMap<HouseId, OfferSnapshot>,
}

impl OfferBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sale_bids(&self) -> &[Bid] {
        &self.sale_bids
    }

    pub fn rental_bids(&self) -> &[RentalBid] {
        &self.rental_bids
    }

    pub fn sale_offers(&self) -> impl Iterator<Item = &OfferSnapshot> {
        self.sale_offers.values()
    }

    pub fn rental_offers(&self) -> impl Iterator<Item = &OfferSnapshot> {
        self.rental_offers.values()
    }

    /// Drop this month's bids; offers stay listed
    pub fn clear_bids(&mut self) {
        self.sale_bids.clear();
        self.rental_bids.clear();
    }
}

impl HousingMarket for OfferBook {
    fn bid_for_house(&mut self, household: HouseholdId, price: f64, buy_to_let: bool) {
        self.sale_bids.push(Bid {
            household,
            price,
            buy_to_let,
        });
    }

    fn bid_for_rental(&mut self, household: HouseholdId, monthly_rent: f64) {
        self.rental_bids.push(RentalBid {
            household,
            monthly_rent,
        });
    }

    fn offer_for_sale(
        &mut self,
        house: HouseId,
        quality: usize,
        seller: HouseholdId,
        price: f64,
        month: u32,
    ) {
        self.sale_offers.insert(
            house,
            OfferSnapshot {
                house,
                quality,
                owner: seller,
                price,
                listed_month: month,
            },
        );
    }

    fn offer_for_rent(
        &mut self,
        house: HouseId,
        quality: usize,
        landlord: HouseholdId,
        monthly_rent: f64,
        month: u32,
    ) {
        self.rental_offers.insert(
            house,
            OfferSnapshot {
                house,
                quality,
                owner: landlord,
                price: monthly_rent,
                listed_month: month,
            },
        );
    }

    fn sale_offer(&self, house: HouseId) -> Option<OfferSnapshot> {
        self.sale_offers.get(&house).cloned()
    }

    fn rental_offer(&self, house: HouseId) -> Option<OfferSnapshot> {
        self.rental_offers.get(&house).cloned()
    }

    fn update_sale_offer(&mut self, house: HouseId, price: f64) {
        if let Some(offer) = self.sale_offers.get_mut(&house) {
            offer.price = price;
        }
    }

    fn update_rental_offer(&mut self, house: HouseId, monthly_rent: f64) {
        if let Some(offer) = self.rental_offers.get_mut(&house) {
            offer.price = monthly_rent;
        }
    }

    fn remove_sale_offer(&mut self, house: HouseId) {
        self.sale_offers.remove(&house);
    }

    fn remove_rental_offer(&mut self, house: HouseId) {
        self.rental_offers.remove(&house);
    }
}
