//! Housing decisions and transaction completion
//!
//! Decisions run inside the monthly step: repricing and listing owned
//! houses, then bidding on the sale or rental market. Completions are
//! driven by the orchestrator when a market reports a matched trade.

use log::warn;

use super::{Holding, Household, HouseholdError, HousingNotice, OwnedProperty, ResidualDebt, Services, StepContext};
use crate::bank::{LoanPurpose, LoanRequest};
use crate::behaviour::{DownPaymentInput, InvestmentProperty, InvestorPosition};
use crate::collectors::CreditCollector;
use crate::core::time::MONTHS_IN_YEAR;
use crate::models::{Event, HouseId, HouseholdId, Letting, RentalAgreement};

impl Household {
    pub(super) fn make_housing_decisions(
        &mut self,
        ctx: &StepContext<'_>,
        svc: &mut Services<'_>,
    ) -> Result<(), HouseholdError> {
        let houses: Vec<HouseId> = self.owned().map(|(house, _)| house).collect();
        for house in houses {
            self.manage_house(house, ctx, svc)?;
        }

        if self.is_in_social_housing() {
            self.bid_for_a_home(ctx, svc)?;
        } else if let Some(expired) = self.tenancy().map(|(_, agreement)| agreement.has_expired()) {
            if expired {
                self.end_tenancy(ctx, svc);
                self.bid_for_a_home(ctx, svc)?;
            }
        } else if self.behaviour.is_property_investor() {
            self.consider_investment_purchase(ctx, svc)?;
        }
        Ok(())
    }

    fn owned_property(&self, house: HouseId) -> Result<&OwnedProperty, HouseholdError> {
        match self.holdings.get(&house) {
            Some(Holding::Owned(property)) => Ok(property),
            Some(Holding::Tenancy { .. }) => Err(HouseholdError::HouseNotOwned { household: self.id, house }),
            None => Err(HouseholdError::UnknownHouse { household: self.id, house }),
        }
    }

    fn principal_on(&self, property: &OwnedProperty, svc: &Services<'_>) -> Result<f64, HouseholdError> {
        Ok(match property.mortgage {
            Some(id) => svc.bank.mortgage(id)?.principal(),
            None => 0.0,
        })
    }

    /// Reprice or list one owned house
    fn manage_house(&mut self, house: HouseId, ctx: &StepContext<'_>, svc: &mut Services<'_>) -> Result<(), HouseholdError> {
        let behaviour = ctx.behaviour();
        let property = self.owned_property(house)?.clone();
        let principal = self.principal_on(&property, svc)?;

        if let Some(offer) = svc.market.sale_offer(house) {
            if offer.listed_month < ctx.month {
                let price = behaviour.rethink_sale_price(offer.price, svc.rng);
                if price > principal {
                    svc.market.update_sale_offer(house, price);
                    if self.behaviour.is_property_investor()
                        && Some(house) != self.home
                        && !self.decide_to_sell(house, &property, ctx, svc)?
                    {
                        svc.market.remove_sale_offer(house);
                    }
                } else {
                    svc.market.remove_sale_offer(house);
                    if Some(house) != self.home
                        && property.letting.is_none()
                        && svc.market.rental_offer(house).is_none()
                    {
                        self.offer_for_rent(house, property.quality, ctx, svc);
                    }
                }
            }
        } else if self.decide_to_sell(house, &property, ctx, svc)? {
            let price = behaviour.initial_sale_price(property.quality, principal, ctx.stats, svc.rng);
            svc.market.offer_for_sale(house, property.quality, self.id, price, ctx.month);
        }

        if let Some(offer) = svc.market.rental_offer(house) {
            if offer.listed_month < ctx.month {
                svc.market.update_rental_offer(house, behaviour.rethink_rent(offer.price));
            }
        }
        Ok(())
    }

    fn decide_to_sell(
        &self,
        house: HouseId,
        property: &OwnedProperty,
        ctx: &StepContext<'_>,
        svc: &mut Services<'_>,
    ) -> Result<bool, HouseholdError> {
        let behaviour = ctx.behaviour();
        if Some(house) == self.home {
            return Ok(behaviour.decide_to_sell_home(&self.behaviour, svc.rng));
        }
        let next_payment = match property.mortgage {
            Some(id) => svc.bank.mortgage(id)?.next_payment(),
            None => 0.0,
        };
        let investment = InvestmentProperty {
            n_properties: self.n_properties(),
            quality: property.quality,
            principal: self.principal_on(property, svc)?,
            next_payment,
            rental_offer: svc.market.rental_offer(house).map(|offer| offer.price),
        };
        Ok(behaviour.decide_to_sell_investment_property(&self.behaviour, &investment, ctx.stats, svc.rng))
    }

    fn offer_for_rent(&self, house: HouseId, quality: usize, ctx: &StepContext<'_>, svc: &mut Services<'_>) {
        let rent = ctx.behaviour().initial_rent(quality, ctx.stats, svc.rng);
        svc.market.offer_for_rent(house, quality, self.id, rent, ctx.month);
    }

    fn offer_for_sale(
        &self,
        house: HouseId,
        quality: usize,
        principal: f64,
        ctx: &StepContext<'_>,
        svc: &mut Services<'_>,
    ) {
        let price = ctx.behaviour().initial_sale_price(quality, principal, ctx.stats, svc.rng);
        svc.market.offer_for_sale(house, quality, self.id, price, ctx.month);
    }

    fn down_payment_input(&self) -> DownPaymentInput {
        DownPaymentInput {
            bank_balance: self.bank_balance,
            is_first_time_buyer: self.is_first_time_buyer,
            income_percentile: self.income_percentile,
        }
    }

    /// Bid for a home to buy, or for a rental if buying is not worth it
    fn bid_for_a_home(&mut self, ctx: &StepContext<'_>, svc: &mut Services<'_>) -> Result<(), HouseholdError> {
        let behaviour = ctx.behaviour();
        let credit = ctx.credit();
        let profile = self.borrower_profile(ctx.env, ctx.stats, svc.bank)?;
        let desired = behaviour.desired_purchase_price(self.annual_gross_employment_income, ctx.stats, svc.rng);
        let max_price = svc.bank.max_purchase_price(&profile, LoanPurpose::Home, &credit)?;
        let price = desired.min(max_price);

        let traits = self.behaviour;
        let buyer = self.down_payment_input();
        let bank = &*svc.bank;
        let buy = behaviour.decide_rent_or_purchase(&traits, price, ctx.stats, svc.rng, |rng| {
            let down_payment = behaviour.decide_down_payment(&traits, &buyer, price, ctx.stats, rng);
            let request = LoanRequest {
                price,
                desired_down_payment: down_payment,
                purpose: LoanPurpose::Home,
            };
            bank.request_approval(&profile, &request, &credit)
                .map(|approval| approval.monthly_payment)
        })?;

        if buy && price > 0.0 {
            svc.market.bid_for_house(self.id, price, false);
        } else {
            let rent = behaviour.desired_rent(self.monthly_gross_employment_income());
            svc.market.bid_for_rental(self.id, rent);
        }
        Ok(())
    }

    /// Investors with a home may bid for another property
    fn consider_investment_purchase(&mut self, ctx: &StepContext<'_>, svc: &mut Services<'_>) -> Result<(), HouseholdError> {
        let credit = ctx.credit();
        let profile = self.borrower_profile(ctx.env, ctx.stats, svc.bank)?;
        let max_price = svc.bank.max_purchase_price(&profile, LoanPurpose::BuyToLet, &credit)?;
        let position = InvestorPosition {
            monthly_payments: self.monthly_payments(svc.bank)?,
            monthly_net_total_income: self.flows.net_total_income(),
            bank_balance: self.bank_balance,
            annual_gross_total_income: self.flows.gross_total_income() * MONTHS_IN_YEAR as f64,
            max_price,
        };
        let bank = &*svc.bank;
        let buy = ctx.behaviour().decide_to_buy_investment_property(
            &self.behaviour,
            &position,
            ctx.stats,
            svc.rng,
            |price| {
                let request = LoanRequest {
                    price,
                    desired_down_payment: 0.0,
                    purpose: LoanPurpose::BuyToLet,
                };
                bank.request_approval(&profile, &request, &credit)
            },
        )?;
        if buy && max_price > 0.0 {
            svc.market.bid_for_house(self.id, max_price, true);
        }
        Ok(())
    }

    /// Leave the rented home and tell the landlord
    fn end_tenancy(&mut self, ctx: &StepContext<'_>, svc: &mut Services<'_>) {
        let Some((house, agreement)) = self.tenancy() else {
            return;
        };
        let landlord = agreement.landlord;
        self.holdings.remove(&house);
        self.home = None;
        svc.notices.push(HousingNotice::TenancyEnded {
            landlord,
            tenant: self.id,
            house,
        });
        svc.events.log(Event::TenancyEnded {
            month: ctx.month,
            tenant: self.id,
            landlord,
            house,
        });
    }

    // ========================================================================
    // Completions
    // ========================================================================

    /// Settle a purchase matched by the sale market
    ///
    /// Renters give notice first, so a purchase by anyone without an owned
    /// home is a home purchase and everything else is buy-to-let.
    pub fn complete_house_purchase(
        &mut self,
        house: HouseId,
        quality: usize,
        price: f64,
        ctx: &StepContext<'_>,
        svc: &mut Services<'_>,
        collector: &mut dyn CreditCollector,
    ) -> Result<(), HouseholdError> {
        if self.holdings.contains_key(&house) {
            return Err(HouseholdError::HouseAlreadyHeld { household: self.id, house });
        }
        if self.is_renting() {
            self.end_tenancy(ctx, svc);
        }
        let purpose = if self.home.is_none() {
            LoanPurpose::Home
        } else {
            LoanPurpose::BuyToLet
        };
        let profile = self.borrower_profile(ctx.env, ctx.stats, svc.bank)?;
        let desired_down_payment = ctx.behaviour().decide_down_payment(
            &self.behaviour,
            &self.down_payment_input(),
            price,
            ctx.stats,
            svc.rng,
        );
        let request = LoanRequest {
            price,
            desired_down_payment,
            purpose,
        };
        let outcome = svc.bank.request_loan(&profile, &request, house, &ctx.credit(), collector, svc.events)?;

        let down_payment = outcome.approval.down_payment;
        self.bank_balance -= down_payment;
        self.pending_settlements.net_house_transaction_revenue -= down_payment;
        self.pending_settlements.new_credit += outcome.approval.principal;
        self.holdings.insert(
            house,
            Holding::Owned(OwnedProperty {
                quality,
                mortgage: outcome.mortgage,
                purchase_price: price,
                letting: None,
            }),
        );
        if purpose.is_home() {
            self.home = Some(house);
        } else {
            self.offer_for_rent(house, quality, ctx, svc);
        }
        self.is_first_time_buyer = false;
        Ok(())
    }

    /// Settle a sale matched by the sale market
    ///
    /// Proceeds pay down the mortgage on the house; any shortfall stays on
    /// the books as residual debt. Returns the residual principal.
    pub fn complete_house_sale(
        &mut self,
        house: HouseId,
        price: f64,
        ctx: &StepContext<'_>,
        svc: &mut Services<'_>,
    ) -> Result<f64, HouseholdError> {
        let property = self.owned_property(house)?.clone();
        self.bank_balance += price;
        self.pending_settlements.net_house_transaction_revenue += price;

        let mut residual_debt = 0.0;
        if let Some(mortgage) = property.mortgage {
            let paid = svc.bank.payoff(mortgage, self.bank_balance)?;
            self.bank_balance -= paid;
            let remaining = svc.bank.mortgage(mortgage)?;
            if remaining.is_extinguished() {
                svc.bank.end_mortgage_contract(mortgage)?;
            } else {
                residual_debt = remaining.principal();
                self.residual_debts.push(ResidualDebt { house, mortgage });
            }
        }

        self.holdings.remove(&house);
        svc.market.remove_sale_offer(house);
        svc.market.remove_rental_offer(house);
        if self.home == Some(house) {
            self.home = None;
        } else if let Some(letting) = property.letting {
            self.evict(letting.tenant, house, ctx, svc);
        }

        svc.events.log(Event::HouseSold {
            month: ctx.month,
            seller: self.id,
            house,
            price,
            residual_debt,
        });
        Ok(residual_debt)
    }

    fn evict(&self, tenant: HouseholdId, house: HouseId, ctx: &StepContext<'_>, svc: &mut Services<'_>) {
        svc.notices.push(HousingNotice::TenantEvicted { tenant, house });
        svc.events.log(Event::TenantEvicted {
            month: ctx.month,
            tenant,
            house,
        });
    }

    /// Move into a rental matched by the rental market
    pub fn start_tenancy(
        &mut self,
        house: HouseId,
        quality: usize,
        landlord: HouseholdId,
        monthly_rent: f64,
        ctx: &StepContext<'_>,
        svc: &mut Services<'_>,
    ) -> Result<(), HouseholdError> {
        if self.home.is_some() {
            return Err(HouseholdError::AlreadyHoused { household: self.id, house });
        }
        if self.holdings.contains_key(&house) {
            return Err(HouseholdError::HouseAlreadyHeld { household: self.id, house });
        }
        let config = &ctx.env.config;
        let epsilon = i64::from(config.tenancy_length_epsilon);
        let length = i64::from(config.tenancy_length_average) + svc.rng.next_int_inclusive(-epsilon, epsilon);
        let agreement = RentalAgreement {
            landlord,
            monthly_rent,
            n_payments: length.max(1) as u32,
        };
        self.holdings.insert(house, Holding::Tenancy { quality, agreement });
        self.home = Some(house);
        Ok(())
    }

    /// Landlord side of a new tenancy
    pub fn let_house(
        &mut self,
        house: HouseId,
        tenant: HouseholdId,
        monthly_rent: f64,
        svc: &mut Services<'_>,
    ) -> Result<(), HouseholdError> {
        if self.home == Some(house) {
            return Err(HouseholdError::HouseAlreadyHeld { household: self.id, house });
        }
        let household = self.id;
        match self.holdings.get_mut(&house) {
            Some(Holding::Owned(property)) => {
                property.letting = Some(Letting { tenant, monthly_rent });
            }
            Some(Holding::Tenancy { .. }) => return Err(HouseholdError::HouseNotOwned { household, house }),
            None => return Err(HouseholdError::UnknownHouse { household, house }),
        }
        svc.market.remove_rental_offer(house);
        Ok(())
    }

    /// The tenant of `house` left: put it back on the rental market
    pub fn end_of_letting(&mut self, house: HouseId, ctx: &StepContext<'_>, svc: &mut Services<'_>) -> Result<(), HouseholdError> {
        let household = self.id;
        let quality = match self.holdings.get_mut(&house) {
            Some(Holding::Owned(property)) => {
                property.letting = None;
                property.quality
            }
            Some(Holding::Tenancy { .. }) => return Err(HouseholdError::HouseNotOwned { household, house }),
            None => return Err(HouseholdError::UnknownHouse { household, house }),
        };
        self.offer_for_rent(house, quality, ctx, svc);
        Ok(())
    }

    /// The landlord of `house` sold or died
    pub fn evicted(&mut self, house: HouseId) {
        match self.holdings.get(&house) {
            Some(Holding::Tenancy { .. }) => {
                self.holdings.remove(&house);
                if self.home == Some(house) {
                    self.home = None;
                }
            }
            _ => warn!("{} got an eviction notice for {} it does not rent", self.id, house),
        }
    }

    // ========================================================================
    // Inheritance
    // ========================================================================

    /// Hand the whole estate to `beneficiary`
    ///
    /// Houses pass unencumbered. Mortgages are settled from the balance and
    /// whatever the balance cannot cover is written off.
    pub fn transfer_all_wealth_to(
        self,
        beneficiary: &mut Household,
        ctx: &StepContext<'_>,
        svc: &mut Services<'_>,
    ) -> Result<(), HouseholdError> {
        let mut balance = self.bank_balance;
        // An heir renting from the deceased moves out before inheriting
        for (house, holding) in &self.holdings {
            if let Holding::Owned(OwnedProperty { letting: Some(letting), .. }) = holding {
                if letting.tenant == beneficiary.id {
                    beneficiary.evicted(*house);
                }
            }
        }
        for (house, holding) in &self.holdings {
            match holding {
                Holding::Owned(property) => {
                    svc.market.remove_sale_offer(*house);
                    svc.market.remove_rental_offer(*house);
                    if let Some(letting) = &property.letting {
                        if letting.tenant != beneficiary.id {
                            self.evict(letting.tenant, *house, ctx, svc);
                        }
                    }
                    beneficiary.inherit_house(*house, property.quality, property.purchase_price, ctx, svc)?;
                }
                Holding::Tenancy { agreement, .. } => {
                    svc.notices.push(HousingNotice::TenancyEnded {
                        landlord: agreement.landlord,
                        tenant: self.id,
                        house: *house,
                    });
                    svc.events.log(Event::TenancyEnded {
                        month: ctx.month,
                        tenant: self.id,
                        landlord: agreement.landlord,
                        house: *house,
                    });
                }
            }
        }

        for mortgage in self.mortgages() {
            let (repaid, written_off) = svc.bank.settle_estate(mortgage, balance)?;
            balance -= repaid;
            if written_off > 0.0 {
                svc.events.log(Event::DebtWrittenOff {
                    month: ctx.month,
                    deceased: self.id,
                    beneficiary: beneficiary.id,
                    mortgage,
                    amount: written_off,
                });
            }
        }
        beneficiary.bank_balance += balance.max(0.0);
        Ok(())
    }

    /// Receive a house from an estate
    ///
    /// Households without an owned home move in. Investors keep or sell by
    /// their usual rule and let the house; others sell and let it meanwhile.
    pub fn inherit_house(
        &mut self,
        house: HouseId,
        quality: usize,
        purchase_price: f64,
        ctx: &StepContext<'_>,
        svc: &mut Services<'_>,
    ) -> Result<(), HouseholdError> {
        if matches!(self.holdings.get(&house), Some(Holding::Owned(_))) {
            return Err(HouseholdError::HouseAlreadyHeld { household: self.id, house });
        }
        let property = OwnedProperty {
            quality,
            mortgage: None,
            purchase_price,
            letting: None,
        };

        if !self.is_homeowner() {
            if self.is_renting() {
                self.end_tenancy(ctx, svc);
            }
            self.holdings.insert(house, Holding::Owned(property));
            self.home = Some(house);
            self.is_first_time_buyer = false;
            return Ok(());
        }

        self.holdings.insert(house, Holding::Owned(property.clone()));
        if self.behaviour.is_property_investor() {
            if self.decide_to_sell(house, &property, ctx, svc)? {
                self.offer_for_sale(house, quality, 0.0, ctx, svc);
            }
        } else {
            self.offer_for_sale(house, quality, 0.0, ctx, svc);
        }
        self.offer_for_rent(house, quality, ctx, svc);
        Ok(())
    }
}
