//! Rental contracts
//!
//! The tenant holds a [`RentalAgreement`] that counts down to the end of
//! the tenancy; the landlord holds a matching [`Letting`] on the owned
//! property. Rent is not transferred between balances directly: the tenant
//! pays it out of disposable income and the landlord books it as rental
//! income in their own step.

use serde::{Deserialize, Serialize};

use super::HouseholdId;

/// Tenant side of a tenancy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalAgreement {
    pub landlord: HouseholdId,
    pub monthly_rent: f64,
    /// Payments left before the tenancy ends
    pub n_payments: u32,
}

impl RentalAgreement {
    /// Pay one month of rent; zero once the tenancy has run out
    pub fn make_monthly_payment(&mut self) -> f64 {
        if self.n_payments == 0 {
            return 0.0;
        }
        self.n_payments -= 1;
        self.monthly_rent
    }

    pub fn has_expired(&self) -> bool {
        self.n_payments == 0
    }
}

/// Landlord side of a tenancy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Letting {
    pub tenant: HouseholdId,
    pub monthly_rent: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rental_countdown() {
        let mut agreement = RentalAgreement {
            landlord: HouseholdId(3),
            monthly_rent: 650.0,
            n_payments: 2,
        };
        assert_eq!(agreement.make_monthly_payment(), 650.0);
        assert!(!agreement.has_expired());
        assert_eq!(agreement.make_monthly_payment(), 650.0);
        assert!(agreement.has_expired());
        assert_eq!(agreement.make_monthly_payment(), 0.0);
    }
}
