use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{StoreType, Usd};

#[derive(Debug, Clone, Error)]
pub enum CommissionError {
    #[error("Commission rate {0} must be at least zero and less than one")]
    RateOutOfRange(Decimal),
    #[error("Could not compute commission: {0}")]
    Arithmetic(String),
}

/// The platform's cut of a seller group's subtotal, by store type.
///
/// Rates are data, not code: the server loads them from configuration and hands them to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRates {
    general: Decimal,
    food: Decimal,
}

/// The split of one seller group's subtotal between the seller and the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionSplit {
    pub subtotal: Usd,
    pub commission: Usd,
    pub seller_net: Usd,
}

impl CommissionRates {
    pub fn new(general: Decimal, food: Decimal) -> Result<Self, CommissionError> {
        for rate in [general, food] {
            if rate.is_sign_negative() || rate >= Decimal::ONE {
                return Err(CommissionError::RateOutOfRange(rate));
            }
        }
        Ok(Self { general, food })
    }

    pub fn rate_for(&self, store_type: StoreType) -> Decimal {
        match store_type {
            StoreType::General => self.general,
            StoreType::Food => self.food,
        }
    }

    /// Splits `subtotal` into commission and seller net. The commission is rounded to the cent and the seller gets
    /// the remainder, so the two parts always add back up to the subtotal.
    pub fn split(&self, store_type: StoreType, subtotal: Usd) -> Result<CommissionSplit, CommissionError> {
        let commission =
            subtotal.mul_rate(self.rate_for(store_type)).map_err(|e| CommissionError::Arithmetic(e.to_string()))?;
        Ok(CommissionSplit { subtotal, commission, seller_net: subtotal - commission })
    }
}

#[cfg(test)]
mod test {
    use rust_decimal_macros::dec;

    use super::*;

    fn rates() -> CommissionRates {
        CommissionRates::new(dec!(0.10), dec!(0.15)).unwrap()
    }

    #[test]
    fn food_split() {
        let split = rates().split(StoreType::Food, Usd::from_dollars(50)).unwrap();
        assert_eq!(split.seller_net, Usd::from_cents(4250));
        assert_eq!(split.commission, Usd::from_cents(750));
    }

    #[test]
    fn splits_never_leak_cents() {
        let rates = CommissionRates::new(dec!(0.125), dec!(0.0725)).unwrap();
        for cents in [1, 3, 99, 101, 1999, 33333, 1_000_001] {
            for store in [StoreType::General, StoreType::Food] {
                let split = rates.split(store, Usd::from_cents(cents)).unwrap();
                assert_eq!(split.seller_net + split.commission, split.subtotal);
                assert!(!split.seller_net.cents().is_negative());
            }
        }
    }

    #[test]
    fn rejects_bad_rates() {
        assert!(CommissionRates::new(dec!(1.0), dec!(0.1)).is_err());
        assert!(CommissionRates::new(dec!(0.1), dec!(-0.01)).is_err());
        assert!(CommissionRates::new(dec!(0), dec!(0.99)).is_ok());
    }
}
