use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const USD_CURRENCY_CODE: &str = "USD";
pub const USD_CURRENCY_CODE_LOWER: &str = "usd";

const CENTS_PER_DOLLAR: i64 = 100;

//--------------------------------------        Usd        ---------------------------------------------------------
/// An amount of US dollars, held as a whole number of cents.
///
/// Every balance, ledger entry and transfer in the system uses this type, so the precision is fixed at two decimal
/// places. Fractional cents never enter the ledger: anything derived from a rate (commission, for example) goes
/// through [`Usd::mul_rate`], which rounds half away from zero.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize, Hash)]
#[sqlx(transparent)]
pub struct Usd(i64);

op!(binary Usd, Add, add);
op!(binary Usd, Sub, sub);
op!(inplace Usd, AddAssign, add_assign);
op!(inplace Usd, SubAssign, sub_assign);
op!(unary Usd, Neg, neg);

impl Sum for Usd {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl PartialEq for Usd {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Usd {}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in USD cents: {0}")]
pub struct UsdConversionError(String);

impl Usd {
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn from_dollars(dollars: i64) -> Self {
        Self(dollars * CENTS_PER_DOLLAR)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Multiplies the amount by a fractional rate, rounding the result to the nearest cent (half away from zero).
    pub fn mul_rate(&self, rate: Decimal) -> Result<Usd, UsdConversionError> {
        let product = self.to_decimal().checked_mul(rate).ok_or_else(|| {
            UsdConversionError(format!("{self} multiplied by {rate} overflows"))
        })?;
        let rounded = product.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Usd::try_from(rounded)
    }

    /// Returns the smaller of the two amounts.
    pub fn min(self, other: Usd) -> Usd {
        Usd(self.0.min(other.0))
    }
}

impl From<i64> for Usd {
    fn from(cents: i64) -> Self {
        Self(cents)
    }
}

impl TryFrom<Decimal> for Usd {
    type Error = UsdConversionError;

    /// Converts a dollar amount into cents. Values with sub-cent precision are rejected rather than rounded.
    fn try_from(dollars: Decimal) -> Result<Self, Self::Error> {
        let cents = dollars
            .checked_mul(Decimal::from(CENTS_PER_DOLLAR))
            .ok_or_else(|| UsdConversionError(format!("{dollars} is too large")))?;
        if cents.fract() != Decimal::ZERO {
            return Err(UsdConversionError(format!("{dollars} has more than two decimal places")));
        }
        cents.to_i64().map(Self).ok_or_else(|| UsdConversionError(format!("{dollars} is too large")))
    }
}

impl FromStr for Usd {
    type Err = UsdConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('$');
        let dollars = Decimal::from_str(trimmed).map_err(|e| UsdConversionError(format!("{s}: {e}")))?;
        Usd::try_from(dollars)
    }
}

impl Display for Usd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod test {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn display() {
        assert_eq!(Usd::from_cents(4250).to_string(), "$42.50");
        assert_eq!(Usd::from_cents(5).to_string(), "$0.05");
        assert_eq!(Usd::from_cents(-750).to_string(), "-$7.50");
        assert_eq!(Usd::default().to_string(), "$0.00");
    }

    #[test]
    fn parse_dollar_strings() {
        assert_eq!("42.50".parse::<Usd>().unwrap(), Usd::from_cents(4250));
        assert_eq!("$100".parse::<Usd>().unwrap(), Usd::from_dollars(100));
        assert_eq!(" 0.01 ".parse::<Usd>().unwrap(), Usd::from_cents(1));
        assert!("1.005".parse::<Usd>().is_err());
        assert!("ten dollars".parse::<Usd>().is_err());
    }

    #[test]
    fn sub_cent_decimals_are_rejected() {
        assert!(Usd::try_from(dec!(0.001)).is_err());
        assert_eq!(Usd::try_from(dec!(19.99)).unwrap(), Usd::from_cents(1999));
    }

    #[test]
    fn rate_multiplication_rounds_half_away_from_zero() {
        assert_eq!(Usd::from_dollars(50).mul_rate(dec!(0.15)).unwrap(), Usd::from_cents(750));
        // 0.99 * 0.125 = 0.12375 -> 0.12
        assert_eq!(Usd::from_cents(99).mul_rate(dec!(0.125)).unwrap(), Usd::from_cents(12));
        // 0.10 * 0.25 = 0.025 -> 0.03
        assert_eq!(Usd::from_cents(10).mul_rate(dec!(0.25)).unwrap(), Usd::from_cents(3));
    }

    #[test]
    fn arithmetic() {
        let mut a = Usd::from_dollars(10);
        a += Usd::from_cents(50);
        a -= Usd::from_cents(25);
        assert_eq!(a, Usd::from_cents(1025));
        assert_eq!(-a, Usd::from_cents(-1025));
        let total: Usd = vec![Usd::from_cents(1), Usd::from_cents(2), Usd::from_cents(3)].into_iter().sum();
        assert_eq!(total, Usd::from_cents(6));
    }

    #[test]
    fn serde_is_transparent_cents() {
        let json = serde_json::to_string(&Usd::from_cents(1234)).unwrap();
        assert_eq!(json, "1234");
    }
}
