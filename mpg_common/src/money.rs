use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

/// The currency assigned to wallets when the caller does not specify one.
pub const DEFAULT_CURRENCY_CODE: &str = "USD";

//--------------------------------------       Money        ----------------------------------------------------------
/// A monetary amount in minor units (cents). All ledger arithmetic is done in `Money` so that rounding never
/// happens inside the engine; conversion to display units is a formatting concern only.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a monetary amount: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {value} is too large to convert to Money")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let units = self.0 / 100;
        let cents = (self.0 % 100).abs();
        write!(f, "{units}.{cents:02}")
    }
}

impl Money {
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Construct an amount from whole currency units.
    pub fn from_units(units: i64) -> Self {
        Self(units * 100)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = Money::from(1_500);
        let b = Money::from(250);
        assert_eq!(a + b, Money::from(1_750));
        assert_eq!(a - b, Money::from(1_250));
        assert_eq!(-b, Money::from(-250));
        assert_eq!(b * 4, Money::from(1_000));
        let total: Money = [a, b, b].into_iter().sum();
        assert_eq!(total, Money::from(2_000));
    }

    #[test]
    fn display_in_major_units() {
        assert_eq!(Money::from(123_456).to_string(), "1234.56");
        assert_eq!(Money::from(5).to_string(), "0.05");
        assert_eq!(Money::from_units(100).to_string(), "100.00");
    }
}
