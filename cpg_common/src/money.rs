use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

//--------------------------------------       Money         ---------------------------------------------------------

/// A monetary amount in minor units (cents, pence). The currency code lives on the record
/// carrying the amount, not here.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, AddAssign, add_assign);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

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
#[error("Value cannot be represented in minor units: {0}")]
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
            Err(MoneyConversionError(format!("Value {value} is too large for a minor-unit amount")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let units = (self.0 / 100).abs();
        let cents = (self.0 % 100).abs();
        write!(f, "{sign}{units}.{cents:02}")
    }
}

#[cfg(test)]
mod test {
    use super::Money;

    #[test]
    fn arithmetic() {
        let a = Money::from(1_250);
        let b = Money::from(750);
        assert_eq!(a + b, Money::from(2_000));
        assert_eq!(a - b, Money::from(500));
        assert_eq!(b * 2, Money::from(1_500));
        assert_eq!(-b, Money::from(-750));
        let total: Money = [a, b, b].into_iter().sum();
        assert_eq!(total, Money::from(2_750));
    }

    #[test]
    fn display_is_major_units() {
        assert_eq!(Money::from(1_250).to_string(), "12.50");
        assert_eq!(Money::from(5).to_string(), "0.05");
        assert_eq!(Money::from(-130).to_string(), "-1.30");
        // The sign must survive even when the major part is zero.
        assert_eq!(Money::from(-30).to_string(), "-0.30");
    }
}
