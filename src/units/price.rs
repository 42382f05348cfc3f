// Basis Tracker
// Written in 2025 by
//   the Basis Tracker developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the CC0 Public Domain Dedication
// along with this software.
// If not, see <http://creativecommons.org/publicdomain/zero/1.0/>.
//

//! Price
//!
//! Values denominated in the reporting currency. A `Price` is used both
//! for per-unit prices and for totals (basis, proceeds, gain); the
//! distinction lives in field names, not in the type.
//!

use crate::units::Amount;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, iter, ops, str};

/// A value in the reporting currency
#[derive(
    Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// The zero price
    pub const ZERO: Price = Price(Decimal::ZERO);

    /// Accessor for the underlying decimal
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Price {
        Price(d)
    }
}

impl str::FromStr for Price {
    type Err = rust_decimal::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        str::FromStr::from_str(s).map(Price)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl ops::Add for Price {
    type Output = Price;
    fn add(self, other: Price) -> Price {
        Price(self.0 + other.0)
    }
}

impl ops::Sub for Price {
    type Output = Price;
    fn sub(self, other: Price) -> Price {
        Price(self.0 - other.0)
    }
}

impl ops::Neg for Price {
    type Output = Price;
    fn neg(self) -> Price {
        Price(-self.0)
    }
}

impl ops::AddAssign for Price {
    fn add_assign(&mut self, other: Price) {
        self.0 += other.0;
    }
}

impl ops::Mul<Amount> for Price {
    type Output = Price;
    fn mul(self, other: Amount) -> Price {
        Price(self.0 * other.as_decimal())
    }
}

impl ops::Div<Amount> for Price {
    type Output = Price;
    fn div(self, other: Amount) -> Price {
        Price(self.0 / other.as_decimal())
    }
}

impl iter::Sum for Price {
    fn sum<I>(iter: I) -> Self
    where
        I: Iterator<Item = Self>,
    {
        iter.fold(Price::ZERO, |acc, n| acc + n)
    }
}

/// Construct a price from a decimal expression, e.g. price!(100.00) or price!(123)
#[macro_export]
macro_rules! price {
    ($num:expr) => {
        $num.to_string().parse::<$crate::units::Price>().unwrap()
    };
}
