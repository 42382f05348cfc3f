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

//! Amounts
//!
//! Signed asset quantities, exact decimals. Positive amounts are
//! inflows, negative amounts are outflows. In general, any use of a
//! bare `Decimal` for a quantity is a code smell and should be
//! replaced by this type.
//!

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{cmp, fmt, iter, ops, str};

/// A signed quantity of some asset
#[derive(
    Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    /// The zero amount
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    /// Accessor for the underlying decimal
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// The absolute value of an amount
    pub fn abs(&self) -> Amount {
        Amount(self.0.abs())
    }

    /// Whether this is a positive number
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Whether this is a negative number
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Whether this is a nonzero number
    pub fn is_nonzero(&self) -> bool {
        !self.0.is_zero()
    }

    /// Whether this represents zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Whether this has the same sign as some other amount
    ///
    /// Considers 0 to be the same as either sign.
    pub fn has_same_sign(&self, other: Amount) -> bool {
        if self.is_zero() || other.is_zero() {
            true
        } else {
            self.is_positive() == other.is_positive()
        }
    }

    /// The smaller of two amounts
    pub fn min(&self, other: Amount) -> Amount {
        Amount(cmp::min(self.0, other.0))
    }
}

impl From<Decimal> for Amount {
    fn from(d: Decimal) -> Amount {
        Amount(d)
    }
}

impl str::FromStr for Amount {
    type Err = rust_decimal::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        str::FromStr::from_str(s).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl ops::Neg for Amount {
    type Output = Amount;
    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl ops::Add for Amount {
    type Output = Amount;
    fn add(self, other: Amount) -> Amount {
        Amount(self.0 + other.0)
    }
}

impl ops::Sub for Amount {
    type Output = Amount;
    fn sub(self, other: Amount) -> Amount {
        Amount(self.0 - other.0)
    }
}

impl ops::AddAssign for Amount {
    fn add_assign(&mut self, other: Amount) {
        self.0 += other.0;
    }
}

impl ops::SubAssign for Amount {
    fn sub_assign(&mut self, other: Amount) {
        self.0 -= other.0;
    }
}

impl ops::Div for Amount {
    type Output = Decimal;
    fn div(self, other: Amount) -> Decimal {
        self.0 / other.0
    }
}

impl iter::Sum for Amount {
    fn sum<I>(iter: I) -> Self
    where
        I: Iterator<Item = Self>,
    {
        iter.fold(Amount::ZERO, |acc, n| acc + n)
    }
}

/// Construct an amount from a decimal expression, e.g. amt!(1.5) or amt!(-2)
#[macro_export]
macro_rules! amt {
    ($num:expr) => {
        $num.to_string().parse::<$crate::units::Amount>().unwrap()
    };
}
