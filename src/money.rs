//! Money Module
//!
//! All amounts are carried as `i64` minor units. Catalog prices, price
//! snapshots, invoice totals and the gateway amount field share the same
//! scale, so no conversion happens inside the core.
//!
//! Arithmetic is checked: an overflow is an error, never a wrap.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::booking::pricing::PricingError;

/// Amount in currency minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(units: i64) -> Self {
        Self(units)
    }

    #[inline]
    pub fn minor_units(&self) -> i64 {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, rhs: Money) -> Result<Money, PricingError> {
        self.0
            .checked_add(rhs.0)
            .map(Money)
            .ok_or(PricingError::Overflow)
    }

    /// Unit price times a count (nights or service quantity).
    pub fn checked_mul(self, count: u32) -> Result<Money, PricingError> {
        self.0
            .checked_mul(i64::from(count))
            .map(Money)
            .ok_or(PricingError::Overflow)
    }
}

impl From<i64> for Money {
    fn from(units: i64) -> Self {
        Self(units)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Money {
    type Err = std::num::ParseIntError;

    /// Parses the gateway's decimal minor-unit string ("1400").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Money)
    }
}
