//! Value objects shared across the order, stock, wallet and coupon aggregates.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Money value object. Single implicit currency (INR); amounts carry two
/// decimal places.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub fn new(amount: Decimal) -> Self {
        Self(amount.round_dp(2))
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Whole-rupee constructor, mostly useful in tests and config defaults.
    pub fn rupees(amount: i64) -> Self {
        Self(Decimal::from(amount))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn add(&self, other: Money) -> Money {
        Money::new(self.0 + other.0)
    }

    pub fn subtract(&self, other: Money) -> Money {
        Money::new(self.0 - other.0)
    }

    pub fn times(&self, qty: u32) -> Money {
        Money::new(self.0 * Decimal::from(qty))
    }

    /// `percentage` percent of this amount, e.g. `Money::rupees(500).percent(10) == 50`.
    pub fn percent(&self, percentage: Decimal) -> Money {
        Money::new(self.0 * percentage / Decimal::from(100))
    }

    pub fn min(&self, other: Money) -> Money {
        if self.0 <= other.0 {
            *self
        } else {
            other
        }
    }

    /// Magnitude of the amount, used when logging a ledger correction.
    pub fn abs(&self) -> Money {
        Money::new(self.0.abs())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "₹{}", self.0)
    }
}

/// Quantity value object for stock counts; subtraction is checked so a
/// reservation can never drive a count negative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn add(&self, other: u32) -> Self {
        Self(self.0.saturating_add(other))
    }

    pub fn checked_sub(&self, other: u32) -> Option<Self> {
        if other > self.0 {
            None
        } else {
            Some(Self(self.0 - other))
        }
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_arithmetic() {
        let a = Money::rupees(100);
        let b = Money::rupees(50);
        assert_eq!(a.add(b), Money::rupees(150));
        assert_eq!(a.subtract(b), Money::rupees(50));
        assert_eq!(b.times(3), Money::rupees(150));
    }

    #[test]
    fn test_money_percent() {
        assert_eq!(Money::rupees(500).percent(Decimal::from(10)), Money::rupees(50));
    }

    #[test]
    fn test_quantity_checked_sub() {
        let q = Quantity::new(3);
        assert_eq!(q.checked_sub(2), Some(Quantity::new(1)));
        assert_eq!(q.checked_sub(4), None);
    }
}
