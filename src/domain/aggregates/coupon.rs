//! Coupon Aggregate
//!
//! Tracks a code's usage count against its limit and expiry, independent of
//! any single order.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::Money;
use crate::error::DomainError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Coupon {
    pub(crate) code: String,
    pub(crate) discount_percentage: Decimal,
    pub(crate) expiration_date: Option<DateTime<Utc>>,
    pub(crate) usage_limit: u32,
    pub(crate) used_count: u32,
    pub(crate) is_active: bool,
    pub(crate) min_order_value: Money,
    pub(crate) max_discount_amount: Option<Money>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl Coupon {
    pub fn new(code: impl Into<String>, discount_percentage: Decimal, usage_limit: u32) -> Self {
        let now = Utc::now();
        Self {
            code: code.into().trim().to_uppercase(),
            discount_percentage,
            expiration_date: None,
            usage_limit,
            used_count: 0,
            is_active: true,
            min_order_value: Money::zero(),
            max_discount_amount: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn expires(mut self, at: DateTime<Utc>) -> Self {
        self.expiration_date = Some(at);
        self
    }

    pub fn capped_at(mut self, cap: Money) -> Self {
        self.max_discount_amount = Some(cap);
        self
    }

    pub fn min_order(mut self, min: Money) -> Self {
        self.min_order_value = min;
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }
    pub fn used_count(&self) -> u32 {
        self.used_count
    }
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|at| at < now)
    }

    pub fn is_exhausted(&self) -> bool {
        self.used_count >= self.usage_limit
    }

    /// Validates the coupon against an order total and computes the capped
    /// discount. Does not record the use; callers pair this with
    /// [`Coupon::record_use`] inside the same transaction.
    pub fn discount_for(&self, order_total: Money, now: DateTime<Utc>) -> Result<Money, DomainError> {
        if !self.is_active {
            return Err(DomainError::NotFound("coupon"));
        }
        if self.is_expired(now) {
            return Err(DomainError::LimitExceeded(format!("coupon {} has expired", self.code)));
        }
        if self.is_exhausted() {
            return Err(DomainError::LimitExceeded(format!(
                "coupon {} has reached its usage limit",
                self.code
            )));
        }
        if order_total < self.min_order_value {
            return Err(DomainError::precondition(format!(
                "order total is below the {} minimum for coupon {}",
                self.min_order_value, self.code
            )));
        }
        let discount = order_total.percent(self.discount_percentage);
        Ok(match self.max_discount_amount {
            Some(cap) => discount.min(cap),
            None => discount,
        })
    }

    pub fn record_use(&mut self) {
        self.used_count += 1;
        self.touch();
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_discount_capped() {
        let coupon = Coupon::new("save10", Decimal::from(10), 100).capped_at(Money::rupees(40));
        let d = coupon.discount_for(Money::rupees(500), Utc::now()).unwrap();
        assert_eq!(d, Money::rupees(40));
    }

    #[test]
    fn test_discount_uncapped() {
        let coupon = Coupon::new("SAVE10", Decimal::from(10), 100);
        let d = coupon.discount_for(Money::rupees(300), Utc::now()).unwrap();
        assert_eq!(d, Money::rupees(30));
    }

    #[test]
    fn test_exhausted_coupon() {
        let mut coupon = Coupon::new("ONCE", Decimal::from(5), 1);
        coupon.record_use();
        let err = coupon.discount_for(Money::rupees(100), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::LimitExceeded(_)));
    }

    #[test]
    fn test_expired_coupon() {
        let coupon = Coupon::new("OLD", Decimal::from(5), 10).expires(Utc::now() - Duration::days(1));
        let err = coupon.discount_for(Money::rupees(100), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::LimitExceeded(_)));
    }

    #[test]
    fn test_min_order_value() {
        let coupon = Coupon::new("BIG", Decimal::from(5), 10).min_order(Money::rupees(1000));
        assert!(coupon.discount_for(Money::rupees(500), Utc::now()).is_err());
        assert!(coupon.discount_for(Money::rupees(1000), Utc::now()).is_ok());
    }

    #[test]
    fn test_inactive_coupon_reads_as_missing() {
        let mut coupon = Coupon::new("GONE", Decimal::from(5), 10);
        coupon.deactivate();
        assert_eq!(
            coupon.discount_for(Money::rupees(100), Utc::now()).unwrap_err(),
            DomainError::NotFound("coupon")
        );
    }
}
