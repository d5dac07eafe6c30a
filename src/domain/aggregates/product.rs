//! Product Aggregate
//!
//! Only the stock-bearing side of the catalog lives in this core: the
//! available quantity is mutated exclusively through `reserve` and `restock`,
//! and soft-deleted products stay readable for historical orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::{Money, Quantity};
use crate::error::DomainError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) price: Money,
    pub(crate) available: Quantity,
    pub(crate) is_deleted: bool,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(title: impl Into<String>, price: Money, available: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            price,
            available: Quantity::new(available),
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn price(&self) -> Money {
        self.price
    }
    pub fn available(&self) -> u32 {
        self.available.value()
    }
    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }
    pub fn in_stock(&self) -> bool {
        !self.available.is_zero()
    }

    /// Atomic check-and-decrement; fails without side effects when the
    /// product is gone or the quantity would go negative.
    pub fn reserve(&mut self, quantity: u32) -> Result<(), DomainError> {
        if self.is_deleted {
            return Err(DomainError::precondition(format!(
                "product {} is no longer available",
                self.id
            )));
        }
        self.available = self
            .available
            .checked_sub(quantity)
            .ok_or_else(|| DomainError::InsufficientStock { product_id: self.id.clone() })?;
        self.touch();
        Ok(())
    }

    /// Reverses a previously successful reservation. Idempotency is the
    /// caller's responsibility via the item state machine.
    pub fn restock(&mut self, quantity: u32) {
        self.available = self.available.add(quantity);
        self.touch();
    }

    pub fn soft_delete(&mut self) {
        self.is_deleted = true;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_and_restock() {
        let mut p = Product::new("Kim", Money::rupees(250), 5);
        p.reserve(3).unwrap();
        assert_eq!(p.available(), 2);
        p.restock(3);
        assert_eq!(p.available(), 5);
    }

    #[test]
    fn test_reserve_never_goes_negative() {
        let mut p = Product::new("Kim", Money::rupees(250), 1);
        let err = p.reserve(2).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock { .. }));
        assert_eq!(p.available(), 1);
    }

    #[test]
    fn test_deleted_product_rejects_reservation() {
        let mut p = Product::new("Kim", Money::rupees(250), 5);
        p.soft_delete();
        assert!(matches!(p.reserve(1), Err(DomainError::PreconditionFailed(_))));
        assert_eq!(p.available(), 5);
    }
}
