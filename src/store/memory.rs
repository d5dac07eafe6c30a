//! In-process store backed by a single mutex-guarded state map.
//!
//! Transactions take the state lock for their whole lifetime, which makes
//! them trivially serializable: mutations land on a staged copy that replaces
//! the shared state on commit and is discarded on drop. Used by the test
//! suite and for running the service without Postgres.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::aggregates::{Address, Coupon, Order, OrderStatus, Product, Wallet};
use crate::error::{DomainError, Result};
use crate::store::{Store, StoreTx};

#[derive(Clone, Default)]
struct State {
    orders: HashMap<String, Order>,
    products: HashMap<String, Product>,
    wallets: HashMap<String, Wallet>,
    coupons: HashMap<String, Coupon>,
    addresses: HashMap<String, Address>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixture helper: inserts a product outside any transaction.
    pub async fn add_product(&self, product: Product) {
        self.state.lock().await.products.insert(product.id().to_string(), product);
    }

    pub async fn add_coupon(&self, coupon: Coupon) {
        self.state.lock().await.coupons.insert(coupon.code().to_string(), coupon);
    }

    pub async fn add_address(&self, address: Address) {
        self.state.lock().await.addresses.insert(address.id().to_string(), address);
    }

    pub async fn get_product(&self, product_id: &str) -> Option<Product> {
        self.state.lock().await.products.get(product_id).cloned()
    }

    pub async fn get_order(&self, order_id: &str) -> Option<Order> {
        self.state.lock().await.orders.get(order_id).cloned()
    }

    pub async fn get_wallet(&self, user_id: &str) -> Option<Wallet> {
        self.state.lock().await.wallets.get(user_id).cloned()
    }

    pub async fn get_coupon(&self, code: &str) -> Option<Coupon> {
        self.state.lock().await.coupons.get(code).cloned()
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<State>,
    staged: State,
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx { guard, staged }))
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn order(&mut self, order_id: &str) -> Result<Order> {
        self.staged.orders.get(order_id).cloned().ok_or(DomainError::NotFound("order"))
    }

    async fn put_order(&mut self, order: &Order) -> Result<()> {
        self.staged.orders.insert(order.id().to_string(), order.clone());
        Ok(())
    }

    async fn orders_for_user(&mut self, user_id: &str) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .staged
            .orders
            .values()
            .filter(|o| o.user_id() == user_id && !o.is_deleted())
            .cloned()
            .collect();
        orders.sort_by_key(|o| std::cmp::Reverse(o.created_at()));
        Ok(orders)
    }

    async fn product(&mut self, product_id: &str) -> Result<Product> {
        self.staged.products.get(product_id).cloned().ok_or(DomainError::NotFound("product"))
    }

    async fn put_product(&mut self, product: &Product) -> Result<()> {
        self.staged.products.insert(product.id().to_string(), product.clone());
        Ok(())
    }

    async fn reserve_stock(&mut self, product_id: &str, quantity: u32) -> Result<()> {
        let product = self
            .staged
            .products
            .get_mut(product_id)
            .ok_or(DomainError::NotFound("product"))?;
        product.reserve(quantity)
    }

    async fn restock(&mut self, product_id: &str, quantity: u32) -> Result<()> {
        let product = self
            .staged
            .products
            .get_mut(product_id)
            .ok_or(DomainError::NotFound("product"))?;
        product.restock(quantity);
        Ok(())
    }

    async fn address(&mut self, address_id: &str) -> Result<Option<Address>> {
        Ok(self.staged.addresses.get(address_id).cloned())
    }

    async fn wallet(&mut self, user_id: &str) -> Result<Option<Wallet>> {
        Ok(self.staged.wallets.get(user_id).cloned())
    }

    async fn put_wallet(&mut self, wallet: &Wallet) -> Result<()> {
        self.staged.wallets.insert(wallet.user_id().to_string(), wallet.clone());
        Ok(())
    }

    async fn coupon(&mut self, code: &str) -> Result<Option<Coupon>> {
        Ok(self.staged.coupons.get(code).cloned())
    }

    async fn put_coupon(&mut self, coupon: &Coupon) -> Result<()> {
        self.staged.coupons.insert(coupon.code().to_string(), coupon.clone());
        Ok(())
    }

    async fn has_pending_order_with_coupon(&mut self, code: &str) -> Result<bool> {
        Ok(self.staged.orders.values().any(|o| {
            o.coupon() == Some(code) && o.status() == OrderStatus::Pending && !o.is_deleted()
        }))
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        *self.guard = self.staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Money;

    #[tokio::test]
    async fn test_dropped_tx_rolls_back() {
        let store = MemoryStore::new();
        store.add_product(Product::new("Dune", Money::rupees(450), 3)).await;
        let id = {
            let state = store.state.lock().await;
            state.products.keys().next().unwrap().clone()
        };

        {
            let mut tx = store.begin().await.unwrap();
            tx.reserve_stock(&id, 2).await.unwrap();
            // dropped without commit
        }
        assert_eq!(store.get_product(&id).await.unwrap().available(), 3);

        let mut tx = store.begin().await.unwrap();
        tx.reserve_stock(&id, 2).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.get_product(&id).await.unwrap().available(), 1);
    }
}
