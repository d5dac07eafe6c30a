//! Storage ports.
//!
//! Every lifecycle operation runs against a [`StoreTx`]: all reads inside it
//! are session-scoped and all writes commit together or not at all. Dropping
//! a transaction without calling `commit` rolls it back.

use async_trait::async_trait;

use crate::domain::aggregates::{Address, Coupon, Order, Product, Wallet};
use crate::error::Result;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;
}

#[async_trait]
pub trait StoreTx: Send {
    /// Loads an order with a write lock for the rest of the transaction.
    async fn order(&mut self, order_id: &str) -> Result<Order>;
    async fn put_order(&mut self, order: &Order) -> Result<()>;
    async fn orders_for_user(&mut self, user_id: &str) -> Result<Vec<Order>>;

    /// Loads a product with a write lock (price snapshot, deletion check).
    async fn product(&mut self, product_id: &str) -> Result<Product>;
    async fn put_product(&mut self, product: &Product) -> Result<()>;
    /// Single-round-trip check-and-decrement of `available_quantity`.
    async fn reserve_stock(&mut self, product_id: &str, quantity: u32) -> Result<()>;
    async fn restock(&mut self, product_id: &str, quantity: u32) -> Result<()>;

    /// Read-only address lookup for the placement ownership check.
    async fn address(&mut self, address_id: &str) -> Result<Option<Address>>;

    async fn wallet(&mut self, user_id: &str) -> Result<Option<Wallet>>;
    async fn put_wallet(&mut self, wallet: &Wallet) -> Result<()>;

    async fn coupon(&mut self, code: &str) -> Result<Option<Coupon>>;
    async fn put_coupon(&mut self, coupon: &Coupon) -> Result<()>;
    /// Guard for lazy coupon deactivation: is any non-deleted pending order
    /// still referencing the code?
    async fn has_pending_order_with_coupon(&mut self, code: &str) -> Result<bool>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
