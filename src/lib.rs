//! Bookstore order lifecycle core.
//!
//! The engineering weight of the platform sits in the order state machine
//! and the ledgers around it: placing an order atomically reserves stock
//! across products, cancellations and verified returns move money back into
//! a per-user wallet, and a coupon's usage counter is charged together with
//! the discount it grants. Every transition leaves stock counts, item
//! statuses and wallet balances mutually consistent, even when requests
//! interleave or fail midway.
//!
//! ## Layout
//! - [`domain`]: aggregates (order, product stock, wallet, coupon), value
//!   objects and domain events
//! - [`store`]: transactional storage ports with Postgres and in-memory
//!   implementations
//! - [`engine`]: the lifecycle engine orchestrating the ledgers
//! - [`publisher`]: post-commit event publication (tracing + NATS)

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod publisher;
pub mod store;

pub use config::Settings;
pub use domain::aggregates::{
    derive_order_status, Address, Coupon, ItemStatus, Order, OrderItem, OrderStatus, PaymentMethod,
    PaymentStatus, Product, ReturnDecision, TransactionKind, Wallet, WalletTransaction, WalletView,
};
pub use domain::value_objects::{Money, Quantity};
pub use engine::requests::{OrderLine, PlaceOrderRequest};
pub use engine::OrderEngine;
pub use error::{DomainError, Result};
pub use publisher::EventPublisher;
pub use store::{MemoryStore, PgStore, Store, StoreTx};
