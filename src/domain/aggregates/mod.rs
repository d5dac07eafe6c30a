//! Aggregates module
pub mod address;
pub mod coupon;
pub mod order;
pub mod product;
pub mod wallet;

pub use address::Address;
pub use coupon::Coupon;
pub use order::{
    derive_order_status, ItemStatus, Order, OrderItem, OrderStatus, PaymentMethod, PaymentStatus,
    RefundLine, ReturnDecision,
};
pub use product::Product;
pub use wallet::{TransactionKind, Wallet, WalletTransaction, WalletView};
