//! Domain events raised by the aggregates and published after commit.

use crate::domain::value_objects::Money;
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Wallet(WalletEvent),
    Stock(StockEvent),
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: String, user_id: String, net_amount: Money },
    PaymentConfirmed { order_id: String },
    ItemCancelled { order_id: String, product_id: String },
    Cancelled { order_id: String },
    ItemDelivered { order_id: String, product_id: String },
    Delivered { order_id: String },
    ReturnRequested { order_id: String, product_id: String },
    ReturnVerified { order_id: String, product_id: String, approved: bool },
    CouponApplied { order_id: String, code: String, discount: Money },
    CouponRemoved { order_id: String, code: String },
    SoftDeleted { order_id: String },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WalletEvent {
    Credited { user_id: String, amount: Money, description: String },
    Debited { user_id: String, amount: Money, description: String },
    Corrected { user_id: String, amount: Money },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StockEvent {
    Reserved { product_id: String, quantity: u32 },
    Restocked { product_id: String, quantity: u32 },
}

impl DomainEvent {
    /// NATS subject the event is published under.
    pub fn subject(&self) -> &'static str {
        match self {
            DomainEvent::Order(e) => match e {
                OrderEvent::Placed { .. } => "bookstore.orders.placed",
                OrderEvent::PaymentConfirmed { .. } => "bookstore.orders.paid",
                OrderEvent::ItemCancelled { .. } => "bookstore.orders.item_cancelled",
                OrderEvent::Cancelled { .. } => "bookstore.orders.cancelled",
                OrderEvent::ItemDelivered { .. } => "bookstore.orders.item_delivered",
                OrderEvent::Delivered { .. } => "bookstore.orders.delivered",
                OrderEvent::ReturnRequested { .. } => "bookstore.orders.return_requested",
                OrderEvent::ReturnVerified { .. } => "bookstore.orders.return_verified",
                OrderEvent::CouponApplied { .. } => "bookstore.orders.coupon_applied",
                OrderEvent::CouponRemoved { .. } => "bookstore.orders.coupon_removed",
                OrderEvent::SoftDeleted { .. } => "bookstore.orders.deleted",
            },
            DomainEvent::Wallet(_) => "bookstore.wallet",
            DomainEvent::Stock(_) => "bookstore.stock",
        }
    }
}
