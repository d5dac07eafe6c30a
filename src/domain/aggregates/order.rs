//! Order Aggregate
//!
//! The order document: header fields plus an embedded list of line items,
//! each with its own status sub-state-machine. Item transitions are
//! `ordered → {cancelled, delivered}` and `delivered → returned`; `cancelled`
//! and `returned` are terminal. The order-level status is derived from the
//! items by [`derive_order_status`] and is never authoritative over them,
//! except for the explicit admin override.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::Money;
use crate::error::DomainError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Returned => "returned",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Ordered,
    Cancelled,
    Delivered,
    Returned,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Ordered => "ordered",
            ItemStatus::Cancelled => "cancelled",
            ItemStatus::Delivered => "delivered",
            ItemStatus::Returned => "returned",
        }
    }

    /// Terminal states permit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Cancelled | ItemStatus::Returned)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cod,
    Online,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnDecision {
    Approved,
    Rejected,
}

/// One product line within an order. `price` is the unit price snapshot taken
/// at order time and is never re-read from the live product.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub title: String,
    pub quantity: u32,
    pub price: Money,
    pub total: Money,
    pub status: ItemStatus,
    pub cancel_reason: Option<String>,
    pub return_reason: Option<String>,
    pub return_verified: bool,
    pub return_decision: Option<ReturnDecision>,
}

impl OrderItem {
    pub fn new(product_id: impl Into<String>, title: impl Into<String>, quantity: u32, price: Money) -> Self {
        Self {
            product_id: product_id.into(),
            title: title.into(),
            quantity,
            price,
            total: price.times(quantity),
            status: ItemStatus::Ordered,
            cancel_reason: None,
            return_reason: None,
            return_verified: false,
            return_decision: None,
        }
    }
}

/// Quantity and amount of a reversed line, handed back to the lifecycle
/// engine so it can restock and refund.
#[derive(Clone, Debug)]
pub struct RefundLine {
    pub product_id: String,
    pub quantity: u32,
    pub amount: Money,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    id: String,
    user_id: String,
    address_id: String,
    status: OrderStatus,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    items: Vec<OrderItem>,
    total: Money,
    discount: Money,
    shipping_charge: Money,
    net_amount: Money,
    coupon: Option<String>,
    is_deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Single source of truth for the order-level status, kept out of the
/// mutators so every transition derives it the same way.
pub fn derive_order_status(items: &[OrderItem]) -> OrderStatus {
    if items.iter().all(|i| i.status == ItemStatus::Cancelled) {
        return OrderStatus::Cancelled;
    }
    let live: Vec<&OrderItem> = items.iter().filter(|i| i.status != ItemStatus::Cancelled).collect();
    if live.iter().all(|i| i.status == ItemStatus::Returned) {
        OrderStatus::Returned
    } else if live.iter().all(|i| matches!(i.status, ItemStatus::Delivered | ItemStatus::Returned)) {
        OrderStatus::Delivered
    } else {
        OrderStatus::Pending
    }
}

impl Order {
    /// Creates an order with every item `ordered`. COD orders are treated as
    /// settled at placement; ONLINE orders stay `Pending` until the external
    /// payment verifier confirms them.
    pub fn place(
        user_id: impl Into<String>,
        address_id: impl Into<String>,
        items: Vec<OrderItem>,
        payment_method: PaymentMethod,
        shipping_charge: Money,
    ) -> Result<Self, DomainError> {
        if items.is_empty() {
            return Err(DomainError::validation("an order needs at least one item"));
        }
        if let Some(bad) = items.iter().find(|i| i.quantity == 0) {
            return Err(DomainError::validation(format!(
                "quantity for product {} must be at least 1",
                bad.product_id
            )));
        }
        let now = Utc::now();
        let payment_status = match payment_method {
            PaymentMethod::Cod => PaymentStatus::Paid,
            PaymentMethod::Online => PaymentStatus::Pending,
        };
        let mut order = Self {
            id: generate_order_id(),
            user_id: user_id.into(),
            address_id: address_id.into(),
            status: OrderStatus::Pending,
            payment_method,
            payment_status,
            items,
            total: Money::zero(),
            discount: Money::zero(),
            shipping_charge,
            net_amount: Money::zero(),
            coupon: None,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
            events: vec![],
        };
        order.recalculate();
        order.raise_event(DomainEvent::Order(OrderEvent::Placed {
            order_id: order.id.clone(),
            user_id: order.user_id.clone(),
            net_amount: order.net_amount,
        }));
        Ok(order)
    }

    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
    pub fn address_id(&self) -> &str {
        &self.address_id
    }
    pub fn status(&self) -> OrderStatus {
        self.status
    }
    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }
    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }
    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }
    pub fn total(&self) -> Money {
        self.total
    }
    pub fn discount(&self) -> Money {
        self.discount
    }
    pub fn shipping_charge(&self) -> Money {
        self.shipping_charge
    }
    pub fn net_amount(&self) -> Money {
        self.net_amount
    }
    pub fn coupon(&self) -> Option<&str> {
        self.coupon.as_deref()
    }
    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn item(&self, product_id: &str) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    /// A refund is owed only when the customer already paid online.
    pub fn refund_eligible(&self) -> bool {
        self.payment_method == PaymentMethod::Online && self.payment_status == PaymentStatus::Paid
    }

    /// External payment verifier confirmed settlement of an ONLINE order.
    pub fn confirm_payment(&mut self) -> Result<(), DomainError> {
        if self.payment_method != PaymentMethod::Online {
            return Err(DomainError::precondition("cash-on-delivery orders settle on delivery"));
        }
        if self.payment_status == PaymentStatus::Paid {
            return Err(DomainError::precondition("payment is already confirmed"));
        }
        self.payment_status = PaymentStatus::Paid;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::PaymentConfirmed {
            order_id: self.id.clone(),
        }));
        Ok(())
    }

    /// `ordered → cancelled` for a single item.
    pub fn cancel_item(&mut self, product_id: &str, reason: &str) -> Result<RefundLine, DomainError> {
        let order_id = self.id.clone();
        let item = self.item_mut(product_id)?;
        if item.status != ItemStatus::Ordered {
            return Err(DomainError::precondition(format!(
                "only items still in ordered state can be cancelled, this one is {}",
                item.status.as_str()
            )));
        }
        item.status = ItemStatus::Cancelled;
        item.cancel_reason = Some(reason.to_string());
        let line = RefundLine {
            product_id: item.product_id.clone(),
            quantity: item.quantity,
            amount: item.total,
        };
        self.status = derive_order_status(&self.items);
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::ItemCancelled {
            order_id,
            product_id: product_id.to_string(),
        }));
        Ok(line)
    }

    /// Cancels every item still `ordered` and marks the order cancelled.
    /// Returns one line per cancelled item so the engine can restock and
    /// refund each separately, preserving per-item audit granularity.
    pub fn cancel_all(&mut self, reason: &str) -> Result<Vec<RefundLine>, DomainError> {
        if matches!(self.status, OrderStatus::Cancelled | OrderStatus::Delivered) {
            return Err(DomainError::precondition(format!(
                "a {} order cannot be cancelled",
                self.status.as_str()
            )));
        }
        let mut lines = Vec::new();
        for item in self.items.iter_mut().filter(|i| i.status == ItemStatus::Ordered) {
            item.status = ItemStatus::Cancelled;
            item.cancel_reason = Some(reason.to_string());
            lines.push(RefundLine {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
                amount: item.total,
            });
        }
        self.status = OrderStatus::Cancelled;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Cancelled { order_id: self.id.clone() }));
        Ok(lines)
    }

    /// `delivered → returned`. The refund itself is issued later, once an
    /// admin approves the return.
    pub fn request_return(&mut self, product_id: &str, reason: &str) -> Result<(), DomainError> {
        let order_id = self.id.clone();
        let item = self.item_mut(product_id)?;
        if item.status != ItemStatus::Delivered {
            return Err(DomainError::precondition("only delivered items can be returned"));
        }
        item.status = ItemStatus::Returned;
        item.return_reason = Some(reason.to_string());
        self.status = derive_order_status(&self.items);
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::ReturnRequested {
            order_id,
            product_id: product_id.to_string(),
        }));
        Ok(())
    }

    /// Admin decision on a returned item. Approval yields the refund line;
    /// a verified item can never be verified again, so the refund is issued
    /// at most once.
    pub fn verify_return(&mut self, product_id: &str, approved: bool) -> Result<Option<RefundLine>, DomainError> {
        let order_id = self.id.clone();
        let item = self.item_mut(product_id)?;
        if item.status != ItemStatus::Returned {
            return Err(DomainError::precondition("only returned items can be verified"));
        }
        if item.return_verified {
            return Err(DomainError::precondition("this return has already been verified"));
        }
        item.return_verified = true;
        item.return_decision = Some(if approved { ReturnDecision::Approved } else { ReturnDecision::Rejected });
        let line = approved.then(|| RefundLine {
            product_id: item.product_id.clone(),
            quantity: item.quantity,
            amount: item.total,
        });
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::ReturnVerified {
            order_id,
            product_id: product_id.to_string(),
            approved,
        }));
        Ok(line)
    }

    /// `ordered → delivered`. When the last live item is delivered the order
    /// itself becomes delivered.
    pub fn mark_delivered(&mut self, product_id: &str) -> Result<(), DomainError> {
        let order_id = self.id.clone();
        let item = self.item_mut(product_id)?;
        if item.status != ItemStatus::Ordered {
            return Err(DomainError::precondition(format!(
                "only ordered items can be delivered, this one is {}",
                item.status.as_str()
            )));
        }
        item.status = ItemStatus::Delivered;
        self.status = derive_order_status(&self.items);
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::ItemDelivered {
            order_id: order_id.clone(),
            product_id: product_id.to_string(),
        }));
        if self.status == OrderStatus::Delivered {
            self.raise_event(DomainEvent::Order(OrderEvent::Delivered { order_id }));
        }
        Ok(())
    }

    /// Administrative override of the order-level status; bypasses item-level
    /// checks but never resurrects a cancelled order.
    pub fn override_status(&mut self, status: OrderStatus) -> Result<(), DomainError> {
        if self.status == OrderStatus::Cancelled {
            return Err(DomainError::precondition("a cancelled order cannot change status"));
        }
        self.status = status;
        self.touch();
        Ok(())
    }

    /// Admin soft delete: every still-`ordered` item is cancelled (the engine
    /// restocks it) and the document is hidden, never hard-deleted.
    pub fn soft_delete(&mut self) -> Result<Vec<RefundLine>, DomainError> {
        if self.status == OrderStatus::Delivered {
            return Err(DomainError::precondition("a delivered order cannot be removed"));
        }
        let mut lines = Vec::new();
        for item in self.items.iter_mut().filter(|i| i.status == ItemStatus::Ordered) {
            item.status = ItemStatus::Cancelled;
            item.cancel_reason = Some("removed by admin".to_string());
            lines.push(RefundLine {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
                amount: item.total,
            });
        }
        self.status = derive_order_status(&self.items);
        self.is_deleted = true;
        self.deleted_at = Some(Utc::now());
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::SoftDeleted { order_id: self.id.clone() }));
        Ok(lines)
    }

    /// Stores the discount a coupon grants. The caller (coupon registry) has
    /// already validated the coupon and computed the capped amount.
    pub fn apply_coupon_discount(&mut self, code: &str, discount: Money) -> Result<(), DomainError> {
        if self.coupon.is_some() {
            return Err(DomainError::precondition("a coupon is already applied to this order"));
        }
        if self.status != OrderStatus::Pending {
            return Err(DomainError::precondition("coupons can only be applied to pending orders"));
        }
        self.coupon = Some(code.to_string());
        self.discount = discount;
        self.recalculate();
        self.raise_event(DomainEvent::Order(OrderEvent::CouponApplied {
            order_id: self.id.clone(),
            code: code.to_string(),
            discount,
        }));
        Ok(())
    }

    /// Full reversal of the discount; the coupon's usage count is *not*
    /// refunded.
    pub fn remove_coupon_discount(&mut self) -> Result<String, DomainError> {
        let code = self
            .coupon
            .take()
            .ok_or_else(|| DomainError::precondition("no coupon is applied to this order"))?;
        self.discount = Money::zero();
        self.recalculate();
        self.raise_event(DomainEvent::Order(OrderEvent::CouponRemoved {
            order_id: self.id.clone(),
            code: code.clone(),
        }));
        Ok(code)
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }

    fn item_mut(&mut self, product_id: &str) -> Result<&mut OrderItem, DomainError> {
        self.items
            .iter_mut()
            .find(|i| i.product_id == product_id)
            .ok_or(DomainError::NotFound("order item"))
    }

    // Invariants: total == Σ items[i].total, net_amount == total + shipping − discount.
    fn recalculate(&mut self) {
        self.total = self.items.iter().fold(Money::zero(), |acc, i| acc.add(i.total));
        self.net_amount = self.total.add(self.shipping_charge).subtract(self.discount);
        self.touch();
    }

    fn raise_event(&mut self, e: DomainEvent) {
        self.events.push(e);
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn generate_order_id() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("ORD-{}", raw[..8].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_item_order(method: PaymentMethod) -> Order {
        Order::place(
            "U1",
            "A1",
            vec![
                OrderItem::new("P1", "The Trial", 2, Money::rupees(100)),
                OrderItem::new("P2", "Ficciones", 1, Money::rupees(300)),
            ],
            method,
            Money::zero(),
        )
        .unwrap()
    }

    #[test]
    fn test_place_computes_totals() {
        let order = two_item_order(PaymentMethod::Online);
        assert_eq!(order.total(), Money::rupees(500));
        assert_eq!(order.net_amount(), Money::rupees(500));
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert!(order.id().starts_with("ORD-"));
    }

    #[test]
    fn test_cod_is_paid_at_placement() {
        let order = two_item_order(PaymentMethod::Cod);
        assert_eq!(order.payment_status(), PaymentStatus::Paid);
    }

    #[test]
    fn test_place_rejects_empty_and_zero_quantity() {
        assert!(matches!(
            Order::place("U1", "A1", vec![], PaymentMethod::Cod, Money::zero()),
            Err(DomainError::Validation(_))
        ));
        let items = vec![OrderItem::new("P1", "B", 0, Money::rupees(10))];
        assert!(matches!(
            Order::place("U1", "A1", items, PaymentMethod::Cod, Money::zero()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn test_cancel_item_transitions_and_reports_line() {
        let mut order = two_item_order(PaymentMethod::Cod);
        let line = order.cancel_item("P1", "changed my mind").unwrap();
        assert_eq!(line.quantity, 2);
        assert_eq!(line.amount, Money::rupees(200));
        assert_eq!(order.item("P1").unwrap().status, ItemStatus::Cancelled);
        // Item totals stay on the document; the invariant still holds.
        assert_eq!(order.total(), Money::rupees(500));
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn test_cancelled_is_terminal() {
        let mut order = two_item_order(PaymentMethod::Cod);
        order.cancel_item("P1", "dup").unwrap();
        assert!(order.cancel_item("P1", "again").is_err());
        assert!(order.mark_delivered("P1").is_err());
    }

    #[test]
    fn test_return_requires_delivery_first() {
        let mut order = two_item_order(PaymentMethod::Cod);
        let err = order.request_return("P1", "damaged").unwrap_err();
        assert!(matches!(err, DomainError::PreconditionFailed(_)));
        order.mark_delivered("P1").unwrap();
        order.request_return("P1", "damaged").unwrap();
        assert_eq!(order.item("P1").unwrap().status, ItemStatus::Returned);
    }

    #[test]
    fn test_verify_return_only_once() {
        let mut order = two_item_order(PaymentMethod::Cod);
        order.mark_delivered("P1").unwrap();
        order.request_return("P1", "damaged").unwrap();
        let line = order.verify_return("P1", true).unwrap();
        assert_eq!(line.unwrap().amount, Money::rupees(200));
        assert!(order.verify_return("P1", true).is_err());
    }

    #[test]
    fn test_rejected_return_yields_no_refund() {
        let mut order = two_item_order(PaymentMethod::Cod);
        order.mark_delivered("P2").unwrap();
        order.request_return("P2", "late").unwrap();
        assert!(order.verify_return("P2", false).unwrap().is_none());
        assert_eq!(order.item("P2").unwrap().return_decision, Some(ReturnDecision::Rejected));
    }

    #[test]
    fn test_deliver_all_marks_order_delivered() {
        let mut order = two_item_order(PaymentMethod::Cod);
        order.mark_delivered("P1").unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);
        order.mark_delivered("P2").unwrap();
        assert_eq!(order.status(), OrderStatus::Delivered);
        // Second delivery of the same item is refused, never a double change.
        assert!(order.mark_delivered("P1").is_err());
    }

    #[test]
    fn test_cancel_all_skips_delivered_items() {
        let mut order = two_item_order(PaymentMethod::Cod);
        order.mark_delivered("P1").unwrap();
        let lines = order.cancel_all("moving house").unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].product_id, "P2");
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert!(order.cancel_all("again").is_err());
    }

    #[test]
    fn test_coupon_discount_keeps_net_amount_invariant() {
        let mut order = Order::place(
            "U1",
            "A1",
            vec![OrderItem::new("P1", "B", 1, Money::rupees(500))],
            PaymentMethod::Online,
            Money::rupees(40),
        )
        .unwrap();
        order.apply_coupon_discount("SAVE10", Money::rupees(50)).unwrap();
        assert_eq!(order.net_amount(), Money::rupees(490));
        assert!(order.apply_coupon_discount("OTHER", Money::rupees(10)).is_err());
        order.remove_coupon_discount().unwrap();
        assert_eq!(order.net_amount(), Money::rupees(540));
        assert_eq!(order.coupon(), None);
    }

    #[test]
    fn test_soft_delete_cancels_ordered_items() {
        let mut order = two_item_order(PaymentMethod::Cod);
        let lines = order.soft_delete().unwrap();
        assert_eq!(lines.len(), 2);
        assert!(order.is_deleted());
        assert_eq!(order.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn test_status_override_guards_cancelled() {
        let mut order = two_item_order(PaymentMethod::Cod);
        order.override_status(OrderStatus::Shipped).unwrap();
        assert_eq!(order.status(), OrderStatus::Shipped);
        order.cancel_all("no").unwrap();
        assert!(order.override_status(OrderStatus::Pending).is_err());
    }

    #[test]
    fn test_derive_order_status() {
        let mut items = vec![
            OrderItem::new("P1", "B", 1, Money::rupees(10)),
            OrderItem::new("P2", "B", 1, Money::rupees(10)),
        ];
        assert_eq!(derive_order_status(&items), OrderStatus::Pending);
        items[0].status = ItemStatus::Cancelled;
        items[1].status = ItemStatus::Cancelled;
        assert_eq!(derive_order_status(&items), OrderStatus::Cancelled);
        items[1].status = ItemStatus::Delivered;
        assert_eq!(derive_order_status(&items), OrderStatus::Delivered);
        items[1].status = ItemStatus::Returned;
        assert_eq!(derive_order_status(&items), OrderStatus::Returned);
    }
}
