//! Order Lifecycle Engine
//!
//! Orchestrates placement, cancellation, return handling and the wallet
//! ledger by composing the stock, wallet and coupon state inside a single
//! store transaction per operation. Any guard violation or mid-transaction
//! failure rolls everything back; conflicted transactions are retried with a
//! bounded budget before being surfaced.

pub mod requests;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::config::Settings;
use crate::domain::aggregates::{
    Coupon, Order, OrderItem, OrderStatus, Wallet, WalletView,
};
use crate::domain::events::{DomainEvent, StockEvent};
use crate::domain::value_objects::Money;
use crate::error::{DomainError, Result};
use crate::publisher::EventPublisher;
use crate::store::{Store, StoreTx};

use requests::{check, PlaceOrderRequest};

/// Per-line ceiling; anything larger is a malformed request, not a purchase.
const MAX_LINE_QUANTITY: u32 = 10_000;

pub struct OrderEngine {
    store: Arc<dyn Store>,
    settings: Settings,
    publisher: EventPublisher,
}

impl OrderEngine {
    pub fn new(store: Arc<dyn Store>, settings: Settings, publisher: EventPublisher) -> Self {
        Self { store, settings, publisher }
    }

    /// Reserves stock for every line, snapshots prices, optionally applies a
    /// coupon, and creates the order, all in one transaction.
    pub async fn place_order(&self, req: PlaceOrderRequest) -> Result<Order> {
        check(&req)?;
        let mut seen = HashSet::new();
        for line in &req.items {
            if !seen.insert(line.product_id.as_str()) {
                return Err(DomainError::validation(format!(
                    "product {} appears more than once",
                    line.product_id
                )));
            }
        }
        if let Some(code) = &req.coupon_code {
            self.deactivate_if_expired(code).await?;
        }
        let order = self.run("place_order", || self.try_place_order(&req)).await?;
        tracing::info!(order_id = order.id(), user_id = order.user_id(), "order placed");
        Ok(order)
    }

    async fn try_place_order(&self, req: &PlaceOrderRequest) -> Result<(Order, Vec<DomainEvent>)> {
        let mut tx = self.store.begin().await?;
        match tx.address(&req.address_id).await? {
            Some(address) if address.user_id() == req.user_id => {}
            _ => return Err(DomainError::NotFound("address")),
        }
        let mut events = Vec::new();
        let mut items = Vec::with_capacity(req.items.len());
        for line in &req.items {
            if line.quantity == 0 || line.quantity > MAX_LINE_QUANTITY {
                return Err(DomainError::validation(format!(
                    "quantity for product {} must be between 1 and {MAX_LINE_QUANTITY}",
                    line.product_id
                )));
            }
            let product = tx.product(&line.product_id).await?;
            if product.is_deleted() {
                return Err(DomainError::precondition(format!(
                    "product {} is no longer available",
                    line.product_id
                )));
            }
            tx.reserve_stock(&line.product_id, line.quantity).await?;
            events.push(DomainEvent::Stock(StockEvent::Reserved {
                product_id: line.product_id.clone(),
                quantity: line.quantity,
            }));
            items.push(OrderItem::new(&line.product_id, product.title(), line.quantity, product.price()));
        }
        let mut order = Order::place(
            &req.user_id,
            &req.address_id,
            items,
            req.payment_method,
            self.settings.shipping_charge,
        )?;
        if let Some(code) = &req.coupon_code {
            let mut coupon = self.load_coupon(&mut tx, code).await?;
            let discount = coupon.discount_for(order.total(), Utc::now())?;
            coupon.record_use();
            tx.put_coupon(&coupon).await?;
            order.apply_coupon_discount(coupon.code(), discount)?;
        }
        events.extend(order.take_events());
        tx.put_order(&order).await?;
        tx.commit().await?;
        Ok((order, events))
    }

    /// External payment verifier confirmed settlement of an ONLINE order.
    pub async fn confirm_payment(&self, user_id: &str, order_id: &str) -> Result<()> {
        self.run("confirm_payment", || async move {
            let mut tx = self.store.begin().await?;
            let mut order = self.owned_order(&mut tx, user_id, order_id).await?;
            order.confirm_payment()?;
            let events = order.take_events();
            tx.put_order(&order).await?;
            tx.commit().await?;
            Ok(((), events))
        })
        .await
    }

    /// Cancels a single still-`ordered` item: status flip, restock, and a
    /// wallet refund when the order was paid online.
    pub async fn cancel_order_item(
        &self,
        user_id: &str,
        order_id: &str,
        product_id: &str,
        reason: &str,
    ) -> Result<()> {
        non_empty(reason, "a cancellation reason is required")?;
        self.run("cancel_order_item", || async move {
            let mut tx = self.store.begin().await?;
            let mut order = self.owned_order(&mut tx, user_id, order_id).await?;
            let line = order.cancel_item(product_id, reason)?;
            let mut events = Vec::new();
            self.restock_line(&mut tx, &line.product_id, line.quantity, &mut events).await?;
            if order.refund_eligible() {
                let description = format!("refund for order {order_id}, product {product_id}");
                self.refund(&mut tx, user_id, line.amount, description, &mut events).await?;
            }
            events.extend(order.take_events());
            tx.put_order(&order).await?;
            tx.commit().await?;
            Ok(((), events))
        })
        .await?;
        tracing::info!(order_id, product_id, "order item cancelled");
        Ok(())
    }

    /// Cancels every still-`ordered` item; each line is restocked and, for
    /// online-paid orders, refunded with its own credit transaction so the
    /// ledger keeps per-item granularity.
    pub async fn cancel_order(&self, user_id: &str, order_id: &str, reason: &str) -> Result<()> {
        non_empty(reason, "a cancellation reason is required")?;
        self.run("cancel_order", || async move {
            let mut tx = self.store.begin().await?;
            let mut order = self.owned_order(&mut tx, user_id, order_id).await?;
            let refund_due = order.refund_eligible();
            let lines = order.cancel_all(reason)?;
            let mut events = Vec::new();
            for line in &lines {
                self.restock_line(&mut tx, &line.product_id, line.quantity, &mut events).await?;
                if refund_due {
                    let description =
                        format!("refund for order {order_id}, product {}", line.product_id);
                    self.refund(&mut tx, user_id, line.amount, description, &mut events).await?;
                }
            }
            events.extend(order.take_events());
            tx.put_order(&order).await?;
            tx.commit().await?;
            Ok(((), events))
        })
        .await?;
        tracing::info!(order_id, "order cancelled");
        Ok(())
    }

    /// `delivered → returned`. No money moves yet; the refund is issued once
    /// an admin approves the return.
    pub async fn request_return(
        &self,
        user_id: &str,
        order_id: &str,
        product_id: &str,
        reason: &str,
    ) -> Result<()> {
        non_empty(reason, "a return reason is required")?;
        self.run("request_return", || async move {
            let mut tx = self.store.begin().await?;
            let mut order = self.owned_order(&mut tx, user_id, order_id).await?;
            order.request_return(product_id, reason)?;
            let events = order.take_events();
            tx.put_order(&order).await?;
            tx.commit().await?;
            Ok(((), events))
        })
        .await
    }

    /// Admin decision on a requested return. Approval credits the wallet
    /// exactly once, and only for orders that were paid online.
    pub async fn verify_return(&self, order_id: &str, product_id: &str, approved: bool) -> Result<()> {
        self.run("verify_return", || async move {
            let mut tx = self.store.begin().await?;
            let mut order = tx.order(order_id).await?;
            let refund_line = order.verify_return(product_id, approved)?;
            let mut events = Vec::new();
            if let Some(line) = refund_line {
                if order.refund_eligible() {
                    let description =
                        format!("refund for returned item, order {order_id}, product {product_id}");
                    self.refund(&mut tx, order.user_id(), line.amount, description, &mut events)
                        .await?;
                }
            }
            events.extend(order.take_events());
            tx.put_order(&order).await?;
            tx.commit().await?;
            Ok(((), events))
        })
        .await?;
        tracing::info!(order_id, product_id, approved, "return verified");
        Ok(())
    }

    pub async fn mark_item_delivered(&self, order_id: &str, product_id: &str) -> Result<()> {
        self.run("mark_item_delivered", || async move {
            let mut tx = self.store.begin().await?;
            let mut order = tx.order(order_id).await?;
            order.mark_delivered(product_id)?;
            let events = order.take_events();
            tx.put_order(&order).await?;
            tx.commit().await?;
            Ok(((), events))
        })
        .await
    }

    /// Administrative status override; bypasses item-level checks.
    pub async fn update_order_status(&self, order_id: &str, status: OrderStatus) -> Result<()> {
        self.run("update_order_status", || async move {
            let mut tx = self.store.begin().await?;
            let mut order = tx.order(order_id).await?;
            order.override_status(status)?;
            tx.put_order(&order).await?;
            tx.commit().await?;
            Ok(((), vec![]))
        })
        .await
    }

    /// Admin soft delete: open items are cancelled and restocked, the
    /// document is hidden from customer reads but never hard-deleted.
    pub async fn soft_delete_order(&self, order_id: &str) -> Result<()> {
        self.run("soft_delete_order", || async move {
            let mut tx = self.store.begin().await?;
            let mut order = tx.order(order_id).await?;
            let lines = order.soft_delete()?;
            let mut events = Vec::new();
            for line in &lines {
                self.restock_line(&mut tx, &line.product_id, line.quantity, &mut events).await?;
            }
            events.extend(order.take_events());
            tx.put_order(&order).await?;
            tx.commit().await?;
            Ok(((), events))
        })
        .await
    }

    /// Applies a coupon to an existing pending order; the usage increment and
    /// the order discount commit together or not at all.
    pub async fn apply_coupon(&self, user_id: &str, order_id: &str, code: &str) -> Result<Order> {
        self.deactivate_if_expired(code).await?;
        self.run("apply_coupon", || async move {
            let mut tx = self.store.begin().await?;
            let mut order = self.owned_order(&mut tx, user_id, order_id).await?;
            let mut coupon = self.load_coupon(&mut tx, code).await?;
            let discount = coupon.discount_for(order.total(), Utc::now())?;
            coupon.record_use();
            tx.put_coupon(&coupon).await?;
            order.apply_coupon_discount(coupon.code(), discount)?;
            let events = order.take_events();
            tx.put_order(&order).await?;
            tx.commit().await?;
            Ok((order, events))
        })
        .await
    }

    /// Reverts the discount in full and detaches the code. The coupon's
    /// usage count is deliberately left as spent.
    pub async fn remove_coupon(&self, user_id: &str, order_id: &str) -> Result<Order> {
        self.run("remove_coupon", || async move {
            let mut tx = self.store.begin().await?;
            let mut order = self.owned_order(&mut tx, user_id, order_id).await?;
            order.remove_coupon_discount()?;
            let events = order.take_events();
            tx.put_order(&order).await?;
            tx.commit().await?;
            Ok((order, events))
        })
        .await
    }

    /// Lazy expiry sweep for one coupon: flags it inactive once past its
    /// expiration, unless a pending non-deleted order still references the
    /// code. Runs in its own transaction so the flag sticks even when a
    /// subsequent apply fails.
    pub async fn deactivate_if_expired(&self, code: &str) -> Result<bool> {
        self.run("deactivate_if_expired", || async move {
            let mut tx = self.store.begin().await?;
            let code = normalize_code(code);
            let Some(mut coupon) = tx.coupon(&code).await? else {
                return Ok((false, vec![]));
            };
            if !coupon.is_active() || !coupon.is_expired(Utc::now()) {
                return Ok((false, vec![]));
            }
            if tx.has_pending_order_with_coupon(&code).await? {
                // A customer already committed to this discount; keep the
                // coupon alive until those orders resolve.
                return Ok((false, vec![]));
            }
            coupon.deactivate();
            tx.put_coupon(&coupon).await?;
            tx.commit().await?;
            tracing::info!(code, "expired coupon deactivated");
            Ok((true, vec![]))
        })
        .await
    }

    /// Balance plus the full transaction log; a user without a wallet reads
    /// as an empty one.
    pub async fn wallet_balance(&self, user_id: &str) -> Result<WalletView> {
        let mut tx = self.store.begin().await?;
        let view = match tx.wallet(user_id).await? {
            Some(wallet) => wallet.view(),
            None => WalletView::empty(),
        };
        Ok(view)
    }

    /// Debits the user's wallet, e.g. when it part-pays a purchase.
    pub async fn debit_wallet(&self, user_id: &str, amount: Money, description: &str) -> Result<()> {
        if amount > self.settings.max_debit {
            return Err(DomainError::LimitExceeded(format!(
                "debit exceeds the {} wallet ceiling",
                self.settings.max_debit
            )));
        }
        self.run("debit_wallet", || async move {
            let mut tx = self.store.begin().await?;
            let mut wallet = tx.wallet(user_id).await?.ok_or(DomainError::NotFound("wallet"))?;
            wallet.debit(amount, description)?;
            let events = wallet.take_events();
            tx.put_wallet(&wallet).await?;
            tx.commit().await?;
            Ok(((), events))
        })
        .await
    }

    /// Integrity repair for a wallet whose balance drifted negative.
    /// Returns whether a correction was appended.
    pub async fn reconcile_wallet(&self, user_id: &str) -> Result<bool> {
        self.run("reconcile_wallet", || async move {
            let mut tx = self.store.begin().await?;
            let mut wallet = tx.wallet(user_id).await?.ok_or(DomainError::NotFound("wallet"))?;
            let repaired = wallet.reconcile();
            let events = wallet.take_events();
            if repaired {
                tx.put_wallet(&wallet).await?;
                tx.commit().await?;
                tracing::warn!(user_id, "wallet balance corrected");
            }
            Ok((repaired, events))
        })
        .await
    }

    pub async fn order(&self, user_id: &str, order_id: &str) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        self.owned_order(&mut tx, user_id, order_id).await
    }

    pub async fn orders_for_user(&self, user_id: &str) -> Result<Vec<Order>> {
        let mut tx = self.store.begin().await?;
        tx.orders_for_user(user_id).await
    }

    /// Admin read without the ownership guard.
    pub async fn order_for_admin(&self, order_id: &str) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        tx.order(order_id).await
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    /// Loads an order and enforces the caller's ownership; deleted or foreign
    /// orders read as absent.
    async fn owned_order(
        &self,
        tx: &mut Box<dyn StoreTx>,
        user_id: &str,
        order_id: &str,
    ) -> Result<Order> {
        let order = tx.order(order_id).await?;
        if order.user_id() != user_id || order.is_deleted() {
            return Err(DomainError::NotFound("order"));
        }
        Ok(order)
    }

    async fn restock_line(
        &self,
        tx: &mut Box<dyn StoreTx>,
        product_id: &str,
        quantity: u32,
        events: &mut Vec<DomainEvent>,
    ) -> Result<()> {
        tx.restock(product_id, quantity).await?;
        events.push(DomainEvent::Stock(StockEvent::Restocked {
            product_id: product_id.to_string(),
            quantity,
        }));
        Ok(())
    }

    /// The one place a refund lands in a wallet: creates the wallet lazily,
    /// enforces the credit ceiling, appends the audit entry.
    async fn refund(
        &self,
        tx: &mut Box<dyn StoreTx>,
        user_id: &str,
        amount: Money,
        description: String,
        events: &mut Vec<DomainEvent>,
    ) -> Result<()> {
        if amount > self.settings.max_credit {
            return Err(DomainError::LimitExceeded(format!(
                "credit exceeds the {} wallet ceiling",
                self.settings.max_credit
            )));
        }
        let mut wallet = tx.wallet(user_id).await?.unwrap_or_else(|| Wallet::new(user_id));
        wallet.credit(amount, description)?;
        events.extend(wallet.take_events());
        tx.put_wallet(&wallet).await
    }

    async fn load_coupon(&self, tx: &mut Box<dyn StoreTx>, code: &str) -> Result<Coupon> {
        tx.coupon(&normalize_code(code)).await?.ok_or(DomainError::NotFound("coupon"))
    }

    /// Runs an operation, retrying on transient conflicts within the
    /// configured budget, and publishes domain events once it commits.
    async fn run<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(T, Vec<DomainEvent>)>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok((value, events)) => {
                    self.publisher.publish(&events).await;
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.settings.tx_retries => {
                    attempt += 1;
                    tracing::warn!(op, attempt, "transaction conflict, retrying");
                    tokio::time::sleep(Duration::from_millis(25 * u64::from(attempt))).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

fn non_empty(value: &str, msg: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(msg));
    }
    Ok(())
}
