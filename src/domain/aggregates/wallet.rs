//! Wallet Aggregate
//!
//! One wallet per user: a non-negative balance plus an append-only
//! transaction log. The balance always equals the ledger sum
//! (credits + corrections − debits); `reconcile` repairs drift that should be
//! structurally impossible.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::events::{DomainEvent, WalletEvent};
use crate::domain::value_objects::Money;
use crate::error::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Credit,
    Debit,
    Correction,
}

/// Immutable once appended.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub kind: TransactionKind,
    pub amount: Money,
    pub description: String,
    pub date: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Wallet {
    user_id: String,
    balance: Money,
    transactions: Vec<WalletTransaction>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Read-only view handed to callers of `getWalletBalance`.
#[derive(Clone, Debug, Serialize)]
pub struct WalletView {
    pub balance: Money,
    pub transactions: Vec<WalletTransaction>,
}

impl WalletView {
    /// A user without a wallet simply has nothing in it; wallets are only
    /// materialized on first credit.
    pub fn empty() -> Self {
        Self { balance: Money::zero(), transactions: vec![] }
    }
}

impl Wallet {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            balance: Money::zero(),
            transactions: vec![],
            created_at: now,
            updated_at: now,
            events: vec![],
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
    pub fn balance(&self) -> Money {
        self.balance
    }
    pub fn transactions(&self) -> &[WalletTransaction] {
        &self.transactions
    }

    pub fn view(&self) -> WalletView {
        WalletView { balance: self.balance, transactions: self.transactions.clone() }
    }

    pub fn credit(&mut self, amount: Money, description: impl Into<String>) -> Result<(), DomainError> {
        if !amount.is_positive() {
            return Err(DomainError::validation("credit amount must be positive"));
        }
        let description = description.into();
        self.balance = self.balance.add(amount);
        self.append(TransactionKind::Credit, amount, description.clone());
        self.events.push(DomainEvent::Wallet(WalletEvent::Credited {
            user_id: self.user_id.clone(),
            amount,
            description,
        }));
        Ok(())
    }

    pub fn debit(&mut self, amount: Money, description: impl Into<String>) -> Result<(), DomainError> {
        if !amount.is_positive() {
            return Err(DomainError::validation("debit amount must be positive"));
        }
        if self.balance < amount {
            return Err(DomainError::InsufficientBalance);
        }
        let description = description.into();
        self.balance = self.balance.subtract(amount);
        self.append(TransactionKind::Debit, amount, description.clone());
        self.events.push(DomainEvent::Wallet(WalletEvent::Debited {
            user_id: self.user_id.clone(),
            amount,
            description,
        }));
        Ok(())
    }

    /// Integrity repair: a negative balance is reset to zero and the
    /// magnitude recorded as a correction entry. Returns whether a repair
    /// happened.
    pub fn reconcile(&mut self) -> bool {
        if !self.balance.is_negative() {
            return false;
        }
        let magnitude = self.balance.abs();
        self.balance = Money::zero();
        self.append(TransactionKind::Correction, magnitude, "balance integrity correction".to_string());
        self.events.push(DomainEvent::Wallet(WalletEvent::Corrected {
            user_id: self.user_id.clone(),
            amount: magnitude,
        }));
        true
    }

    /// Sum of the log: credits and corrections add, debits subtract. Equals
    /// the balance at every observable point.
    pub fn ledger_sum(&self) -> Money {
        self.transactions.iter().fold(Money::zero(), |acc, t| match t.kind {
            TransactionKind::Credit | TransactionKind::Correction => acc.add(t.amount),
            TransactionKind::Debit => acc.subtract(t.amount),
        })
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }

    fn append(&mut self, kind: TransactionKind, amount: Money, description: String) {
        self.transactions.push(WalletTransaction { kind, amount, description, date: Utc::now() });
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_and_debit_keep_ledger_sum() {
        let mut w = Wallet::new("U1");
        w.credit(Money::rupees(500), "refund for order ORD-1 (P1)").unwrap();
        w.credit(Money::rupees(200), "refund for order ORD-1 (P2)").unwrap();
        w.debit(Money::rupees(300), "purchase ORD-2").unwrap();
        assert_eq!(w.balance(), Money::rupees(400));
        assert_eq!(w.ledger_sum(), w.balance());
        assert_eq!(w.transactions().len(), 3);
    }

    #[test]
    fn test_debit_guards_balance() {
        let mut w = Wallet::new("U1");
        w.credit(Money::rupees(100), "refund").unwrap();
        assert_eq!(w.debit(Money::rupees(101), "too much"), Err(DomainError::InsufficientBalance));
        assert_eq!(w.balance(), Money::rupees(100));
    }

    #[test]
    fn test_non_positive_amounts_rejected() {
        let mut w = Wallet::new("U1");
        assert!(w.credit(Money::zero(), "nothing").is_err());
        assert!(w.debit(Money::rupees(-5), "negative").is_err());
        assert!(w.transactions().is_empty());
    }

    #[test]
    fn test_reconcile_is_a_noop_on_healthy_wallet() {
        let mut w = Wallet::new("U1");
        w.credit(Money::rupees(50), "refund").unwrap();
        assert!(!w.reconcile());
        assert_eq!(w.transactions().len(), 1);
    }

    #[test]
    fn test_reconcile_repairs_a_drifted_negative_balance() {
        let mut w = Wallet::new("U1");
        w.credit(Money::rupees(100), "refund").unwrap();
        w.debit(Money::rupees(100), "purchase").unwrap();

        // A drifted document, as the store would hand it back: the debit
        // overshot the balance by 150.
        let mut doc = serde_json::to_value(&w).unwrap();
        doc["balance"] = serde_json::to_value(Money::rupees(-150)).unwrap();
        doc["transactions"][1]["amount"] = serde_json::to_value(Money::rupees(250)).unwrap();
        let mut w: Wallet = serde_json::from_value(doc).unwrap();
        assert_eq!(w.balance(), Money::rupees(-150));

        assert!(w.reconcile());
        assert_eq!(w.balance(), Money::zero());
        assert_eq!(w.ledger_sum(), w.balance());
        let correction = w.transactions().last().unwrap();
        assert_eq!(correction.kind, TransactionKind::Correction);
        assert_eq!(correction.amount, Money::rupees(150));
    }
}
