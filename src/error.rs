//! Error taxonomy for the order lifecycle core.
//!
//! Every lifecycle operation returns a typed `DomainError`; an error raised
//! mid-transaction always rolls the whole transaction back, so callers never
//! observe half-applied state.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input, the caller's fault; no state was touched.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Order, product, wallet or coupon absent (or not visible to the caller).
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A state-machine guard was violated, e.g. cancelling a delivered item.
    #[error("{0}")]
    PreconditionFailed(String),

    #[error("insufficient stock for product {product_id}")]
    InsufficientStock { product_id: String },

    #[error("insufficient wallet balance")]
    InsufficientBalance,

    /// Wallet ceilings, coupon usage limits and coupon expiry.
    #[error("{0}")]
    LimitExceeded(String),

    /// Transient write conflict; retried internally with bounded attempts
    /// before being surfaced.
    #[error("transaction conflict, safe to retry")]
    TransactionConflict,

    #[error("storage error: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        DomainError::PreconditionFailed(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        DomainError::Validation(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::TransactionConflict)
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
