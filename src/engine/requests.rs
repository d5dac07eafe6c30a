//! Typed request bodies for the lifecycle operations. Required fields are
//! compile-time checked; shape validation runs before any state is touched.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::aggregates::{OrderStatus, PaymentMethod};
use crate::error::{DomainError, Result};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PlaceOrderRequest {
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(length(min = 1))]
    pub address_id: String,
    #[validate(length(min = 1))]
    pub items: Vec<OrderLine>,
    pub payment_method: PaymentMethod,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CancelRequest {
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(length(min = 1))]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReturnRequest {
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(length(min = 1))]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyReturnRequest {
    pub approved: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CouponRequest {
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(length(min = 1))]
    pub code: String,
}

pub(crate) fn check<T: Validate>(req: &T) -> Result<()> {
    req.validate().map_err(|e| DomainError::Validation(e.to_string()))
}
