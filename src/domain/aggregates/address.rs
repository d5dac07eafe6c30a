//! Shipping address reference.
//!
//! Addresses are created and edited by the account service; the lifecycle
//! core only reads them, to check that an order ships to an address the
//! requesting user actually owns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Address {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) details: String,
    pub(crate) created_at: DateTime<Utc>,
}

impl Address {
    pub fn new(user_id: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            details: details.into(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
    pub fn details(&self) -> &str {
        &self.details
    }
}
