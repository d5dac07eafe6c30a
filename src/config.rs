//! Environment-driven settings. `.env` is loaded by the binary before this
//! runs; everything has a default so tests never need the environment.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::domain::value_objects::Money;

#[derive(Clone, Debug)]
pub struct Settings {
    pub port: u16,
    pub database_url: String,
    pub nats_url: Option<String>,
    /// Flat shipping charge added to every order; rate policy is out of scope.
    pub shipping_charge: Money,
    /// Ceiling for a single wallet credit (refunds).
    pub max_credit: Money,
    /// Ceiling for a single wallet debit.
    pub max_debit: Money,
    /// Bounded retry budget for conflicted transactions.
    pub tx_retries: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 8083,
            database_url: "postgres://localhost/bookstore".to_string(),
            nats_url: None,
            shipping_charge: Money::zero(),
            max_credit: Money::rupees(100_000),
            max_debit: Money::rupees(50_000),
            tx_retries: 3,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parse("PORT", defaults.port),
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            nats_url: std::env::var("NATS_URL").ok(),
            shipping_charge: env_money("SHIPPING_CHARGE", defaults.shipping_charge),
            max_credit: env_money("WALLET_MAX_CREDIT", defaults.max_credit),
            max_debit: env_money("WALLET_MAX_DEBIT", defaults.max_debit),
            tx_retries: env_parse("TX_RETRY_LIMIT", defaults.tx_retries),
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_money(key: &str, default: Money) -> Money {
    std::env::var(key)
        .ok()
        .and_then(|v| Decimal::from_str(&v).ok())
        .map(Money::new)
        .unwrap_or(default)
}
