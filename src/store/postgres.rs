//! Postgres store.
//!
//! Order, wallet and coupon documents are persisted as JSONB alongside the
//! columns the lifecycle queries need; product stock is a plain row so the
//! reserve decrement can be conditioned on the current quantity in a single
//! statement. Postgres serialization failures surface as
//! `DomainError::TransactionConflict` for the engine's retry loop.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::domain::aggregates::{Address, Coupon, Order, Product, Wallet};
use crate::domain::value_objects::{Money, Quantity};
use crate::error::{DomainError, Result};
use crate::store::{Store, StoreTx};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(map_sqlx)?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DomainError::Storage(e.to_string()))
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await.map_err(map_sqlx)?;
        Ok(Box::new(PgTx { tx }))
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn order(&mut self, order_id: &str) -> Result<Order> {
        let row = sqlx::query("SELECT doc FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?
            .ok_or(DomainError::NotFound("order"))?;
        decode_doc(row.try_get("doc").map_err(map_sqlx)?)
    }

    async fn put_order(&mut self, order: &Order) -> Result<()> {
        let doc = encode_doc(order)?;
        sqlx::query(
            "INSERT INTO orders (id, user_id, status, coupon, is_deleted, created_at, doc) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO UPDATE SET \
               status = EXCLUDED.status, coupon = EXCLUDED.coupon, \
               is_deleted = EXCLUDED.is_deleted, doc = EXCLUDED.doc",
        )
        .bind(order.id())
        .bind(order.user_id())
        .bind(order.status().as_str())
        .bind(order.coupon())
        .bind(order.is_deleted())
        .bind(order.created_at())
        .bind(doc)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn orders_for_user(&mut self, user_id: &str) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT doc FROM orders WHERE user_id = $1 AND is_deleted = FALSE \
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        rows.into_iter()
            .map(|row| decode_doc(row.try_get("doc").map_err(map_sqlx)?))
            .collect()
    }

    async fn product(&mut self, product_id: &str) -> Result<Product> {
        let row = sqlx::query(
            "SELECT id, title, price, available_quantity, is_deleted, created_at, updated_at \
             FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(product_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?
        .ok_or(DomainError::NotFound("product"))?;
        Ok(Product {
            id: row.try_get("id").map_err(map_sqlx)?,
            title: row.try_get("title").map_err(map_sqlx)?,
            price: Money::new(row.try_get("price").map_err(map_sqlx)?),
            available: Quantity::new(row.try_get::<i32, _>("available_quantity").map_err(map_sqlx)?.max(0) as u32),
            is_deleted: row.try_get("is_deleted").map_err(map_sqlx)?,
            created_at: row.try_get("created_at").map_err(map_sqlx)?,
            updated_at: row.try_get("updated_at").map_err(map_sqlx)?,
        })
    }

    async fn put_product(&mut self, product: &Product) -> Result<()> {
        sqlx::query(
            "INSERT INTO products (id, title, price, available_quantity, is_deleted, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO UPDATE SET \
               title = EXCLUDED.title, price = EXCLUDED.price, \
               available_quantity = EXCLUDED.available_quantity, \
               is_deleted = EXCLUDED.is_deleted, updated_at = EXCLUDED.updated_at",
        )
        .bind(product.id())
        .bind(product.title())
        .bind(product.price().amount())
        .bind(int_quantity(product.available())?)
        .bind(product.is_deleted())
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn reserve_stock(&mut self, product_id: &str, quantity: u32) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE products SET available_quantity = available_quantity - $2, updated_at = NOW() \
             WHERE id = $1 AND is_deleted = FALSE AND available_quantity >= $2",
        )
        .bind(product_id)
        .bind(int_quantity(quantity)?)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        if updated.rows_affected() == 1 {
            return Ok(());
        }
        // The conditional update missed; work out which guard failed.
        let probe = sqlx::query("SELECT is_deleted FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        match probe {
            None => Err(DomainError::NotFound("product")),
            Some(row) if row.try_get::<bool, _>("is_deleted").map_err(map_sqlx)? => Err(
                DomainError::precondition(format!("product {product_id} is no longer available")),
            ),
            Some(_) => Err(DomainError::InsufficientStock { product_id: product_id.to_string() }),
        }
    }

    async fn restock(&mut self, product_id: &str, quantity: u32) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE products SET available_quantity = available_quantity + $2, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(product_id)
        .bind(int_quantity(quantity)?)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        if updated.rows_affected() == 0 {
            return Err(DomainError::NotFound("product"));
        }
        Ok(())
    }

    async fn address(&mut self, address_id: &str) -> Result<Option<Address>> {
        let row = sqlx::query(
            "SELECT id, user_id, details, created_at FROM addresses WHERE id = $1",
        )
        .bind(address_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        row.map(|row| {
            Ok(Address {
                id: row.try_get("id").map_err(map_sqlx)?,
                user_id: row.try_get("user_id").map_err(map_sqlx)?,
                details: row.try_get("details").map_err(map_sqlx)?,
                created_at: row.try_get("created_at").map_err(map_sqlx)?,
            })
        })
        .transpose()
    }

    async fn wallet(&mut self, user_id: &str) -> Result<Option<Wallet>> {
        let row = sqlx::query("SELECT doc FROM wallets WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        row.map(|row| decode_doc(row.try_get("doc").map_err(map_sqlx)?)).transpose()
    }

    async fn put_wallet(&mut self, wallet: &Wallet) -> Result<()> {
        let doc = encode_doc(wallet)?;
        sqlx::query(
            "INSERT INTO wallets (user_id, doc, updated_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (user_id) DO UPDATE SET doc = EXCLUDED.doc, updated_at = NOW()",
        )
        .bind(wallet.user_id())
        .bind(doc)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn coupon(&mut self, code: &str) -> Result<Option<Coupon>> {
        let row = sqlx::query("SELECT doc FROM coupons WHERE code = $1 FOR UPDATE")
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        row.map(|row| decode_doc(row.try_get("doc").map_err(map_sqlx)?)).transpose()
    }

    async fn put_coupon(&mut self, coupon: &Coupon) -> Result<()> {
        let doc = encode_doc(coupon)?;
        sqlx::query(
            "INSERT INTO coupons (code, is_active, doc, updated_at) VALUES ($1, $2, $3, NOW()) \
             ON CONFLICT (code) DO UPDATE SET \
               is_active = EXCLUDED.is_active, doc = EXCLUDED.doc, updated_at = NOW()",
        )
        .bind(coupon.code())
        .bind(coupon.is_active())
        .bind(doc)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn has_pending_order_with_coupon(&mut self, code: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM orders \
             WHERE coupon = $1 AND status = 'pending' AND is_deleted = FALSE) AS present",
        )
        .bind(code)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        row.try_get("present").map_err(map_sqlx)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(map_sqlx)
    }
}

// Quantities bind against INTEGER columns; anything past i32::MAX would wrap
// negative and defeat the `available_quantity >= $2` reservation guard.
fn int_quantity(quantity: u32) -> Result<i32> {
    i32::try_from(quantity).map_err(|_| DomainError::validation("quantity out of range"))
}

fn encode_doc<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| DomainError::Storage(e.to_string()))
}

fn decode_doc<T: serde::de::DeserializeOwned>(doc: serde_json::Value) -> Result<T> {
    serde_json::from_value(doc).map_err(|e| DomainError::Storage(e.to_string()))
}

fn map_sqlx(e: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(db) = &e {
        // serialization_failure / deadlock_detected
        if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) {
            return DomainError::TransactionConflict;
        }
    }
    DomainError::Storage(e.to_string())
}
