//! # Inventory Ledger
//!
//! The single writer of stock levels.
//!
//! ## Concurrency Primitive
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  reserve(sku, qty)                                                      │
//! │                                                                         │
//! │    UPDATE products SET stock = stock - qty                              │
//! │    WHERE id = sku AND stock >= qty          ← one atomic statement      │
//! │          │                                                              │
//! │          ├── 1 row  → Reserved                                          │
//! │          └── 0 rows → SELECT stock                                      │
//! │                          ├── row  → InsufficientStock { available }     │
//! │                          └── none → NotFound                            │
//! │                                                                         │
//! │  release(sku, qty)                                                      │
//! │    UPDATE products SET stock = stock + qty WHERE id = sku               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two checkouts racing for the last units both issue the conditional
//! update; the store serializes them and the loser sees 0 rows affected.
//! There is no read-then-write window.
//!
//! Variant SKUs hit `product_variants` (matched on both ids); plain SKUs hit
//! `products`. Both operations take the caller's transaction so a failed
//! checkout rolls back every decrement it already made.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use super::SqliteTx;
use crate::error::{DbError, DbResult};
use holdfast_core::{CoreError, SkuRef};

/// Outcome of a conditional decrement. Failure is a value, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved,
    InsufficientStock { available: i64 },
    NotFound,
}

impl ReserveOutcome {
    /// Converts a failed outcome into the matching domain error.
    pub fn into_result(self, sku: &SkuRef, requested: i64) -> Result<(), CoreError> {
        match self {
            ReserveOutcome::Reserved => Ok(()),
            ReserveOutcome::InsufficientStock { available } => Err(CoreError::InsufficientStock {
                sku: sku.clone(),
                available,
                requested,
            }),
            ReserveOutcome::NotFound => Err(CoreError::SkuNotFound(sku.clone())),
        }
    }
}

/// Atomic stock decrement / increment per SKU.
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    pool: SqlitePool,
}

impl InventoryLedger {
    /// Creates a new InventoryLedger.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryLedger { pool }
    }

    /// Takes `qty` units of `sku` if at least that many are available.
    pub async fn reserve(
        &self,
        tx: &mut SqliteTx<'_>,
        sku: &SkuRef,
        qty: i64,
        now: DateTime<Utc>,
    ) -> DbResult<ReserveOutcome> {
        let result = match &sku.variant_id {
            Some(variant_id) => {
                sqlx::query(
                    r#"
                    UPDATE product_variants
                    SET stock = stock - ?3, updated_at = ?4
                    WHERE id = ?1 AND product_id = ?2 AND stock >= ?3
                    "#,
                )
                .bind(variant_id)
                .bind(&sku.product_id)
                .bind(qty)
                .bind(now)
                .execute(&mut **tx)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE products
                    SET stock = stock - ?2, updated_at = ?3
                    WHERE id = ?1 AND stock >= ?2
                    "#,
                )
                .bind(&sku.product_id)
                .bind(qty)
                .bind(now)
                .execute(&mut **tx)
                .await?
            }
        };

        if result.rows_affected() == 1 {
            debug!(sku = %sku, qty, "Stock reserved");
            return Ok(ReserveOutcome::Reserved);
        }

        // Nothing matched: tell a missing SKU apart from a short one.
        // Read inside the same transaction, after the failed write.
        let available = Self::stock_in_tx(tx, sku).await?;

        let outcome = match available {
            Some(available) => ReserveOutcome::InsufficientStock { available },
            None => ReserveOutcome::NotFound,
        };
        debug!(sku = %sku, qty, ?outcome, "Stock reservation refused");

        Ok(outcome)
    }

    /// Returns `qty` units of `sku` to stock.
    ///
    /// Unconditional; fails only when the SKU no longer exists.
    pub async fn release(
        &self,
        tx: &mut SqliteTx<'_>,
        sku: &SkuRef,
        qty: i64,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = match &sku.variant_id {
            Some(variant_id) => {
                sqlx::query(
                    r#"
                    UPDATE product_variants
                    SET stock = stock + ?3, updated_at = ?4
                    WHERE id = ?1 AND product_id = ?2
                    "#,
                )
                .bind(variant_id)
                .bind(&sku.product_id)
                .bind(qty)
                .bind(now)
                .execute(&mut **tx)
                .await?
            }
            None => {
                sqlx::query("UPDATE products SET stock = stock + ?2, updated_at = ?3 WHERE id = ?1")
                    .bind(&sku.product_id)
                    .bind(qty)
                    .bind(now)
                    .execute(&mut **tx)
                    .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("StockUnit", sku.to_string()));
        }

        debug!(sku = %sku, qty, "Stock released");
        Ok(())
    }

    /// Current stock of `sku`, or `None` if the SKU does not exist.
    pub async fn stock_of(&self, sku: &SkuRef) -> DbResult<Option<i64>> {
        let stock = match &sku.variant_id {
            Some(variant_id) => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT stock FROM product_variants WHERE id = ?1 AND product_id = ?2",
                )
                .bind(variant_id)
                .bind(&sku.product_id)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar::<_, i64>("SELECT stock FROM products WHERE id = ?1")
                    .bind(&sku.product_id)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        Ok(stock)
    }

    async fn stock_in_tx(tx: &mut SqliteTx<'_>, sku: &SkuRef) -> DbResult<Option<i64>> {
        let stock = match &sku.variant_id {
            Some(variant_id) => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT stock FROM product_variants WHERE id = ?1 AND product_id = ?2",
                )
                .bind(variant_id)
                .bind(&sku.product_id)
                .fetch_optional(&mut **tx)
                .await?
            }
            None => {
                sqlx::query_scalar::<_, i64>("SELECT stock FROM products WHERE id = ?1")
                    .bind(&sku.product_id)
                    .fetch_optional(&mut **tx)
                    .await?
            }
        };

        Ok(stock)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
