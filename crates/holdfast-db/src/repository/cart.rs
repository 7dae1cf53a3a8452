//! # Cart Repository
//!
//! The slice of cart storage checkout depends on: reading a cart's priced
//! lines and clearing it once an order has been placed. Line-item editing
//! belongs to the storefront.
//!
//! Checkout reads and clears inside one transaction, after it holds the
//! write lock, so a cart is consumed by at most one order.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use super::SqliteTx;
use crate::error::{DbError, DbResult};
use holdfast_core::{Money, OrderLine, SkuRef};

/// A cart header.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Cart {
    pub id: String,
    pub owner_id: String,
    /// Running total of the cart's lines.
    pub total_cents: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    product_id: String,
    variant_id: Option<String>,
    quantity: i64,
    price_per_item_cents: i64,
    total_cents: i64,
}

impl From<CartLineRow> for OrderLine {
    fn from(row: CartLineRow) -> Self {
        OrderLine {
            sku: SkuRef {
                product_id: row.product_id,
                variant_id: row.variant_id,
            },
            quantity: row.quantity,
            unit_price_cents: row.price_per_item_cents,
            line_total_cents: row.total_cents,
        }
    }
}

/// Repository for carts.
#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
}

impl CartRepository {
    /// Creates a new CartRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CartRepository { pool }
    }

    /// Creates an empty cart and returns its ID.
    pub async fn create_cart(&self, owner_id: &str) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO carts (id, owner_id, total_cents, created_at, updated_at) VALUES (?1, ?2, 0, ?3, ?3)",
        )
        .bind(&id)
        .bind(owner_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(cart_id = %id, owner_id = %owner_id, "Cart created");
        Ok(id)
    }

    /// Adds a priced line and bumps the cart's running total.
    pub async fn add_item(
        &self,
        cart_id: &str,
        sku: &SkuRef,
        quantity: i64,
        price_per_item_cents: i64,
    ) -> DbResult<()> {
        let now = Utc::now();
        let total = Money::from_cents(price_per_item_cents).multiply_quantity(quantity);

        let mut tx = self.pool.begin().await?;

        let bumped = sqlx::query(
            "UPDATE carts SET total_cents = total_cents + ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(cart_id)
        .bind(total.cents())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if bumped.rows_affected() == 0 {
            return Err(DbError::not_found("Cart", cart_id));
        }

        sqlx::query(
            r#"
            INSERT INTO cart_items (
                id, cart_id, product_id, variant_id,
                quantity, price_per_item_cents, total_cents,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(cart_id)
        .bind(&sku.product_id)
        .bind(&sku.variant_id)
        .bind(quantity)
        .bind(price_per_item_cents)
        .bind(total.cents())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Gets a cart header inside the caller's transaction.
    pub async fn get(&self, tx: &mut SqliteTx<'_>, cart_id: &str) -> DbResult<Option<Cart>> {
        let cart = sqlx::query_as::<_, Cart>("SELECT id, owner_id, total_cents FROM carts WHERE id = ?1")
            .bind(cart_id)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(cart)
    }

    /// Gets a cart's lines as checkout input, in the order they were added.
    pub async fn items_of(&self, tx: &mut SqliteTx<'_>, cart_id: &str) -> DbResult<Vec<OrderLine>> {
        let rows = sqlx::query_as::<_, CartLineRow>(
            r#"
            SELECT product_id, variant_id, quantity, price_per_item_cents, total_cents
            FROM cart_items
            WHERE cart_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(cart_id)
        .fetch_all(&mut **tx)
        .await?;

        Ok(rows.into_iter().map(OrderLine::from).collect())
    }

    /// Removes every line and zeroes the total, inside the caller's transaction.
    pub async fn clear(
        &self,
        tx: &mut SqliteTx<'_>,
        cart_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query("DELETE FROM cart_items WHERE cart_id = ?1")
            .bind(cart_id)
            .execute(&mut **tx)
            .await?;

        sqlx::query("UPDATE carts SET total_cents = 0, updated_at = ?2 WHERE id = ?1")
            .bind(cart_id)
            .bind(now)
            .execute(&mut **tx)
            .await?;

        debug!(cart_id = %cart_id, "Cart cleared");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_cart_lines_and_total() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sku = db.catalog().insert_product("Pen", 150, 100).await.unwrap();
        let carts = db.carts();

        let cart_id = carts.create_cart("u-1").await.unwrap();
        carts.add_item(&cart_id, &sku, 4, 150).await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        let cart = carts.get(&mut tx, &cart_id).await.unwrap().unwrap();
        let lines = carts.items_of(&mut tx, &cart_id).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(cart.owner_id, "u-1");
        assert_eq!(cart.total_cents, 600);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].sku, sku);
        assert_eq!(lines[0].line_total_cents, 600);
    }

    #[tokio::test]
    async fn test_clear() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sku = db.catalog().insert_product("Pen", 150, 100).await.unwrap();
        let carts = db.carts();
        let cart_id = carts.create_cart("u-1").await.unwrap();
        carts.add_item(&cart_id, &sku, 1, 150).await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        carts.clear(&mut tx, &cart_id, chrono::Utc::now()).await.unwrap();
        assert!(carts.items_of(&mut tx, &cart_id).await.unwrap().is_empty());
        assert_eq!(carts.get(&mut tx, &cart_id).await.unwrap().unwrap().total_cents, 0);
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_add_to_missing_cart() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sku = db.catalog().insert_product("Pen", 150, 100).await.unwrap();

        let err = db.carts().add_item("missing", &sku, 1, 150).await.unwrap_err();
        assert!(matches!(err, crate::DbError::NotFound { .. }));
    }
}
