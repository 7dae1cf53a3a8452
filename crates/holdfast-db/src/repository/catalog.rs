//! # Catalog Repository
//!
//! Products and variants as seen by the reservation engine.
//!
//! Catalog management is owned elsewhere; this repository only creates
//! rows for seeding and tests, and reads stock units. Stock itself is
//! changed exclusively through the [`InventoryLedger`](super::inventory::InventoryLedger).

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use holdfast_core::{SkuRef, StockUnit};

/// Repository for catalog rows.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Inserts a plain product and returns its SKU.
    pub async fn insert_product(&self, name: &str, price_cents: i64, stock: i64) -> DbResult<SkuRef> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        debug!(id = %id, name = %name, stock, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, price_cents, discount_price_cents,
                stock, has_variants, created_at, updated_at
            ) VALUES (?1, ?2, ?3, NULL, ?4, 0, ?5, ?5)
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(price_cents)
        .bind(stock)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(SkuRef::product(id))
    }

    /// Inserts a variant under `product_id` and returns its SKU.
    ///
    /// The parent is flagged `has_variants`; its own stock column is left
    /// alone (variant stock never rolls up).
    pub async fn insert_variant(
        &self,
        product_id: &str,
        name: &str,
        price_cents: i64,
        stock: i64,
    ) -> DbResult<SkuRef> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        debug!(product_id = %product_id, variant_id = %id, stock, "Inserting variant");

        let mut tx = self.pool.begin().await?;

        let flagged = sqlx::query("UPDATE products SET has_variants = 1, updated_at = ?2 WHERE id = ?1")
            .bind(product_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        if flagged.rows_affected() == 0 {
            return Err(DbError::not_found("Product", product_id));
        }

        sqlx::query(
            r#"
            INSERT INTO product_variants (
                id, product_id, name, price_cents, discount_price_cents,
                stock, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?6)
            "#,
        )
        .bind(&id)
        .bind(product_id)
        .bind(name)
        .bind(price_cents)
        .bind(stock)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(SkuRef::variant(product_id, id))
    }

    /// Sets (or clears) the discounted price of a stock unit.
    pub async fn set_discount(&self, sku: &SkuRef, discount_price_cents: Option<i64>) -> DbResult<()> {
        let now = Utc::now();

        let result = match &sku.variant_id {
            Some(variant_id) => {
                sqlx::query(
                    "UPDATE product_variants SET discount_price_cents = ?3, updated_at = ?4 \
                     WHERE id = ?1 AND product_id = ?2",
                )
                .bind(variant_id)
                .bind(&sku.product_id)
                .bind(discount_price_cents)
                .bind(now)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "UPDATE products SET discount_price_cents = ?2, updated_at = ?3 WHERE id = ?1",
                )
                .bind(&sku.product_id)
                .bind(discount_price_cents)
                .bind(now)
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("StockUnit", sku.to_string()));
        }

        Ok(())
    }

    /// Returns the stock unit behind `sku`, if it exists.
    pub async fn get_stock_unit(&self, sku: &SkuRef) -> DbResult<Option<StockUnit>> {
        let unit = match &sku.variant_id {
            Some(variant_id) => {
                sqlx::query_as::<_, StockUnit>(
                    r#"
                    SELECT
                        product_id,
                        id AS variant_id,
                        stock,
                        price_cents,
                        discount_price_cents,
                        updated_at
                    FROM product_variants
                    WHERE id = ?1 AND product_id = ?2
                    "#,
                )
                .bind(variant_id)
                .bind(&sku.product_id)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, StockUnit>(
                    r#"
                    SELECT
                        id AS product_id,
                        NULL AS variant_id,
                        stock,
                        price_cents,
                        discount_price_cents,
                        updated_at
                    FROM products
                    WHERE id = ?1
                    "#,
                )
                .bind(&sku.product_id)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(unit)
    }

    /// Counts products (plain and parent rows).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig, DbError};

    #[tokio::test]
    async fn test_product_stock_unit() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();

        let sku = catalog.insert_product("Desk Lamp", 2500, 7).await.unwrap();
        catalog.set_discount(&sku, Some(1999)).await.unwrap();

        let unit = catalog.get_stock_unit(&sku).await.unwrap().unwrap();
        assert_eq!(unit.stock, 7);
        assert_eq!(unit.variant_id, None);
        assert_eq!(unit.effective_price().cents(), 1999);
        assert_eq!(catalog.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_variant_stock_is_separate() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();

        let parent = catalog.insert_product("T-Shirt", 1500, 0).await.unwrap();
        let large = catalog
            .insert_variant(&parent.product_id, "Large", 1700, 12)
            .await
            .unwrap();

        let unit = catalog.get_stock_unit(&large).await.unwrap().unwrap();
        assert_eq!(unit.stock, 12);
        assert_eq!(unit.sku(), large);

        let parent_unit = catalog.get_stock_unit(&parent).await.unwrap().unwrap();
        assert_eq!(parent_unit.stock, 0);
    }

    #[tokio::test]
    async fn test_variant_requires_parent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let err = db
            .catalog()
            .insert_variant("missing", "Small", 100, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_variant_under_wrong_product_is_unknown() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();

        let a = catalog.insert_product("A", 100, 0).await.unwrap();
        let b = catalog.insert_product("B", 100, 0).await.unwrap();
        let variant = catalog.insert_variant(&a.product_id, "Red", 100, 3).await.unwrap();

        let crossed = holdfast_core::SkuRef::variant(
            b.product_id.clone(),
            variant.variant_id.clone().unwrap(),
        );
        assert!(catalog.get_stock_unit(&crossed).await.unwrap().is_none());
    }
}
