//! # Order Repository
//!
//! Orders, their items, and guarded status transitions.
//!
//! ## Status Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every status change is a conditional UPDATE:                           │
//! │                                                                         │
//! │    UPDATE orders SET status = :to                                       │
//! │    WHERE id = :id AND status = :from                                    │
//! │                                                                         │
//! │  1 row  → this caller performed the transition                          │
//! │  0 rows → someone else already did (or the order is gone)               │
//! │                                                                         │
//! │  A cancel and a sweep racing on one order can therefore never both      │
//! │  release its stock.                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use super::SqliteTx;
use crate::error::DbResult;
use holdfast_core::{Order, OrderItem, OrderLine, OrderStatus, OrderWithItems};

const ORDER_COLUMNS: &str =
    "id, owner_id, cart_id, status, total_cents, expires_at, created_at, updated_at";

const ITEM_COLUMNS: &str =
    "id, order_id, product_id, variant_id, quantity, unit_price_cents, line_total_cents";

/// Repository for orders and order items.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Inserts a `waitToBuy` order and its items.
    ///
    /// ## Snapshot Pattern
    /// Unit prices and line totals are copied from the lines as given; later
    /// catalog price changes do not touch existing orders.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        &self,
        tx: &mut SqliteTx<'_>,
        owner_id: &str,
        cart_id: Option<&str>,
        total_cents: i64,
        expires_at: DateTime<Utc>,
        lines: &[OrderLine],
        now: DateTime<Utc>,
    ) -> DbResult<(Order, Vec<OrderItem>)> {
        let order = Order {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            cart_id: cart_id.map(str::to_string),
            status: OrderStatus::WaitToBuy,
            total_cents,
            expires_at,
            created_at: now,
            updated_at: now,
        };

        debug!(order_id = %order.id, owner_id = %owner_id, lines = lines.len(), "Inserting order");

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, owner_id, cart_id, status,
                total_cents, expires_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            "#,
        )
        .bind(&order.id)
        .bind(&order.owner_id)
        .bind(&order.cart_id)
        .bind(order.status.as_str())
        .bind(order.total_cents)
        .bind(order.expires_at)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for (position, line) in lines.iter().enumerate() {
            let item = OrderItem {
                id: Uuid::new_v4().to_string(),
                order_id: order.id.clone(),
                product_id: line.sku.product_id.clone(),
                variant_id: line.sku.variant_id.clone(),
                quantity: line.quantity,
                unit_price_cents: line.unit_price_cents,
                line_total_cents: line.line_total_cents,
            };

            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, product_id, variant_id,
                    quantity, unit_price_cents, line_total_cents, position
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&item.id)
            .bind(&item.order_id)
            .bind(&item.product_id)
            .bind(&item.variant_id)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.line_total_cents)
            .bind(position as i64)
            .execute(&mut **tx)
            .await?;

            items.push(item);
        }

        Ok((order, items))
    }

    /// Gets an order by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    /// Gets the items of an order, in checkout order.
    pub async fn items_of(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ?1 ORDER BY position"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Gets the items of an order inside the caller's transaction.
    pub async fn items_in_tx(&self, tx: &mut SqliteTx<'_>, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ?1 ORDER BY position"
        ))
        .bind(order_id)
        .fetch_all(&mut **tx)
        .await?;

        Ok(items)
    }

    /// Lists a customer's orders with their items, newest first.
    pub async fn list_for_owner(&self, owner_id: &str) -> DbResult<Vec<OrderWithItems>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE owner_id = ?1 ORDER BY created_at DESC, id"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT
                oi.id, oi.order_id, oi.product_id, oi.variant_id,
                oi.quantity, oi.unit_price_cents, oi.line_total_cents
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE o.owner_id = ?1
            ORDER BY oi.order_id, oi.position
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_order: HashMap<String, Vec<OrderItem>> = HashMap::new();
        for item in items {
            by_order.entry(item.order_id.clone()).or_default().push(item);
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let items = by_order.remove(&order.id).unwrap_or_default();
                OrderWithItems { order, items }
            })
            .collect())
    }

    /// Moves an order from `from` to `to` if it is still in `from`.
    ///
    /// ## Returns
    /// `true` if this call performed the transition.
    pub async fn transition(
        &self,
        tx: &mut SqliteTx<'_>,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE orders SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
        )
        .bind(order_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(now)
        .execute(&mut **tx)
        .await?;

        let moved = result.rows_affected() == 1;
        if moved {
            debug!(order_id = %order_id, from = %from, to = %to, "Order status changed");
        }

        Ok(moved)
    }

    /// Marks an order expired if it is still `waitToBuy` and past its deadline.
    pub async fn expire_if_overdue(
        &self,
        tx: &mut SqliteTx<'_>,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET status = 'expired', updated_at = ?2
            WHERE id = ?1 AND status = 'waitToBuy' AND expires_at < ?2
            "#,
        )
        .bind(order_id)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Finds `waitToBuy` orders whose deadline has strictly passed.
    pub async fn find_overdue(&self, now: DateTime<Utc>) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE status = 'waitToBuy' AND expires_at < ?1 \
             ORDER BY expires_at, id"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::{Duration, TimeZone};
    use holdfast_core::SkuRef;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    async fn place(db: &Database, owner: &str, at: DateTime<Utc>) -> (Order, Vec<OrderItem>) {
        let a = db.catalog().insert_product("A", 250, 10).await.unwrap();
        let b = db.catalog().insert_product("B", 1000, 10).await.unwrap();
        let lines = vec![OrderLine::new(a, 2, 250), OrderLine::new(b, 1, 1000)];

        let mut tx = db.pool().begin().await.unwrap();
        let placed = db
            .orders()
            .insert(&mut tx, owner, None, 1500, at + Duration::hours(12), &lines, at)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        placed
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (order, items) = place(&db, "u-1", t0()).await;

        let stored = db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::WaitToBuy);
        assert_eq!(stored.total_cents, 1500);
        assert_eq!(stored.expires_at, t0() + Duration::hours(12));
        assert!(stored.cart_id.is_none());

        let stored_items = db.orders().items_of(&order.id).await.unwrap();
        assert_eq!(stored_items.len(), 2);
        assert_eq!(stored_items[0].id, items[0].id);
        assert_eq!(stored_items[0].line_total_cents, 500);
    }

    #[tokio::test]
    async fn test_transition_is_one_shot() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (order, _) = place(&db, "u-1", t0()).await;
        let orders = db.orders();

        let mut tx = db.pool().begin().await.unwrap();
        let first = orders
            .transition(&mut tx, &order.id, OrderStatus::WaitToBuy, OrderStatus::Canceled, t0())
            .await
            .unwrap();
        let second = orders
            .transition(&mut tx, &order.id, OrderStatus::WaitToBuy, OrderStatus::Canceled, t0())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(first);
        assert!(!second);
        let stored = orders.get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Canceled);
    }

    #[tokio::test]
    async fn test_overdue_is_strict() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (order, _) = place(&db, "u-1", t0()).await;
        let deadline = t0() + Duration::hours(12);

        assert!(db.orders().find_overdue(deadline).await.unwrap().is_empty());
        let overdue = db.orders().find_overdue(deadline + Duration::seconds(1)).await.unwrap();
        assert_eq!(overdue.len(), 1);

        let mut tx = db.pool().begin().await.unwrap();
        assert!(!db.orders().expire_if_overdue(&mut tx, &order.id, deadline).await.unwrap());
        assert!(db
            .orders()
            .expire_if_overdue(&mut tx, &order.id, deadline + Duration::seconds(1))
            .await
            .unwrap());
        tx.commit().await.unwrap();

        let stored = db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Expired);
    }

    #[tokio::test]
    async fn test_list_for_owner_newest_first() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (older, _) = place(&db, "u-1", t0()).await;
        let (newer, _) = place(&db, "u-1", t0() + Duration::minutes(5)).await;
        place(&db, "u-2", t0()).await;

        let listed = db.orders().list_for_owner("u-1").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].order.id, newer.id);
        assert_eq!(listed[1].order.id, older.id);
        assert!(listed.iter().all(|o| o.items.len() == 2));
    }

    #[tokio::test]
    async fn test_item_for_unknown_product_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let lines = vec![OrderLine::new(SkuRef::product("ghost"), 1, 100)];

        let mut tx = db.pool().begin().await.unwrap();
        let err = db
            .orders()
            .insert(&mut tx, "u-1", None, 100, t0(), &lines, t0())
            .await
            .unwrap_err();
        tx.rollback().await.unwrap();

        assert!(matches!(err, crate::DbError::ForeignKeyViolation { .. }));
    }
}
