//! # Reservation Store
//!
//! Reservation headers and their per-SKU details.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  create()            ← same transaction as the order it backs          │
//! │     │                                                                   │
//! │     │   (never updated)                                                 │
//! │     │                                                                   │
//! │     ├── delete_for_order()   ← cancel / sweep                          │
//! │     └── delete_if_expired()  ← reservation cleanup                     │
//! │                                                                         │
//! │  Deleting returns the removed details so the caller releases exactly   │
//! │  what was held.                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use super::SqliteTx;
use crate::error::DbResult;
use holdfast_core::{ExpiredReservation, OrderItem, Reservation, ReservationDetail};

/// One row of the expired-reservation join (details may be absent).
#[derive(Debug, sqlx::FromRow)]
struct ExpiredRow {
    reservation_id: String,
    order_id: String,
    owner_id: String,
    expires_at: DateTime<Utc>,
    product_id: Option<String>,
    variant_id: Option<String>,
    quantity: Option<i64>,
}

/// Repository for reservations and reservation details.
#[derive(Debug, Clone)]
pub struct ReservationStore {
    pool: SqlitePool,
}

impl ReservationStore {
    /// Creates a new ReservationStore.
    pub fn new(pool: SqlitePool) -> Self {
        ReservationStore { pool }
    }

    /// Creates a reservation holding one detail per order item.
    ///
    /// ## Returns
    /// The stored reservation (`expires_at = reserved_at + ttl`).
    pub async fn create(
        &self,
        tx: &mut SqliteTx<'_>,
        owner_id: &str,
        order_id: &str,
        reserved_at: DateTime<Utc>,
        ttl: Duration,
        items: &[OrderItem],
    ) -> DbResult<Reservation> {
        let reservation = Reservation {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            order_id: order_id.to_string(),
            reserved_at,
            expires_at: reserved_at + ttl,
        };

        debug!(
            reservation_id = %reservation.id,
            order_id = %order_id,
            lines = items.len(),
            "Creating reservation"
        );

        sqlx::query(
            r#"
            INSERT INTO reservations (id, owner_id, order_id, reserved_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&reservation.id)
        .bind(&reservation.owner_id)
        .bind(&reservation.order_id)
        .bind(reservation.reserved_at)
        .bind(reservation.expires_at)
        .execute(&mut **tx)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO reservation_details (reservation_id, product_id, variant_id, quantity)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(&reservation.id)
            .bind(&item.product_id)
            .bind(&item.variant_id)
            .bind(item.quantity)
            .execute(&mut **tx)
            .await?;
        }

        Ok(reservation)
    }

    /// Gets a reservation by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Reservation>> {
        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT id, owner_id, order_id, reserved_at, expires_at
            FROM reservations
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reservation)
    }

    /// Gets the live reservation backing an order, if any.
    pub async fn find_by_order(&self, order_id: &str) -> DbResult<Option<Reservation>> {
        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT id, owner_id, order_id, reserved_at, expires_at
            FROM reservations
            WHERE order_id = ?1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reservation)
    }

    /// Gets the details of a reservation, in creation order.
    pub async fn details_for(&self, reservation_id: &str) -> DbResult<Vec<ReservationDetail>> {
        let details = sqlx::query_as::<_, ReservationDetail>(
            r#"
            SELECT reservation_id, product_id, variant_id, quantity
            FROM reservation_details
            WHERE reservation_id = ?1
            ORDER BY id
            "#,
        )
        .bind(reservation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(details)
    }

    /// Lists a customer's reservations, newest first.
    pub async fn list_for_owner(&self, owner_id: &str) -> DbResult<Vec<Reservation>> {
        let reservations = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT id, owner_id, order_id, reserved_at, expires_at
            FROM reservations
            WHERE owner_id = ?1
            ORDER BY reserved_at DESC, id
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(reservations)
    }

    /// Deletes the reservation of an order.
    ///
    /// ## Returns
    /// * `Some(details)` - the reservation existed; these units were held
    /// * `None` - no reservation (already released)
    pub async fn delete_for_order(
        &self,
        tx: &mut SqliteTx<'_>,
        order_id: &str,
    ) -> DbResult<Option<Vec<ReservationDetail>>> {
        let details = sqlx::query_as::<_, ReservationDetail>(
            r#"
            DELETE FROM reservation_details
            WHERE reservation_id IN (SELECT id FROM reservations WHERE order_id = ?1)
            RETURNING reservation_id, product_id, variant_id, quantity
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut **tx)
        .await?;

        let removed = sqlx::query("DELETE FROM reservations WHERE order_id = ?1")
            .bind(order_id)
            .execute(&mut **tx)
            .await?
            .rows_affected();

        if removed == 0 {
            return Ok(None);
        }

        debug!(order_id = %order_id, details = details.len(), "Reservation deleted");
        Ok(Some(details))
    }

    /// Deletes a reservation only if it still exists and is due at `now`.
    ///
    /// The check and the delete are one statement, so a reservation removed
    /// by a concurrent cancel is never released twice.
    pub async fn delete_if_expired(
        &self,
        tx: &mut SqliteTx<'_>,
        reservation_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Vec<ReservationDetail>>> {
        let details = sqlx::query_as::<_, ReservationDetail>(
            r#"
            DELETE FROM reservation_details
            WHERE reservation_id IN (
                SELECT id FROM reservations WHERE id = ?1 AND expires_at <= ?2
            )
            RETURNING reservation_id, product_id, variant_id, quantity
            "#,
        )
        .bind(reservation_id)
        .bind(now)
        .fetch_all(&mut **tx)
        .await?;

        let removed = sqlx::query("DELETE FROM reservations WHERE id = ?1 AND expires_at <= ?2")
            .bind(reservation_id)
            .bind(now)
            .execute(&mut **tx)
            .await?
            .rows_affected();

        if removed == 0 {
            return Ok(None);
        }

        debug!(reservation_id = %reservation_id, details = details.len(), "Expired reservation deleted");
        Ok(Some(details))
    }

    /// Finds reservations due at `now` (`expires_at <= now`), details inlined.
    ///
    /// One query; rows are grouped per reservation in deadline order.
    pub async fn find_expired(&self, now: DateTime<Utc>) -> DbResult<Vec<ExpiredReservation>> {
        let rows = sqlx::query_as::<_, ExpiredRow>(
            r#"
            SELECT
                r.id AS reservation_id,
                r.order_id,
                r.owner_id,
                r.expires_at,
                d.product_id,
                d.variant_id,
                d.quantity
            FROM reservations r
            LEFT JOIN reservation_details d ON d.reservation_id = r.id
            WHERE r.expires_at <= ?1
            ORDER BY r.expires_at, r.id, d.id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut expired: Vec<ExpiredReservation> = Vec::new();
        for row in rows {
            let starts_new = expired
                .last()
                .map_or(true, |last| last.reservation_id != row.reservation_id);

            if starts_new {
                expired.push(ExpiredReservation {
                    reservation_id: row.reservation_id.clone(),
                    order_id: row.order_id,
                    owner_id: row.owner_id,
                    expires_at: row.expires_at,
                    details: Vec::new(),
                });
            }

            if let (Some(product_id), Some(quantity), Some(current)) =
                (row.product_id, row.quantity, expired.last_mut())
            {
                current.details.push(ReservationDetail {
                    reservation_id: row.reservation_id,
                    product_id,
                    variant_id: row.variant_id,
                    quantity,
                });
            }
        }

        Ok(expired)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
