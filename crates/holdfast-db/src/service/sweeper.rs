//! # Expiry Sweeper
//!
//! Batch passes that resolve holds whose deadline has passed. The timer is
//! external (`holdfast-sweep`, cron, a scheduler); every pass is idempotent.
//!
//! ## Passes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sweep(now)                                                             │
//! │    scan: orders WHERE status = waitToBuy AND expires_at < now           │
//! │    per order, own transaction:                                          │
//! │      ├── mark expired (only if still waitToBuy and overdue)             │
//! │      ├── delete reservation + details (absent → nothing to release)     │
//! │      ├── release every removed detail                                   │
//! │      └── penalize owner credit (clamped at the floor)                   │
//! │                                                                         │
//! │  clean_expired_reservations(now)                                        │
//! │    scan: reservations WHERE expires_at <= now (details inlined)         │
//! │    per reservation, own transaction:                                    │
//! │      ├── delete only if still present and due                          │
//! │      ├── release the removed details                                    │
//! │      └── mark order expired if still waitToBuy  (no credit penalty)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failure on one order is logged and reported; the pass carries on with
//! the next one. Only a failed scan aborts the pass.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{DbResult, EngineResult};
use crate::pool::Database;
use crate::repository::credit::Penalty;
use holdfast_core::{CreditPolicy, ExpiredReservation, Order, OrderStatus};

// =============================================================================
// Reports
// =============================================================================

/// One order or reservation the pass could not resolve.
#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    pub id: String,
    pub reason: String,
}

/// Result of [`ExpirySweeper::sweep`].
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub ran_at: DateTime<Utc>,
    /// Overdue orders found by the scan.
    pub scanned: usize,
    /// Orders this pass moved to `expired`.
    pub expired: usize,
    /// Orders resolved concurrently (cancelled or swept elsewhere).
    pub skipped: usize,
    pub failed: usize,
    pub units_released: i64,
    pub credits_penalized: usize,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    fn new(ran_at: DateTime<Utc>, scanned: usize) -> Self {
        SweepReport {
            ran_at,
            scanned,
            expired: 0,
            skipped: 0,
            failed: 0,
            units_released: 0,
            credits_penalized: 0,
            failures: Vec::new(),
        }
    }
}

/// Result of [`ExpirySweeper::clean_expired_reservations`].
#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    pub ran_at: DateTime<Utc>,
    /// Due reservations found by the scan.
    pub scanned: usize,
    /// Reservations this pass deleted.
    pub released: usize,
    /// Reservations already gone by the time they were re-checked.
    pub skipped: usize,
    pub failed: usize,
    pub units_released: i64,
    /// Orders moved to `expired` alongside their reservation.
    pub orders_expired: usize,
    pub failures: Vec<SweepFailure>,
}

impl CleanupReport {
    fn new(ran_at: DateTime<Utc>, scanned: usize) -> Self {
        CleanupReport {
            ran_at,
            scanned,
            released: 0,
            skipped: 0,
            failed: 0,
            units_released: 0,
            orders_expired: 0,
            failures: Vec::new(),
        }
    }
}

/// What expiring a single order did.
struct Expired {
    units: i64,
    penalty: Penalty,
}

/// What cleaning a single reservation did.
struct Cleaned {
    units: i64,
    order_expired: bool,
}

// =============================================================================
// Sweeper
// =============================================================================

/// Resolves overdue orders and stale reservations.
#[derive(Debug, Clone)]
pub struct ExpirySweeper {
    db: Database,
    policy: CreditPolicy,
}

impl ExpirySweeper {
    /// Creates a new ExpirySweeper.
    pub fn new(db: Database, policy: CreditPolicy) -> Self {
        ExpirySweeper { db, policy }
    }

    /// Expires every `waitToBuy` order whose deadline is strictly before `now`.
    ///
    /// Running it again with the same `now` is a no-op: expired orders no
    /// longer match the scan and credit is only taken by the transaction that
    /// performed the transition.
    pub async fn sweep(&self, now: DateTime<Utc>) -> EngineResult<SweepReport> {
        let overdue = self.db.orders().find_overdue(now).await?;
        Ok(self.expire_all(&overdue, now).await)
    }

    /// Deletes every reservation due at `now` and returns its stock.
    ///
    /// Orders still `waitToBuy` are marked expired; credit is left alone.
    pub async fn clean_expired_reservations(&self, now: DateTime<Utc>) -> EngineResult<CleanupReport> {
        let due = self.db.reservations().find_expired(now).await?;
        Ok(self.clean_all(&due, now).await)
    }

    /// Expires each scanned order in its own transaction.
    ///
    /// The scan may be stale by now; orders resolved since are skipped.
    async fn expire_all(&self, overdue: &[Order], now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::new(now, overdue.len());

        for order in overdue {
            match self.expire_order(order, now).await {
                Ok(Some(done)) => {
                    report.expired += 1;
                    report.units_released += done.units;
                    match done.penalty {
                        Penalty::Applied { .. } => report.credits_penalized += 1,
                        Penalty::AtFloor { balance } => {
                            debug!(owner_id = %order.owner_id, balance, "Credit already at floor");
                        }
                        Penalty::NoAccount => {
                            warn!(owner_id = %order.owner_id, order_id = %order.id, "No credit row to penalize");
                        }
                    }
                }
                Ok(None) => {
                    debug!(order_id = %order.id, "Order already resolved, skipping");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "Failed to expire order");
                    report.failed += 1;
                    report.failures.push(SweepFailure {
                        id: order.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            scanned = report.scanned,
            expired = report.expired,
            skipped = report.skipped,
            failed = report.failed,
            units_released = report.units_released,
            credits_penalized = report.credits_penalized,
            "Order sweep complete"
        );

        report
    }

    /// Cleans each scanned reservation in its own transaction.
    async fn clean_all(&self, due: &[ExpiredReservation], now: DateTime<Utc>) -> CleanupReport {
        let mut report = CleanupReport::new(now, due.len());

        for reservation in due {
            match self.clean_reservation(reservation, now).await {
                Ok(Some(done)) => {
                    report.released += 1;
                    report.units_released += done.units;
                    if done.order_expired {
                        report.orders_expired += 1;
                    }
                }
                Ok(None) => {
                    debug!(reservation_id = %reservation.reservation_id, "Reservation already resolved, skipping");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(
                        reservation_id = %reservation.reservation_id,
                        order_id = %reservation.order_id,
                        error = %e,
                        "Failed to clean reservation"
                    );
                    report.failed += 1;
                    report.failures.push(SweepFailure {
                        id: reservation.reservation_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            scanned = report.scanned,
            released = report.released,
            skipped = report.skipped,
            failed = report.failed,
            units_released = report.units_released,
            orders_expired = report.orders_expired,
            "Reservation cleanup complete"
        );

        report
    }

    async fn expire_order(&self, order: &Order, now: DateTime<Utc>) -> DbResult<Option<Expired>> {
        let mut tx = self.db.pool().begin().await?;

        if !self.db.orders().expire_if_overdue(&mut tx, &order.id, now).await? {
            tx.rollback().await?;
            return Ok(None);
        }

        let details = self
            .db
            .reservations()
            .delete_for_order(&mut tx, &order.id)
            .await?
            .unwrap_or_default();

        let ledger = self.db.ledger();
        let mut units = 0;
        for detail in &details {
            ledger.release(&mut tx, &detail.sku(), detail.quantity, now).await?;
            units += detail.quantity;
        }

        let penalty = self
            .db
            .credits()
            .penalize(&mut tx, &order.owner_id, &self.policy, now)
            .await?;

        tx.commit().await?;

        info!(
            order_id = %order.id,
            owner_id = %order.owner_id,
            status = %OrderStatus::Expired,
            units,
            "Order expired"
        );

        Ok(Some(Expired { units, penalty }))
    }

    async fn clean_reservation(
        &self,
        reservation: &ExpiredReservation,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Cleaned>> {
        let mut tx = self.db.pool().begin().await?;

        let removed = self
            .db
            .reservations()
            .delete_if_expired(&mut tx, &reservation.reservation_id, now)
            .await?;

        let Some(details) = removed else {
            tx.rollback().await?;
            return Ok(None);
        };

        let ledger = self.db.ledger();
        let mut units = 0;
        for detail in &details {
            ledger.release(&mut tx, &detail.sku(), detail.quantity, now).await?;
            units += detail.quantity;
        }

        let order_expired = self
            .db
            .orders()
            .transition(
                &mut tx,
                &reservation.order_id,
                OrderStatus::WaitToBuy,
                OrderStatus::Expired,
                now,
            )
            .await?;

        tx.commit().await?;

        debug!(
            reservation_id = %reservation.reservation_id,
            order_id = %reservation.order_id,
            units,
            order_expired,
            "Reservation cleaned"
        );

        Ok(Some(Cleaned { units, order_expired }))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
