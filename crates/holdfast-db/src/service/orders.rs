//! # Order Lifecycle
//!
//! Checkout and cancellation, each one atomic unit of work.
//!
//! ## Checkout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_order(request, now)       checkout_cart(owner, cart, now)       │
//! │                                                                         │
//! │  validate_checkout()              BEGIN, lock credit, read cart lines,  │
//! │  BEGIN                            validate_checkout(), then as left     │
//! │  ├── lock credit balance          ← first statement is a write          │
//! │  ├── policy.ttl_for(balance)      ← InvalidCredit aborts                │
//! │  ├── ledger.reserve() per line    ← InsufficientStock aborts            │
//! │  ├── insert order (waitToBuy) + items (price snapshot)                  │
//! │  ├── create reservation + details (mirror the items)                    │
//! │  └── clear originating cart                                             │
//! │  COMMIT                           ← or nothing happened at all          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cancel
//! ```text
//! waitToBuy ──(owner)──► canceled
//!   BEGIN
//!   ├── UPDATE status WHERE status = waitToBuy   ← one-shot guard
//!   ├── delete reservation + details
//!   ├── release every order item
//!   COMMIT
//! ```

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::EngineResult;
use crate::pool::Database;
use crate::repository::SqliteTx;
use holdfast_core::validation::validate_checkout;
use holdfast_core::{
    CheckoutRequest, CoreError, CreditPolicy, Order, OrderPlaced, OrderStatus, OrderWithItems,
    Reservation, ReservationDetail,
};

/// Order lifecycle operations.
///
/// ## Usage
/// ```rust,ignore
/// let service = db.order_service(CreditPolicy::default());
/// let placed = service.checkout_cart("user-1", &cart_id, Utc::now()).await?;
/// service.cancel_order("user-1", &placed.order_id, Utc::now()).await?;
/// ```
#[derive(Debug, Clone)]
pub struct OrderService {
    db: Database,
    policy: CreditPolicy,
}

impl OrderService {
    /// Creates a new OrderService.
    pub fn new(db: Database, policy: CreditPolicy) -> Self {
        OrderService { db, policy }
    }

    /// Returns the credit policy in use.
    pub fn policy(&self) -> &CreditPolicy {
        &self.policy
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Places an order holding stock for every line.
    ///
    /// ## Errors
    /// * `EmptyCart` / `Validation` - rejected before any write
    /// * `CustomerNotFound` - no credit row for the owner
    /// * `InvalidCredit` - balance has no TTL
    /// * `SkuNotFound` / `InsufficientStock` - a line cannot be held
    ///
    /// Every error leaves the store untouched.
    pub async fn create_order(
        &self,
        request: CheckoutRequest,
        now: DateTime<Utc>,
    ) -> EngineResult<OrderPlaced> {
        validate_checkout(&request)?;

        let owner_id = request.owner_id.as_str();
        let mut tx = self.db.pool().begin().await?;

        let balance = self
            .db
            .credits()
            .lock_balance(&mut tx, owner_id)
            .await?
            .ok_or_else(|| CoreError::CustomerNotFound(owner_id.to_string()))?;

        self.place(tx, &request, balance, now).await
    }

    /// Checks out a stored cart on behalf of its owner.
    ///
    /// The cart is read and emptied inside the checkout transaction, after
    /// the write lock is taken. A second checkout of the same cart sees it
    /// empty and fails with `EmptyCart`.
    ///
    /// ## Errors
    /// * `CartNotFound` / `Forbidden` - checked before the credit row
    /// * everything [`create_order`](Self::create_order) returns
    pub async fn checkout_cart(
        &self,
        owner_id: &str,
        cart_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<OrderPlaced> {
        let carts = self.db.carts();
        let mut tx = self.db.pool().begin().await?;

        let locked = self.db.credits().lock_balance(&mut tx, owner_id).await?;

        let cart = carts
            .get(&mut tx, cart_id)
            .await?
            .ok_or_else(|| CoreError::CartNotFound(cart_id.to_string()))?;

        if cart.owner_id != owner_id {
            return Err(CoreError::Forbidden {
                resource: "cart",
                id: cart_id.to_string(),
                requester: owner_id.to_string(),
            }
            .into());
        }

        let lines = carts.items_of(&mut tx, cart_id).await?;
        debug!(cart_id = %cart_id, lines = lines.len(), "Checking out cart");

        let request = CheckoutRequest {
            owner_id: owner_id.to_string(),
            cart_id: Some(cart_id.to_string()),
            total_cents: cart.total_cents,
            lines,
        };
        validate_checkout(&request)?;

        let balance = locked.ok_or_else(|| CoreError::CustomerNotFound(owner_id.to_string()))?;

        self.place(tx, &request, balance, now).await
    }

    /// Cancels a `waitToBuy` order and returns its stock.
    ///
    /// ## Errors
    /// * `OrderNotFound`
    /// * `Forbidden` - requester is not the owner
    /// * `InvalidTransition` - order is no longer `waitToBuy`
    pub async fn cancel_order(
        &self,
        requester_id: &str,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Order> {
        let orders = self.db.orders();

        let order = self.owned_order(requester_id, order_id).await?;
        if !order.status.can_transition_to(OrderStatus::Canceled) {
            return Err(invalid_cancel(&order).into());
        }

        let mut tx = self.db.pool().begin().await?;

        let moved = orders
            .transition(&mut tx, order_id, OrderStatus::WaitToBuy, OrderStatus::Canceled, now)
            .await?;

        if !moved {
            // Lost a race with the sweeper or another cancel.
            tx.rollback().await?;
            let current = orders
                .get_by_id(order_id)
                .await?
                .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()))?;
            return Err(invalid_cancel(&current).into());
        }

        self.db.reservations().delete_for_order(&mut tx, order_id).await?;

        let ledger = self.db.ledger();
        let items = orders.items_in_tx(&mut tx, order_id).await?;
        let mut released = 0;
        for item in &items {
            ledger.release(&mut tx, &item.sku(), item.quantity, now).await?;
            released += item.quantity;
        }

        tx.commit().await?;

        info!(order_id = %order_id, owner_id = %requester_id, released, "Order canceled");

        Ok(Order {
            status: OrderStatus::Canceled,
            updated_at: now,
            ..order
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets one of the requester's orders with its items.
    pub async fn get_order(&self, requester_id: &str, order_id: &str) -> EngineResult<OrderWithItems> {
        let order = self.owned_order(requester_id, order_id).await?;
        let items = self.db.orders().items_of(order_id).await?;

        Ok(OrderWithItems { order, items })
    }

    /// Lists the owner's orders with items, newest first.
    pub async fn list_orders(&self, owner_id: &str) -> EngineResult<Vec<OrderWithItems>> {
        Ok(self.db.orders().list_for_owner(owner_id).await?)
    }

    /// Lists the owner's live reservations, newest first.
    pub async fn list_reservations(&self, owner_id: &str) -> EngineResult<Vec<Reservation>> {
        Ok(self.db.reservations().list_for_owner(owner_id).await?)
    }

    /// Gets the details of one of the requester's reservations.
    pub async fn reservation_details(
        &self,
        requester_id: &str,
        reservation_id: &str,
    ) -> EngineResult<Vec<ReservationDetail>> {
        let reservations = self.db.reservations();

        let reservation = reservations
            .get_by_id(reservation_id)
            .await?
            .ok_or_else(|| CoreError::ReservationNotFound(reservation_id.to_string()))?;

        if reservation.owner_id != requester_id {
            return Err(CoreError::Forbidden {
                resource: "reservation",
                id: reservation_id.to_string(),
                requester: requester_id.to_string(),
            }
            .into());
        }

        Ok(reservations.details_for(reservation_id).await?)
    }

    /// Holds stock, writes the order and its reservation, clears the cart,
    /// then commits. `tx` already holds the owner's credit row.
    async fn place(
        &self,
        mut tx: SqliteTx<'_>,
        request: &CheckoutRequest,
        balance: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<OrderPlaced> {
        let owner_id = request.owner_id.as_str();
        let ttl = self.policy.ttl_for(balance)?;
        let expires_at = now + ttl;

        let ledger = self.db.ledger();
        for line in &request.lines {
            ledger
                .reserve(&mut tx, &line.sku, line.quantity, now)
                .await?
                .into_result(&line.sku, line.quantity)?;
        }

        let (order, items) = self
            .db
            .orders()
            .insert(
                &mut tx,
                owner_id,
                request.cart_id.as_deref(),
                request.total_cents,
                expires_at,
                &request.lines,
                now,
            )
            .await?;

        let reservation = self
            .db
            .reservations()
            .create(&mut tx, owner_id, &order.id, now, ttl, &items)
            .await?;

        if let Some(cart_id) = &request.cart_id {
            self.db.carts().clear(&mut tx, cart_id, now).await?;
        }

        tx.commit().await?;

        info!(
            order_id = %order.id,
            owner_id = %owner_id,
            lines = items.len(),
            total_cents = order.total_cents,
            balance,
            expires_at = %expires_at,
            "Order placed"
        );

        Ok(OrderPlaced {
            order_id: order.id,
            reservation_id: reservation.id,
            total_cents: order.total_cents,
            expires_at,
        })
    }

    async fn owned_order(&self, requester_id: &str, order_id: &str) -> EngineResult<Order> {
        let order = self
            .db
            .orders()
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()))?;

        if order.owner_id != requester_id {
            return Err(CoreError::Forbidden {
                resource: "order",
                id: order_id.to_string(),
                requester: requester_id.to_string(),
            }
            .into());
        }

        Ok(order)
    }
}

fn invalid_cancel(order: &Order) -> CoreError {
    CoreError::InvalidTransition {
        order_id: order.id.clone(),
        status: order.status,
        target: OrderStatus::Canceled,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DbConfig, ErrorKind};
    use chrono::{Duration, TimeZone};
    use holdfast_core::{OrderLine, SkuRef};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap()
    }

    async fn setup(balance: i64) -> (Database, OrderService, SkuRef) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.credits().set_balance("alice", balance).await.unwrap();
        let sku = db.catalog().insert_product("Kettle", 3000, 10).await.unwrap();
        let service = db.order_service(CreditPolicy::default());
        (db, service, sku)
    }

    fn request(sku: &SkuRef, qty: i64) -> CheckoutRequest {
        CheckoutRequest::from_lines("alice", vec![OrderLine::new(sku.clone(), qty, 3000)])
    }

    #[tokio::test]
    async fn test_ttl_follows_credit() {
        for (balance, hours) in [(3, 24), (2, 12), (1, 6)] {
            let (_, service, sku) = setup(balance).await;
            let placed = service.create_order(request(&sku, 1), t0()).await.unwrap();
            assert_eq!(placed.expires_at, t0() + Duration::hours(hours));
        }
    }

    #[tokio::test]
    async fn test_create_order_holds_stock() {
        let (db, service, sku) = setup(3).await;

        let placed = service.create_order(request(&sku, 4), t0()).await.unwrap();
        assert_eq!(placed.total_cents, 12000);
        assert_eq!(db.ledger().stock_of(&sku).await.unwrap(), Some(6));

        let order = service.get_order("alice", &placed.order_id).await.unwrap();
        assert_eq!(order.order.status, OrderStatus::WaitToBuy);
        assert_eq!(order.items[0].unit_price_cents, 3000);

        let reservation = db
            .reservations()
            .find_by_order(&placed.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reservation.id, placed.reservation_id);
        assert_eq!(reservation.expires_at, placed.expires_at);

        // Checkout does not touch credit
        assert_eq!(db.credits().balance("alice").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_zero_credit_blocks_checkout() {
        let (db, service, sku) = setup(0).await;

        let err = service.create_order(request(&sku, 1), t0()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCredit);
        assert_eq!(db.ledger().stock_of(&sku).await.unwrap(), Some(10));
        assert!(service.list_orders("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_customer() {
        let (_, service, sku) = setup(3).await;
        let mut req = request(&sku, 1);
        req.owner_id = "mallory".to_string();

        let err = service.create_order(req, t0()).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::CustomerNotFound(_))));
    }

    #[tokio::test]
    async fn test_empty_and_invalid_requests() {
        let (_, service, sku) = setup(3).await;

        let empty = CheckoutRequest::from_lines("alice", vec![]);
        let err = service.create_order(empty, t0()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyCart);

        let err = service.create_order(request(&sku, 0), t0()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[tokio::test]
    async fn test_unknown_sku_is_not_found() {
        let (_, service, _) = setup(3).await;
        let ghost = SkuRef::product("ghost");

        let err = service.create_order(request(&ghost, 1), t0()).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::SkuNotFound(sku)) if *sku == ghost));
    }

    #[tokio::test]
    async fn test_cancel_returns_stock() {
        let (db, service, sku) = setup(3).await;
        let placed = service.create_order(request(&sku, 2), t0()).await.unwrap();

        let canceled = service
            .cancel_order("alice", &placed.order_id, t0() + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(canceled.status, OrderStatus::Canceled);
        assert_eq!(db.ledger().stock_of(&sku).await.unwrap(), Some(10));
        assert!(db.reservations().find_by_order(&placed.order_id).await.unwrap().is_none());

        let again = service
            .cancel_order("alice", &placed.order_id, t0() + Duration::minutes(2))
            .await
            .unwrap_err();
        assert_eq!(again.kind(), ErrorKind::InvalidTransition);
        assert_eq!(db.ledger().stock_of(&sku).await.unwrap(), Some(10));
    }

    #[tokio::test]
    async fn test_cancel_checks_owner_and_existence() {
        let (db, service, sku) = setup(3).await;
        let placed = service.create_order(request(&sku, 1), t0()).await.unwrap();

        let err = service.cancel_order("bob", &placed.order_id, t0()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(db.ledger().stock_of(&sku).await.unwrap(), Some(9));

        let err = service.cancel_order("alice", "no-such-order", t0()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_checkout_cart_clears_cart() {
        let (db, service, sku) = setup(2).await;
        let cart_id = db.carts().create_cart("alice").await.unwrap();
        db.carts().add_item(&cart_id, &sku, 3, 3000).await.unwrap();

        let placed = service.checkout_cart("alice", &cart_id, t0()).await.unwrap();
        assert_eq!(placed.total_cents, 9000);
        assert_eq!(placed.expires_at, t0() + Duration::hours(12));

        let mut tx = db.pool().begin().await.unwrap();
        let cart = db.carts().get(&mut tx, &cart_id).await.unwrap().unwrap();
        let lines = db.carts().items_of(&mut tx, &cart_id).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(cart.total_cents, 0);
        assert!(lines.is_empty());

        let order = db.orders().get_by_id(&placed.order_id).await.unwrap().unwrap();
        assert_eq!(order.cart_id.as_deref(), Some(cart_id.as_str()));

        // Now empty
        let err = service.checkout_cart("alice", &cart_id, t0()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyCart);
    }

    #[tokio::test]
    async fn test_checkout_foreign_cart() {
        let (db, service, sku) = setup(3).await;
        let cart_id = db.carts().create_cart("bob").await.unwrap();
        db.carts().add_item(&cart_id, &sku, 1, 3000).await.unwrap();

        let err = service.checkout_cart("alice", &cart_id, t0()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = service.checkout_cart("alice", "missing", t0()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_failed_checkout_keeps_cart() {
        let (db, service, sku) = setup(3).await;
        let cart_id = db.carts().create_cart("alice").await.unwrap();
        db.carts().add_item(&cart_id, &sku, 11, 3000).await.unwrap();

        let err = service.checkout_cart("alice", &cart_id, t0()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        let mut tx = db.pool().begin().await.unwrap();
        let lines = db.carts().items_of(&mut tx, &cart_id).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(db.ledger().stock_of(&sku).await.unwrap(), Some(10));
    }

    #[tokio::test]
    async fn test_reservation_reads_are_owner_only() {
        let (_, service, sku) = setup(3).await;
        let placed = service.create_order(request(&sku, 2), t0()).await.unwrap();

        let mine = service.list_reservations("alice").await.unwrap();
        assert_eq!(mine.len(), 1);

        let details = service
            .reservation_details("alice", &placed.reservation_id)
            .await
            .unwrap();
        assert_eq!(details[0].quantity, 2);

        let err = service
            .reservation_details("bob", &placed.reservation_id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = service.get_order("bob", &placed.order_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
}
