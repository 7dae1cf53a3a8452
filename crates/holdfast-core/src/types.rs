//! # Domain Types
//!
//! Core domain types of the reservation engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   owns   ┌─────────────────┐                      │
//! │  │     Order       │─────────►│   OrderItem     │  (price snapshot)    │
//! │  │  status         │          │  sku, quantity  │                      │
//! │  │  expires_at     │          └─────────────────┘                      │
//! │  └────────┬────────┘                                                    │
//! │           │ 1:1 (cascade)                                               │
//! │  ┌────────▼────────┐   owns   ┌───────────────────┐                    │
//! │  │  Reservation    │─────────►│ ReservationDetail │  (mirrors items)   │
//! │  │  reserved_at    │          │  sku, quantity    │                    │
//! │  │  expires_at     │          └───────────────────┘                    │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! │  ┌─────────────────┐          ┌─────────────────┐                      │
//! │  │   StockUnit     │          │ CustomerCredit  │                      │
//! │  │  (SkuRef)       │          │  balance 0..=3  │                      │
//! │  │  stock ≥ 0      │          │  ("hearts")     │                      │
//! │  └─────────────────┘          └─────────────────┘                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// SKU Reference
// =============================================================================

/// Identifies a stock-keeping unit: a plain product or one of its variants.
///
/// Variant stock lives on the variant row, never on the parent product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SkuRef {
    pub product_id: String,
    pub variant_id: Option<String>,
}

impl SkuRef {
    /// A plain product.
    pub fn product(product_id: impl Into<String>) -> Self {
        SkuRef {
            product_id: product_id.into(),
            variant_id: None,
        }
    }

    /// A specific variant of a product.
    pub fn variant(product_id: impl Into<String>, variant_id: impl Into<String>) -> Self {
        SkuRef {
            product_id: product_id.into(),
            variant_id: Some(variant_id.into()),
        }
    }
}

impl fmt::Display for SkuRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant_id {
            Some(variant_id) => write!(f, "{}/{}", self.product_id, variant_id),
            None => write!(f, "{}", self.product_id),
        }
    }
}

// =============================================================================
// Stock Unit
// =============================================================================

/// Catalog view of a stock unit (the Catalog collaborator's `getStockUnit`).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockUnit {
    pub product_id: String,
    pub variant_id: Option<String>,
    /// Units currently available (never negative).
    pub stock: i64,
    pub price_cents: i64,
    pub discount_price_cents: Option<i64>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl StockUnit {
    /// Returns the SKU reference of this unit.
    pub fn sku(&self) -> SkuRef {
        SkuRef {
            product_id: self.product_id.clone(),
            variant_id: self.variant_id.clone(),
        }
    }

    /// Price a buyer pays right now (discount wins when present).
    pub fn effective_price(&self) -> Money {
        Money::from_cents(self.discount_price_cents.unwrap_or(self.price_cents))
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// The status of an order.
///
/// ## State Machine
/// ```text
///                ┌──────────► canceled   (owner, cancel_order)
///                │
///   waitToBuy ───┼──────────► expired    (sweeper)
///                │
///                └──────────► fulfilled  (payment collaborator, external)
/// ```
/// Every transition is one-shot: terminal states never move again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "camelCase"))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub enum OrderStatus {
    /// Stock is held, waiting for payment.
    WaitToBuy,
    /// Cancelled by its owner.
    Canceled,
    /// Swept after its deadline passed.
    Expired,
    /// Paid; set outside this engine.
    Fulfilled,
}

impl OrderStatus {
    /// Wire/storage representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::WaitToBuy => "waitToBuy",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Expired => "expired",
            OrderStatus::Fulfilled => "fulfilled",
        }
    }

    /// Returns true once the order can no longer change.
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::WaitToBuy)
    }

    /// Returns true if `self → target` is an edge of the state machine.
    pub const fn can_transition_to(&self, target: OrderStatus) -> bool {
        !self.is_terminal() && target.is_terminal()
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::WaitToBuy
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Order
// =============================================================================

/// A checkout that holds stock until it is paid, cancelled or expired.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub owner_id: String,
    /// Originating cart; NULL once the cart is deleted.
    pub cart_id: Option<String>,
    pub status: OrderStatus,
    pub total_cents: i64,
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Order Item
// =============================================================================

/// A line of an order.
/// Uses snapshot pattern to freeze the unit price at checkout time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: i64,
    /// Unit price in cents at checkout (frozen).
    pub unit_price_cents: i64,
    /// unit_price × quantity.
    pub line_total_cents: i64,
}

impl OrderItem {
    /// Returns the SKU this line holds.
    pub fn sku(&self) -> SkuRef {
        SkuRef {
            product_id: self.product_id.clone(),
            variant_id: self.variant_id.clone(),
        }
    }
}

/// An order together with its lines (read model for "my orders").
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

// =============================================================================
// Reservation
// =============================================================================

/// Time-boxed hold on stock backing a `waitToBuy` order.
///
/// Immutable once created; deleting it is the signal that the hold is gone
/// (stock has already been released by then).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Reservation {
    pub id: String,
    pub owner_id: String,
    pub order_id: String,
    #[ts(as = "String")]
    pub reserved_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
}

/// Quantity held against one SKU on behalf of a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ReservationDetail {
    pub reservation_id: String,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: i64,
}

impl ReservationDetail {
    /// Returns the SKU this detail holds.
    pub fn sku(&self) -> SkuRef {
        SkuRef {
            product_id: self.product_id.clone(),
            variant_id: self.variant_id.clone(),
        }
    }
}

/// An expired reservation with its details inlined.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ExpiredReservation {
    pub reservation_id: String,
    pub order_id: String,
    pub owner_id: String,
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
    pub details: Vec<ReservationDetail>,
}

// =============================================================================
// Customer Credit
// =============================================================================

/// A customer's retry-credit ("hearts") balance.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CustomerCredit {
    pub user_id: String,
    pub balance: i64,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Checkout Input / Output
// =============================================================================

/// A priced line handed to checkout.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderLine {
    pub sku: SkuRef,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

impl OrderLine {
    /// Builds a line whose total is derived from price × quantity.
    pub fn new(sku: SkuRef, quantity: i64, unit_price_cents: i64) -> Self {
        OrderLine {
            sku,
            quantity,
            unit_price_cents,
            line_total_cents: Money::from_cents(unit_price_cents)
                .multiply_quantity(quantity)
                .cents(),
        }
    }
}

/// Everything checkout needs: who, from which cart, and what.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutRequest {
    pub owner_id: String,
    pub cart_id: Option<String>,
    pub total_cents: i64,
    pub lines: Vec<OrderLine>,
}

impl CheckoutRequest {
    /// Builds a request whose total is the sum of its lines.
    pub fn from_lines(owner_id: impl Into<String>, lines: Vec<OrderLine>) -> Self {
        let total_cents = lines.iter().map(|l| l.line_total_cents).sum();
        CheckoutRequest {
            owner_id: owner_id.into(),
            cart_id: None,
            total_cents,
            lines,
        }
    }
}

/// Result of a successful checkout.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderPlaced {
    pub order_id: String,
    pub reservation_id: String,
    pub total_cents: i64,
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sku_display() {
        assert_eq!(SkuRef::product("p-1").to_string(), "p-1");
        assert_eq!(SkuRef::variant("p-1", "v-2").to_string(), "p-1/v-2");
    }

    #[test]
    fn test_order_status_transitions() {
        let wait = OrderStatus::WaitToBuy;
        assert!(wait.can_transition_to(OrderStatus::Canceled));
        assert!(wait.can_transition_to(OrderStatus::Expired));
        assert!(!wait.can_transition_to(OrderStatus::WaitToBuy));

        for terminal in [OrderStatus::Canceled, OrderStatus::Expired, OrderStatus::Fulfilled] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(OrderStatus::Canceled));
            assert!(!terminal.can_transition_to(OrderStatus::Expired));
        }
    }

    #[test]
    fn test_order_status_serde_matches_storage() {
        let json = serde_json::to_string(&OrderStatus::WaitToBuy).unwrap();
        assert_eq!(json, "\"waitToBuy\"");
        assert_eq!(OrderStatus::WaitToBuy.as_str(), "waitToBuy");
        assert_eq!(OrderStatus::default(), OrderStatus::WaitToBuy);
    }

    #[test]
    fn test_order_line_total() {
        let line = OrderLine::new(SkuRef::product("p-1"), 3, 250);
        assert_eq!(line.line_total_cents, 750);

        let request = CheckoutRequest::from_lines("u-1", vec![line.clone(), line]);
        assert_eq!(request.total_cents, 1500);
        assert!(request.cart_id.is_none());
    }

    #[test]
    fn test_effective_price_prefers_discount() {
        let unit = StockUnit {
            product_id: "p-1".to_string(),
            variant_id: None,
            stock: 4,
            price_cents: 1000,
            discount_price_cents: Some(800),
            updated_at: Utc::now(),
        };
        assert_eq!(unit.effective_price().cents(), 800);
        assert_eq!(unit.sku(), SkuRef::product("p-1"));
    }
}
