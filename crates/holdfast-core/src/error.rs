//! # Error Types
//!
//! Domain error types for holdfast-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  holdfast-core errors (this file)                                      │
//! │  ├── CoreError        - Reservation engine domain errors               │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  holdfast-db errors (separate crate)                                   │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── EngineError      - CoreError | DbError, returned by services      │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → transport           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::{OrderStatus, SkuRef};

// =============================================================================
// Core Error
// =============================================================================

/// Reservation engine domain errors.
///
/// Every variant except [`CoreError::InsufficientStock`] and
/// [`CoreError::SkuNotFound`] is detected before any mutation happens.
/// Those two surface mid-transaction and roll the whole checkout back.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Reservation does not exist.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(String),

    /// Cart does not exist.
    #[error("Cart not found: {0}")]
    CartNotFound(String),

    /// No credit row for the customer.
    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    /// Stock unit referenced by a line does not exist.
    #[error("Stock unit not found: {0}")]
    SkuNotFound(SkuRef),

    /// Caller does not own the resource.
    ///
    /// ## When This Occurs
    /// - Cancelling another customer's order
    /// - Checking out another customer's cart
    /// - Reading another customer's reservation details
    #[error("{resource} {id} does not belong to {requester}")]
    Forbidden {
        resource: &'static str,
        id: String,
        requester: String,
    },

    /// Order state machine violation.
    ///
    /// ## When This Occurs
    /// - Cancelling an order that is already canceled, expired or fulfilled
    #[error("Order {order_id} is {status}, cannot move to {target}")]
    InvalidTransition {
        order_id: String,
        status: OrderStatus,
        target: OrderStatus,
    },

    /// Checkout with no lines.
    #[error("Cannot create an order from an empty cart")]
    EmptyCart,

    /// Not enough stock to hold the requested quantity.
    ///
    /// ## User Workflow
    /// ```text
    /// Checkout (qty: 5)
    ///      │
    ///      ▼
    /// Conditional decrement fails: available=3
    ///      │
    ///      ▼
    /// InsufficientStock { sku: product-1, available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// Whole transaction rolled back
    /// ```
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: SkuRef,
        available: i64,
        requested: i64,
    },

    /// Credit balance has no entry in the TTL table.
    #[error("Credit balance {balance} cannot open a reservation")]
    InvalidCredit { balance: i64 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Too many entries in a collection.
    #[error("{field} cannot have more than {max} entries")]
    TooMany { field: String, max: usize },

    /// Derived value does not match its inputs.
    #[error("{field} is {actual}, expected {expected}")]
    Mismatch {
        field: String,
        expected: i64,
        actual: i64,
    },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
