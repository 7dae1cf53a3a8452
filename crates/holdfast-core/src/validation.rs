//! # Validation Module
//!
//! Checkout input validation.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Cart collaborator                                            │
//! │  └── Prices lines, tracks the running cart total                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (before any transaction is opened)               │
//! │  ├── Empty cart, line count, quantity range                            │
//! │  └── Price snapshot consistency                                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (stock >= 0), CHECK (quantity > 0)                          │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{CheckoutRequest, OrderLine};
use crate::{MAX_ITEM_QUANTITY, MAX_ORDER_LINES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Scalar Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be at least 1
/// - Must not exceed MAX_ITEM_QUANTITY (999)
///
/// ## Example
/// ```rust
/// use holdfast_core::validation::validate_quantity;
///
/// assert!(validate_quantity(5).is_ok());
/// assert!(validate_quantity(0).is_err());
/// assert!(validate_quantity(1000).is_err());
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if !(1..=MAX_ITEM_QUANTITY).contains(&qty) {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates an amount in minor units. Zero is allowed (free items).
pub fn validate_amount_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates an identifier supplied by a collaborator.
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Checkout Validators
// =============================================================================

/// Validates one priced line.
///
/// The line total must equal `unit_price × quantity`; the snapshot stored on
/// the order item is what a later refund or audit will trust.
pub fn validate_line(line: &OrderLine) -> ValidationResult<()> {
    validate_id("product_id", &line.sku.product_id)?;
    if let Some(variant_id) = &line.sku.variant_id {
        validate_id("variant_id", variant_id)?;
    }
    validate_quantity(line.quantity)?;
    validate_amount_cents("unit_price_cents", line.unit_price_cents)?;

    let expected = Money::from_cents(line.unit_price_cents)
        .checked_multiply_quantity(line.quantity)
        .ok_or_else(|| ValidationError::OutOfRange {
            field: "line_total_cents".to_string(),
            min: 0,
            max: i64::MAX,
        })?;
    if expected.cents() != line.line_total_cents {
        return Err(ValidationError::Mismatch {
            field: "line_total_cents".to_string(),
            expected: expected.cents(),
            actual: line.line_total_cents,
        });
    }

    Ok(())
}

/// Validates a checkout request before any mutation.
///
/// ## Checks (in order)
/// 1. owner id present
/// 2. at least one line → otherwise [`CoreError::EmptyCart`]
/// 3. at most MAX_ORDER_LINES lines
/// 4. every line (see [`validate_line`])
/// 5. cart total not negative
pub fn validate_checkout(request: &CheckoutRequest) -> CoreResult<()> {
    validate_id("owner_id", &request.owner_id)?;

    if request.lines.is_empty() {
        return Err(CoreError::EmptyCart);
    }

    if request.lines.len() > MAX_ORDER_LINES {
        return Err(ValidationError::TooMany {
            field: "lines".to_string(),
            max: MAX_ORDER_LINES,
        }
        .into());
    }

    for line in &request.lines {
        validate_line(line)?;
    }

    validate_amount_cents("total_cents", request.total_cents)?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
