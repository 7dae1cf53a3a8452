//! # holdfast-core: Pure Business Logic for the Reservation Engine
//!
//! Everything the order & inventory reservation engine decides without touching
//! storage: domain types, the retry-credit TTL policy, checkout validation and
//! integer money.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Holdfast Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        Transport / Identity / Cart CRUD (external)              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ owner id + priced lines               │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ holdfast-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  credit   │  │   money   │  │ validation│  │   │
//! │  │   │  Order    │  │ TTL table │  │   Money   │  │ checkout  │  │   │
//! │  │   │  SkuRef   │  │ penalty   │  │           │  │  lines    │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   holdfast-db: ledger, reservation store, lifecycle, sweeper    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Order, OrderItem, Reservation, SkuRef, ...)
//! - [`credit`] - Retry-credit ("hearts") policy: balance → reservation TTL
//! - [`money`] - Money type with integer arithmetic
//! - [`error`] - Domain error types
//! - [`validation`] - Checkout input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use holdfast_core::credit::CreditPolicy;
//!
//! let policy = CreditPolicy::default();
//! let ttl = policy.ttl_for(2).unwrap();
//! assert_eq!(ttl.num_hours(), 12);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod credit;
pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use credit::CreditPolicy;
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single checkout.
pub const MAX_ORDER_LINES: usize = 100;

/// Maximum quantity of a single line.
///
/// ## Business Reason
/// Prevents one checkout from draining a SKU by a typo (1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;
