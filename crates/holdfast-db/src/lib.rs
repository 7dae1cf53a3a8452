//! # holdfast-db: Storage and Order Lifecycle
//!
//! SQLite-backed inventory ledger, reservation store and order lifecycle
//! for the reservation engine, plus the expiry sweeper.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Holdfast Data Flow                               │
//! │                                                                         │
//! │  Request handler / holdfast-sweep binary                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   holdfast-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌───────────────┐   ┌───────────────┐    │   │
//! │  │   │   service     │   │  repository   │   │   Database    │    │   │
//! │  │   │ OrderService  │──►│ Ledger        │──►│   (pool.rs)   │    │   │
//! │  │   │ ExpirySweeper │   │ Reservations  │   │  SqlitePool   │    │   │
//! │  │   │               │   │ Orders        │   │  migrations   │    │   │
//! │  │   │               │   │ Credits/Carts │   │               │    │   │
//! │  │   └───────────────┘   └───────────────┘   └───────────────┘    │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`config`] - Engine configuration file + env overrides
//! - [`error`] - Database and engine error types
//! - [`repository`] - Transaction-aware storage (ledger, reservations, orders...)
//! - [`service`] - Order lifecycle and expiry sweeper
//!
//! ## Usage
//!
//! ```rust,ignore
//! use holdfast_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("holdfast.db")).await?;
//! let service = db.order_service(CreditPolicy::default());
//! let placed = service.checkout_cart("user-1", &cart_id, Utc::now()).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{EngineConfig, SweepMode};
pub use error::{DbError, DbResult, EngineError, EngineResult, ErrorKind};
pub use pool::{Database, DbConfig};

pub use repository::cart::CartRepository;
pub use repository::catalog::CatalogRepository;
pub use repository::credit::CreditRepository;
pub use repository::inventory::{InventoryLedger, ReserveOutcome};
pub use repository::order::OrderRepository;
pub use repository::reservation::ReservationStore;
pub use service::orders::OrderService;
pub use service::sweeper::{CleanupReport, ExpirySweeper, SweepReport};
