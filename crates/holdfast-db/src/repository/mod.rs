//! # Repository Module
//!
//! Storage access for the reservation engine.
//!
//! ## Two Kinds of Methods
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Pool methods  (&self)                                                 │
//! │  └── reads and standalone writes; run on their own connection          │
//! │                                                                         │
//! │  Tx methods    (&self, tx: &mut SqliteTx<'_>, ...)                     │
//! │  └── participate in the caller's unit of work:                         │
//! │                                                                         │
//! │      let mut tx = db.pool().begin().await?;                            │
//! │      orders.insert(&mut tx, ...)                                       │
//! │      ledger.reserve(&mut tx, ...)                                      │
//! │      reservations.create(&mut tx, ...)                                 │
//! │      tx.commit().await?;       ← all or nothing                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`InventoryLedger`](inventory::InventoryLedger) - conditional stock decrement / release
//! - [`ReservationStore`](reservation::ReservationStore) - reservation headers and details
//! - [`OrderRepository`](order::OrderRepository) - orders, items, status transitions
//! - [`CreditRepository`](credit::CreditRepository) - retry-credit balances
//! - [`CartRepository`](cart::CartRepository) - carts consumed by checkout
//! - [`CatalogRepository`](catalog::CatalogRepository) - products and variants

pub mod cart;
pub mod catalog;
pub mod credit;
pub mod inventory;
pub mod order;
pub mod reservation;

/// A SQLite transaction borrowed by repository tx methods.
pub type SqliteTx<'c> = sqlx::Transaction<'c, sqlx::Sqlite>;
