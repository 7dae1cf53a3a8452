//! # Service Module
//!
//! Multi-step operations built on the repositories. Each mutation owns its
//! transaction; nothing here holds in-process locks.
//!
//! - [`OrderService`](orders::OrderService) - checkout, cancel, order reads
//! - [`ExpirySweeper`](sweeper::ExpirySweeper) - overdue orders, stale reservations

pub mod orders;
pub mod sweeper;
