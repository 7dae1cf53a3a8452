//! # Connection Pool
//!
//! Opens the SQLite store behind the reservation engine and hands out the
//! repositories and services that share it.
//!
//! ## Layout
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  EngineConfig::db_config()  or  DbConfig::new(path)                  │
//! │       │                                                              │
//! │       ▼                                                              │
//! │  Database::new(config)                                               │
//! │    ├─ open file (created on first use), WAL, foreign keys on         │
//! │    ├─ busy_timeout: how long a blocked writer queues                 │
//! │    └─ apply embedded migrations                                      │
//! │       │                                                              │
//! │       ├──► catalog() / carts() / credits()      collaborators        │
//! │       ├──► orders() / reservations() / ledger() stores               │
//! │       └──► order_service(policy) / sweeper(policy)                   │
//! │                                                                      │
//! │  Checkout, cancel, sweep and cleanup each open their own transaction │
//! │  and write first, so SQLite hands them the write lock one at a time. │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! WAL keeps order and reservation reads going while a checkout holds the
//! write lock.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use holdfast_core::CreditPolicy;

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::cart::CartRepository;
use crate::repository::catalog::CatalogRepository;
use crate::repository::credit::CreditRepository;
use crate::repository::inventory::InventoryLedger;
use crate::repository::order::OrderRepository;
use crate::repository::reservation::ReservationStore;
use crate::service::orders::OrderService;
use crate::service::sweeper::ExpirySweeper;

// =============================================================================
// Configuration
// =============================================================================

/// Where the engine's store lives and how the pool around it behaves.
///
/// ```rust,ignore
/// let config = DbConfig::new("./holdfast.db")
///     .max_connections(8)
///     .busy_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// SQLite file holding catalog, credit, orders and reservations.
    pub database_path: PathBuf,

    /// Upper bound on pooled connections (5 unless overridden).
    pub max_connections: u32,

    /// Connections kept open while idle (1).
    pub min_connections: u32,

    /// Wait for a free connection before `ConnectionFailed` (30s).
    pub connect_timeout: Duration,

    /// Idle connections beyond `min_connections` are dropped after this (10m).
    pub idle_timeout: Duration,

    /// How long a checkout or sweep queues behind another writer (5s).
    pub busy_timeout: Duration,

    /// Apply pending migrations while opening (on by default).
    pub run_migrations: bool,
}

impl DbConfig {
    /// Pool settings for the store at `path`; the file is created on first open.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Leave migrations to an explicit [`Database::run_migrations`] call.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Throwaway store for unit tests.
    ///
    /// Every task shares the single connection, so concurrent checkouts
    /// queue on the pool and run one transaction at a time.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            // a second connection would open a second, empty database
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Shared handle to the engine's store.
///
/// Clones share one pool. Repositories and services are built on demand
/// and are cheap to drop.
///
/// ```rust,ignore
/// let db = Database::new(DbConfig::new("./holdfast.db")).await?;
/// let placed = db.order_service(policy).create_order(request, Utc::now()).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the store described by `config` and brings its schema current.
    ///
    /// Connections run in WAL mode with `synchronous = NORMAL`, foreign keys
    /// enforced (order items and reservation details cascade from their
    /// parents) and the configured busy timeout.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Opening reservation store"
        );

        // mode=rwc creates the file on first open
        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // off by default in SQLite
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        debug!(busy_timeout = ?config.busy_timeout, "Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database { pool };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Applies any embedded migration not yet recorded in `_sqlx_migrations`.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Raw pool, for callers that open their own transactions.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Products and variants with their stock counters.
    pub fn catalog(&self) -> CatalogRepository {
        CatalogRepository::new(self.pool.clone())
    }

    pub fn credits(&self) -> CreditRepository {
        CreditRepository::new(self.pool.clone())
    }

    pub fn carts(&self) -> CartRepository {
        CartRepository::new(self.pool.clone())
    }

    pub fn orders(&self) -> OrderRepository {
        OrderRepository::new(self.pool.clone())
    }

    pub fn reservations(&self) -> ReservationStore {
        ReservationStore::new(self.pool.clone())
    }

    /// Conditional stock decrements and releases.
    pub fn ledger(&self) -> InventoryLedger {
        InventoryLedger::new(self.pool.clone())
    }

    /// Checkout, cancel and the read accessors, holding with `policy`'s TTL tiers.
    pub fn order_service(&self, policy: CreditPolicy) -> OrderService {
        OrderService::new(self.clone(), policy)
    }

    /// Overdue-order sweep and reservation cleanup, penalizing per `policy`.
    pub fn sweeper(&self, policy: CreditPolicy) -> ExpirySweeper {
        ExpirySweeper::new(self.clone(), policy)
    }

    /// Waits for checked-out connections to return, then shuts the pool.
    ///
    /// Every clone shares the pool, so later calls through any of them fail
    /// with a store error. The sweep runner calls this on shutdown.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// `true` when a trivial query round-trips through the pool.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::migration_status;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn test_config_builder() {
        let config = DbConfig::new("/tmp/holdfast.db")
            .max_connections(10)
            .min_connections(2)
            .connect_timeout(Duration::from_secs(3))
            .busy_timeout(Duration::from_secs(1))
            .run_migrations(false);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.busy_timeout, Duration::from_secs(1));
        assert!(!config.run_migrations);
    }

    #[tokio::test]
    async fn test_deferred_migrations_run_on_request() {
        let db = Database::new(DbConfig::in_memory().run_migrations(false))
            .await
            .unwrap();

        let (total, applied) = migration_status(db.pool()).await.unwrap();
        assert_eq!(applied, 0);

        db.run_migrations().await.unwrap();
        let (_, applied) = migration_status(db.pool()).await.unwrap();
        assert_eq!(applied, total);
        assert_eq!(db.catalog().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_store_uses_wal_and_foreign_keys() {
        let path = std::env::temp_dir().join(format!("holdfast-pool-{}.db", uuid::Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path).max_connections(2))
            .await
            .unwrap();

        let journal: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(journal.to_lowercase(), "wal");

        let foreign_keys: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(foreign_keys, 1);

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }

    #[tokio::test]
    async fn test_closed_pool_is_unhealthy() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;
        assert!(!db.health_check().await);
    }
}
