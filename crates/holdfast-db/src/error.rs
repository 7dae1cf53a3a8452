//! # Database and Engine Error Types
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError ← Adds context and categorization                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  EngineError ← DbError | CoreError (domain kinds)                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ErrorKind ← flat kind the transport maps to a status code             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use holdfast_core::{CoreError, ValidationError};
use serde::Serialize;
use thiserror::Error;

// =============================================================================
// DbError
// =============================================================================

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and reporting.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - A second reservation for the same order
    /// - Duplicate primary key
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Order item referencing a product that does not exist
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint violation (e.g. negative stock).
    #[error("Check constraint violation: {message}")]
    CheckViolation { message: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite constraint messages:
                // "UNIQUE constraint failed: <table>.<column>"
                // "FOREIGN KEY constraint failed"
                // "CHECK constraint failed: <expr>"
                if let Some(field) = msg.split("UNIQUE constraint failed: ").nth(1) {
                    DbError::UniqueViolation {
                        field: field.to_string(),
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("CHECK constraint failed") {
                    DbError::CheckViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// EngineError
// =============================================================================

/// Error returned by the order lifecycle and the sweeper.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Business rule violation; nothing was written.
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// Store failure; the transaction was rolled back.
    #[error(transparent)]
    Store(#[from] DbError),
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Store(err.into())
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Domain(err.into())
    }
}

/// Flat error kind for callers that map errors to a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidTransition,
    EmptyCart,
    InsufficientStock,
    InvalidCredit,
    Invalid,
    Store,
}

impl EngineError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Domain(err) => match err {
                CoreError::OrderNotFound(_)
                | CoreError::ReservationNotFound(_)
                | CoreError::CartNotFound(_)
                | CoreError::CustomerNotFound(_)
                | CoreError::SkuNotFound(_) => ErrorKind::NotFound,
                CoreError::Forbidden { .. } => ErrorKind::Forbidden,
                CoreError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
                CoreError::EmptyCart => ErrorKind::EmptyCart,
                CoreError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
                CoreError::InvalidCredit { .. } => ErrorKind::InvalidCredit,
                CoreError::Validation(_) => ErrorKind::Invalid,
            },
            EngineError::Store(DbError::NotFound { .. }) => ErrorKind::NotFound,
            EngineError::Store(_) => ErrorKind::Store,
        }
    }

    /// Returns the domain error, if this is one.
    pub fn as_domain(&self) -> Option<&CoreError> {
        match self {
            EngineError::Domain(err) => Some(err),
            EngineError::Store(_) => None,
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Unit Tests
// =============================================================================
