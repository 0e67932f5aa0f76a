//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  ValidationError / CoreError (tradebook-core)                          │
//! │       │                                                                 │
//! │       │     SQLite Error (sqlx::Error)                                 │
//! │       │          │                                                      │
//! │       ▼          ▼                                                      │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ├── is_retryable()? ──► Coordinator retries the transaction      │
//! │       ▼                                                                 │
//! │  Caller (UI / API layer) shows the message                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;
use tradebook_core::{CoreError, ValidationError};

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - `fetch_one` returns no rows
    /// - An invoice line references a product that does not exist
    /// - A header references a missing quotation
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Invoice number allocation collided or its counter was inconsistent.
    ///
    /// Retryable: a fresh transaction allocates a fresh number.
    #[error("Invoice number allocation failed: {0}")]
    Sequence(String),

    /// Unique constraint violation.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Referencing a non-existent shop or customer
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    ///
    /// Also raised by triggers (`RAISE(ABORT, ...)`) and CHECK constraints.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction could not begin or commit.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Input rejected before any transaction opened.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A business rule rejected the operation.
    #[error(transparent)]
    Domain(CoreError),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether running the whole transaction again may succeed.
    ///
    /// True for sequence collisions and SQLite busy/locked contention.
    pub fn is_retryable(&self) -> bool {
        match self {
            DbError::Sequence(_) | DbError::PoolExhausted => true,
            DbError::QueryFailed(msg) | DbError::TransactionFailed(msg) => is_busy_message(msg),
            _ => false,
        }
    }
}

fn is_busy_message(msg: &str) -> bool {
    let msg = msg.to_lowercase();
    msg.contains("database is locked") || msg.contains("database is busy") || msg.contains("sqlite_busy")
}

impl From<CoreError> for DbError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => DbError::Validation(e),
            other => DbError::Domain(other),
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
/// Other                       → DbError::QueryFailed
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
                // UNIQUE:  "UNIQUE constraint failed: <table>.<column>"
                // FK:      "FOREIGN KEY constraint failed"
                if let Some(field) = msg.split("UNIQUE constraint failed: ").nth(1) {
                    if field.contains("invoices.invoice_number") {
                        DbError::Sequence(format!("invoice number already issued ({})", field))
                    } else {
                        DbError::UniqueViolation {
                            field: field.to_string(),
                            value: "unknown".to_string(),
                        }
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            other => DbError::QueryFailed(other.to_string()),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(DbError::Sequence("collision".into()).is_retryable());
        assert!(DbError::QueryFailed("database is locked".into()).is_retryable());
        assert!(DbError::PoolExhausted.is_retryable());

        assert!(!DbError::not_found("Product", "p1").is_retryable());
        assert!(!DbError::QueryFailed("no such table: foo".into()).is_retryable());
        assert!(!DbError::Validation(ValidationError::NoItems).is_retryable());
    }

    #[test]
    fn test_core_validation_unwraps_into_validation() {
        let err: DbError = CoreError::Validation(ValidationError::NoItems).into();
        assert!(matches!(err, DbError::Validation(ValidationError::NoItems)));
    }
}
