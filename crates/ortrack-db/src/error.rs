//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ├── Busy / StaleWrite ──► retried by the engine                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  EngineError (ortrack-engine) ← Carries a machine-readable ErrorCode   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in the caller's facility.
    ///
    /// ## When This Occurs
    /// - ID doesn't exist
    /// - ID exists but belongs to another facility
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// One or more items referenced by a bulk batch are absent.
    ///
    /// Nothing from the batch was written.
    #[error("Inventory items not found: {}", .missing_ids.join(", "))]
    ItemsNotFound { missing_ids: Vec<String> },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Duplicate barcode within a facility
    /// - Duplicate catalog identifier
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Referencing a non-existent catalog or location
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// The item row changed between read and write inside a transaction.
    #[error("Stale write on {entity} {id}: expected version {expected}")]
    StaleWrite {
        entity: String,
        id: String,
        expected: i64,
    },

    /// SQLite reported the database as busy or locked.
    #[error("Database busy: {0}")]
    Busy(String),

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

    /// Stored data could not be mapped back to a domain type.
    #[error("Corrupt {entity} row {id}: {reason}")]
    CorruptRow {
        entity: String,
        id: String,
        reason: String,
    },

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

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether re-running the whole transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DbError::StaleWrite { .. } | DbError::Busy(_) | DbError::PoolExhausted
        )
    }
}

/// SQLite primary result codes (and extended codes) meaning "try again".
const BUSY_CODES: [&str; 4] = ["5", "6", "261", "517"];

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze code/message for constraint or busy
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
                let busy_code = db_err
                    .code()
                    .map(|code| BUSY_CODES.contains(&code.as_ref()))
                    .unwrap_or(false);

                // UNIQUE constraint: "UNIQUE constraint failed: <table>.<column>, ..."
                // FK constraint: "FOREIGN KEY constraint failed"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if busy_code
                    || msg.contains("database is locked")
                    || msg.contains("database is busy")
                {
                    DbError::Busy(msg.to_string())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let stale = DbError::StaleWrite {
            entity: "InventoryItem".to_string(),
            id: "item-1".to_string(),
            expected: 3,
        };
        assert!(stale.is_retryable());
        assert!(DbError::Busy("database is locked".to_string()).is_retryable());
        assert!(!DbError::not_found("InventoryItem", "item-1").is_retryable());
        assert!(!DbError::duplicate("barcode", "BC-1").is_retryable());
    }

    #[test]
    fn test_items_not_found_message() {
        let err = DbError::ItemsNotFound {
            missing_ids: vec!["b".to_string()],
        };
        assert_eq!(err.to_string(), "Inventory items not found: b");
    }
}
