//! # Engine Error Type
//!
//! Unified error type for engine operations.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in ORtrack                                │
//! │                                                                         │
//! │  Caller                      Engine                                     │
//! │  ──────                      ──────                                     │
//! │                                                                         │
//! │  engine.events().record_event(..)                                      │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Service method                                                  │  │
//! │  │  EngineResult<T>                                                 │  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Store error? ──── DbError::StaleWrite ──► retry ──► Conflict   │  │
//! │  │         │          DbError::NotFound ─────────────► NotFound    │  │
//! │  │         ▼                                                        │  │
//! │  │  Policy error? ─── ValidationError ───────────────► Validation  │  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Success ──────────────────────────────────────────────────────►│  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  ApiError { code: "CONFLICT", message, existingItemId }                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Serialization
//! [`ApiError`] is what a UI receives: a machine-readable `code` plus a
//! human-readable `message`, and the structured details needed to act on it
//! (violated constraints, missing ids, the item holding a duplicate barcode).

use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

use crate::config::ConfigError;
use ortrack_core::{CoreError, ValidationError};
use ortrack_db::DbError;

/// Errors returned by engine services.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Entity absent from the caller's facility.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A bulk batch referenced items that do not exist. Nothing was written.
    #[error("Inventory items not found: {}", .missing_ids.join(", "))]
    ItemsNotFound { missing_ids: Vec<String> },

    /// Input or policy violation, carrying the complete violation set.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Duplicate barcode, or concurrent writers kept winning.
    #[error("{message}")]
    Conflict {
        message: String,
        /// Item already holding the barcode, when that is the cause.
        existing_item_id: Option<String>,
    },

    /// Store failure that is not the caller's fault.
    #[error("Database error: {0}")]
    Database(DbError),

    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Machine-readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::NotFound { .. } | EngineError::ItemsNotFound { .. } => {
                ErrorCode::NotFound
            }
            EngineError::Validation(_) => ErrorCode::ValidationError,
            EngineError::Conflict { .. } => ErrorCode::Conflict,
            EngineError::Database(_) => ErrorCode::DatabaseError,
            EngineError::Config(_) => ErrorCode::ConfigError,
            EngineError::Internal(_) => ErrorCode::Internal,
        }
    }
}

/// Error codes at the service boundary.
///
/// ## Usage in a UI
/// ```typescript
/// switch (e.code) {
///   case 'CONFLICT':
///     if (e.existingItemId) offerViewExisting(e.existingItemId);
///     break;
///   case 'VALIDATION_ERROR':
///     highlightFields(e.constraints);
///     break;
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Entity absent or in another facility (404)
    NotFound,

    /// Input or policy validation failed (400)
    ValidationError,

    /// Duplicate barcode or lost concurrency race (409)
    Conflict,

    /// Database operation failed (500)
    DatabaseError,

    /// Configuration missing or invalid
    ConfigError,

    /// Internal error (500)
    Internal,
}

/// Serializable form of an [`EngineError`].
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    /// Violated constraint names, e.g. `GRATIS_REASON_REQUIRED`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_item_id: Option<String>,
}

impl From<&EngineError> for ApiError {
    fn from(err: &EngineError) -> Self {
        let constraints = match err {
            EngineError::Validation(v) => v
                .constraint_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        let missing_ids = match err {
            EngineError::ItemsNotFound { missing_ids } => missing_ids.clone(),
            _ => Vec::new(),
        };
        let existing_item_id = match err {
            EngineError::Conflict {
                existing_item_id, ..
            } => existing_item_id.clone(),
            _ => None,
        };

        // Store internals stay in the logs.
        let message = match err {
            EngineError::Database(_) => "Database operation failed".to_string(),
            other => other.to_string(),
        };

        ApiError {
            code: err.code(),
            message,
            constraints,
            missing_ids,
            existing_item_id,
        }
    }
}

/// Converts database errors to engine errors.
impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            DbError::ItemsNotFound { missing_ids } => EngineError::ItemsNotFound { missing_ids },
            DbError::UniqueViolation { field, value } => EngineError::Conflict {
                message: format!("Duplicate {}: '{}' already exists", field, value),
                existing_item_id: None,
            },
            DbError::StaleWrite { entity, id, .. } => EngineError::Conflict {
                message: format!("{} {} was modified concurrently", entity, id),
                existing_item_id: None,
            },
            DbError::QueryFailed(e) => {
                tracing::error!(error = %e, "Database query failed");
                EngineError::Database(DbError::QueryFailed(e))
            }
            DbError::Internal(e) => {
                tracing::error!(error = %e, "Internal database error");
                EngineError::Database(DbError::Internal(e))
            }
            other => EngineError::Database(other),
        }
    }
}

/// Converts core errors to engine errors.
impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            CoreError::ItemsNotFound { missing_ids } => EngineError::ItemsNotFound { missing_ids },
            CoreError::DuplicateBarcode {
                barcode,
                existing_item_id,
            } => EngineError::Conflict {
                message: format!(
                    "Barcode '{}' is already assigned to item {}",
                    barcode, existing_item_id
                ),
                existing_item_id: Some(existing_item_id),
            },
            CoreError::Validation(e) => EngineError::Validation(e),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ortrack_core::validation::FinancialViolation;

    #[test]
    fn test_stale_write_maps_to_conflict() {
        let err: EngineError = DbError::StaleWrite {
            entity: "InventoryItem".to_string(),
            id: "item-1".to_string(),
            expected: 3,
        }
        .into();
        assert_eq!(err.code(), ErrorCode::Conflict);
    }

    #[test]
    fn test_duplicate_barcode_carries_existing_item() {
        let err: EngineError = CoreError::DuplicateBarcode {
            barcode: "BC-1".to_string(),
            existing_item_id: "item-9".to_string(),
        }
        .into();

        let api = ApiError::from(&err);
        assert_eq!(api.code, ErrorCode::Conflict);
        assert_eq!(api.existing_item_id.as_deref(), Some("item-9"));
    }

    #[test]
    fn test_api_error_lists_constraints() {
        let err = EngineError::Validation(ValidationError::FinancialPolicy {
            violations: vec![
                FinancialViolation::VendorInactive,
                FinancialViolation::GratisReasonRequired,
            ],
        });

        let json = serde_json::to_value(ApiError::from(&err)).unwrap();
        assert_eq!(json["code"], "VALIDATION_ERROR");
        assert_eq!(
            json["constraints"],
            serde_json::json!(["VENDOR_INACTIVE", "GRATIS_REASON_REQUIRED"])
        );
        assert!(json.get("missingIds").is_none());
    }

    #[test]
    fn test_database_details_not_exposed() {
        let err: EngineError = DbError::QueryFailed("no such column: secret".to_string()).into();
        let api = ApiError::from(&err);
        assert_eq!(api.code, ErrorCode::DatabaseError);
        assert!(!api.message.contains("secret"));
    }
}
