//! # Error Types
//!
//! Domain-specific error types for ortrack-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  ortrack-core errors (this file)                                       │
//! │  ├── CoreError        - Not found / conflict / validation              │
//! │  └── ValidationError  - Policy and input violations (complete sets)    │
//! │                                                                         │
//! │  ortrack-db errors (separate crate)                                    │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  ortrack-engine errors                                                 │
//! │  └── EngineError      - What callers see (with ErrorCode)              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → Caller              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Validation errors carry every violation, never just the first
//! 3. Not-found errors never reveal whether a record exists in another facility

use thiserror::Error;

use crate::validation::{FinancialViolation, RequiredField};

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Referenced entity is absent, or belongs to another facility.
    ///
    /// ## When This Occurs
    /// - Item, device, vendor, location or catalog id is unknown
    /// - Id exists but is scoped to a different facility (same message,
    ///   so existence never leaks across tenants)
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// One or more items of a bulk event batch do not exist.
    ///
    /// The whole batch is rejected; `missing_ids` keeps input order.
    #[error("Inventory items not found: {}", .missing_ids.join(", "))]
    ItemsNotFound { missing_ids: Vec<String> },

    /// Barcode already assigned to another item in the facility.
    #[error("Barcode '{barcode}' is already assigned to item {existing_item_id}")]
    DuplicateBarcode {
        barcode: String,
        existing_item_id: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input and policy validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Invalid format (e.g., invalid UUID, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Catalog tracking policy requires fields the check-in did not supply.
    #[error("Missing required fields: {}", RequiredField::join(.fields))]
    MissingRequiredFields { fields: Vec<RequiredField> },

    /// Financial attribution broke one or more named constraints.
    #[error("Financial attribution rejected: {}", FinancialViolation::join(.violations))]
    FinancialPolicy { violations: Vec<FinancialViolation> },

    /// One or more events of a bulk batch were rejected. Every failing event
    /// is listed, in input order.
    #[error("Batch rejected: {}", EventRejection::join(.rejections))]
    BatchRejected { rejections: Vec<EventRejection> },
}

/// The validation failure of one event in a bulk batch.
#[derive(Debug)]
pub struct EventRejection {
    /// Position of the event in the submitted batch.
    pub index: usize,
    pub error: ValidationError,
}

impl EventRejection {
    fn join(rejections: &[EventRejection]) -> String {
        rejections
            .iter()
            .map(|r| format!("event {}: {}", r.index, r.error))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl ValidationError {
    /// Names of the violated constraints, for callers that branch on them.
    pub fn constraint_names(&self) -> Vec<&'static str> {
        match self {
            ValidationError::FinancialPolicy { violations } => {
                violations.iter().map(|v| v.constraint_name()).collect()
            }
            ValidationError::MissingRequiredFields { fields } => {
                fields.iter().map(|f| f.constraint_name()).collect()
            }
            ValidationError::BatchRejected { rejections } => {
                let mut names = Vec::new();
                for name in rejections.iter().flat_map(|r| r.error.constraint_names()) {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
                names
            }
            _ => Vec::new(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::not_found("InventoryItem", "item-1");
        assert_eq!(err.to_string(), "InventoryItem not found: item-1");

        let err = CoreError::ItemsNotFound {
            missing_ids: vec!["b".to_string(), "d".to_string()],
        };
        assert_eq!(err.to_string(), "Inventory items not found: b, d");
    }

    #[test]
    fn test_missing_fields_message_lists_all() {
        let err = ValidationError::MissingRequiredFields {
            fields: vec![RequiredField::LotNumber, RequiredField::SterilityExpiresAt],
        };
        assert_eq!(
            err.to_string(),
            "Missing required fields: lotNumber, sterilityExpiresAt"
        );
    }

    #[test]
    fn test_financial_constraint_names() {
        let err = ValidationError::FinancialPolicy {
            violations: vec![FinancialViolation::GratisReasonRequired],
        };
        assert_eq!(err.constraint_names(), vec!["GRATIS_REASON_REQUIRED"]);
        assert!(err.to_string().contains("GRATIS_REASON_REQUIRED"));
    }

    #[test]
    fn test_batch_rejection_lists_every_event() {
        let err = ValidationError::BatchRejected {
            rejections: vec![
                EventRejection {
                    index: 0,
                    error: ValidationError::FinancialPolicy {
                        violations: vec![FinancialViolation::GratisReasonRequired],
                    },
                },
                EventRejection {
                    index: 2,
                    error: ValidationError::FinancialPolicy {
                        violations: vec![
                            FinancialViolation::GratisReasonRequired,
                            FinancialViolation::CostOverrideNegative,
                        ],
                    },
                },
            ],
        };

        assert_eq!(
            err.constraint_names(),
            vec!["GRATIS_REASON_REQUIRED", "COST_OVERRIDE_NEGATIVE"]
        );
        let message = err.to_string();
        assert!(message.contains("event 0: "));
        assert!(message.contains("event 2: "));
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "catalogId".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
