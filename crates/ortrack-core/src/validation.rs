//! # Validation Rules
//!
//! Check-in policy enforcement and financial attribution rules.
//!
//! ## Check-in
//! ```text
//! CatalogPolicy ──┐
//!                 ├──► missing_required_fields ──► [] ok
//! CheckInRequest ─┘                              └► [lotNumber, ...] rejected
//! ```
//!
//! | Policy condition                                   | Field required        |
//! |----------------------------------------------------|-----------------------|
//! | `requires_lot_tracking`                            | `lotNumber`           |
//! | `requires_serial_tracking`                         | `serialNumber`        |
//! | expiration tracking, sterility, or IMPLANT category| `sterilityExpiresAt`  |
//!
//! Blank strings count as missing. The check reports every missing field
//! at once so the operator fixes the form in one pass.
//!
//! ## Financial Attribution
//! Rules are evaluated together and every broken rule is reported, each
//! under a stable constraint name (e.g. `GRATIS_REASON_REQUIRED`).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::events::{CostOverrideReason, EventPayload, FinancialAttribution, FinancialInput, GratisReason};
use crate::types::{CatalogPolicy, SterilityStatus, Vendor};

// =============================================================================
// Required Fields
// =============================================================================

/// A field a catalog policy can make mandatory at check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub enum RequiredField {
    LotNumber,
    SerialNumber,
    SterilityExpiresAt,
}

impl RequiredField {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequiredField::LotNumber => "lotNumber",
            RequiredField::SerialNumber => "serialNumber",
            RequiredField::SterilityExpiresAt => "sterilityExpiresAt",
        }
    }

    pub fn constraint_name(&self) -> &'static str {
        match self {
            RequiredField::LotNumber => "LOT_NUMBER_REQUIRED",
            RequiredField::SerialNumber => "SERIAL_NUMBER_REQUIRED",
            RequiredField::SterilityExpiresAt => "STERILITY_EXPIRES_AT_REQUIRED",
        }
    }

    pub fn join(fields: &[RequiredField]) -> String {
        fields
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A physical unit as presented at receiving.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    pub catalog_id: String,
    pub barcode: Option<String>,
    pub serial_number: Option<String>,
    pub lot_number: Option<String>,
    pub location_id: Option<String>,
    pub sterility_status: Option<SterilityStatus>,
    #[ts(as = "Option<String>")]
    pub sterility_expires_at: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Trims a caller-supplied string; blank becomes `None`.
pub fn normalize_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Lists every field the policy requires that the request lacks.
///
/// ## Returns
/// Fields in a fixed order: lot, serial, expiration. Empty when valid.
pub fn missing_required_fields(policy: &CatalogPolicy, req: &CheckInRequest) -> Vec<RequiredField> {
    let mut missing = Vec::new();

    if policy.requires_lot_tracking && normalize_optional(req.lot_number.as_deref()).is_none() {
        missing.push(RequiredField::LotNumber);
    }
    if policy.requires_serial_tracking
        && normalize_optional(req.serial_number.as_deref()).is_none()
    {
        missing.push(RequiredField::SerialNumber);
    }
    if policy.expiration_required() && req.sterility_expires_at.is_none() {
        missing.push(RequiredField::SterilityExpiresAt);
    }

    missing
}

/// Rejects a check-in that does not satisfy the catalog policy.
pub fn validate_check_in(policy: &CatalogPolicy, req: &CheckInRequest) -> Result<(), ValidationError> {
    if req.catalog_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "catalogId".to_string(),
        });
    }

    let missing = missing_required_fields(policy, req);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::MissingRequiredFields { fields: missing })
    }
}

// =============================================================================
// Financial Attribution
// =============================================================================

/// A named financial attribution constraint that was broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinancialViolation {
    CostOverrideReasonRequired,
    CostOverrideReasonInvalid,
    CostOverrideNegative,
    GratisReasonRequired,
    GratisReasonInvalid,
    VendorNotFound,
    VendorInactive,
}

impl FinancialViolation {
    pub fn constraint_name(&self) -> &'static str {
        match self {
            FinancialViolation::CostOverrideReasonRequired => "COST_OVERRIDE_REASON_REQUIRED",
            FinancialViolation::CostOverrideReasonInvalid => "COST_OVERRIDE_REASON_INVALID",
            FinancialViolation::CostOverrideNegative => "COST_OVERRIDE_NEGATIVE",
            FinancialViolation::GratisReasonRequired => "GRATIS_REASON_REQUIRED",
            FinancialViolation::GratisReasonInvalid => "GRATIS_REASON_INVALID",
            FinancialViolation::VendorNotFound => "VENDOR_NOT_FOUND",
            FinancialViolation::VendorInactive => "VENDOR_INACTIVE",
        }
    }

    pub fn join(violations: &[FinancialViolation]) -> String {
        violations
            .iter()
            .map(|v| v.constraint_name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Validates financial attribution against the vendor it references.
///
/// ## Arguments
/// * `input` - Attribution as supplied by the caller
/// * `vendor` - The referenced vendor, if `input.vendor_id` resolved to one
///   in the caller's facility
///
/// ## Returns
/// The typed attribution, or every violated constraint.
pub fn validate_financial(
    input: &FinancialInput,
    vendor: Option<&Vendor>,
) -> Result<FinancialAttribution, ValidationError> {
    let mut violations = Vec::new();

    let vendor_id = normalize_optional(input.vendor_id.as_deref());
    if vendor_id.is_some() {
        match vendor {
            None => violations.push(FinancialViolation::VendorNotFound),
            Some(v) if !v.is_active => violations.push(FinancialViolation::VendorInactive),
            Some(_) => {}
        }
    }

    let cost_reason_raw = normalize_optional(input.cost_override_reason.as_deref());
    let mut cost_override_reason = None;
    if let Some(cents) = input.cost_override_cents {
        if cents < 0 {
            violations.push(FinancialViolation::CostOverrideNegative);
        }
        match cost_reason_raw.as_deref() {
            None => violations.push(FinancialViolation::CostOverrideReasonRequired),
            Some(raw) => match CostOverrideReason::parse(raw) {
                Some(reason) => cost_override_reason = Some(reason),
                None => violations.push(FinancialViolation::CostOverrideReasonInvalid),
            },
        }
    } else if let Some(raw) = cost_reason_raw.as_deref() {
        // A reason without an amount is kept only if it is a known value.
        match CostOverrideReason::parse(raw) {
            Some(reason) => cost_override_reason = Some(reason),
            None => violations.push(FinancialViolation::CostOverrideReasonInvalid),
        }
    }

    let gratis_reason_raw = normalize_optional(input.gratis_reason.as_deref());
    let mut gratis_reason = None;
    match (input.is_gratis, gratis_reason_raw.as_deref()) {
        (true, None) => violations.push(FinancialViolation::GratisReasonRequired),
        (_, Some(raw)) => match GratisReason::parse(raw) {
            Some(reason) => gratis_reason = Some(reason),
            None => violations.push(FinancialViolation::GratisReasonInvalid),
        },
        (false, None) => {}
    }

    if !violations.is_empty() {
        return Err(ValidationError::FinancialPolicy { violations });
    }

    Ok(FinancialAttribution {
        vendor_id,
        cost_override_cents: input.cost_override_cents,
        cost_override_reason,
        is_gratis: input.is_gratis,
        gratis_reason,
    })
}

// =============================================================================
// Event Payload
// =============================================================================

/// Rejects event types callers may not write.
pub fn validate_event_payload(payload: &EventPayload) -> Result<(), ValidationError> {
    if payload.is_recognized() {
        Ok(())
    } else {
        Err(ValidationError::NotAllowed {
            field: "eventType".to_string(),
            allowed: EventPayload::known_types(),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Criticality, ItemCategory};

    fn policy() -> CatalogPolicy {
        CatalogPolicy {
            catalog_id: "cat-1".to_string(),
            facility_id: "fac-1".to_string(),
            name: "Hip Stem".to_string(),
            category: ItemCategory::Instrument,
            criticality: Some(Criticality::Important),
            requires_lot_tracking: true,
            requires_serial_tracking: false,
            requires_expiration_tracking: true,
            requires_sterility: false,
            expiration_warning_days: None,
            is_active: true,
        }
    }

    fn vendor(active: bool) -> Vendor {
        Vendor {
            id: "ven-1".to_string(),
            facility_id: "fac-1".to_string(),
            name: "Acme Ortho".to_string(),
            is_active: active,
        }
    }

    #[test]
    fn test_check_in_reports_all_missing_fields() {
        let req = CheckInRequest {
            catalog_id: "cat-1".to_string(),
            lot_number: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(
            missing_required_fields(&policy(), &req),
            vec![RequiredField::LotNumber, RequiredField::SterilityExpiresAt]
        );

        let err = validate_check_in(&policy(), &req).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("lotNumber"));
        assert!(msg.contains("sterilityExpiresAt"));
    }

    #[test]
    fn test_implant_requires_expiration_even_without_flag() {
        let mut p = policy();
        p.category = ItemCategory::Implant;
        p.requires_lot_tracking = false;
        p.requires_expiration_tracking = false;

        let req = CheckInRequest {
            catalog_id: "cat-1".to_string(),
            ..Default::default()
        };
        assert_eq!(
            missing_required_fields(&p, &req),
            vec![RequiredField::SterilityExpiresAt]
        );
    }

    #[test]
    fn test_check_in_passes_when_complete() {
        let req = CheckInRequest {
            catalog_id: "cat-1".to_string(),
            lot_number: Some("LOT-7".to_string()),
            sterility_expires_at: NaiveDate::from_ymd_opt(2027, 1, 1),
            ..Default::default()
        };
        assert!(validate_check_in(&policy(), &req).is_ok());
    }

    #[test]
    fn test_gratis_requires_reason() {
        let input = FinancialInput {
            is_gratis: true,
            ..Default::default()
        };
        match validate_financial(&input, None) {
            Err(ValidationError::FinancialPolicy { violations }) => {
                assert_eq!(violations, vec![FinancialViolation::GratisReasonRequired]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_cost_override_requires_reason() {
        let input = FinancialInput {
            cost_override_cents: Some(1500),
            ..Default::default()
        };
        let err = validate_financial(&input, None).unwrap_err();
        assert_eq!(err.constraint_names(), vec!["COST_OVERRIDE_REASON_REQUIRED"]);
    }

    #[test]
    fn test_all_violations_reported_together() {
        let input = FinancialInput {
            vendor_id: Some("ven-1".to_string()),
            cost_override_cents: Some(-5),
            cost_override_reason: Some("BECAUSE".to_string()),
            is_gratis: true,
            gratis_reason: None,
        };
        let v = vendor(false);
        let err = validate_financial(&input, Some(&v)).unwrap_err();
        assert_eq!(
            err.constraint_names(),
            vec![
                "VENDOR_INACTIVE",
                "COST_OVERRIDE_NEGATIVE",
                "COST_OVERRIDE_REASON_INVALID",
                "GRATIS_REASON_REQUIRED",
            ]
        );
    }

    #[test]
    fn test_valid_financial_attribution() {
        let input = FinancialInput {
            vendor_id: Some("ven-1".to_string()),
            cost_override_cents: Some(0),
            cost_override_reason: Some("VENDOR_CREDIT".to_string()),
            is_gratis: true,
            gratis_reason: Some("TRIAL_PRODUCT".to_string()),
        };
        let v = vendor(true);
        let attribution = validate_financial(&input, Some(&v)).unwrap();
        assert_eq!(attribution.vendor_id.as_deref(), Some("ven-1"));
        assert_eq!(
            attribution.cost_override_reason,
            Some(CostOverrideReason::VendorCredit)
        );
        assert_eq!(attribution.gratis_reason, Some(GratisReason::TrialProduct));
    }

    #[test]
    fn test_unrecognized_event_type_rejected() {
        let payload = EventPayload::Unrecognized {
            raw_type: "TELEPORTED".to_string(),
        };
        assert!(validate_event_payload(&payload).is_err());
        assert!(validate_event_payload(&EventPayload::Verified).is_ok());
    }
}
