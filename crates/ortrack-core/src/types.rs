//! # Domain Types
//!
//! Core domain types used throughout ORtrack.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐    │
//! │  │  InventoryItem   │   │  CatalogPolicy   │   │     Device       │    │
//! │  │  ──────────────  │   │  ──────────────  │   │  ──────────────  │    │
//! │  │  id, catalog_id  │──►│  requires_*      │   │  device_type     │    │
//! │  │  facility_id     │   │  category        │   │  is_active       │    │
//! │  │  barcode/serial  │   │  criticality     │   └──────────────────┘    │
//! │  │  sterility/avail │   │  warning days    │                           │
//! │  └──────────────────┘   └──────────────────┘   Location, Vendor        │
//! │                                                 (existence lookups)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Facility Scope
//! Every entity carries `facility_id`. Lookups always filter on it; there is
//! no API that takes an id without the caller's facility.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Caller
// =============================================================================

/// Authenticated caller identity, supplied by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Caller {
    pub user_id: String,
    pub facility_id: String,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, facility_id: impl Into<String>) -> Self {
        Caller {
            user_id: user_id.into(),
            facility_id: facility_id.into(),
        }
    }
}

// =============================================================================
// Status Enums
// =============================================================================

/// Sterility state of a physical unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SterilityStatus {
    Sterile,
    NonSterile,
    Expired,
}

impl SterilityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SterilityStatus::Sterile => "STERILE",
            SterilityStatus::NonSterile => "NON_STERILE",
            SterilityStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "STERILE" => Some(SterilityStatus::Sterile),
            "NON_STERILE" => Some(SterilityStatus::NonSterile),
            "EXPIRED" => Some(SterilityStatus::Expired),
            _ => None,
        }
    }
}

/// Availability of a physical unit for case use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AvailabilityStatus {
    #[default]
    Available,
    Reserved,
    Unavailable,
    Missing,
}

impl AvailabilityStatus {
    /// Units that are consumed or lost drop out of risk evaluation.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AvailabilityStatus::Available | AvailabilityStatus::Reserved
        )
    }
}

/// Catalog category. Implants always require expiration tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemCategory {
    Implant,
    Instrument,
    Equipment,
    Loaner,
    Consumable,
    Other,
}

/// How much a shortage or lapse of this catalog entry matters clinically.
///
/// Stored as free text by the catalog collaborator; see
/// [`Criticality::parse`] for the lenient mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Criticality {
    Critical,
    Important,
    Routine,
}

impl Criticality {
    /// Parses a stored criticality value. Unrecognized values yield `None`
    /// and are handled by the explicit default arms in [`crate::risk`].
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Some(Criticality::Critical),
            "IMPORTANT" => Some(Criticality::Important),
            "ROUTINE" => Some(Criticality::Routine),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Criticality::Critical => "CRITICAL",
            Criticality::Important => "IMPORTANT",
            Criticality::Routine => "ROUTINE",
        }
    }
}

// =============================================================================
// Catalog Policy
// =============================================================================

/// Tracking policy of a catalog entry (owned by the catalog collaborator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPolicy {
    pub catalog_id: String,
    pub facility_id: String,
    pub name: String,
    pub category: ItemCategory,
    pub criticality: Option<Criticality>,
    pub requires_lot_tracking: bool,
    pub requires_serial_tracking: bool,
    pub requires_expiration_tracking: bool,
    pub requires_sterility: bool,
    /// Per-catalog override of the criticality-based warning window.
    pub expiration_warning_days: Option<i64>,
    /// Retired catalog entries are inactive.
    pub is_active: bool,
}

impl CatalogPolicy {
    /// Whether items of this catalog entry must carry an expiration date.
    ///
    /// Sterile and implant items always require it, whatever the explicit
    /// flag says. This default cannot be switched off per catalog.
    pub fn expiration_required(&self) -> bool {
        self.requires_expiration_tracking
            || self.requires_sterility
            || self.category == ItemCategory::Implant
    }
}

/// Kind of external identifier attached to a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum IdentifierType {
    Gtin,
    Upc,
    /// Manufacturer reference / catalog number.
    Ref,
}

/// An identifier (GTIN, UPC, REF) that maps to a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CatalogIdentifier {
    pub id: String,
    pub facility_id: String,
    pub catalog_id: String,
    pub identifier_type: IdentifierType,
    pub raw_value: String,
}

// =============================================================================
// Inventory Item
// =============================================================================

/// One physical unit. A projection over its event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: String,
    pub catalog_id: String,
    pub facility_id: String,

    pub serial_number: Option<String>,
    pub lot_number: Option<String>,
    /// Unique within a facility.
    pub barcode: Option<String>,

    pub location_id: Option<String>,

    pub sterility_status: SterilityStatus,
    #[ts(as = "Option<String>")]
    pub sterility_expires_at: Option<NaiveDate>,

    pub availability_status: AvailabilityStatus,
    /// Only meaningful while `availability_status` is `Reserved`.
    pub reserved_for_case_id: Option<String>,

    #[ts(as = "Option<String>")]
    pub last_verified_at: Option<DateTime<Utc>>,
    pub last_verified_by_user_id: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    /// Incremented on every projection write; guards concurrent writers.
    pub version: i64,
}

// =============================================================================
// Devices
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceType {
    BarcodeScanner,
    RfidReader,
    /// Virtual device for scanners that type into a text field.
    KeyboardWedge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadType {
    Barcode,
    Rfid,
}

/// A registered scanning device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub facility_id: String,
    pub name: String,
    pub device_type: DeviceType,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Locations & Vendors
// =============================================================================

/// A storage location (owned by the location collaborator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: String,
    pub facility_id: String,
    pub name: String,
    pub is_active: bool,
}

/// A supplier (owned by the vendor collaborator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Vendor {
    pub id: String,
    pub facility_id: String,
    pub name: String,
    pub is_active: bool,
}

// =============================================================================
// Read Models
// =============================================================================

/// An item with the names a scan confirmation screen needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ItemDetail {
    pub item: InventoryItem,
    pub catalog_name: String,
    pub category: ItemCategory,
    pub location_name: Option<String>,
}

/// Suggested catalog entry for a scan that matched no item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CatalogMatch {
    pub catalog_id: String,
    pub catalog_name: String,
    /// The identifier value that matched (the GTIN).
    pub identifier: String,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(category: ItemCategory) -> CatalogPolicy {
        CatalogPolicy {
            catalog_id: "cat-1".to_string(),
            facility_id: "fac-1".to_string(),
            name: "Bone Screw 4.5mm".to_string(),
            category,
            criticality: Some(Criticality::Routine),
            requires_lot_tracking: false,
            requires_serial_tracking: false,
            requires_expiration_tracking: false,
            requires_sterility: false,
            expiration_warning_days: None,
            is_active: true,
        }
    }

    #[test]
    fn test_implant_always_requires_expiration() {
        assert!(policy(ItemCategory::Implant).expiration_required());
        assert!(!policy(ItemCategory::Instrument).expiration_required());
    }

    #[test]
    fn test_sterility_requires_expiration() {
        let mut p = policy(ItemCategory::Consumable);
        p.requires_sterility = true;
        assert!(p.expiration_required());
    }

    #[test]
    fn test_criticality_parse_is_lenient() {
        assert_eq!(Criticality::parse("critical"), Some(Criticality::Critical));
        assert_eq!(Criticality::parse(" ROUTINE "), Some(Criticality::Routine));
        assert_eq!(Criticality::parse("SEVERE"), None);
    }

    #[test]
    fn test_availability_active() {
        assert!(AvailabilityStatus::Available.is_active());
        assert!(AvailabilityStatus::Reserved.is_active());
        assert!(!AvailabilityStatus::Unavailable.is_active());
        assert!(!AvailabilityStatus::Missing.is_active());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&SterilityStatus::NonSterile).unwrap();
        assert_eq!(json, "\"NON_STERILE\"");
        assert_eq!(
            SterilityStatus::parse("non_sterile"),
            Some(SterilityStatus::NonSterile)
        );
    }
}
