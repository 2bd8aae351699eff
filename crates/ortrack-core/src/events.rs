//! # Inventory & Device Events
//!
//! The append-only facts that every item state is derived from.
//!
//! ## Event Shape
//! ```text
//! InventoryEvent
//! ├── id, facility_id, inventory_item_id
//! ├── payload: EventPayload          ◄── tagged by `eventType`
//! │   ├── RECEIVED         { locationId?, sterilityStatus? }
//! │   ├── VERIFIED
//! │   ├── LOCATION_CHANGED { locationId? }
//! │   ├── RESERVED         { caseId? }
//! │   ├── RELEASED         { caseId? }
//! │   ├── CONSUMED         { caseId? }
//! │   ├── EXPIRED
//! │   └── Unrecognized     (stored type this build does not know)
//! ├── occurred_at, created_at
//! ├── performed_by_user_id, previous_location_id
//! ├── notes, device_event_id
//! └── financial: Option<FinancialAttribution>
//! ```
//!
//! The payload is a sum type so each event kind carries only the fields it
//! uses. A stored row with a type string this build does not recognize is
//! loaded as [`EventPayload::Unrecognized`] and projected as a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{PayloadType, SterilityStatus};

// =============================================================================
// Event Payload
// =============================================================================

/// What happened to the item, with the fields that kind of event carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "eventType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    #[serde(rename_all = "camelCase")]
    Received {
        location_id: Option<String>,
        sterility_status: Option<SterilityStatus>,
    },
    Verified,
    #[serde(rename_all = "camelCase")]
    LocationChanged { location_id: Option<String> },
    #[serde(rename_all = "camelCase")]
    Reserved { case_id: Option<String> },
    #[serde(rename_all = "camelCase")]
    Released { case_id: Option<String> },
    #[serde(rename_all = "camelCase")]
    Consumed { case_id: Option<String> },
    Expired,
    /// Loaded from storage with a type string not known to this build.
    #[serde(rename_all = "camelCase")]
    Unrecognized { raw_type: String },
}

impl EventPayload {
    /// The stored `event_type` string.
    pub fn event_type(&self) -> &str {
        match self {
            EventPayload::Received { .. } => "RECEIVED",
            EventPayload::Verified => "VERIFIED",
            EventPayload::LocationChanged { .. } => "LOCATION_CHANGED",
            EventPayload::Reserved { .. } => "RESERVED",
            EventPayload::Released { .. } => "RELEASED",
            EventPayload::Consumed { .. } => "CONSUMED",
            EventPayload::Expired => "EXPIRED",
            EventPayload::Unrecognized { raw_type } => raw_type,
        }
    }

    /// Event types callers may write.
    pub fn known_types() -> Vec<String> {
        [
            "RECEIVED",
            "VERIFIED",
            "LOCATION_CHANGED",
            "RESERVED",
            "RELEASED",
            "CONSUMED",
            "EXPIRED",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, EventPayload::Unrecognized { .. })
    }

    pub fn case_id(&self) -> Option<&str> {
        match self {
            EventPayload::Reserved { case_id }
            | EventPayload::Released { case_id }
            | EventPayload::Consumed { case_id } => case_id.as_deref(),
            _ => None,
        }
    }

    pub fn location_id(&self) -> Option<&str> {
        match self {
            EventPayload::Received { location_id, .. }
            | EventPayload::LocationChanged { location_id } => location_id.as_deref(),
            _ => None,
        }
    }

    pub fn sterility_status(&self) -> Option<SterilityStatus> {
        match self {
            EventPayload::Received {
                sterility_status, ..
            } => *sterility_status,
            _ => None,
        }
    }

    /// Rebuilds a payload from its flat storage columns.
    ///
    /// Columns that the event type does not use are ignored.
    pub fn from_parts(
        event_type: &str,
        case_id: Option<String>,
        location_id: Option<String>,
        sterility_status: Option<SterilityStatus>,
    ) -> Self {
        match event_type {
            "RECEIVED" => EventPayload::Received {
                location_id,
                sterility_status,
            },
            "VERIFIED" => EventPayload::Verified,
            "LOCATION_CHANGED" => EventPayload::LocationChanged { location_id },
            "RESERVED" => EventPayload::Reserved { case_id },
            "RELEASED" => EventPayload::Released { case_id },
            "CONSUMED" => EventPayload::Consumed { case_id },
            "EXPIRED" => EventPayload::Expired,
            other => EventPayload::Unrecognized {
                raw_type: other.to_string(),
            },
        }
    }
}

// =============================================================================
// Financial Attribution
// =============================================================================

/// Why the acquisition cost differs from the catalog price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CostOverrideReason {
    NegotiatedDiscount,
    ContractAdjustment,
    VendorCredit,
    PriceCorrection,
    Other,
}

impl CostOverrideReason {
    pub const ALL: [CostOverrideReason; 5] = [
        CostOverrideReason::NegotiatedDiscount,
        CostOverrideReason::ContractAdjustment,
        CostOverrideReason::VendorCredit,
        CostOverrideReason::PriceCorrection,
        CostOverrideReason::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CostOverrideReason::NegotiatedDiscount => "NEGOTIATED_DISCOUNT",
            CostOverrideReason::ContractAdjustment => "CONTRACT_ADJUSTMENT",
            CostOverrideReason::VendorCredit => "VENDOR_CREDIT",
            CostOverrideReason::PriceCorrection => "PRICE_CORRECTION",
            CostOverrideReason::Other => "OTHER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == value.trim())
    }
}

/// Why an item was provided at no charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GratisReason {
    VendorSample,
    VendorSupport,
    TrialProduct,
    WarrantyReplacement,
    Other,
}

impl GratisReason {
    pub const ALL: [GratisReason; 5] = [
        GratisReason::VendorSample,
        GratisReason::VendorSupport,
        GratisReason::TrialProduct,
        GratisReason::WarrantyReplacement,
        GratisReason::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GratisReason::VendorSample => "VENDOR_SAMPLE",
            GratisReason::VendorSupport => "VENDOR_SUPPORT",
            GratisReason::TrialProduct => "TRIAL_PRODUCT",
            GratisReason::WarrantyReplacement => "WARRANTY_REPLACEMENT",
            GratisReason::Other => "OTHER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == value.trim())
    }
}

/// Financial attribution as the caller supplied it (unvalidated).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FinancialInput {
    pub vendor_id: Option<String>,
    pub cost_override_cents: Option<i64>,
    pub cost_override_reason: Option<String>,
    #[serde(default)]
    pub is_gratis: bool,
    pub gratis_reason: Option<String>,
}

impl FinancialInput {
    /// True when no financial field was supplied at all.
    pub fn is_empty(&self) -> bool {
        self.vendor_id.is_none()
            && self.cost_override_cents.is_none()
            && self.cost_override_reason.is_none()
            && !self.is_gratis
            && self.gratis_reason.is_none()
    }
}

/// Validated financial attribution stored on an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FinancialAttribution {
    pub vendor_id: Option<String>,
    pub cost_override_cents: Option<i64>,
    pub cost_override_reason: Option<CostOverrideReason>,
    pub is_gratis: bool,
    pub gratis_reason: Option<GratisReason>,
}

// =============================================================================
// Inventory Event
// =============================================================================

/// A stored, immutable inventory event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct InventoryEvent {
    pub id: String,
    pub facility_id: String,
    pub inventory_item_id: String,
    pub payload: EventPayload,
    /// When it happened in the physical world (caller-supplied or now).
    #[ts(as = "String")]
    pub occurred_at: DateTime<Utc>,
    pub performed_by_user_id: String,
    /// Item location immediately before this event was applied.
    pub previous_location_id: Option<String>,
    pub notes: Option<String>,
    /// The raw scan that produced this event, if any.
    pub device_event_id: Option<String>,
    pub financial: Option<FinancialAttribution>,
    /// When the engine recorded it. Drives the item's `updated_at`.
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl InventoryEvent {
    pub fn event_type(&self) -> &str {
        self.payload.event_type()
    }
}

/// An event as submitted by a caller, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewInventoryEvent {
    pub inventory_item_id: String,
    pub payload: EventPayload,
    #[ts(as = "Option<String>")]
    pub occurred_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub device_event_id: Option<String>,
    pub financial: Option<FinancialInput>,
}

impl NewInventoryEvent {
    /// A bare event of the given kind, with no notes or attribution.
    pub fn new(inventory_item_id: impl Into<String>, payload: EventPayload) -> Self {
        NewInventoryEvent {
            inventory_item_id: inventory_item_id.into(),
            payload,
            occurred_at: None,
            notes: None,
            device_event_id: None,
            financial: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    pub fn with_financial(mut self, financial: FinancialInput) -> Self {
        self.financial = Some(financial);
        self
    }
}

// =============================================================================
// Device Events
// =============================================================================

/// Audit record of one raw scan, written whether or not it matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEvent {
    pub id: String,
    pub facility_id: String,
    pub device_id: String,
    pub device_type: crate::types::DeviceType,
    pub payload_type: PayloadType,
    pub raw_value: String,
    pub processed: bool,
    pub processed_item_id: Option<String>,
    pub processing_error: Option<String>,
    #[ts(as = "String")]
    pub occurred_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
