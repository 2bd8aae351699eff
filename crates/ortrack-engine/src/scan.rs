//! # Device Scan Gateway
//!
//! Turns a raw scan into an identification result and an audit record.
//!
//! ## Scan Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        handle_scan                                      │
//! │                                                                         │
//! │  raw value + device id                                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  1. Resolve device ── all-zero id ──► facility keyboard wedge          │
//! │       │               otherwise    ──► active device in facility       │
//! │       ▼                                                                 │
//! │  2. Candidate item ── barcode, then serial number                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  3. GS1 decode (always)                                                │
//! │       │                                                                 │
//! │       ├── no item, GTIN parsed   ──► catalog suggestion                │
//! │       └── no item, nothing parsed ──► guidance text                    │
//! │       ▼                                                                 │
//! │  4. Append DeviceEvent (processed = candidate found)                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## The Scan Law
//! A scan identifies; it never changes inventory state. The gateway is built
//! from the device, item, catalog and device-event repositories only. It has
//! no handle on the event store, so it cannot write an inventory event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ts_rs::TS;
use uuid::Uuid;

use crate::config::ScanSettings;
use crate::error::{EngineError, EngineResult};
use ortrack_core::gs1::{self, Gs1Data, Symbology};
use ortrack_core::{
    Caller, CatalogMatch, Device, DeviceEvent, ItemDetail, PayloadType, KEYBOARD_WEDGE_DEVICE_ID,
};
use ortrack_db::{CatalogRepository, DeviceEventRepository, DeviceRepository, InventoryItemRepository};

/// A raw scan as delivered by a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ScanInput {
    pub raw_value: String,
    /// A registered device, or the all-zero id for keyboard-wedge input.
    pub device_id: String,
    pub payload_type: PayloadType,
    #[ts(as = "Option<String>")]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl ScanInput {
    /// A barcode typed in by a keyboard-wedge scanner, occurring now.
    pub fn keyboard_wedge(raw_value: impl Into<String>) -> Self {
        ScanInput {
            raw_value: raw_value.into(),
            device_id: KEYBOARD_WEDGE_DEVICE_ID.to_string(),
            payload_type: PayloadType::Barcode,
            occurred_at: None,
        }
    }

    /// A barcode from a registered device, occurring now.
    pub fn barcode(device_id: impl Into<String>, raw_value: impl Into<String>) -> Self {
        ScanInput {
            raw_value: raw_value.into(),
            device_id: device_id.into(),
            payload_type: PayloadType::Barcode,
            occurred_at: None,
        }
    }
}

/// What a scan identified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEventResult {
    /// The audit record written for this scan.
    pub device_event_id: String,
    /// The resolved device (the real id of the wedge for all-zero input).
    pub device_id: String,
    pub candidate: Option<ItemDetail>,
    pub gs1: Option<Gs1Data>,
    pub catalog_match: Option<CatalogMatch>,
    pub classification: Symbology,
    pub guidance: Option<String>,
    pub processed: bool,
}

/// Identifies scanned items. Never records inventory events.
#[derive(Debug, Clone)]
pub struct DeviceScanGateway {
    devices: DeviceRepository,
    items: InventoryItemRepository,
    catalog: CatalogRepository,
    device_events: DeviceEventRepository,
    settings: ScanSettings,
}

impl DeviceScanGateway {
    pub fn new(
        devices: DeviceRepository,
        items: InventoryItemRepository,
        catalog: CatalogRepository,
        device_events: DeviceEventRepository,
        settings: ScanSettings,
    ) -> Self {
        DeviceScanGateway {
            devices,
            items,
            catalog,
            device_events,
            settings,
        }
    }

    /// Identifies a scan and appends its audit record.
    ///
    /// ## Errors
    /// * `NotFound` - device unknown, inactive, or in another facility
    pub async fn handle_scan(
        &self,
        caller: &Caller,
        input: &ScanInput,
    ) -> EngineResult<DeviceEventResult> {
        let device = self.resolve_device(caller, &input.device_id).await?;
        let value = input
            .raw_value
            .trim_matches(|c: char| matches!(c, ' ' | '\t' | '\r' | '\n'));

        let candidate = match self.items.find_candidate(&caller.facility_id, value).await? {
            Some(item) => self.items.detail(&caller.facility_id, &item.id).await?,
            None => None,
        };

        let decoded = gs1::decode(&input.raw_value);

        let mut catalog_match = None;
        let mut guidance = None;
        if candidate.is_none() {
            match decoded.parsed.as_ref().and_then(|p| p.gtin.as_deref()) {
                Some(gtin) => {
                    catalog_match = self.catalog.find_by_gtin(&caller.facility_id, gtin).await?;
                }
                None if decoded.parsed.is_none() => {
                    guidance = Some(gs1::guidance(decoded.classification).to_string());
                }
                None => {}
            }
        }

        let processing_error = match (&candidate, &catalog_match, &decoded.parsed) {
            (Some(_), _, _) => None,
            (None, Some(m), _) => Some(format!(
                "No inventory item matched; GTIN {} suggests catalog entry '{}'",
                m.identifier, m.catalog_name
            )),
            (None, None, Some(parsed)) => Some(match &parsed.gtin {
                Some(gtin) => format!("No inventory item or catalog entry matched GTIN {}", gtin),
                None => "No inventory item matched the GS1 data".to_string(),
            }),
            (None, None, None) => Some(format!(
                "No inventory item matched ({})",
                decoded.classification.as_str()
            )),
        };

        let now = Utc::now();
        let event = DeviceEvent {
            id: Uuid::new_v4().to_string(),
            facility_id: caller.facility_id.clone(),
            device_id: device.id.clone(),
            device_type: device.device_type,
            payload_type: input.payload_type,
            raw_value: input.raw_value.clone(),
            processed: candidate.is_some(),
            processed_item_id: candidate.as_ref().map(|c| c.item.id.clone()),
            processing_error,
            occurred_at: input.occurred_at.unwrap_or(now),
            created_at: now,
        };
        self.device_events.insert(&event).await?;

        info!(
            device_event_id = %event.id,
            device_id = %device.id,
            classification = decoded.classification.as_str(),
            processed = event.processed,
            catalog_match = catalog_match.is_some(),
            "Scan handled"
        );

        Ok(DeviceEventResult {
            device_event_id: event.id,
            device_id: device.id,
            candidate,
            gs1: decoded.parsed,
            catalog_match,
            classification: decoded.classification,
            guidance,
            processed: event.processed,
        })
    }

    async fn resolve_device(&self, caller: &Caller, device_id: &str) -> EngineResult<Device> {
        if device_id == KEYBOARD_WEDGE_DEVICE_ID {
            debug!(facility_id = %caller.facility_id, "Resolving keyboard-wedge device");
            return Ok(self
                .devices
                .find_or_create_keyboard_wedge(&caller.facility_id, &self.settings.keyboard_wedge_name)
                .await?);
        }

        match self.devices.get(&caller.facility_id, device_id).await? {
            Some(device) if device.is_active => Ok(device),
            _ => Err(EngineError::not_found("Device", device_id)),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
