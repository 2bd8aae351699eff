//! # Check-in Service
//!
//! Creates inventory items at receiving. An item is born together with its
//! RECEIVED event, so its log is never empty.
//!
//! ## Flow
//! ```text
//! CheckInRequest
//!      │
//!      ├── catalog entry in facility?            no ──► NotFound
//!      ├── tracking policy satisfied?            no ──► Validation
//!      │                                                 (every missing field)
//!      ├── location in facility?                 no ──► NotFound
//!      ├── barcode unused in facility?           no ──► Conflict (+ existing id)
//!      ▼
//! insert item + RECEIVED event (one transaction)
//! ```

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::config::EventSettings;
use crate::error::{EngineError, EngineResult};
use crate::events::{retry_write, RecordedEvent};
use ortrack_core::projector::prepare_event;
use ortrack_core::validation::{normalize_optional, validate_check_in, CheckInRequest};
use ortrack_core::{
    AvailabilityStatus, Caller, CoreError, EventPayload, InventoryItem, NewInventoryEvent,
    SterilityStatus, ValidationError,
};
use ortrack_db::{CatalogRepository, DbError, InventoryItemRepository, LocationRepository};

/// Receives physical units into inventory.
#[derive(Debug, Clone)]
pub struct CheckInService {
    catalog: CatalogRepository,
    items: InventoryItemRepository,
    locations: LocationRepository,
    settings: EventSettings,
}

impl CheckInService {
    pub fn new(
        catalog: CatalogRepository,
        items: InventoryItemRepository,
        locations: LocationRepository,
        settings: EventSettings,
    ) -> Self {
        CheckInService {
            catalog,
            items,
            locations,
            settings,
        }
    }

    /// Creates an item and its RECEIVED event.
    ///
    /// ## Returns
    /// The new item (version 1) and its RECEIVED event.
    ///
    /// ## Errors
    /// * `NotFound` - catalog entry or location absent from the facility
    /// * `Validation` - the complete list of fields the policy requires
    /// * `Conflict` - barcode already used in the facility
    pub async fn check_in(
        &self,
        caller: &Caller,
        req: &CheckInRequest,
    ) -> EngineResult<RecordedEvent> {
        let catalog_id = req.catalog_id.trim();
        if catalog_id.is_empty() {
            return Err(ValidationError::Required {
                field: "catalogId".to_string(),
            }
            .into());
        }
        let policy = self
            .catalog
            .get(&caller.facility_id, catalog_id)
            .await?
            .ok_or_else(|| EngineError::not_found("CatalogItem", catalog_id))?;

        validate_check_in(&policy, req)?;

        let location_id = normalize_optional(req.location_id.as_deref());
        if let Some(location_id) = &location_id {
            if self
                .locations
                .get(&caller.facility_id, location_id)
                .await?
                .is_none()
            {
                return Err(EngineError::not_found("Location", location_id));
            }
        }

        let barcode = normalize_optional(req.barcode.as_deref());
        if let Some(barcode) = &barcode {
            if let Some(existing) = self.items.find_by_barcode(&caller.facility_id, barcode).await? {
                return Err(CoreError::DuplicateBarcode {
                    barcode: barcode.clone(),
                    existing_item_id: existing.id,
                }
                .into());
            }
        }

        let now = Utc::now();
        let sterility_status = req.sterility_status.unwrap_or(SterilityStatus::NonSterile);
        let item = InventoryItem {
            id: Uuid::new_v4().to_string(),
            catalog_id: policy.catalog_id.clone(),
            facility_id: caller.facility_id.clone(),
            serial_number: normalize_optional(req.serial_number.as_deref()),
            lot_number: normalize_optional(req.lot_number.as_deref()),
            barcode,
            location_id: location_id.clone(),
            sterility_status,
            sterility_expires_at: req.sterility_expires_at,
            availability_status: AvailabilityStatus::Available,
            reserved_for_case_id: None,
            last_verified_at: None,
            last_verified_by_user_id: None,
            created_at: now,
            updated_at: now,
            version: 1,
        };

        let mut new = NewInventoryEvent::new(
            &item.id,
            EventPayload::Received {
                location_id,
                sterility_status: Some(sterility_status),
            },
        );
        if let Some(notes) = normalize_optional(req.notes.as_deref()) {
            new = new.with_notes(notes);
        }
        let mut received = prepare_event(&item, &new, None, caller, now);
        // A new item has no prior location.
        received.previous_location_id = None;

        let (item_ref, received_ref) = (&item, &received);
        let inserted = retry_write("check_in", &self.settings, move || {
            self.items.insert_with_receipt(item_ref, received_ref)
        })
        .await;

        match inserted {
            Ok(()) => {}
            // Lost a race for the barcode after the pre-check.
            Err(EngineError::Conflict { message, .. }) => {
                let existing = match &item.barcode {
                    Some(barcode) => self
                        .items
                        .find_by_barcode(&caller.facility_id, barcode)
                        .await?
                        .map(|existing| existing.id),
                    None => None,
                };
                return Err(EngineError::Conflict {
                    message,
                    existing_item_id: existing,
                });
            }
            Err(EngineError::Database(DbError::ForeignKeyViolation { message })) => {
                return Err(EngineError::Internal(format!(
                    "check-in references vanished: {}",
                    message
                )));
            }
            Err(other) => return Err(other),
        }

        info!(
            item_id = %item.id,
            facility_id = %item.facility_id,
            catalog_id = %item.catalog_id,
            "Checked in inventory item"
        );

        Ok(RecordedEvent {
            item,
            event: received,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture, Fixture};
    use chrono::NaiveDate;
    use ortrack_core::validation::RequiredField;
    use ortrack_core::{CatalogPolicy, ItemCategory};

    fn request(catalog_id: &str) -> CheckInRequest {
        CheckInRequest {
            catalog_id: catalog_id.to_string(),
            barcode: Some("BC-NEW-1".to_string()),
            serial_number: Some("SN-100".to_string()),
            lot_number: Some("LOT-7".to_string()),
            location_id: None,
            sterility_status: Some(SterilityStatus::Sterile),
            sterility_expires_at: NaiveDate::from_ymd_opt(2027, 6, 30),
            notes: None,
        }
    }

    fn missing_fields(err: EngineError) -> Vec<RequiredField> {
        match err {
            EngineError::Validation(ValidationError::MissingRequiredFields { fields }) => fields,
            other => panic!("expected MissingRequiredFields, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_check_in_creates_item_with_received_event() {
        let Fixture {
            engine,
            caller,
            catalog_id,
            location_id,
            ..
        } = fixture().await;

        let mut req = request(&catalog_id);
        req.location_id = Some(location_id.clone());
        req.notes = Some("  From loaner tray  ".to_string());

        let recorded = engine.check_in().check_in(&caller, &req).await.unwrap();

        assert_eq!(recorded.item.version, 1);
        assert_eq!(recorded.item.sterility_status, SterilityStatus::Sterile);
        assert_eq!(recorded.item.availability_status, AvailabilityStatus::Available);
        assert_eq!(recorded.event.event_type(), "RECEIVED");
        assert_eq!(recorded.event.previous_location_id, None);
        assert_eq!(recorded.event.notes.as_deref(), Some("From loaner tray"));

        let history = engine
            .events()
            .list_item_events(&caller, &recorded.item.id)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].payload.location_id(), Some(location_id.as_str()));
    }

    #[tokio::test]
    async fn test_missing_fields_reported_together() {
        let Fixture {
            engine,
            caller,
            catalog_id,
            ..
        } = fixture().await;

        let mut req = request(&catalog_id);
        req.lot_number = Some("   ".to_string());
        req.serial_number = None;
        req.sterility_expires_at = None;

        let fields = missing_fields(engine.check_in().check_in(&caller, &req).await.unwrap_err());
        assert_eq!(
            fields,
            vec![
                RequiredField::LotNumber,
                RequiredField::SerialNumber,
                RequiredField::SterilityExpiresAt
            ]
        );
        assert_eq!(engine.database().items().count(&caller.facility_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_implant_requires_expiration_by_default() {
        let Fixture { engine, caller, .. } = fixture().await;
        let screw = engine
            .database()
            .catalog()
            .insert(&CatalogPolicy {
                catalog_id: String::new(),
                facility_id: caller.facility_id.clone(),
                name: "Bone Screw".to_string(),
                category: ItemCategory::Implant,
                criticality: None,
                requires_lot_tracking: false,
                requires_serial_tracking: false,
                requires_expiration_tracking: false,
                requires_sterility: false,
                expiration_warning_days: None,
                is_active: true,
            })
            .await
            .unwrap();

        let req = CheckInRequest {
            catalog_id: screw.catalog_id.clone(),
            ..CheckInRequest::default()
        };
        let fields = missing_fields(engine.check_in().check_in(&caller, &req).await.unwrap_err());
        assert_eq!(fields, vec![RequiredField::SterilityExpiresAt]);
    }

    #[tokio::test]
    async fn test_duplicate_barcode_is_conflict_with_existing_item() {
        let Fixture {
            engine,
            caller,
            catalog_id,
            item_a,
            ..
        } = fixture().await;

        let mut req = request(&catalog_id);
        req.barcode = item_a.barcode.clone();

        match engine.check_in().check_in(&caller, &req).await.unwrap_err() {
            EngineError::Conflict {
                existing_item_id, ..
            } => assert_eq!(existing_item_id, Some(item_a.id.clone())),
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_same_barcode_allowed_in_other_facility() {
        let Fixture {
            engine, item_a, ..
        } = fixture().await;
        let other = Caller::new("user-2", "fac-other");
        let policy = crate::testing::hip_stem_policy(&engine, &other.facility_id).await;

        let mut req = request(&policy.catalog_id);
        req.barcode = item_a.barcode.clone();

        assert!(engine.check_in().check_in(&other, &req).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_catalog_or_location_is_not_found() {
        let Fixture {
            engine,
            caller,
            catalog_id,
            ..
        } = fixture().await;

        let err = engine
            .check_in()
            .check_in(&caller, &request("no-such-catalog"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { ref entity, .. } if entity == "CatalogItem"));

        let mut req = request(&catalog_id);
        req.location_id = Some("nowhere".to_string());
        let err = engine.check_in().check_in(&caller, &req).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { ref entity, .. } if entity == "Location"));
    }

    #[tokio::test]
    async fn test_catalog_of_other_facility_is_not_found() {
        let Fixture {
            engine, catalog_id, ..
        } = fixture().await;
        let outsider = Caller::new("user-x", "fac-other");

        let err = engine
            .check_in()
            .check_in(&outsider, &request(&catalog_id))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_blank_catalog_id_is_validation_error() {
        let Fixture { engine, caller, .. } = fixture().await;

        let err = engine
            .check_in()
            .check_in(&caller, &request("  "))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::Required { .. })
        ));
    }
}
