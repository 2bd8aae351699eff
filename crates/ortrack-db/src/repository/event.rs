//! # Event Store
//!
//! The append-only inventory event log and the only path that updates the
//! item projection.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    read item (facility-scoped)          ── absent → NotFound           │
//! │    prepare_event()  previous_location_id := item.location_id           │
//! │    apply_event()    item' (pure)                                       │
//! │    INSERT inventory_events                                              │
//! │    UPDATE inventory_items ... WHERE version = item.version             │
//! │                                          ── 0 rows → StaleWrite        │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Bulk Path
//! Every referenced item is read once, in one statement, inside the batch
//! transaction. If any is missing the batch is rolled back and the missing
//! ids are reported in input order. Events for the same item chain through
//! an in-memory snapshot, so the second event sees the first one's result.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::item::{fetch_many, fetch_scoped, write_projection};
use ortrack_core::projector::{apply_event, prepare_event};
use ortrack_core::{
    Caller, CostOverrideReason, EventPayload, FinancialAttribution, GratisReason,
    InventoryEvent, InventoryItem, NewInventoryEvent, SterilityStatus,
};

const EVENT_COLUMNS: &str = "\
    id, facility_id, inventory_item_id, event_type, case_id, location_id, \
    previous_location_id, sterility_status, notes, occurred_at, performed_by_user_id, \
    device_event_id, vendor_id, cost_override_cents, cost_override_reason, \
    is_gratis, gratis_reason, created_at";

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: String,
    facility_id: String,
    inventory_item_id: String,
    event_type: String,
    case_id: Option<String>,
    location_id: Option<String>,
    previous_location_id: Option<String>,
    sterility_status: Option<String>,
    notes: Option<String>,
    occurred_at: DateTime<Utc>,
    performed_by_user_id: String,
    device_event_id: Option<String>,
    vendor_id: Option<String>,
    cost_override_cents: Option<i64>,
    cost_override_reason: Option<String>,
    is_gratis: bool,
    gratis_reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<EventRow> for InventoryEvent {
    fn from(row: EventRow) -> Self {
        let payload = EventPayload::from_parts(
            &row.event_type,
            row.case_id,
            row.location_id,
            row.sterility_status.as_deref().and_then(SterilityStatus::parse),
        );

        let has_financial = row.vendor_id.is_some()
            || row.cost_override_cents.is_some()
            || row.cost_override_reason.is_some()
            || row.is_gratis
            || row.gratis_reason.is_some();
        let financial = has_financial.then(|| FinancialAttribution {
            vendor_id: row.vendor_id,
            cost_override_cents: row.cost_override_cents,
            cost_override_reason: row
                .cost_override_reason
                .as_deref()
                .and_then(CostOverrideReason::parse),
            is_gratis: row.is_gratis,
            gratis_reason: row.gratis_reason.as_deref().and_then(GratisReason::parse),
        });

        InventoryEvent {
            id: row.id,
            facility_id: row.facility_id,
            inventory_item_id: row.inventory_item_id,
            payload,
            occurred_at: row.occurred_at,
            performed_by_user_id: row.performed_by_user_id,
            previous_location_id: row.previous_location_id,
            notes: row.notes,
            device_event_id: row.device_event_id,
            financial,
            created_at: row.created_at,
        }
    }
}

/// Appends one event row on the given connection.
pub(crate) async fn insert_event(conn: &mut SqliteConnection, event: &InventoryEvent) -> DbResult<()> {
    let financial = event.financial.clone().unwrap_or_default();

    sqlx::query(
        r#"
        INSERT INTO inventory_events (
            id, facility_id, inventory_item_id, event_type,
            case_id, location_id, previous_location_id, sterility_status,
            notes, occurred_at, performed_by_user_id, device_event_id,
            vendor_id, cost_override_cents, cost_override_reason,
            is_gratis, gratis_reason, created_at
        ) VALUES (
            ?1, ?2, ?3, ?4,
            ?5, ?6, ?7, ?8,
            ?9, ?10, ?11, ?12,
            ?13, ?14, ?15,
            ?16, ?17, ?18
        )
        "#,
    )
    .bind(&event.id)
    .bind(&event.facility_id)
    .bind(&event.inventory_item_id)
    .bind(event.event_type())
    .bind(event.payload.case_id())
    .bind(event.payload.location_id())
    .bind(&event.previous_location_id)
    .bind(event.payload.sterility_status().map(|s| s.as_str()))
    .bind(&event.notes)
    .bind(event.occurred_at)
    .bind(&event.performed_by_user_id)
    .bind(&event.device_event_id)
    .bind(&financial.vendor_id)
    .bind(financial.cost_override_cents)
    .bind(financial.cost_override_reason.map(|r| r.as_str()))
    .bind(financial.is_gratis)
    .bind(financial.gratis_reason.map(|r| r.as_str()))
    .bind(event.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// A submitted event whose financial attribution has already been validated.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub event: NewInventoryEvent,
    pub financial: Option<FinancialAttribution>,
}

/// Repository for the inventory event log.
#[derive(Debug, Clone)]
pub struct EventStore {
    pool: SqlitePool,
}

impl EventStore {
    /// Creates a new EventStore.
    pub fn new(pool: SqlitePool) -> Self {
        EventStore { pool }
    }

    /// Appends one event and updates its item, atomically.
    ///
    /// ## Arguments
    /// * `caller` - Facility scope and performing user
    /// * `new` - The submitted event
    /// * `financial` - Validated attribution, if any
    /// * `now` - Write time (`created_at`, default `occurred_at`)
    ///
    /// ## Returns
    /// The item after the event, and the stored event.
    ///
    /// ## Errors
    /// * `NotFound` - item absent from the caller's facility
    /// * `StaleWrite` / `Busy` - lost a race; safe to retry
    pub async fn record_event(
        &self,
        caller: &Caller,
        new: &NewInventoryEvent,
        financial: Option<FinancialAttribution>,
        now: DateTime<Utc>,
    ) -> DbResult<(InventoryItem, InventoryEvent)> {
        let mut tx = self.pool.begin().await?;

        let item = fetch_scoped(&mut tx, &caller.facility_id, &new.inventory_item_id)
            .await?
            .ok_or_else(|| DbError::not_found("InventoryItem", &new.inventory_item_id))?;

        let event = prepare_event(&item, new, financial, caller, now);
        let mut next = apply_event(&item, &event);

        insert_event(&mut tx, &event).await?;
        next.version = write_projection(&mut tx, &next).await?;

        tx.commit().await?;

        debug!(
            event_id = %event.id,
            item_id = %next.id,
            event_type = event.event_type(),
            version = next.version,
            "Recorded inventory event"
        );

        Ok((next, event))
    }

    /// Appends a batch of events in input order, all or nothing.
    ///
    /// ## Errors
    /// * `ItemsNotFound` - listing every referenced id absent from the
    ///   caller's facility; nothing is written
    /// * `StaleWrite` / `Busy` - lost a race; safe to retry the whole batch
    pub async fn record_events(
        &self,
        caller: &Caller,
        batch: &[PendingEvent],
        now: DateTime<Utc>,
    ) -> DbResult<Vec<(InventoryItem, InventoryEvent)>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids: Vec<String> = Vec::new();
        for pending in batch {
            if !ids.contains(&pending.event.inventory_item_id) {
                ids.push(pending.event.inventory_item_id.clone());
            }
        }

        let mut tx = self.pool.begin().await?;

        let mut snapshot: HashMap<String, InventoryItem> =
            fetch_many(&mut tx, &caller.facility_id, &ids)
                .await?
                .into_iter()
                .map(|item| (item.id.clone(), item))
                .collect();

        let missing_ids: Vec<String> = ids
            .iter()
            .filter(|id| !snapshot.contains_key(*id))
            .cloned()
            .collect();
        if !missing_ids.is_empty() {
            tx.rollback().await?;
            return Err(DbError::ItemsNotFound { missing_ids });
        }

        let mut results = Vec::with_capacity(batch.len());
        for pending in batch {
            let item_id = &pending.event.inventory_item_id;
            let item = snapshot
                .get(item_id)
                .ok_or_else(|| DbError::not_found("InventoryItem", item_id))?;

            let event = prepare_event(item, &pending.event, pending.financial.clone(), caller, now);
            let mut next = apply_event(item, &event);

            insert_event(&mut tx, &event).await?;
            next.version = write_projection(&mut tx, &next).await?;

            snapshot.insert(item_id.clone(), next.clone());
            results.push((next, event));
        }

        tx.commit().await?;

        info!(
            facility_id = %caller.facility_id,
            events = results.len(),
            items = ids.len(),
            "Recorded inventory event batch"
        );

        Ok(results)
    }

    /// The facility-scoped log of one item, in occurrence order.
    pub async fn list_item_events(
        &self,
        facility_id: &str,
        item_id: &str,
    ) -> DbResult<Vec<InventoryEvent>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM inventory_events \
             WHERE facility_id = ?1 AND inventory_item_id = ?2 \
             ORDER BY occurred_at, rowid"
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(facility_id)
            .bind(item_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(InventoryEvent::from).collect())
    }

    /// Number of inventory events in a facility.
    pub async fn count(&self, facility_id: &str) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM inventory_events WHERE facility_id = ?1")
                .bind(facility_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use ortrack_core::projector::replay;
    use ortrack_core::{AvailabilityStatus, CatalogPolicy, ItemCategory};
    use uuid::Uuid;

    const FACILITY: &str = "fac-1";

    fn caller() -> Caller {
        Caller::new("user-1", FACILITY)
    }

    async fn setup() -> (Database, InventoryItem) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db
            .catalog()
            .insert(&CatalogPolicy {
                catalog_id: String::new(),
                facility_id: FACILITY.to_string(),
                name: "Knee Tray".to_string(),
                category: ItemCategory::Instrument,
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
        let item = insert_item(&db, &catalog.catalog_id, "BC-A").await;
        (db, item)
    }

    async fn insert_item(db: &Database, catalog_id: &str, barcode: &str) -> InventoryItem {
        let now = Utc::now();
        let item = InventoryItem {
            id: Uuid::new_v4().to_string(),
            catalog_id: catalog_id.to_string(),
            facility_id: FACILITY.to_string(),
            serial_number: None,
            lot_number: None,
            barcode: Some(barcode.to_string()),
            location_id: None,
            sterility_status: SterilityStatus::NonSterile,
            sterility_expires_at: None,
            availability_status: AvailabilityStatus::Available,
            reserved_for_case_id: None,
            last_verified_at: None,
            last_verified_by_user_id: None,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        let received = prepare_event(
            &item,
            &NewInventoryEvent::new(
                &item.id,
                EventPayload::Received {
                    location_id: None,
                    sterility_status: Some(SterilityStatus::NonSterile),
                },
            ),
            None,
            &caller(),
            now,
        );
        db.items().insert_with_receipt(&item, &received).await.unwrap();
        item
    }

    #[tokio::test]
    async fn test_record_event_updates_projection_and_version() {
        let (db, item) = setup().await;

        let new = NewInventoryEvent::new(
            &item.id,
            EventPayload::Reserved {
                case_id: Some("case-1".to_string()),
            },
        );
        let (next, event) = db
            .events()
            .record_event(&caller(), &new, None, Utc::now())
            .await
            .unwrap();

        assert_eq!(next.availability_status, AvailabilityStatus::Reserved);
        assert_eq!(next.version, 2);
        assert_eq!(next.updated_at, event.created_at);

        let stored = db.items().get(FACILITY, &item.id).await.unwrap().unwrap();
        assert_eq!(stored, next);
    }

    #[tokio::test]
    async fn test_cross_facility_item_is_not_found() {
        let (db, item) = setup().await;
        let other = Caller::new("user-2", "fac-2");

        let err = db
            .events()
            .record_event(
                &other,
                &NewInventoryEvent::new(&item.id, EventPayload::Verified),
                None,
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let (db, item) = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let mut stale = item.clone();
        stale.version = 7;
        let err = write_projection(&mut conn, &stale).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_bulk_with_missing_item_persists_nothing() {
        let (db, item_a) = setup().await;
        let before = db.events().count(FACILITY).await.unwrap();

        let batch = vec![
            PendingEvent {
                event: NewInventoryEvent::new(&item_a.id, EventPayload::Verified),
                financial: None,
            },
            PendingEvent {
                event: NewInventoryEvent::new("item-b", EventPayload::Verified),
                financial: None,
            },
        ];
        let err = db
            .events()
            .record_events(&caller(), &batch, Utc::now())
            .await
            .unwrap_err();

        match err {
            DbError::ItemsNotFound { missing_ids } => assert_eq!(missing_ids, vec!["item-b"]),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(db.events().count(FACILITY).await.unwrap(), before);
        let unchanged = db.items().get(FACILITY, &item_a.id).await.unwrap().unwrap();
        assert_eq!(unchanged.last_verified_at, None);
    }

    #[tokio::test]
    async fn test_bulk_missing_middle_item_rolls_back_neighbours() {
        let (db, item_a) = setup().await;
        let item_c = insert_item(&db, &item_a.catalog_id, "BC-C").await;
        let before = db.events().count(FACILITY).await.unwrap();

        let verified = |id: &str| PendingEvent {
            event: NewInventoryEvent::new(id, EventPayload::Verified),
            financial: None,
        };
        let batch = vec![verified(&item_a.id), verified("item-b"), verified(&item_c.id)];
        let err = db
            .events()
            .record_events(&caller(), &batch, Utc::now())
            .await
            .unwrap_err();

        match err {
            DbError::ItemsNotFound { missing_ids } => assert_eq!(missing_ids, vec!["item-b"]),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(db.events().count(FACILITY).await.unwrap(), before);
        for id in [&item_a.id, &item_c.id] {
            let stored = db.items().get(FACILITY, id).await.unwrap().unwrap();
            assert_eq!(stored.version, 1);
            assert_eq!(stored.last_verified_at, None);
        }
    }

    #[tokio::test]
    async fn test_missing_ids_keeps_input_order() {
        let (db, item_a) = setup().await;

        let ids = vec![
            "item-z".to_string(),
            item_a.id.clone(),
            "item-b".to_string(),
            "item-z".to_string(),
        ];
        let missing = db.items().missing_ids(FACILITY, &ids).await.unwrap();
        assert_eq!(missing, vec!["item-z", "item-b"]);

        let other_facility = db.items().missing_ids("fac-2", &[item_a.id.clone()]).await.unwrap();
        assert_eq!(other_facility, vec![item_a.id.clone()]);
    }

    #[tokio::test]
    async fn test_bulk_chains_events_for_same_item() {
        let (db, item) = setup().await;

        let batch = vec![
            PendingEvent {
                event: NewInventoryEvent::new(
                    &item.id,
                    EventPayload::Reserved {
                        case_id: Some("case-1".to_string()),
                    },
                ),
                financial: None,
            },
            PendingEvent {
                event: NewInventoryEvent::new(
                    &item.id,
                    EventPayload::Consumed {
                        case_id: Some("case-1".to_string()),
                    },
                ),
                financial: None,
            },
        ];
        let results = db
            .events()
            .record_events(&caller(), &batch, Utc::now())
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.availability_status, AvailabilityStatus::Reserved);
        assert_eq!(results[1].0.availability_status, AvailabilityStatus::Unavailable);
        assert_eq!(results[1].0.version, 3);

        let stored = db.items().get(FACILITY, &item.id).await.unwrap().unwrap();
        assert_eq!(stored.availability_status, AvailabilityStatus::Unavailable);
        assert_eq!(stored.reserved_for_case_id, None);
    }

    #[tokio::test]
    async fn test_log_replays_to_stored_projection() {
        let (db, item) = setup().await;
        let location = db.locations().insert(FACILITY, "Core A").await.unwrap();

        for payload in [
            EventPayload::LocationChanged {
                location_id: Some(location.id.clone()),
            },
            EventPayload::Verified,
            EventPayload::Expired,
        ] {
            db.events()
                .record_event(&caller(), &NewInventoryEvent::new(&item.id, payload), None, Utc::now())
                .await
                .unwrap();
        }

        let log = db.events().list_item_events(FACILITY, &item.id).await.unwrap();
        assert_eq!(log.len(), 4);
        assert_eq!(log[0].event_type(), "RECEIVED");
        assert_eq!(log[1].previous_location_id, None);

        let stored = db.items().get(FACILITY, &item.id).await.unwrap().unwrap();
        let first = replay(&item, &log);
        let second = replay(&item, &log);
        assert_eq!(first, second);
        assert_eq!(first.location_id, stored.location_id);
        assert_eq!(first.sterility_status, SterilityStatus::Expired);
        assert_eq!(first.last_verified_at, stored.last_verified_at);
        assert_eq!(first.updated_at, stored.updated_at);
    }

    #[tokio::test]
    async fn test_unknown_stored_type_loads_as_unrecognized() {
        let (db, item) = setup().await;
        sqlx::query("UPDATE inventory_events SET event_type = 'STERILIZED' WHERE inventory_item_id = ?1")
            .bind(&item.id)
            .execute(db.pool())
            .await
            .unwrap();

        let log = db.events().list_item_events(FACILITY, &item.id).await.unwrap();
        assert!(!log[0].payload.is_recognized());
        assert_eq!(replay(&item, &log), item);
    }
}
