//! # Event Service
//!
//! The write path for inventory state. Validates submitted events, resolves
//! their references, then hands them to the [`EventStore`].
//!
//! ## Write Path
//! ```text
//! NewInventoryEvent
//!      │
//!      ├── eventType in the closed set?          no ──► Validation
//!      ├── locationId in facility? (RECEIVED,    no ──► NotFound
//!      │   LOCATION_CHANGED)
//!      ├── financial attribution valid?          no ──► Validation (all
//!      │                                                 violations)
//!      ▼
//! EventStore::record_event  (append + projection, one transaction)
//!      │
//!      ├── StaleWrite / Busy ──► jittered backoff, retry up to
//!      │                         events.max_write_retries
//!      │                              └── exhausted ──► Conflict
//!      ▼
//! RecordedEvent { item, event }
//! ```
//!
//! ## Bulk Batches
//! A batch is checked as a whole before anything is written: absent item ids
//! first (all of them, as `ItemsNotFound`), then every event's payload and
//! attribution (all failures, as one `BatchRejected`), then referenced
//! locations.

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use ts_rs::TS;

use crate::config::EventSettings;
use crate::error::{EngineError, EngineResult};
use ortrack_core::validation::{normalize_optional, validate_event_payload, validate_financial};
use ortrack_core::{
    Caller, EventRejection, FinancialAttribution, InventoryEvent, InventoryItem, ItemDetail,
    NewInventoryEvent, ValidationError,
};
use ortrack_db::{
    DbResult, EventStore, InventoryItemRepository, LocationRepository, PendingEvent,
    VendorRepository,
};

/// An item state together with the event that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RecordedEvent {
    pub item: InventoryItem,
    pub event: InventoryEvent,
}

impl From<(InventoryItem, InventoryEvent)> for RecordedEvent {
    fn from((item, event): (InventoryItem, InventoryEvent)) -> Self {
        RecordedEvent { item, event }
    }
}

/// Runs a store write, retrying while it loses concurrency races.
///
/// Between attempts the writer sleeps a random time up to
/// [`EventSettings::backoff_ceiling`]. Non-retryable errors are returned at
/// once. After `max_write_retries` retries the last race is reported as a
/// Conflict.
pub(crate) async fn retry_write<T, F, Fut>(
    operation: &'static str,
    settings: &EventSettings,
    mut write: F,
) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match write().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => {
                if attempt >= settings.max_write_retries {
                    warn!(operation, attempts = attempt + 1, error = %err, "Giving up after concurrent write conflicts");
                    return Err(EngineError::Conflict {
                        message: format!(
                            "{} failed after {} attempts: {}",
                            operation,
                            attempt + 1,
                            err
                        ),
                        existing_item_id: None,
                    });
                }
                attempt += 1;
                let delay = jittered(settings.backoff_ceiling(attempt));
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Concurrent write conflict, retrying"
                );
                if delay.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Full jitter: uniform in `[0, ceiling]`.
fn jittered(ceiling: Duration) -> Duration {
    let ceiling_ms = ceiling.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling_ms))
}

/// Records inventory events and serves item history.
#[derive(Debug, Clone)]
pub struct EventService {
    events: EventStore,
    items: InventoryItemRepository,
    locations: LocationRepository,
    vendors: VendorRepository,
    settings: EventSettings,
}

impl EventService {
    pub fn new(
        events: EventStore,
        items: InventoryItemRepository,
        locations: LocationRepository,
        vendors: VendorRepository,
        settings: EventSettings,
    ) -> Self {
        EventService {
            events,
            items,
            locations,
            vendors,
            settings,
        }
    }

    /// Appends one event and returns the updated item.
    ///
    /// ## Errors
    /// * `NotFound` - item or referenced location absent from the facility
    /// * `Validation` - unrecognized event type or rejected attribution
    /// * `Conflict` - concurrent writers won every retry
    pub async fn record_event(
        &self,
        caller: &Caller,
        new: NewInventoryEvent,
    ) -> EngineResult<RecordedEvent> {
        validate_event_payload(&new.payload)?;
        self.check_location(caller, &new).await?;
        let financial = self.check_financial(caller, &new).await?;

        let new = &new;
        let recorded = retry_write("record_event", &self.settings, move || {
            self.events
                .record_event(caller, new, financial.clone(), Utc::now())
        })
        .await?;

        Ok(recorded.into())
    }

    /// Appends a batch in input order, all or nothing.
    ///
    /// ## Errors
    /// * `Validation` - batch larger than `events.max_batch_size`, or
    ///   `BatchRejected` listing every invalid event
    /// * `ItemsNotFound` - every absent item id; nothing is written
    /// * `NotFound` - first referenced location absent from the facility
    /// * `Conflict` - concurrent writers won every retry
    pub async fn record_events(
        &self,
        caller: &Caller,
        batch: Vec<NewInventoryEvent>,
    ) -> EngineResult<Vec<RecordedEvent>> {
        if batch.len() > self.settings.max_batch_size {
            return Err(ValidationError::OutOfRange {
                field: "events".to_string(),
                min: 1,
                max: self.settings.max_batch_size as i64,
            }
            .into());
        }
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = batch.iter().map(|e| e.inventory_item_id.clone()).collect();
        let missing_ids = self.items.missing_ids(&caller.facility_id, &ids).await?;
        if !missing_ids.is_empty() {
            debug!(missing = missing_ids.len(), "Bulk batch references absent items");
            return Err(EngineError::ItemsNotFound { missing_ids });
        }

        let mut pending = Vec::with_capacity(batch.len());
        let mut rejections = Vec::new();
        for (index, event) in batch.into_iter().enumerate() {
            let checked = match validate_event_payload(&event.payload) {
                Ok(()) => self.check_financial(caller, &event).await,
                Err(err) => Err(err.into()),
            };
            match checked {
                Ok(financial) => pending.push(PendingEvent { event, financial }),
                Err(EngineError::Validation(error)) => {
                    rejections.push(EventRejection { index, error })
                }
                Err(other) => return Err(other),
            }
        }
        if !rejections.is_empty() {
            return Err(ValidationError::BatchRejected { rejections }.into());
        }

        for PendingEvent { event, .. } in &pending {
            self.check_location(caller, event).await?;
        }

        let pending = &pending;
        let recorded = retry_write("record_events", &self.settings, move || {
            self.events.record_events(caller, pending, Utc::now())
        })
        .await?;

        Ok(recorded.into_iter().map(RecordedEvent::from).collect())
    }

    /// The item's event log in occurrence order.
    pub async fn list_item_events(
        &self,
        caller: &Caller,
        item_id: &str,
    ) -> EngineResult<Vec<InventoryEvent>> {
        if self.items.get(&caller.facility_id, item_id).await?.is_none() {
            return Err(EngineError::not_found("InventoryItem", item_id));
        }
        Ok(self
            .events
            .list_item_events(&caller.facility_id, item_id)
            .await?)
    }

    /// The item with its catalog and location names.
    pub async fn item_detail(&self, caller: &Caller, item_id: &str) -> EngineResult<ItemDetail> {
        self.items
            .detail(&caller.facility_id, item_id)
            .await?
            .ok_or_else(|| EngineError::not_found("InventoryItem", item_id))
    }

    /// RECEIVED and LOCATION_CHANGED must name a location in the facility.
    async fn check_location(&self, caller: &Caller, new: &NewInventoryEvent) -> EngineResult<()> {
        if let Some(location_id) = new.payload.location_id() {
            if self
                .locations
                .get(&caller.facility_id, location_id)
                .await?
                .is_none()
            {
                return Err(EngineError::not_found("Location", location_id));
            }
        }
        Ok(())
    }

    /// Resolves the vendor and validates the attribution, if any was given.
    async fn check_financial(
        &self,
        caller: &Caller,
        new: &NewInventoryEvent,
    ) -> EngineResult<Option<FinancialAttribution>> {
        let input = match &new.financial {
            Some(input) if !input.is_empty() => input,
            _ => return Ok(None),
        };

        let vendor = match normalize_optional(input.vendor_id.as_deref()) {
            Some(vendor_id) => self.vendors.get(&caller.facility_id, &vendor_id).await?,
            None => None,
        };

        let attribution = validate_financial(input, vendor.as_ref())?;
        debug!(
            item_id = %new.inventory_item_id,
            is_gratis = attribution.is_gratis,
            vendor_id = ?attribution.vendor_id,
            "Financial attribution accepted"
        );

        Ok(Some(attribution))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
