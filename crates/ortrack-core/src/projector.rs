//! # State Projector
//!
//! The deterministic event → item state machine.
//!
//! ## How It Works
//! ```text
//!   InventoryItem (v)          InventoryEvent
//!         │                          │
//!         └──────────┬───────────────┘
//!                    ▼
//!              apply_event()
//!                    │
//!                    ▼
//!   InventoryItem (v') ── updated_at := event.created_at
//! ```
//!
//! The projector never reads the clock and never fails. Replaying the same
//! events over the same base item always yields the same item, which is what
//! makes the stored `inventory_items` row a disposable cache of the log.
//!
//! `version` is not touched here. The store bumps it when it writes the
//! projected row.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::events::{EventPayload, FinancialAttribution, InventoryEvent, NewInventoryEvent};
use crate::types::{AvailabilityStatus, Caller, InventoryItem, SterilityStatus};

/// Computes the item state after `event`.
///
/// ## Arguments
/// * `item` - State before the event
/// * `event` - A stored event for this item
///
/// ## Returns
/// The next state. Unrecognized event types return `item` unchanged.
pub fn apply_event(item: &InventoryItem, event: &InventoryEvent) -> InventoryItem {
    let mut next = item.clone();

    match &event.payload {
        EventPayload::Verified => {
            next.last_verified_at = Some(event.occurred_at);
            next.last_verified_by_user_id = Some(event.performed_by_user_id.clone());
        }
        EventPayload::LocationChanged { location_id } => {
            if let Some(location_id) = location_id {
                next.location_id = Some(location_id.clone());
            }
        }
        EventPayload::Reserved { case_id } => {
            next.availability_status = AvailabilityStatus::Reserved;
            next.reserved_for_case_id = case_id.clone();
        }
        EventPayload::Released { .. } => {
            next.availability_status = AvailabilityStatus::Available;
            next.reserved_for_case_id = None;
        }
        EventPayload::Consumed { .. } => {
            next.availability_status = AvailabilityStatus::Unavailable;
            next.reserved_for_case_id = None;
        }
        EventPayload::Expired => {
            next.sterility_status = SterilityStatus::Expired;
        }
        EventPayload::Received {
            sterility_status, ..
        } => {
            if let Some(status) = sterility_status {
                next.sterility_status = *status;
                next.availability_status = AvailabilityStatus::Available;
            }
        }
        EventPayload::Unrecognized { raw_type } => {
            tracing::warn!(
                event_id = %event.id,
                item_id = %item.id,
                event_type = %raw_type,
                "Ignoring unrecognized inventory event type"
            );
            return next;
        }
    }

    next.updated_at = event.created_at;
    next
}

/// Folds `events` over `base` in the order given.
pub fn replay<'a, I>(base: &InventoryItem, events: I) -> InventoryItem
where
    I: IntoIterator<Item = &'a InventoryEvent>,
{
    events
        .into_iter()
        .fold(base.clone(), |item, event| apply_event(&item, event))
}

/// Turns a submitted event into the stored event for `item`.
///
/// `previous_location_id` is taken from `item`, so this must be called with
/// the state read inside the writing transaction.
pub fn prepare_event(
    item: &InventoryItem,
    new: &NewInventoryEvent,
    financial: Option<FinancialAttribution>,
    caller: &Caller,
    now: DateTime<Utc>,
) -> InventoryEvent {
    InventoryEvent {
        id: Uuid::new_v4().to_string(),
        facility_id: caller.facility_id.clone(),
        inventory_item_id: item.id.clone(),
        payload: new.payload.clone(),
        occurred_at: new.occurred_at.unwrap_or(now),
        performed_by_user_id: caller.user_id.clone(),
        previous_location_id: item.location_id.clone(),
        notes: new.notes.clone(),
        device_event_id: new.device_event_id.clone(),
        financial,
        created_at: now,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
