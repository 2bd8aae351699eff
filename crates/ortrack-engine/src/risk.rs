//! # Risk Service
//!
//! One bulk read of active items with their catalog policy, then the pure
//! rules in [`ortrack_core::risk`]. Never reads device events and never
//! writes.

use chrono::{NaiveDate, Utc};
use tracing::debug;

use crate::error::EngineResult;
use ortrack_core::risk::{compute_risk_queue, RiskItem};
use ortrack_core::Caller;
use ortrack_db::InventoryItemRepository;

#[derive(Debug, Clone)]
pub struct RiskService {
    items: InventoryItemRepository,
}

impl RiskService {
    pub fn new(items: InventoryItemRepository) -> Self {
        RiskService { items }
    }

    /// The ranked risk queue of the caller's facility as of `today`.
    pub async fn compute_risk_queue(
        &self,
        caller: &Caller,
        today: NaiveDate,
    ) -> EngineResult<Vec<RiskItem>> {
        let candidates = self.items.list_risk_candidates(&caller.facility_id).await?;
        let queue = compute_risk_queue(&candidates, today);

        debug!(
            facility_id = %caller.facility_id,
            %today,
            candidates = candidates.len(),
            alarms = queue.len(),
            "Computed risk queue"
        );

        Ok(queue)
    }

    /// The risk queue as of the current UTC date.
    pub async fn compute_risk_queue_today(&self, caller: &Caller) -> EngineResult<Vec<RiskItem>> {
        self.compute_risk_queue(caller, Utc::now().date_naive()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture, Fixture};
    use chrono::Duration;
    use ortrack_core::risk::{RiskRule, Severity};
    use ortrack_core::validation::CheckInRequest;
    use ortrack_core::{
        CatalogPolicy, Criticality, EventPayload, ItemCategory, NewInventoryEvent,
        SterilityStatus,
    };

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[tokio::test]
    async fn test_critical_item_expiring_in_45_days_is_red() {
        let Fixture {
            engine,
            caller,
            catalog_id,
            ..
        } = fixture().await;
        let expires = today() + Duration::days(45);
        let recorded = engine
            .check_in()
            .check_in(
                &caller,
                &CheckInRequest {
                    catalog_id: catalog_id.clone(),
                    barcode: Some("BC-45".to_string()),
                    serial_number: Some("SN-45".to_string()),
                    lot_number: Some("LOT-45".to_string()),
                    sterility_status: Some(SterilityStatus::Sterile),
                    sterility_expires_at: Some(expires),
                    ..CheckInRequest::default()
                },
            )
            .await
            .unwrap();

        let queue = engine
            .risk()
            .compute_risk_queue(&caller, today())
            .await
            .unwrap();
        let alarm = queue
            .iter()
            .find(|r| r.item_id == recorded.item.id)
            .unwrap();

        assert_eq!(alarm.rule, RiskRule::ExpiringSoon);
        assert_eq!(alarm.severity, Severity::Red);
        assert_eq!(alarm.days_to_expire, Some(45));
    }

    #[tokio::test]
    async fn test_consumed_and_other_facility_items_excluded() {
        let Fixture {
            engine,
            caller,
            item_a,
            item_b,
            ..
        } = fixture().await;

        // Both fixture items expire within the warning window.
        let before = engine.risk().compute_risk_queue(&caller, today()).await.unwrap();
        assert!(before.iter().any(|r| r.item_id == item_a.id));

        engine
            .events()
            .record_event(
                &caller,
                NewInventoryEvent::new(&item_a.id, EventPayload::Consumed { case_id: None }),
            )
            .await
            .unwrap();

        let after = engine.risk().compute_risk_queue(&caller, today()).await.unwrap();
        assert!(after.iter().all(|r| r.item_id != item_a.id));
        assert!(after.iter().any(|r| r.item_id == item_b.id));

        let outsider = Caller::new("user-x", "fac-other");
        assert!(engine
            .risk()
            .compute_risk_queue(&outsider, today())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_expired_event_raises_red_expired_alarm() {
        let Fixture {
            engine, caller, item_b, ..
        } = fixture().await;

        engine
            .events()
            .record_event(&caller, NewInventoryEvent::new(&item_b.id, EventPayload::Expired))
            .await
            .unwrap();

        let queue = engine.risk().compute_risk_queue(&caller, today()).await.unwrap();
        let alarms: Vec<_> = queue.iter().filter(|r| r.item_id == item_b.id).collect();
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].rule, RiskRule::Expired);
        assert_eq!(alarms[0].severity, Severity::Red);
        // Red alarms sort first.
        assert_eq!(queue[0].severity, Severity::Red);
    }

    #[tokio::test]
    async fn test_inactive_catalog_items_excluded() {
        let Fixture { engine, caller, .. } = fixture().await;
        let retired = engine
            .database()
            .catalog()
            .insert(&CatalogPolicy {
                catalog_id: String::new(),
                facility_id: caller.facility_id.clone(),
                name: "Retired Plate".to_string(),
                category: ItemCategory::Implant,
                criticality: Some(Criticality::Critical),
                requires_lot_tracking: true,
                requires_serial_tracking: false,
                requires_expiration_tracking: true,
                requires_sterility: false,
                expiration_warning_days: None,
                is_active: false,
            })
            .await
            .unwrap();

        let recorded = engine
            .check_in()
            .check_in(
                &caller,
                &CheckInRequest {
                    catalog_id: retired.catalog_id.clone(),
                    lot_number: Some("LOT-R".to_string()),
                    sterility_expires_at: Some(today()),
                    ..CheckInRequest::default()
                },
            )
            .await
            .unwrap();

        let queue = engine.risk().compute_risk_queue(&caller, today()).await.unwrap();
        assert!(queue.iter().all(|r| r.item_id != recorded.item.id));
    }
}
