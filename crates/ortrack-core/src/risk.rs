//! # Risk Rules
//!
//! Derives alarms from catalog policy and item state, then ranks them.
//!
//! ## Rule Set
//! ```text
//! ┌──────────────────────┬──────────────────────────────────────┬──────────┐
//! │ Rule                 │ Fires when                           │ Severity │
//! ├──────────────────────┼──────────────────────────────────────┼──────────┤
//! │ EXPIRED              │ status EXPIRED or expires ≤ today    │ RED      │
//! │ EXPIRING_SOON        │ not expired, expiration required,    │ by       │
//! │                      │ days to expire ≤ warning window      │ critical │
//! │ MISSING_EXPIRATION   │ expiration required, no date         │ by       │
//! │ MISSING_LOT          │ lot tracked, no lot                  │ critical │
//! │ MISSING_SERIAL       │ serial tracked, no serial            │          │
//! └──────────────────────┴──────────────────────────────────────┴──────────┘
//!
//! criticality:   CRITICAL    IMPORTANT    ROUTINE    (unrecognized)
//! severity:      RED         ORANGE       YELLOW     YELLOW
//! warning days:  90          60           30         30
//! ```
//!
//! Everything here is a pure function of `(items, catalog, today)`. The
//! caller supplies `today` so results are reproducible.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{CatalogPolicy, Criticality, InventoryItem, SterilityStatus};
use crate::validation::normalize_optional;

/// Warning window when neither an override nor a known criticality applies.
pub const DEFAULT_WARNING_DAYS: i64 = 30;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Yellow,
    Orange,
    Red,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskRule {
    Expired,
    ExpiringSoon,
    MissingExpiration,
    MissingLot,
    MissingSerial,
}

impl RiskRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskRule::Expired => "EXPIRED",
            RiskRule::ExpiringSoon => "EXPIRING_SOON",
            RiskRule::MissingExpiration => "MISSING_EXPIRATION",
            RiskRule::MissingLot => "MISSING_LOT",
            RiskRule::MissingSerial => "MISSING_SERIAL",
        }
    }
}

/// An item paired with the catalog policy that governs it.
#[derive(Debug, Clone)]
pub struct RiskCandidate {
    pub item: InventoryItem,
    pub catalog: CatalogPolicy,
}

/// One alarm in the risk queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RiskItem {
    pub item_id: String,
    pub catalog_id: String,
    pub catalog_name: String,
    pub rule: RiskRule,
    pub severity: Severity,
    /// Negative once the date has passed.
    pub days_to_expire: Option<i64>,
    #[ts(as = "Option<String>")]
    pub sterility_expires_at: Option<NaiveDate>,
    pub location_id: Option<String>,
    pub lot_number: Option<String>,
    pub serial_number: Option<String>,
    pub barcode: Option<String>,
}

// =============================================================================
// Policy Mapping
// =============================================================================

/// Severity of non-EXPIRED alarms by criticality.
pub fn severity_for(criticality: Option<Criticality>) -> Severity {
    match criticality {
        Some(Criticality::Critical) => Severity::Red,
        Some(Criticality::Important) => Severity::Orange,
        Some(Criticality::Routine) => Severity::Yellow,
        None => Severity::Yellow,
    }
}

/// Days before expiration at which EXPIRING_SOON fires.
pub fn effective_warning_days(catalog: &CatalogPolicy) -> i64 {
    if let Some(days) = catalog.expiration_warning_days {
        return days;
    }
    match catalog.criticality {
        Some(Criticality::Critical) => 90,
        Some(Criticality::Important) => 60,
        Some(Criticality::Routine) => 30,
        None => DEFAULT_WARNING_DAYS,
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// Every alarm for a single item, unsorted.
pub fn evaluate_item(item: &InventoryItem, catalog: &CatalogPolicy, today: NaiveDate) -> Vec<RiskItem> {
    let mut alarms = Vec::new();
    let severity = severity_for(catalog.criticality);
    let expiration_required = catalog.expiration_required();
    let days_to_expire = item
        .sterility_expires_at
        .map(|date| date.signed_duration_since(today).num_days());

    let alarm = |rule: RiskRule, severity: Severity| RiskItem {
        item_id: item.id.clone(),
        catalog_id: catalog.catalog_id.clone(),
        catalog_name: catalog.name.clone(),
        rule,
        severity,
        days_to_expire,
        sterility_expires_at: item.sterility_expires_at,
        location_id: item.location_id.clone(),
        lot_number: item.lot_number.clone(),
        serial_number: item.serial_number.clone(),
        barcode: item.barcode.clone(),
    };

    let expired = item.sterility_status == SterilityStatus::Expired
        || days_to_expire.is_some_and(|days| days <= 0);

    if expired {
        alarms.push(alarm(RiskRule::Expired, Severity::Red));
    } else if expiration_required {
        if let Some(days) = days_to_expire {
            if days <= effective_warning_days(catalog) {
                alarms.push(alarm(RiskRule::ExpiringSoon, severity));
            }
        }
    }

    if expiration_required && item.sterility_expires_at.is_none() {
        alarms.push(alarm(RiskRule::MissingExpiration, severity));
    }
    if catalog.requires_lot_tracking && normalize_optional(item.lot_number.as_deref()).is_none() {
        alarms.push(alarm(RiskRule::MissingLot, severity));
    }
    if catalog.requires_serial_tracking
        && normalize_optional(item.serial_number.as_deref()).is_none()
    {
        alarms.push(alarm(RiskRule::MissingSerial, severity));
    }

    alarms
}

/// Orders alarms for display.
///
/// Severity descending, then rule name ascending, then days to expire
/// ascending with missing dates last, then catalog name. The sort is
/// stable, so equal alarms keep their input order.
pub fn sort_risk_items(items: &mut [RiskItem]) {
    items.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.rule.as_str().cmp(b.rule.as_str()))
            .then_with(|| match (a.days_to_expire, b.days_to_expire) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
            .then_with(|| a.catalog_name.cmp(&b.catalog_name))
    });
}

/// Builds the sorted risk queue over active items with active catalogs.
pub fn compute_risk_queue(candidates: &[RiskCandidate], today: NaiveDate) -> Vec<RiskItem> {
    let mut queue: Vec<RiskItem> = candidates
        .iter()
        .filter(|c| c.item.availability_status.is_active() && c.catalog.is_active)
        .flat_map(|c| evaluate_item(&c.item, &c.catalog, today))
        .collect();

    sort_risk_items(&mut queue);
    queue
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AvailabilityStatus, ItemCategory};
    use chrono::{TimeZone, Utc};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    fn catalog(name: &str, criticality: Option<Criticality>) -> CatalogPolicy {
        CatalogPolicy {
            catalog_id: format!("cat-{}", name),
            facility_id: "fac-1".to_string(),
            name: name.to_string(),
            category: ItemCategory::Implant,
            criticality,
            requires_lot_tracking: false,
            requires_serial_tracking: false,
            requires_expiration_tracking: false,
            requires_sterility: false,
            expiration_warning_days: None,
            is_active: true,
        }
    }

    fn item(id: &str, expires_in: Option<i64>) -> InventoryItem {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        InventoryItem {
            id: id.to_string(),
            catalog_id: "cat".to_string(),
            facility_id: "fac-1".to_string(),
            serial_number: None,
            lot_number: None,
            barcode: None,
            location_id: None,
            sterility_status: SterilityStatus::Sterile,
            sterility_expires_at: expires_in.map(|d| today() + chrono::Duration::days(d)),
            availability_status: AvailabilityStatus::Available,
            reserved_for_case_id: None,
            last_verified_at: None,
            last_verified_by_user_id: None,
            created_at: ts,
            updated_at: ts,
            version: 1,
        }
    }

    #[test]
    fn test_critical_expiring_in_45_days() {
        let alarms = evaluate_item(
            &item("a", Some(45)),
            &catalog("Stent", Some(Criticality::Critical)),
            today(),
        );
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].rule, RiskRule::ExpiringSoon);
        assert_eq!(alarms[0].severity, Severity::Red);
        assert_eq!(alarms[0].days_to_expire, Some(45));
    }

    #[test]
    fn test_expires_today_is_expired_not_expiring() {
        let alarms = evaluate_item(
            &item("a", Some(0)),
            &catalog("Stent", Some(Criticality::Routine)),
            today(),
        );
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].rule, RiskRule::Expired);
        assert_eq!(alarms[0].severity, Severity::Red);
        assert_eq!(alarms[0].days_to_expire, Some(0));
    }

    #[test]
    fn test_expired_status_without_date() {
        let mut i = item("a", None);
        i.sterility_status = SterilityStatus::Expired;
        let alarms = evaluate_item(&i, &catalog("Mesh", None), today());
        let rules: Vec<RiskRule> = alarms.iter().map(|a| a.rule).collect();
        assert_eq!(rules, vec![RiskRule::Expired, RiskRule::MissingExpiration]);
        assert_eq!(alarms[0].days_to_expire, None);
    }

    #[test]
    fn test_override_and_default_windows() {
        let mut c = catalog("Plate", Some(Criticality::Important));
        assert_eq!(effective_warning_days(&c), 60);
        c.expiration_warning_days = Some(10);
        assert_eq!(effective_warning_days(&c), 10);
        assert!(evaluate_item(&item("a", Some(11)), &c, today()).is_empty());

        let unknown = catalog("Plate", None);
        assert_eq!(effective_warning_days(&unknown), DEFAULT_WARNING_DAYS);
        assert_eq!(severity_for(None), Severity::Yellow);
    }

    #[test]
    fn test_expiring_soon_gated_on_expiration_required() {
        let mut c = catalog("Retractor", Some(Criticality::Critical));
        c.category = ItemCategory::Instrument;
        assert!(evaluate_item(&item("a", Some(5)), &c, today()).is_empty());
    }

    #[test]
    fn test_missing_tracking_fields() {
        let mut c = catalog("Screw", Some(Criticality::Important));
        c.requires_lot_tracking = true;
        c.requires_serial_tracking = true;
        let mut i = item("a", Some(400));
        i.lot_number = Some("  ".to_string());
        let rules: Vec<RiskRule> = evaluate_item(&i, &c, today())
            .iter()
            .map(|a| a.rule)
            .collect();
        assert_eq!(rules, vec![RiskRule::MissingLot, RiskRule::MissingSerial]);
    }

    #[test]
    fn test_sort_days_ascending_nulls_last_then_catalog() {
        let c = catalog("Zeta", Some(Criticality::Routine));
        let base = evaluate_item(&item("x", Some(10)), &c, today()).remove(0);

        let with = |id: &str, days: Option<i64>, name: &str| RiskItem {
            item_id: id.to_string(),
            days_to_expire: days,
            catalog_name: name.to_string(),
            ..base.clone()
        };

        let mut items = vec![
            with("1", None, "Alpha"),
            with("2", Some(20), "Beta"),
            with("3", Some(5), "Gamma"),
            with("4", Some(20), "Alpha"),
            with("5", None, "Alpha"),
        ];
        sort_risk_items(&mut items);

        let order: Vec<&str> = items.iter().map(|i| i.item_id.as_str()).collect();
        assert_eq!(order, vec!["3", "4", "2", "1", "5"]);
    }

    #[test]
    fn test_queue_orders_by_severity_then_rule() {
        let critical = catalog("Valve", Some(Criticality::Critical));
        let mut routine = catalog("Gauze", Some(Criticality::Routine));
        routine.requires_lot_tracking = true;

        let queue = compute_risk_queue(
            &[
                RiskCandidate {
                    item: item("routine", Some(400)),
                    catalog: routine,
                },
                RiskCandidate {
                    item: item("critical", Some(45)),
                    catalog: critical.clone(),
                },
                RiskCandidate {
                    item: item("expired", Some(-3)),
                    catalog: critical,
                },
            ],
            today(),
        );

        let summary: Vec<(&str, RiskRule)> = queue
            .iter()
            .map(|r| (r.item_id.as_str(), r.rule))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("expired", RiskRule::Expired),
                ("critical", RiskRule::ExpiringSoon),
                ("routine", RiskRule::MissingLot),
            ]
        );
    }

    #[test]
    fn test_inactive_items_and_catalogs_skipped() {
        let mut consumed = item("a", Some(-1));
        consumed.availability_status = AvailabilityStatus::Unavailable;
        let mut retired = catalog("Old", Some(Criticality::Critical));
        retired.is_active = false;

        let queue = compute_risk_queue(
            &[
                RiskCandidate {
                    item: consumed,
                    catalog: catalog("Live", Some(Criticality::Critical)),
                },
                RiskCandidate {
                    item: item("b", Some(-1)),
                    catalog: retired,
                },
            ],
            today(),
        );
        assert!(queue.is_empty());
    }
}
