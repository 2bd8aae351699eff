//! # Seed Data Generator
//!
//! Populates a demo facility for development and risk-queue demos.
//!
//! ## Usage
//! ```bash
//! # Seed facility "demo-facility" with 6 items per catalog entry (default)
//! cargo run -p ortrack-db --bin seed
//!
//! # Custom amount, facility and database path
//! cargo run -p ortrack-db --bin seed -- --count 20 --facility fac-7 --db ./data/ortrack.db
//! ```
//!
//! ## Generated Data
//! - Locations: sterile core, OR suites, loaner cage
//! - Vendors: one active, one inactive
//! - Catalog entries across categories and criticalities, with GTIN/UPC
//!   identifiers so GS1 scans resolve to catalog suggestions
//! - A barcode scanner device
//! - Items received through the event log, some deliberately incomplete or
//!   near expiry so the risk queue has content

use chrono::{Duration, NaiveDate, Utc};
use std::env;
use uuid::Uuid;

use ortrack_core::projector::prepare_event;
use ortrack_core::{
    AvailabilityStatus, Caller, CatalogPolicy, Criticality, DeviceType, EventPayload,
    IdentifierType, InventoryItem, ItemCategory, NewInventoryEvent, SterilityStatus,
};
use ortrack_db::{Database, DbConfig};

/// Catalog entries: (code, name, category, criticality, lot, serial, expiration, sterile, warning override, identifier)
type CatalogSeed = (
    &'static str,
    &'static str,
    ItemCategory,
    Criticality,
    bool,
    bool,
    bool,
    bool,
    Option<i64>,
    Option<(IdentifierType, &'static str)>,
);

const CATALOG: &[CatalogSeed] = &[
    (
        "HIP",
        "Cemented Hip Stem 12mm",
        ItemCategory::Implant,
        Criticality::Critical,
        true,
        true,
        true,
        true,
        None,
        Some((IdentifierType::Gtin, "00884426070010")),
    ),
    (
        "SCR",
        "Cortical Bone Screw 4.5mm",
        ItemCategory::Implant,
        Criticality::Important,
        true,
        false,
        true,
        true,
        None,
        Some((IdentifierType::Gtin, "10303512345674")),
    ),
    (
        "TRO",
        "Laparoscopic Trocar 12mm",
        ItemCategory::Consumable,
        Criticality::Routine,
        true,
        false,
        true,
        true,
        Some(45),
        Some((IdentifierType::Gtin, "00807771234562")),
    ),
    (
        "TRY",
        "Basic Ortho Instrument Tray",
        ItemCategory::Instrument,
        Criticality::Important,
        false,
        true,
        false,
        false,
        None,
        None,
    ),
    (
        "SPN",
        "Loaner Spine Set",
        ItemCategory::Loaner,
        Criticality::Critical,
        false,
        false,
        false,
        false,
        None,
        Some((IdentifierType::Upc, "614141000012")),
    ),
];

const LOCATIONS: &[&str] = &["Sterile Core A", "OR 1", "OR 2", "Loaner Cage"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 6;
    let mut db_path = String::from("./ortrack_dev.db");
    let mut facility_id = String::from("demo-facility");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(6);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--facility" | "-f" => {
                if i + 1 < args.len() {
                    facility_id = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("ORtrack Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>        Items per catalog entry (default: 6)");
                println!("  -d, --db <PATH>        Database file path (default: ./ortrack_dev.db)");
                println!("  -f, --facility <ID>    Facility id (default: demo-facility)");
                println!("  -h, --help             Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("ORtrack Seed Data Generator");
    println!("===========================");
    println!("Database: {}", db_path);
    println!("Facility: {}", facility_id);
    println!("Items per catalog entry: {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database, migrations applied");

    let existing = db.items().count(&facility_id).await?;
    if existing > 0 {
        println!("⚠ Facility already has {} items", existing);
        println!("  Skipping seed to avoid duplicates.");
        return Ok(());
    }

    let mut location_ids = Vec::new();
    for name in LOCATIONS {
        location_ids.push(db.locations().insert(&facility_id, name).await?.id);
    }
    let vendor = db.vendors().insert(&facility_id, "Acme Orthopedics", true).await?;
    db.vendors()
        .insert(&facility_id, "Legacy Surgical Supply", false)
        .await?;
    let scanner = db
        .devices()
        .insert(&facility_id, "Core A Scanner", DeviceType::BarcodeScanner, true)
        .await?;
    println!(
        "✓ {} locations, 2 vendors (active: {}), scanner {}",
        location_ids.len(),
        vendor.id,
        scanner.id
    );

    let caller = Caller::new("seed", &facility_id);
    let today = Utc::now().date_naive();
    let mut generated = 0;

    for (code, name, category, criticality, lot, serial, expiration, sterile, warning, identifier) in
        CATALOG
    {
        let policy = db
            .catalog()
            .insert(&CatalogPolicy {
                catalog_id: String::new(),
                facility_id: facility_id.clone(),
                name: name.to_string(),
                category: *category,
                criticality: Some(*criticality),
                requires_lot_tracking: *lot,
                requires_serial_tracking: *serial,
                requires_expiration_tracking: *expiration,
                requires_sterility: *sterile,
                expiration_warning_days: *warning,
                is_active: true,
            })
            .await?;

        if let Some((identifier_type, value)) = identifier {
            db.catalog()
                .add_identifier(&facility_id, &policy.catalog_id, *identifier_type, value)
                .await?;
        }

        for n in 0..count {
            let item = generate_item(&policy, code, n, &location_ids, today);
            let received = prepare_event(
                &item,
                &NewInventoryEvent::new(
                    &item.id,
                    EventPayload::Received {
                        location_id: item.location_id.clone(),
                        sterility_status: Some(item.sterility_status),
                    },
                )
                .with_notes("Seeded"),
                None,
                &caller,
                item.created_at,
            );

            if let Err(e) = db.items().insert_with_receipt(&item, &received).await {
                eprintln!("Failed to insert {:?}: {}", item.barcode, e);
                continue;
            }
            generated += 1;
        }

        println!("  {} → {} items", name, count);
    }

    println!();
    println!("✓ Seeded {} items", generated);

    let candidates = db.items().list_risk_candidates(&facility_id).await?;
    let queue = ortrack_core::risk::compute_risk_queue(&candidates, today);
    println!("  Risk queue: {} alarms", queue.len());

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Generates one item. Every fourth item lacks its lot, every fifth its
/// expiration, so tracked fields have realistic gaps.
fn generate_item(
    policy: &CatalogPolicy,
    code: &str,
    seed: usize,
    location_ids: &[String],
    today: NaiveDate,
) -> InventoryItem {
    let now = Utc::now();

    let lot_number = (policy.requires_lot_tracking && seed % 4 != 3)
        .then(|| format!("LOT-{}-{:03}", code, seed / 3));
    let serial_number = policy
        .requires_serial_tracking
        .then(|| format!("SN-{}-{:05}", code, seed * 7 + 11));

    // Spread expirations from already expired to well in the future.
    let sterility_expires_at = (policy.expiration_required() && seed % 5 != 4)
        .then(|| today + Duration::days((seed as i64 * 37) % 200 - 10));

    let sterility_status = if policy.requires_sterility {
        SterilityStatus::Sterile
    } else {
        SterilityStatus::NonSterile
    };

    InventoryItem {
        id: Uuid::new_v4().to_string(),
        catalog_id: policy.catalog_id.clone(),
        facility_id: policy.facility_id.clone(),
        serial_number,
        lot_number,
        barcode: Some(format!("ORT-{}-{:04}", code, seed)),
        location_id: location_ids.get(seed % location_ids.len().max(1)).cloned(),
        sterility_status,
        sterility_expires_at,
        availability_status: AvailabilityStatus::Available,
        reserved_for_case_id: None,
        last_verified_at: None,
        last_verified_by_user_id: None,
        created_at: now,
        updated_at: now,
        version: 1,
    }
}
