//! # ortrack-engine: Services for ORtrack
//!
//! Wires the store into the operations callers use: recording events,
//! checking items in, handling scans and computing the risk queue.
//!
//! ## Module Organization
//! ```text
//! ortrack_engine/
//! ├── lib.rs          ◄─── You are here (Engine facade, tracing setup)
//! ├── config.rs       ◄─── EngineConfig (TOML + ORTRACK_* env)
//! ├── error.rs        ◄─── EngineError, ErrorCode, ApiError
//! ├── events.rs       ◄─── EventService (the only write path for state)
//! ├── checkin.rs      ◄─── CheckInService
//! ├── scan.rs         ◄─── DeviceScanGateway (never writes inventory events)
//! └── risk.rs         ◄─── RiskService
//! ```
//!
//! ## Service Wiring
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Constructor Injection                                │
//! │                                                                         │
//! │  Engine { db: Database, config: EngineConfig }                         │
//! │     │                                                                   │
//! │     ├── events()   ─► EventService(events, items, locations, vendors)  │
//! │     ├── check_in() ─► CheckInService(catalog, items, locations)        │
//! │     ├── scans()    ─► DeviceScanGateway(devices, items, catalog,       │
//! │     │                                   device_events)                  │
//! │     └── risk()     ─► RiskService(items)                               │
//! │                                                                         │
//! │  Each service receives only the repositories it needs. Services are    │
//! │  cheap to build (they hold pool handles) so accessors build per call.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use ortrack_engine::{Engine, EngineConfig};
//!
//! ortrack_engine::init_tracing();
//! let engine = Engine::open(EngineConfig::load(None)?).await?;
//! let queue = engine.risk().compute_risk_queue_today(&caller).await?;
//! ```

pub mod checkin;
pub mod config;
pub mod error;
pub mod events;
pub mod risk;
pub mod scan;

use tracing::info;
use tracing_subscriber::EnvFilter;

pub use checkin::CheckInService;
pub use config::{ConfigError, EngineConfig};
pub use error::{ApiError, EngineError, EngineResult, ErrorCode};
pub use events::{EventService, RecordedEvent};
pub use risk::RiskService;
pub use scan::{DeviceEventResult, DeviceScanGateway, ScanInput};

use ortrack_db::Database;

/// Entry point holding the store and configuration.
#[derive(Debug, Clone)]
pub struct Engine {
    db: Database,
    config: EngineConfig,
}

impl Engine {
    /// Wraps an already opened database.
    pub fn new(db: Database, config: EngineConfig) -> Self {
        Engine { db, config }
    }

    /// Opens the configured database (running migrations) and builds the
    /// engine around it.
    pub async fn open(config: EngineConfig) -> EngineResult<Self> {
        let db_config = config.db_config()?;
        info!(path = %db_config.database_path.display(), "Opening ORtrack engine");
        let db = Database::new(db_config).await?;
        Ok(Engine::new(db, config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying store, for collaborators that own reference data
    /// (catalog, locations, vendors, devices).
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Event recording and item history.
    pub fn events(&self) -> EventService {
        EventService::new(
            self.db.events(),
            self.db.items(),
            self.db.locations(),
            self.db.vendors(),
            self.config.events.clone(),
        )
    }

    /// Item check-in at receiving.
    pub fn check_in(&self) -> CheckInService {
        CheckInService::new(
            self.db.catalog(),
            self.db.items(),
            self.db.locations(),
            self.config.events.clone(),
        )
    }

    /// The scan gateway. Built without the event store.
    pub fn scans(&self) -> DeviceScanGateway {
        DeviceScanGateway::new(
            self.db.devices(),
            self.db.items(),
            self.db.catalog(),
            self.db.device_events(),
            self.config.scan.clone(),
        )
    }

    /// Risk queue computation.
    pub fn risk(&self) -> RiskService {
        RiskService::new(self.db.items())
    }
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=ortrack_db=trace` - Show trace for the store only
/// - Default: `info,ortrack=debug,sqlx=warn`
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ortrack=debug,sqlx=warn"));

    // A second call (tests, embedding apps) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}

// =============================================================================
// Test Fixture
// =============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use chrono::NaiveDate;
    use std::path::Path;

    use crate::{Engine, EngineConfig};
    use ortrack_core::validation::CheckInRequest;
    use ortrack_core::{
        Caller, CatalogPolicy, Criticality, IdentifierType, InventoryItem, ItemCategory,
        SterilityStatus,
    };
    use ortrack_db::{Database, DbConfig};

    pub const HIP_STEM_GTIN: &str = "00884426070010";

    /// One facility with a tracked implant, a location, a vendor and two
    /// checked-in items.
    pub struct Fixture {
        pub engine: Engine,
        pub config: EngineConfig,
        pub caller: Caller,
        pub catalog_id: String,
        pub location_id: String,
        pub vendor_id: String,
        /// Barcode `BC-0001`, serial `SN-0001`.
        pub item_a: InventoryItem,
        /// Barcode `BC-0002`, serial `SN-0002`.
        pub item_b: InventoryItem,
    }

    pub async fn engine_with(config: EngineConfig) -> Engine {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        Engine::new(db, config)
    }

    /// A CRITICAL implant tracked by lot, serial and expiration.
    pub async fn hip_stem_policy(engine: &Engine, facility_id: &str) -> CatalogPolicy {
        engine
            .database()
            .catalog()
            .insert(&CatalogPolicy {
                catalog_id: String::new(),
                facility_id: facility_id.to_string(),
                name: "Cemented Hip Stem".to_string(),
                category: ItemCategory::Implant,
                criticality: Some(Criticality::Critical),
                requires_lot_tracking: true,
                requires_serial_tracking: true,
                requires_expiration_tracking: true,
                requires_sterility: true,
                expiration_warning_days: None,
                is_active: true,
            })
            .await
            .unwrap()
    }

    pub async fn fixture() -> Fixture {
        let config = EngineConfig::default();
        let engine = engine_with(config.clone()).await;
        seed(engine, config).await
    }

    /// Same data as [`fixture`] in an on-disk store under `dir`, with enough
    /// pooled connections for concurrent writers.
    pub async fn file_fixture(dir: &Path) -> Fixture {
        std::fs::create_dir_all(dir).unwrap();
        let mut config = EngineConfig::default();
        config.database.path = Some(dir.join("engine.db"));
        config.database.max_connections = 10;

        let engine = Engine::open(config.clone()).await.unwrap();
        seed(engine, config).await
    }

    async fn seed(engine: Engine, config: EngineConfig) -> Fixture {
        let caller = Caller::new("user-1", "fac-1");

        let policy = hip_stem_policy(&engine, &caller.facility_id).await;
        engine
            .database()
            .catalog()
            .add_identifier(
                &caller.facility_id,
                &policy.catalog_id,
                IdentifierType::Gtin,
                HIP_STEM_GTIN,
            )
            .await
            .unwrap();
        let location = engine
            .database()
            .locations()
            .insert(&caller.facility_id, "Sterile Core A")
            .await
            .unwrap();
        let vendor = engine
            .database()
            .vendors()
            .insert(&caller.facility_id, "Acme Orthopedics", true)
            .await
            .unwrap();

        let mut items = Vec::new();
        for n in 1..=2 {
            let recorded = engine
                .check_in()
                .check_in(
                    &caller,
                    &CheckInRequest {
                        catalog_id: policy.catalog_id.clone(),
                        barcode: Some(format!("BC-000{n}")),
                        serial_number: Some(format!("SN-000{n}")),
                        lot_number: Some("LOT-A".to_string()),
                        location_id: Some(location.id.clone()),
                        sterility_status: Some(SterilityStatus::Sterile),
                        sterility_expires_at: NaiveDate::from_ymd_opt(2026, 12, 1),
                        notes: None,
                    },
                )
                .await
                .unwrap();
            items.push(recorded.item);
        }
        let item_b = items.pop().unwrap();
        let item_a = items.pop().unwrap();

        Fixture {
            engine,
            config,
            caller,
            catalog_id: policy.catalog_id,
            location_id: location.id,
            vendor_id: vendor.id,
            item_a,
            item_b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture, Fixture};
    use ortrack_core::{EventPayload, NewInventoryEvent};

    #[tokio::test]
    async fn test_scan_gateway_and_event_service_share_state() {
        let Fixture {
            engine, caller, item_a, ..
        } = fixture().await;
        init_tracing();

        let scanned = engine
            .scans()
            .handle_scan(&caller, &ScanInput::keyboard_wedge("BC-0001"))
            .await
            .unwrap();
        let candidate = scanned.candidate.unwrap();
        assert_eq!(candidate.item.id, item_a.id);

        // The caller, not the gateway, decides to record a verification.
        let mut verify = NewInventoryEvent::new(&candidate.item.id, EventPayload::Verified);
        verify.device_event_id = Some(scanned.device_event_id.clone());
        let recorded = engine.events().record_event(&caller, verify).await.unwrap();

        assert_eq!(recorded.item.last_verified_by_user_id.as_deref(), Some("user-1"));
        assert_eq!(
            recorded.event.device_event_id.as_deref(),
            Some(scanned.device_event_id.as_str())
        );
    }

    #[tokio::test]
    async fn test_open_uses_configured_path() {
        let dir = std::env::temp_dir().join(format!("ortrack-engine-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut config = EngineConfig::default();
        config.database.path = Some(dir.join("engine.db"));
        config.database.max_connections = 2;

        let engine = Engine::open(config).await.unwrap();
        assert!(engine.database().health_check().await);
        assert!(dir.join("engine.db").exists());

        engine.database().close().await;
        let _ = std::fs::remove_dir_all(&dir);
    }
}
