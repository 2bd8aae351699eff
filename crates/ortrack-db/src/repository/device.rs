//! # Device & Device Event Repositories
//!
//! Registered scanners and the audit log of raw scans.
//!
//! ## Keyboard Wedge
//! ```text
//! find_or_create_keyboard_wedge(facility)
//!      │
//!      ├── INSERT OR IGNORE  (partial unique index: one wedge per facility)
//!      │        two callers racing: one insert wins, the other is ignored
//!      ▼
//!   SELECT the facility's wedge row  ──► same Device for every caller
//! ```
//!
//! Device events are written by the scan gateway only. They reference an
//! item at most weakly and never cause an inventory event.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use ortrack_core::{Device, DeviceEvent, DeviceType, PayloadType};

const DEVICE_COLUMNS: &str = "id, facility_id, name, device_type, is_active, created_at";

const DEVICE_EVENT_COLUMNS: &str = "\
    id, facility_id, device_id, device_type, payload_type, raw_value, processed, \
    processed_item_id, processing_error, occurred_at, created_at";

#[derive(Debug, sqlx::FromRow)]
struct DeviceRow {
    id: String,
    facility_id: String,
    name: String,
    device_type: DeviceType,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<DeviceRow> for Device {
    fn from(row: DeviceRow) -> Self {
        Device {
            id: row.id,
            facility_id: row.facility_id,
            name: row.name,
            device_type: row.device_type,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DeviceEventRow {
    id: String,
    facility_id: String,
    device_id: String,
    device_type: DeviceType,
    payload_type: PayloadType,
    raw_value: String,
    processed: bool,
    processed_item_id: Option<String>,
    processing_error: Option<String>,
    occurred_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<DeviceEventRow> for DeviceEvent {
    fn from(row: DeviceEventRow) -> Self {
        DeviceEvent {
            id: row.id,
            facility_id: row.facility_id,
            device_id: row.device_id,
            device_type: row.device_type,
            payload_type: row.payload_type,
            raw_value: row.raw_value,
            processed: row.processed,
            processed_item_id: row.processed_item_id,
            processing_error: row.processing_error,
            occurred_at: row.occurred_at,
            created_at: row.created_at,
        }
    }
}

// =============================================================================
// Devices
// =============================================================================

/// Repository for registered devices.
#[derive(Debug, Clone)]
pub struct DeviceRepository {
    pool: SqlitePool,
}

impl DeviceRepository {
    /// Creates a new DeviceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DeviceRepository { pool }
    }

    /// Gets a device in the caller's facility, active or not.
    pub async fn get(&self, facility_id: &str, id: &str) -> DbResult<Option<Device>> {
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?1 AND facility_id = ?2");
        let row = sqlx::query_as::<_, DeviceRow>(&sql)
            .bind(id)
            .bind(facility_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Device::from))
    }

    /// Registers a device.
    pub async fn insert(
        &self,
        facility_id: &str,
        name: &str,
        device_type: DeviceType,
        is_active: bool,
    ) -> DbResult<Device> {
        let device = Device {
            id: Uuid::new_v4().to_string(),
            facility_id: facility_id.to_string(),
            name: name.to_string(),
            device_type,
            is_active,
            created_at: Utc::now(),
        };
        debug!(id = %device.id, facility_id, ?device_type, "Registering device");

        sqlx::query(
            "INSERT INTO devices (id, facility_id, name, device_type, is_active, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&device.id)
        .bind(&device.facility_id)
        .bind(&device.name)
        .bind(device.device_type)
        .bind(device.is_active)
        .bind(device.created_at)
        .execute(&self.pool)
        .await?;

        Ok(device)
    }

    /// Returns the facility's keyboard-wedge device, creating it on first use.
    pub async fn find_or_create_keyboard_wedge(
        &self,
        facility_id: &str,
        name: &str,
    ) -> DbResult<Device> {
        if let Some(device) = self.keyboard_wedge(facility_id).await? {
            return Ok(device);
        }

        // Two first scans can race here; the partial unique index keeps one row.
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO devices (id, facility_id, name, device_type, is_active, created_at) \
             VALUES (?1, ?2, ?3, ?4, 1, ?5)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(facility_id)
        .bind(name)
        .bind(DeviceType::KeyboardWedge)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() > 0 {
            debug!(facility_id, "Created keyboard-wedge device");
        }

        self.keyboard_wedge(facility_id)
            .await?
            .ok_or_else(|| DbError::not_found("KeyboardWedgeDevice", facility_id))
    }

    async fn keyboard_wedge(&self, facility_id: &str) -> DbResult<Option<Device>> {
        let sql = format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE facility_id = ?1 AND device_type = ?2"
        );
        let row = sqlx::query_as::<_, DeviceRow>(&sql)
            .bind(facility_id)
            .bind(DeviceType::KeyboardWedge)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Device::from))
    }
}

// =============================================================================
// Device Events
// =============================================================================

/// Repository for the raw scan audit log.
#[derive(Debug, Clone)]
pub struct DeviceEventRepository {
    pool: SqlitePool,
}

impl DeviceEventRepository {
    /// Creates a new DeviceEventRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DeviceEventRepository { pool }
    }

    /// Appends one scan audit record.
    pub async fn insert(&self, event: &DeviceEvent) -> DbResult<()> {
        debug!(
            id = %event.id,
            device_id = %event.device_id,
            processed = event.processed,
            "Recording device event"
        );

        let sql = format!(
            "INSERT INTO device_events ({DEVICE_EVENT_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        );
        sqlx::query(&sql)
            .bind(&event.id)
            .bind(&event.facility_id)
            .bind(&event.device_id)
            .bind(event.device_type)
            .bind(event.payload_type)
            .bind(&event.raw_value)
            .bind(event.processed)
            .bind(&event.processed_item_id)
            .bind(&event.processing_error)
            .bind(event.occurred_at)
            .bind(event.created_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Gets a device event in the caller's facility.
    pub async fn get(&self, facility_id: &str, id: &str) -> DbResult<Option<DeviceEvent>> {
        let sql = format!(
            "SELECT {DEVICE_EVENT_COLUMNS} FROM device_events WHERE id = ?1 AND facility_id = ?2"
        );
        let row = sqlx::query_as::<_, DeviceEventRow>(&sql)
            .bind(id)
            .bind(facility_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(DeviceEvent::from))
    }

    /// Most recent scans first.
    pub async fn list_recent(&self, facility_id: &str, limit: u32) -> DbResult<Vec<DeviceEvent>> {
        let sql = format!(
            "SELECT {DEVICE_EVENT_COLUMNS} FROM device_events WHERE facility_id = ?1 \
             ORDER BY occurred_at DESC, rowid DESC LIMIT ?2"
        );
        let rows = sqlx::query_as::<_, DeviceEventRow>(&sql)
            .bind(facility_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(DeviceEvent::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};
    use ortrack_core::DeviceType;

    #[tokio::test]
    async fn test_keyboard_wedge_created_once_per_facility() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let first = db
            .devices()
            .find_or_create_keyboard_wedge("fac-1", "Keyboard Wedge")
            .await
            .unwrap();
        let second = db
            .devices()
            .find_or_create_keyboard_wedge("fac-1", "Keyboard Wedge")
            .await
            .unwrap();
        let other = db
            .devices()
            .find_or_create_keyboard_wedge("fac-2", "Keyboard Wedge")
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_ne!(first.id, other.id);
        assert_eq!(first.device_type, DeviceType::KeyboardWedge);
    }

    #[tokio::test]
    async fn test_existing_keyboard_wedge_is_reused_without_insert() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let first = db
            .devices()
            .find_or_create_keyboard_wedge("fac-1", "Front Desk Wedge")
            .await
            .unwrap();
        for _ in 0..3 {
            let again = db
                .devices()
                .find_or_create_keyboard_wedge("fac-1", "Renamed Wedge")
                .await
                .unwrap();
            assert_eq!(again.id, first.id);
            assert_eq!(again.name, "Front Desk Wedge");
        }

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM devices WHERE facility_id = 'fac-1'",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_device_lookup_is_facility_scoped() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let device = db
            .devices()
            .insert("fac-1", "Zebra DS8178", DeviceType::BarcodeScanner, true)
            .await
            .unwrap();

        assert!(db.devices().get("fac-1", &device.id).await.unwrap().is_some());
        assert!(db.devices().get("fac-2", &device.id).await.unwrap().is_none());
    }
}
