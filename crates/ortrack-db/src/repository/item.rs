//! # Inventory Item Repository
//!
//! Reads of the item projection, and the one insert that creates an item.
//!
//! ## Who Writes `inventory_items`
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  insert_with_receipt()   INSERT item + RECEIVED event   (check-in)     │
//! │  write_projection()      UPDATE ... WHERE version = ?   (event store)  │
//! │                                                                         │
//! │  Nothing else. Both run inside a transaction that also appends the    │
//! │  inventory event, so the row never drifts from the log.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All lookups take the caller's `facility_id`. An item in another facility
//! is indistinguishable from a missing one.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::catalog::{CatalogRow, CATALOG_COLUMNS};
use crate::repository::event::insert_event;
use ortrack_core::risk::RiskCandidate;
use ortrack_core::{
    AvailabilityStatus, InventoryEvent, InventoryItem, ItemCategory, ItemDetail, SterilityStatus,
};

pub(crate) const ITEM_COLUMNS: &str = "\
    i.id, i.catalog_id, i.facility_id, i.serial_number, i.lot_number, i.barcode, \
    i.location_id, i.sterility_status, i.sterility_expires_at, i.availability_status, \
    i.reserved_for_case_id, i.last_verified_at, i.last_verified_by_user_id, \
    i.created_at, i.updated_at, i.version";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ItemRow {
    id: String,
    catalog_id: String,
    facility_id: String,
    serial_number: Option<String>,
    lot_number: Option<String>,
    barcode: Option<String>,
    location_id: Option<String>,
    sterility_status: SterilityStatus,
    sterility_expires_at: Option<chrono::NaiveDate>,
    availability_status: AvailabilityStatus,
    reserved_for_case_id: Option<String>,
    last_verified_at: Option<chrono::DateTime<chrono::Utc>>,
    last_verified_by_user_id: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    version: i64,
}

impl From<ItemRow> for InventoryItem {
    fn from(row: ItemRow) -> Self {
        InventoryItem {
            id: row.id,
            catalog_id: row.catalog_id,
            facility_id: row.facility_id,
            serial_number: row.serial_number,
            lot_number: row.lot_number,
            barcode: row.barcode,
            location_id: row.location_id,
            sterility_status: row.sterility_status,
            sterility_expires_at: row.sterility_expires_at,
            availability_status: row.availability_status,
            reserved_for_case_id: row.reserved_for_case_id,
            last_verified_at: row.last_verified_at,
            last_verified_by_user_id: row.last_verified_by_user_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DetailRow {
    #[sqlx(flatten)]
    item: ItemRow,
    catalog_name: String,
    catalog_category: ItemCategory,
    location_name: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct CandidateRow {
    #[sqlx(flatten)]
    item: ItemRow,
    #[sqlx(flatten)]
    catalog: CatalogRow,
}

// =============================================================================
// Transaction Helpers
// =============================================================================

/// Reads one item on the given connection (usually a transaction).
pub(crate) async fn fetch_scoped(
    conn: &mut SqliteConnection,
    facility_id: &str,
    id: &str,
) -> DbResult<Option<InventoryItem>> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM inventory_items i WHERE i.id = ?1 AND i.facility_id = ?2"
    );
    let row = sqlx::query_as::<_, ItemRow>(&sql)
        .bind(id)
        .bind(facility_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(InventoryItem::from))
}

/// Reads every listed item in one statement. Absent ids are simply missing
/// from the result.
pub(crate) async fn fetch_many(
    conn: &mut SqliteConnection,
    facility_id: &str,
    ids: &[String],
) -> DbResult<Vec<InventoryItem>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = (0..ids.len())
        .map(|i| format!("?{}", i + 2))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM inventory_items i \
         WHERE i.facility_id = ?1 AND i.id IN ({placeholders})"
    );

    let mut query = sqlx::query_as::<_, ItemRow>(&sql).bind(facility_id);
    for id in ids {
        query = query.bind(id);
    }
    let rows = query.fetch_all(&mut *conn).await?;

    Ok(rows.into_iter().map(InventoryItem::from).collect())
}

/// Writes the projected mutable fields of `item`.
///
/// Guarded by `item.version`: if another writer got there first no row
/// matches and [`DbError::StaleWrite`] is returned.
///
/// ## Returns
/// The new version.
pub(crate) async fn write_projection(
    conn: &mut SqliteConnection,
    item: &InventoryItem,
) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        UPDATE inventory_items SET
            location_id = ?3,
            sterility_status = ?4,
            availability_status = ?5,
            reserved_for_case_id = ?6,
            last_verified_at = ?7,
            last_verified_by_user_id = ?8,
            updated_at = ?9,
            version = version + 1
        WHERE id = ?1 AND facility_id = ?2 AND version = ?10
        "#,
    )
    .bind(&item.id)
    .bind(&item.facility_id)
    .bind(&item.location_id)
    .bind(item.sterility_status)
    .bind(item.availability_status)
    .bind(&item.reserved_for_case_id)
    .bind(item.last_verified_at)
    .bind(&item.last_verified_by_user_id)
    .bind(item.updated_at)
    .bind(item.version)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::StaleWrite {
            entity: "InventoryItem".to_string(),
            id: item.id.clone(),
            expected: item.version,
        });
    }

    Ok(item.version + 1)
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the inventory item projection.
#[derive(Debug, Clone)]
pub struct InventoryItemRepository {
    pool: SqlitePool,
}

impl InventoryItemRepository {
    /// Creates a new InventoryItemRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryItemRepository { pool }
    }

    /// Gets an item in the caller's facility.
    pub async fn get(&self, facility_id: &str, id: &str) -> DbResult<Option<InventoryItem>> {
        let mut conn = self.pool.acquire().await?;
        fetch_scoped(&mut conn, facility_id, id).await
    }

    /// Exact barcode match.
    pub async fn find_by_barcode(
        &self,
        facility_id: &str,
        barcode: &str,
    ) -> DbResult<Option<InventoryItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items i WHERE i.facility_id = ?1 AND i.barcode = ?2"
        );
        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(facility_id)
            .bind(barcode)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(InventoryItem::from))
    }

    /// Exact serial number match. The oldest item wins if serials repeat
    /// across catalog entries.
    pub async fn find_by_serial(
        &self,
        facility_id: &str,
        serial_number: &str,
    ) -> DbResult<Option<InventoryItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items i \
             WHERE i.facility_id = ?1 AND i.serial_number = ?2 \
             ORDER BY i.created_at, i.id LIMIT 1"
        );
        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(facility_id)
            .bind(serial_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(InventoryItem::from))
    }

    /// Resolves a raw value to an item: barcode first, then serial number.
    pub async fn find_candidate(
        &self,
        facility_id: &str,
        raw_value: &str,
    ) -> DbResult<Option<InventoryItem>> {
        if let Some(item) = self.find_by_barcode(facility_id, raw_value).await? {
            return Ok(Some(item));
        }
        self.find_by_serial(facility_id, raw_value).await
    }

    /// Item with catalog name, category and location name.
    pub async fn detail(&self, facility_id: &str, id: &str) -> DbResult<Option<ItemDetail>> {
        let sql = format!(
            r#"
            SELECT {ITEM_COLUMNS},
                   c.name AS catalog_name,
                   c.category AS catalog_category,
                   l.name AS location_name
            FROM inventory_items i
            JOIN catalog_items c ON c.id = i.catalog_id AND c.facility_id = i.facility_id
            LEFT JOIN locations l ON l.id = i.location_id AND l.facility_id = i.facility_id
            WHERE i.id = ?1 AND i.facility_id = ?2
            "#
        );
        let row = sqlx::query_as::<_, DetailRow>(&sql)
            .bind(id)
            .bind(facility_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| ItemDetail {
            item: r.item.into(),
            catalog_name: r.catalog_name,
            category: r.catalog_category,
            location_name: r.location_name,
        }))
    }

    /// Every active item with an active catalog entry, paired with its policy.
    ///
    /// One statement, so the risk queue sees a single consistent snapshot.
    pub async fn list_risk_candidates(&self, facility_id: &str) -> DbResult<Vec<RiskCandidate>> {
        let sql = format!(
            r#"
            SELECT {ITEM_COLUMNS}, {CATALOG_COLUMNS}
            FROM inventory_items i
            JOIN catalog_items c ON c.id = i.catalog_id AND c.facility_id = i.facility_id
            WHERE i.facility_id = ?1
              AND i.availability_status NOT IN ('UNAVAILABLE', 'MISSING')
              AND c.is_active = 1
            ORDER BY i.created_at, i.id
            "#
        );
        let rows = sqlx::query_as::<_, CandidateRow>(&sql)
            .bind(facility_id)
            .fetch_all(&self.pool)
            .await?;

        debug!(facility_id, count = rows.len(), "Loaded risk candidates");

        Ok(rows
            .into_iter()
            .map(|r| RiskCandidate {
                item: r.item.into(),
                catalog: r.catalog.into(),
            })
            .collect())
    }

    /// Returns the ids from `ids` with no item in the facility, deduplicated
    /// and in input order.
    pub async fn missing_ids(&self, facility_id: &str, ids: &[String]) -> DbResult<Vec<String>> {
        let mut unique: Vec<String> = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(id) {
                unique.push(id.clone());
            }
        }

        let mut conn = self.pool.acquire().await?;
        let found = fetch_many(&mut conn, facility_id, &unique).await?;

        Ok(unique
            .into_iter()
            .filter(|id| !found.iter().any(|item| &item.id == id))
            .collect())
    }

    /// Number of items in a facility.
    pub async fn count(&self, facility_id: &str) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM inventory_items WHERE facility_id = ?1")
                .bind(facility_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Creates an item together with its RECEIVED event, atomically.
    ///
    /// ## Errors
    /// * `UniqueViolation` - barcode already used in the facility
    /// * `ForeignKeyViolation` - catalog or location row is missing
    pub async fn insert_with_receipt(
        &self,
        item: &InventoryItem,
        received: &InventoryEvent,
    ) -> DbResult<()> {
        debug!(
            id = %item.id,
            facility_id = %item.facility_id,
            catalog_id = %item.catalog_id,
            "Checking in inventory item"
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO inventory_items (
                id, catalog_id, facility_id,
                serial_number, lot_number, barcode, location_id,
                sterility_status, sterility_expires_at,
                availability_status, reserved_for_case_id,
                last_verified_at, last_verified_by_user_id,
                created_at, updated_at, version
            ) VALUES (
                ?1, ?2, ?3,
                ?4, ?5, ?6, ?7,
                ?8, ?9,
                ?10, ?11,
                ?12, ?13,
                ?14, ?15, ?16
            )
            "#,
        )
        .bind(&item.id)
        .bind(&item.catalog_id)
        .bind(&item.facility_id)
        .bind(&item.serial_number)
        .bind(&item.lot_number)
        .bind(&item.barcode)
        .bind(&item.location_id)
        .bind(item.sterility_status)
        .bind(item.sterility_expires_at)
        .bind(item.availability_status)
        .bind(&item.reserved_for_case_id)
        .bind(item.last_verified_at)
        .bind(&item.last_verified_by_user_id)
        .bind(item.created_at)
        .bind(item.updated_at)
        .bind(item.version)
        .execute(&mut *tx)
        .await?;

        insert_event(&mut tx, received).await?;

        tx.commit().await?;
        Ok(())
    }
}
