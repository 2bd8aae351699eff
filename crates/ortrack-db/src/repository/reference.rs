//! # Location & Vendor Repositories
//!
//! Minimal insert/lookup for reference data owned by collaborators.
//! The engine only asks two questions: does it exist in this facility, and
//! is it active.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use ortrack_core::{Location, Vendor};

/// Columns shared by `locations` and `vendors`.
const REFERENCE_COLUMNS: &str = "id, facility_id, name, is_active";

#[derive(Debug, sqlx::FromRow)]
struct ReferenceRow {
    id: String,
    facility_id: String,
    name: String,
    is_active: bool,
}

impl From<ReferenceRow> for Location {
    fn from(row: ReferenceRow) -> Self {
        Location {
            id: row.id,
            facility_id: row.facility_id,
            name: row.name,
            is_active: row.is_active,
        }
    }
}

impl From<ReferenceRow> for Vendor {
    fn from(row: ReferenceRow) -> Self {
        Vendor {
            id: row.id,
            facility_id: row.facility_id,
            name: row.name,
            is_active: row.is_active,
        }
    }
}

async fn get_scoped(
    pool: &SqlitePool,
    table: &str,
    facility_id: &str,
    id: &str,
) -> DbResult<Option<ReferenceRow>> {
    let sql = format!("SELECT {REFERENCE_COLUMNS} FROM {table} WHERE id = ?1 AND facility_id = ?2");
    let row = sqlx::query_as::<_, ReferenceRow>(&sql)
        .bind(id)
        .bind(facility_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

async fn insert(
    pool: &SqlitePool,
    table: &str,
    facility_id: &str,
    name: &str,
    is_active: bool,
) -> DbResult<ReferenceRow> {
    let row = ReferenceRow {
        id: Uuid::new_v4().to_string(),
        facility_id: facility_id.to_string(),
        name: name.to_string(),
        is_active,
    };
    debug!(table, id = %row.id, facility_id, "Inserting reference row");

    let sql = format!(
        "INSERT INTO {table} (id, facility_id, name, is_active, created_at) VALUES (?1, ?2, ?3, ?4, ?5)"
    );
    sqlx::query(&sql)
        .bind(&row.id)
        .bind(&row.facility_id)
        .bind(&row.name)
        .bind(row.is_active)
        .bind(Utc::now())
        .execute(pool)
        .await?;

    Ok(row)
}

// =============================================================================
// Locations
// =============================================================================

/// Repository for storage locations.
#[derive(Debug, Clone)]
pub struct LocationRepository {
    pool: SqlitePool,
}

impl LocationRepository {
    /// Creates a new LocationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LocationRepository { pool }
    }

    /// Gets a location in the caller's facility.
    pub async fn get(&self, facility_id: &str, id: &str) -> DbResult<Option<Location>> {
        Ok(get_scoped(&self.pool, "locations", facility_id, id)
            .await?
            .map(Location::from))
    }

    /// Creates a location.
    pub async fn insert(&self, facility_id: &str, name: &str) -> DbResult<Location> {
        Ok(insert(&self.pool, "locations", facility_id, name, true)
            .await?
            .into())
    }
}

// =============================================================================
// Vendors
// =============================================================================

/// Repository for vendors.
#[derive(Debug, Clone)]
pub struct VendorRepository {
    pool: SqlitePool,
}

impl VendorRepository {
    /// Creates a new VendorRepository.
    pub fn new(pool: SqlitePool) -> Self {
        VendorRepository { pool }
    }

    /// Gets a vendor in the caller's facility, active or not.
    pub async fn get(&self, facility_id: &str, id: &str) -> DbResult<Option<Vendor>> {
        Ok(get_scoped(&self.pool, "vendors", facility_id, id)
            .await?
            .map(Vendor::from))
    }

    /// Creates a vendor.
    pub async fn insert(&self, facility_id: &str, name: &str, is_active: bool) -> DbResult<Vendor> {
        Ok(insert(&self.pool, "vendors", facility_id, name, is_active)
            .await?
            .into())
    }
}
