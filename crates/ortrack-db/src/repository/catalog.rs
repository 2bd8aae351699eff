//! # Catalog Repository
//!
//! Read access to catalog tracking policy, plus the minimal writes used by
//! seeding and tests.
//!
//! ## GTIN Suggestion Lookup
//! ```text
//! parsed GTIN-14  00614141999996
//!      │
//!      ├── GTIN  identifier = "00614141999996"   ┐
//!      ├── GTIN-13 form     = "0614141999996"    ├── any active catalog entry
//!      └── GTIN-12 (UPC-A)  = "614141999996"     ┘   in the caller's facility
//!                                                   GTIN rows win over UPC rows
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use ortrack_core::{
    CatalogIdentifier, CatalogMatch, CatalogPolicy, Criticality, IdentifierType, ItemCategory,
};

/// Catalog columns, prefixed so they can sit next to item columns in joins.
pub(crate) const CATALOG_COLUMNS: &str = "\
    c.id AS cat_id, c.facility_id AS cat_facility_id, c.name AS cat_name, \
    c.category AS cat_category, c.criticality AS cat_criticality, \
    c.requires_lot_tracking AS cat_requires_lot_tracking, \
    c.requires_serial_tracking AS cat_requires_serial_tracking, \
    c.requires_expiration_tracking AS cat_requires_expiration_tracking, \
    c.requires_sterility AS cat_requires_sterility, \
    c.expiration_warning_days AS cat_expiration_warning_days, \
    c.is_active AS cat_is_active";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CatalogRow {
    cat_id: String,
    cat_facility_id: String,
    cat_name: String,
    cat_category: ItemCategory,
    cat_criticality: Option<String>,
    cat_requires_lot_tracking: bool,
    cat_requires_serial_tracking: bool,
    cat_requires_expiration_tracking: bool,
    cat_requires_sterility: bool,
    cat_expiration_warning_days: Option<i64>,
    cat_is_active: bool,
}

impl From<CatalogRow> for CatalogPolicy {
    fn from(row: CatalogRow) -> Self {
        CatalogPolicy {
            catalog_id: row.cat_id,
            facility_id: row.cat_facility_id,
            name: row.cat_name,
            category: row.cat_category,
            criticality: row.cat_criticality.as_deref().and_then(Criticality::parse),
            requires_lot_tracking: row.cat_requires_lot_tracking,
            requires_serial_tracking: row.cat_requires_serial_tracking,
            requires_expiration_tracking: row.cat_requires_expiration_tracking,
            requires_sterility: row.cat_requires_sterility,
            expiration_warning_days: row.cat_expiration_warning_days,
            is_active: row.cat_is_active,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MatchRow {
    catalog_id: String,
    catalog_name: String,
    raw_value: String,
}

/// Repository for catalog policy and identifiers.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Gets the tracking policy of a catalog entry in the caller's facility.
    pub async fn get(&self, facility_id: &str, catalog_id: &str) -> DbResult<Option<CatalogPolicy>> {
        let sql = format!(
            "SELECT {CATALOG_COLUMNS} FROM catalog_items c WHERE c.id = ?1 AND c.facility_id = ?2"
        );
        let row = sqlx::query_as::<_, CatalogRow>(&sql)
            .bind(catalog_id)
            .bind(facility_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(CatalogPolicy::from))
    }

    /// Inserts a catalog entry. An empty `catalog_id` gets a generated id.
    pub async fn insert(&self, policy: &CatalogPolicy) -> DbResult<CatalogPolicy> {
        let mut policy = policy.clone();
        if policy.catalog_id.is_empty() {
            policy.catalog_id = Uuid::new_v4().to_string();
        }

        debug!(
            id = %policy.catalog_id,
            facility_id = %policy.facility_id,
            name = %policy.name,
            "Inserting catalog entry"
        );

        sqlx::query(
            r#"
            INSERT INTO catalog_items (
                id, facility_id, name, category, criticality,
                requires_lot_tracking, requires_serial_tracking,
                requires_expiration_tracking, requires_sterility,
                expiration_warning_days, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&policy.catalog_id)
        .bind(&policy.facility_id)
        .bind(&policy.name)
        .bind(policy.category)
        .bind(policy.criticality.map(|c| c.as_str()))
        .bind(policy.requires_lot_tracking)
        .bind(policy.requires_serial_tracking)
        .bind(policy.requires_expiration_tracking)
        .bind(policy.requires_sterility)
        .bind(policy.expiration_warning_days)
        .bind(policy.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(policy)
    }

    /// Attaches an external identifier to a catalog entry.
    pub async fn add_identifier(
        &self,
        facility_id: &str,
        catalog_id: &str,
        identifier_type: IdentifierType,
        raw_value: &str,
    ) -> DbResult<CatalogIdentifier> {
        let identifier = CatalogIdentifier {
            id: Uuid::new_v4().to_string(),
            facility_id: facility_id.to_string(),
            catalog_id: catalog_id.to_string(),
            identifier_type,
            raw_value: raw_value.trim().to_string(),
        };

        sqlx::query(
            r#"
            INSERT INTO catalog_identifiers (
                id, facility_id, catalog_id, identifier_type, raw_value, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&identifier.id)
        .bind(&identifier.facility_id)
        .bind(&identifier.catalog_id)
        .bind(identifier.identifier_type)
        .bind(&identifier.raw_value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(identifier)
    }

    /// Finds the active catalog entry a parsed GTIN belongs to.
    pub async fn find_by_gtin(&self, facility_id: &str, gtin: &str) -> DbResult<Option<CatalogMatch>> {
        let forms = gtin_forms(gtin);
        debug!(facility_id, gtin, forms = forms.len(), "Looking up catalog by GTIN");

        let placeholders = (0..forms.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r#"
            SELECT c.id AS catalog_id, c.name AS catalog_name, ci.raw_value
            FROM catalog_identifiers ci
            JOIN catalog_items c ON c.id = ci.catalog_id AND c.facility_id = ci.facility_id
            WHERE ci.facility_id = ?1
              AND ci.identifier_type IN ('GTIN', 'UPC')
              AND ci.raw_value IN ({placeholders})
              AND c.is_active = 1
            ORDER BY CASE ci.identifier_type WHEN 'GTIN' THEN 0 ELSE 1 END, c.name
            LIMIT 1
            "#
        );

        let mut query = sqlx::query_as::<_, MatchRow>(&sql).bind(facility_id);
        for form in &forms {
            query = query.bind(form);
        }
        let row = query.fetch_optional(&self.pool).await?;

        Ok(row.map(|r| CatalogMatch {
            catalog_id: r.catalog_id,
            catalog_name: r.catalog_name,
            identifier: r.raw_value,
        }))
    }
}

/// The GTIN itself plus its shorter zero-stripped forms (GTIN-13, GTIN-12).
fn gtin_forms(gtin: &str) -> Vec<String> {
    let mut forms = vec![gtin.to_string()];
    let mut rest = gtin;
    while rest.len() > 12 {
        match rest.strip_prefix('0') {
            Some(shorter) => {
                forms.push(shorter.to_string());
                rest = shorter;
            }
            None => break,
        }
    }
    forms
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    fn policy(facility_id: &str, name: &str) -> CatalogPolicy {
        CatalogPolicy {
            catalog_id: String::new(),
            facility_id: facility_id.to_string(),
            name: name.to_string(),
            category: ItemCategory::Implant,
            criticality: Some(Criticality::Critical),
            requires_lot_tracking: true,
            requires_serial_tracking: false,
            requires_expiration_tracking: false,
            requires_sterility: true,
            expiration_warning_days: None,
            is_active: true,
        }
    }

    #[test]
    fn test_gtin_forms() {
        assert_eq!(
            gtin_forms("00614141999996"),
            vec!["00614141999996", "0614141999996", "614141999996"]
        );
        assert_eq!(gtin_forms("10303512345674"), vec!["10303512345674"]);
    }

    #[tokio::test]
    async fn test_insert_and_get_policy() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let created = db.catalog().insert(&policy("fac-1", "Hip Stem")).await.unwrap();

        let loaded = db.catalog().get("fac-1", &created.catalog_id).await.unwrap().unwrap();
        assert_eq!(loaded, created);
        assert!(db.catalog().get("fac-2", &created.catalog_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unrecognized_criticality_reads_as_none() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let created = db.catalog().insert(&policy("fac-1", "Mesh")).await.unwrap();

        sqlx::query("UPDATE catalog_items SET criticality = 'SEVERE' WHERE id = ?1")
            .bind(&created.catalog_id)
            .execute(db.pool())
            .await
            .unwrap();

        let loaded = db.catalog().get("fac-1", &created.catalog_id).await.unwrap().unwrap();
        assert_eq!(loaded.criticality, None);
    }

    #[tokio::test]
    async fn test_find_by_gtin_matches_upc_form() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let created = db.catalog().insert(&policy("fac-1", "Bone Screw")).await.unwrap();
        db.catalog()
            .add_identifier("fac-1", &created.catalog_id, IdentifierType::Upc, "614141999996")
            .await
            .unwrap();

        let found = db
            .catalog()
            .find_by_gtin("fac-1", "00614141999996")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.catalog_id, created.catalog_id);
        assert_eq!(found.identifier, "614141999996");

        assert!(db
            .catalog()
            .find_by_gtin("fac-2", "00614141999996")
            .await
            .unwrap()
            .is_none());
    }
}
