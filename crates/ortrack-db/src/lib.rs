//! # ortrack-db: Database Layer for ORtrack
//!
//! This crate provides database access for the ORtrack engine.
//! It uses SQLite for storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        ORtrack Data Flow                                │
//! │                                                                         │
//! │  ortrack-engine service (EventService::record_event)                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     ortrack-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ EventStore    │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ ItemRepo      │    │ 001_initial_ │  │   │
//! │  │   │ WAL, FKs on   │    │ CatalogRepo   │    │   schema.sql │  │   │
//! │  │   │               │    │ DeviceRepo    │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (path from EngineConfig)                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ortrack_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("ortrack.db")).await?;
//! let item = db.items().find_by_barcode("fac-1", "BC-0001").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::catalog::CatalogRepository;
pub use repository::device::{DeviceEventRepository, DeviceRepository};
pub use repository::event::{EventStore, PendingEvent};
pub use repository::item::InventoryItemRepository;
pub use repository::reference::{LocationRepository, VendorRepository};
