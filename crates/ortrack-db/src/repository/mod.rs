//! # Repository Module
//!
//! Database repository implementations for ORtrack.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Engine service                                                        │
//! │       │                                                                 │
//! │       │  db.events().record_event(&caller, &new, financial, now)       │
//! │       ▼                                                                 │
//! │  EventStore                                                            │
//! │  ├── record_event / record_events   (only writer of item state)        │
//! │  └── list_item_events                                                  │
//! │       │                                                                 │
//! │       │  SQL (runtime-checked sqlx::query / query_as)                  │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Every method takes the caller's facility id. There is no unscoped     │
//! │  lookup to misuse.                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`InventoryItemRepository`](item::InventoryItemRepository) - Item reads, check-in insert
//! - [`EventStore`](event::EventStore) - Inventory event log and projection writes
//! - [`CatalogRepository`](catalog::CatalogRepository) - Tracking policy, GTIN lookup
//! - [`LocationRepository`](reference::LocationRepository),
//!   [`VendorRepository`](reference::VendorRepository) - Existence checks
//! - [`DeviceRepository`](device::DeviceRepository),
//!   [`DeviceEventRepository`](device::DeviceEventRepository) - Scanners and scan audit

pub mod catalog;
pub mod device;
pub mod event;
pub mod item;
pub mod reference;
