//! # ortrack-core: Pure Inventory Domain Logic
//!
//! This crate is the **heart** of the ORtrack inventory truth-state engine.
//! Everything here is a pure function over plain data: no database, no
//! network, no implicit clock.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       ORtrack Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 ortrack-engine (services)                       │   │
//! │  │   DeviceScanGateway   CheckInService   EventService   Risk     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ ortrack-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │  ┌─────────┐ ┌───────────┐ ┌────────────┐ ┌────────┐ ┌──────┐ │   │
//! │  │  │  gs1    │ │ projector │ │ validation │ │  risk  │ │types │ │   │
//! │  │  │ decode  │ │ apply     │ │ check-in   │ │ rules  │ │items │ │   │
//! │  │  │ classify│ │ replay    │ │ financial  │ │ sort   │ │events│ │   │
//! │  │  └─────────┘ └───────────┘ └────────────┘ └────────┘ └──────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 ortrack-db (Database Layer)                     │   │
//! │  │         SQLite, migrations, repositories, event store           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Items, catalog policy, devices, locations, vendors
//! - [`events`] - Inventory events (tagged payload), device events, financials
//! - [`gs1`] - Barcode classification and GS1 element string parsing
//! - [`projector`] - The event → item state machine
//! - [`validation`] - Check-in and financial attribution rules
//! - [`risk`] - Risk/alarm derivation and ordering
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use ortrack_core::gs1::{decode, Symbology};
//!
//! let scan = decode("(01)00884426070010(17)270331(10)LOT42");
//! assert_eq!(scan.classification, Symbology::Gs1DataMatrix);
//!
//! let parsed = scan.parsed.unwrap();
//! assert_eq!(parsed.gtin.as_deref(), Some("00884426070010"));
//! assert_eq!(parsed.lot.as_deref(), Some("LOT42"));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod events;
pub mod gs1;
pub mod projector;
pub mod risk;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, EventRejection, ValidationError};
pub use events::*;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Reserved device id for the virtual "keyboard wedge" scanner.
///
/// Scanners that type into a focused text field have no registered device
/// row. Callers pass this id and the scan gateway resolves it to the
/// facility's keyboard-wedge device, creating it on first use.
pub const KEYBOARD_WEDGE_DEVICE_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Maximum length of a raw scan we will analyse as a linear barcode.
pub const MAX_LINEAR_BARCODE_LEN: usize = 80;
