//! # Engine Configuration
//!
//! Configuration management for the ORtrack engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     ORTRACK_DB_PATH=/var/lib/ortrack/ortrack.db                        │
//! │     ORTRACK_WRITE_RETRIES=5                                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/ortrack/engine.toml (Linux)                              │
//! │     ~/Library/Application Support/com.ortrack.engine/engine.toml       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # engine.toml
//! [database]
//! path = "/var/lib/ortrack/ortrack.db"
//! max_connections = 5
//!
//! [events]
//! max_write_retries = 10
//! initial_backoff_ms = 5
//! max_backoff_ms = 250
//! max_batch_size = 500
//!
//! [scan]
//! keyboard_wedge_name = "Keyboard Wedge"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use ortrack_db::DbConfig;

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Could not determine a platform directory for {0}")]
    NoPlatformDir(&'static str),
}

// =============================================================================
// Database Settings
// =============================================================================

/// Where the store lives and how many connections it may use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Event Settings
// =============================================================================

/// Event write behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSettings {
    /// Retries after a lost optimistic-concurrency race before giving up
    /// with a Conflict. 0 disables retrying.
    #[serde(default = "default_max_write_retries")]
    pub max_write_retries: u32,

    /// Backoff before the first retry. Doubles per attempt.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Cap on the backoff between two attempts.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Largest accepted bulk batch.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_max_write_retries() -> u32 {
    10
}

fn default_initial_backoff_ms() -> u64 {
    5
}

fn default_max_backoff_ms() -> u64 {
    250
}

fn default_max_batch_size() -> usize {
    500
}

impl Default for EventSettings {
    fn default() -> Self {
        EventSettings {
            max_write_retries: default_max_write_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl EventSettings {
    /// Upper bound of the wait before retry number `attempt` (1-based):
    /// `initial_backoff_ms * 2^(attempt-1)`, capped at `max_backoff_ms`.
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(20);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

// =============================================================================
// Scan Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Name given to a facility's keyboard-wedge device when it is created.
    #[serde(default = "default_keyboard_wedge_name")]
    pub keyboard_wedge_name: String,
}

fn default_keyboard_wedge_name() -> String {
    "Keyboard Wedge".to_string()
}

impl Default for ScanSettings {
    fn default() -> Self {
        ScanSettings {
            keyboard_wedge_name: default_keyboard_wedge_name(),
        }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub events: EventSettings,

    #[serde(default)]
    pub scan: ScanSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (engine.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> Result<(), ConfigError> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(ConfigError::NoPlatformDir("config"))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.events.max_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "events.max_batch_size must be greater than 0".into(),
            ));
        }

        if self.events.initial_backoff_ms > self.events.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "events.initial_backoff_ms must not exceed events.max_backoff_ms".into(),
            ));
        }

        if self.scan.keyboard_wedge_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "scan.keyboard_wedge_name must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Applies `ORTRACK_*` overrides read through `lookup`.
    ///
    /// Unparseable numbers are ignored with a warning.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("ORTRACK_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(value) = lookup("ORTRACK_MAX_CONNECTIONS") {
            match value.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %value, "Ignoring invalid ORTRACK_MAX_CONNECTIONS"),
            }
        }

        if let Some(value) = lookup("ORTRACK_WRITE_RETRIES") {
            match value.parse::<u32>() {
                Ok(n) => self.events.max_write_retries = n,
                Err(_) => warn!(value = %value, "Ignoring invalid ORTRACK_WRITE_RETRIES"),
            }
        }

        if let Some(value) = lookup("ORTRACK_INITIAL_BACKOFF_MS") {
            match value.parse::<u64>() {
                Ok(n) => self.events.initial_backoff_ms = n,
                Err(_) => warn!(value = %value, "Ignoring invalid ORTRACK_INITIAL_BACKOFF_MS"),
            }
        }

        if let Some(value) = lookup("ORTRACK_MAX_BACKOFF_MS") {
            match value.parse::<u64>() {
                Ok(n) => self.events.max_backoff_ms = n,
                Err(_) => warn!(value = %value, "Ignoring invalid ORTRACK_MAX_BACKOFF_MS"),
            }
        }

        if let Some(value) = lookup("ORTRACK_MAX_BATCH_SIZE") {
            match value.parse::<usize>() {
                Ok(n) => self.events.max_batch_size = n,
                Err(_) => warn!(value = %value, "Ignoring invalid ORTRACK_MAX_BATCH_SIZE"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "ortrack", "engine")
            .map(|dirs| dirs.config_dir().join("engine.toml"))
    }

    /// The configured database path, or `ortrack.db` in the platform data
    /// directory (created if missing).
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.database.path {
            return Ok(path.clone());
        }

        let dirs = directories::ProjectDirs::from("com", "ortrack", "engine")
            .ok_or(ConfigError::NoPlatformDir("data"))?;
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        Ok(data_dir.join("ortrack.db"))
    }

    /// Store settings for [`ortrack_db::Database::new`].
    pub fn db_config(&self) -> Result<DbConfig, ConfigError> {
        Ok(DbConfig::new(self.database_path()?).max_connections(self.database.max_connections))
    }
}
