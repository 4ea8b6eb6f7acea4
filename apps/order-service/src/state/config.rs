//! # Configuration State
//!
//! Service configuration loaded once at startup.
//!
//! ## Configuration Sources (later overrides earlier)
//! 1. Defaults (this file)
//! 2. Config file (path in `KOPI_CONFIG`, TOML)
//! 3. Environment variables (`KOPI_*`)
//!
//! ## Example Config File
//! ```toml
//! database_path = "/var/lib/kopi/kopi.db"
//! max_connections = 8
//! tax_bps = 1100
//! pickup_lead_minutes = 20
//! delivery_fee = 10000
//! utc_offset_hours = 7
//! notification_queue = 256
//! ```
//!
//! Read-only after initialization, so commands share it by reference.

use chrono::{Duration, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use kopi_core::order_number::utc_offset;
use kopi_core::{Money, TaxRate, PICKUP_LEAD_MINUTES};

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {0}")]
    InvalidValue(String),
}

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigState {
    /// SQLite database file.
    pub database_path: PathBuf,

    /// Pool size. SQLite serializes writers; this bounds concurrent readers.
    pub max_connections: u32,

    /// Tax in basis points. 1100 = 11%.
    pub tax_bps: u32,

    /// Minimum minutes between now and a pickup time.
    pub pickup_lead_minutes: i64,

    /// Flat fee in rupiah added to delivery orders.
    pub delivery_fee: i64,

    /// Business-local offset used to date order numbers.
    pub utc_offset_hours: i32,

    /// Capacity of the post-commit notification queue.
    pub notification_queue: usize,
}

impl Default for ConfigState {
    fn default() -> Self {
        ConfigState {
            database_path: PathBuf::from("./kopi.db"),
            max_connections: 5,
            tax_bps: TaxRate::STANDARD.bps(),
            pickup_lead_minutes: PICKUP_LEAD_MINUTES,
            delivery_fee: 0,
            utc_offset_hours: 7,
            notification_queue: 256,
        }
    }
}

impl ConfigState {
    /// Loads configuration from file, environment, and defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("KOPI_CONFIG").ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                info!(?path, "Loading service config from file");
                let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&contents)?
            }
            None => {
                debug!("No config file given, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Applies `KOPI_*` environment variable overrides.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(path) = std::env::var("KOPI_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database_path = PathBuf::from(path);
        }

        override_parsed("KOPI_MAX_CONNECTIONS", &mut self.max_connections)?;
        override_parsed("KOPI_TAX_BPS", &mut self.tax_bps)?;
        override_parsed("KOPI_PICKUP_LEAD_MINUTES", &mut self.pickup_lead_minutes)?;
        override_parsed("KOPI_DELIVERY_FEE", &mut self.delivery_fee)?;
        override_parsed("KOPI_UTC_OFFSET_HOURS", &mut self.utc_offset_hours)?;
        override_parsed("KOPI_NOTIFICATION_QUEUE", &mut self.notification_queue)?;

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("max_connections".into()));
        }
        if self.pickup_lead_minutes < 0 {
            return Err(ConfigError::InvalidValue("pickup_lead_minutes".into()));
        }
        if self.delivery_fee < 0 {
            return Err(ConfigError::InvalidValue("delivery_fee".into()));
        }
        if utc_offset(self.utc_offset_hours).is_none() {
            return Err(ConfigError::InvalidValue("utc_offset_hours".into()));
        }
        if self.notification_queue == 0 {
            return Err(ConfigError::InvalidValue("notification_queue".into()));
        }
        Ok(())
    }

    // =========================================================================
    // Typed Accessors
    // =========================================================================

    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_bps)
    }

    pub fn pickup_lead(&self) -> Duration {
        Duration::minutes(self.pickup_lead_minutes)
    }

    pub fn delivery_fee(&self) -> Money {
        Money::from_rupiah(self.delivery_fee)
    }

    /// Business-local offset. Falls back to UTC for an out-of-range value
    /// that slipped past [`validate`](Self::validate).
    pub fn business_offset(&self) -> FixedOffset {
        utc_offset(self.utc_offset_hours).unwrap_or_else(|| Utc.fix())
    }
}

fn override_parsed<T: std::str::FromStr>(var: &str, target: &mut T) -> Result<(), ConfigError> {
    if let Ok(raw) = std::env::var(var) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(var.to_string()))?;
    }
    Ok(())
}
