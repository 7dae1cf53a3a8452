//! # Engine Configuration
//!
//! Configuration for the reservation engine and the sweep runner.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Command line flags (holdfast-sweep only, highest priority)         │
//! │                                                                         │
//! │  2. Environment Variables                                              │
//! │     HOLDFAST_DB_PATH=/var/lib/holdfast/holdfast.db                     │
//! │     HOLDFAST_SWEEP_MODE=both                                           │
//! │                                                                         │
//! │  3. TOML Config File (--config / HOLDFAST_CONFIG)                      │
//! │                                                                         │
//! │  4. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "holdfast.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [credit]
//! floor = 0
//! [[credit.tiers]]
//! balance = 3
//! ttl_hours = 24
//! [[credit.tiers]]
//! balance = 2
//! ttl_hours = 12
//! [[credit.tiers]]
//! balance = 1
//! ttl_hours = 6
//!
//! [sweeper]
//! interval_secs = 60
//! mode = "both"   # orders | reservations | both
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use holdfast_core::CreditPolicy;

use crate::pool::DbConfig;

// =============================================================================
// Config Error
// =============================================================================

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Sweep Mode
// =============================================================================

/// Which expiry pass the sweep runner performs.
///
/// ```text
/// orders        sweep(now): overdue waitToBuy orders, penalizes credit
/// reservations  clean_expired_reservations(now): stale holds, no penalty
/// both          orders first, then reservations (default)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepMode {
    Orders,
    Reservations,
    #[default]
    Both,
}

impl SweepMode {
    /// Returns true if the order sweep runs in this mode.
    pub fn sweeps_orders(&self) -> bool {
        matches!(self, SweepMode::Orders | SweepMode::Both)
    }

    /// Returns true if the reservation cleanup runs in this mode.
    pub fn cleans_reservations(&self) -> bool {
        matches!(self, SweepMode::Reservations | SweepMode::Both)
    }
}

impl std::fmt::Display for SweepMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SweepMode::Orders => write!(f, "orders"),
            SweepMode::Reservations => write!(f, "reservations"),
            SweepMode::Both => write!(f, "both"),
        }
    }
}

impl std::str::FromStr for SweepMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "orders" => Ok(SweepMode::Orders),
            "reservations" | "cleanup" => Ok(SweepMode::Reservations),
            "both" | "all" => Ok(SweepMode::Both),
            other => Err(ConfigError::Invalid(format!(
                "Unknown sweep mode: '{}'. Valid options: orders, reservations, both",
                other
            ))),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Milliseconds a writer waits on a locked database.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("holdfast.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// `[sweeper]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperSettings {
    /// Seconds between runs in loop mode.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default)]
    pub mode: SweepMode,
}

fn default_interval_secs() -> u64 {
    60
}

impl Default for SweeperSettings {
    fn default() -> Self {
        SweeperSettings {
            interval_secs: default_interval_secs(),
            mode: SweepMode::default(),
        }
    }
}

impl SweeperSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Credit balance → TTL table and penalty floor.
    #[serde(default)]
    pub credit: CreditPolicy,

    #[serde(default)]
    pub sweeper: SweeperSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (if given and present)
    /// 3. Environment variables
    pub fn load(config_path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match config_path {
            Some(path) if path.exists() => {
                info!(?path, "Loading engine config from file");
                Self::from_toml(&std::fs::read_to_string(path)?)?
            }
            Some(path) => {
                debug!(?path, "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document (missing sections take defaults).
    pub fn from_toml(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.sweeper.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sweeper.interval_secs must be greater than 0".into(),
            ));
        }

        self.credit
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        Ok(())
    }

    /// Applies `HOLDFAST_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup (the environment in production).
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("HOLDFAST_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = lookup("HOLDFAST_DB_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid HOLDFAST_DB_MAX_CONNECTIONS"),
            }
        }

        if let Some(secs) = lookup("HOLDFAST_SWEEP_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(n) => {
                    debug!(interval_secs = n, "Overriding sweep interval from environment");
                    self.sweeper.interval_secs = n;
                }
                Err(_) => warn!(value = %secs, "Ignoring invalid HOLDFAST_SWEEP_INTERVAL_SECS"),
            }
        }

        if let Some(mode) = lookup("HOLDFAST_SWEEP_MODE") {
            match mode.parse() {
                Ok(parsed) => self.sweeper.mode = parsed,
                Err(_) => warn!(mode = %mode, "Unknown sweep mode in environment"),
            }
        }

        if let Some(floor) = lookup("HOLDFAST_CREDIT_FLOOR") {
            match floor.parse::<i64>() {
                Ok(n) => self.credit.floor = n,
                Err(_) => warn!(value = %floor, "Ignoring invalid HOLDFAST_CREDIT_FLOOR"),
            }
        }
    }

    /// Builds the pool configuration for this engine.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_sweep_mode_parsing() {
        assert_eq!("orders".parse::<SweepMode>().unwrap(), SweepMode::Orders);
        assert_eq!("Reservations".parse::<SweepMode>().unwrap(), SweepMode::Reservations);
        assert_eq!("both".parse::<SweepMode>().unwrap(), SweepMode::Both);
        assert!("everything".parse::<SweepMode>().is_err());

        assert!(SweepMode::Both.sweeps_orders());
        assert!(SweepMode::Both.cleans_reservations());
        assert!(!SweepMode::Orders.cleans_reservations());
        assert!(!SweepMode::Reservations.sweeps_orders());
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.database.path, PathBuf::from("holdfast.db"));
        assert_eq!(config.sweeper.interval_secs, 60);
        assert_eq!(config.sweeper.mode, SweepMode::Both);
        assert_eq!(config.credit, CreditPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = EngineConfig::from_toml(
            r#"
            [sweeper]
            mode = "orders"

            [credit]
            floor = 0
            [[credit.tiers]]
            balance = 5
            ttl_hours = 48
            "#,
        )
        .unwrap();

        assert_eq!(config.sweeper.mode, SweepMode::Orders);
        assert_eq!(config.sweeper.interval_secs, 60);
        assert_eq!(config.credit.ttl_for(5).unwrap().num_hours(), 48);
        assert!(config.credit.ttl_for(3).is_err());
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_validation() {
        let mut config = EngineConfig::default();
        config.sweeper.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.credit.tiers.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("HOLDFAST_DB_PATH", "/tmp/other.db"),
            ("HOLDFAST_SWEEP_MODE", "reservations"),
            ("HOLDFAST_SWEEP_INTERVAL_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.sweeper.mode, SweepMode::Reservations);
        // Invalid values are ignored
        assert_eq!(config.sweeper.interval_secs, 60);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = EngineConfig::load(Some(Path::new("/nonexistent/holdfast.toml"))).unwrap();
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_toml_serialization() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[sweeper]"));
    }
}
