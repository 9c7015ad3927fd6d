//! Relay configuration.
//!
//! Layered with the `config` crate, later layers winning:
//!
//! 1. Built-in defaults ([`RelayConfig::default`])
//! 2. A TOML file: `--config <path>` (must exist) or `./shoplink.toml` (optional)
//! 3. Environment variables prefixed `SHOPLINK__`, sections split by `__`
//!    (`SHOPLINK__STORE__BACKEND=sqlite`, `SHOPLINK__SYNC__EXPIRY_SOON_DAYS=30`)
//!
//! ```toml
//! [store]
//! backend = "sqlite"
//! path = "/var/lib/shoplink/relay.db"
//! strict_load = false
//! max_connections = 5
//! connect_timeout_secs = 30
//!
//! [sync]
//! expiry_soon_days = 90
//! business_utc_offset_minutes = 60
//! ```

use std::path::Path;

use chrono::{FixedOffset, Offset, Utc};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use shoplink_core::{
    DEFAULT_BUSINESS_UTC_OFFSET_MINUTES, DEFAULT_EXPIRY_SOON_DAYS, MAX_EXPIRY_SOON_DAYS,
    MIN_EXPIRY_SOON_DAYS,
};
use shoplink_db::StoreConfig;

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "shoplink";

pub const ENV_PREFIX: &str = "SHOPLINK";

/// UTC offsets that exist somewhere on Earth, in minutes.
const MIN_UTC_OFFSET_MINUTES: i32 = -12 * 60;
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub store: StoreConfig,
    pub sync: SyncConfig,
}

/// `[sync]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// "Expiring soon" window for shops without their own setting.
    pub expiry_soon_days: i64,

    /// Offset of the shops' business day from UTC. Decides what "today"
    /// means for the expiry gate.
    pub business_utc_offset_minutes: i32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            expiry_soon_days: DEFAULT_EXPIRY_SOON_DAYS,
            business_utc_offset_minutes: DEFAULT_BUSINESS_UTC_OFFSET_MINUTES,
        }
    }
}

impl SyncConfig {
    pub fn business_tz(&self) -> FixedOffset {
        FixedOffset::east_opt(self.business_utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }
}

impl RelayConfig {
    /// Loads defaults, then the TOML file, then `SHOPLINK__*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = Config::try_from(&RelayConfig::default())?;

        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config: RelayConfig = Config::builder()
            .add_source(defaults)
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let days = self.sync.expiry_soon_days;
        if !(MIN_EXPIRY_SOON_DAYS..=MAX_EXPIRY_SOON_DAYS).contains(&days) {
            return Err(ConfigError::InvalidValue {
                key: "sync.expiry_soon_days".to_string(),
                reason: format!("{days} is outside {MIN_EXPIRY_SOON_DAYS}..={MAX_EXPIRY_SOON_DAYS}"),
            });
        }

        let offset = self.sync.business_utc_offset_minutes;
        if !(MIN_UTC_OFFSET_MINUTES..=MAX_UTC_OFFSET_MINUTES).contains(&offset) {
            return Err(ConfigError::InvalidValue {
                key: "sync.business_utc_offset_minutes".to_string(),
                reason: format!("{offset} is not a real UTC offset"),
            });
        }

        if self.store.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                key: "store.max_connections".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if self.store.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "store.connect_timeout_secs".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if self.store.path.as_os_str().is_empty() && self.store.backend != shoplink_db::Backend::Memory {
            return Err(ConfigError::MissingRequired("store.path".to_string()));
        }

        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoplink_db::Backend;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = RelayConfig::default();
        config.validate().unwrap();
        assert_eq!(config.sync.expiry_soon_days, 90);
        assert_eq!(config.sync.business_tz().local_minus_utc(), 3600);
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[store]\nbackend = \"memory\"\nconnect_timeout_secs = 5\n\n[sync]\nexpiry_soon_days = 30\nbusiness_utc_offset_minutes = 0"
        )
        .unwrap();

        let config = RelayConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.store.backend, Backend::Memory);
        assert_eq!(config.store.max_connections, 5);
        assert_eq!(config.store.connect_timeout_secs, 5);
        assert_eq!(config.sync.expiry_soon_days, 30);
        assert_eq!(config.sync.business_tz().local_minus_utc(), 0);
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = RelayConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn test_validate_rejects_bad_window() {
        let mut config = RelayConfig::default();
        config.sync.expiry_soon_days = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));

        let mut config = RelayConfig::default();
        config.sync.business_utc_offset_minutes = 15 * 60;
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.store.connect_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
