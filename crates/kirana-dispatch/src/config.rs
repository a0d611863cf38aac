//! # Kirana Configuration
//!
//! Configuration for the database, checkout policy and notification
//! dispatcher.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     KIRANA_DB_PATH=/var/lib/kirana/kirana.db                           │
//! │     KIRANA_SLOT_CAPACITY=30                                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/kirana/kirana.toml (Linux)                               │
//! │     ~/Library/Application Support/in.kirana.kirana/kirana.toml (macOS) │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     ./kirana.db, ₹40 delivery, free above ₹499, 20 orders per slot    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # kirana.toml
//! [database]
//! path = "/var/lib/kirana/kirana.db"
//! max_connections = 5
//!
//! [checkout]
//! delivery_fee_cents = 4000
//! free_delivery_threshold_cents = 49900
//! peak_slot_surcharge_cents = 3000
//! slot_capacity = 20
//!
//! [dispatch]
//! poll_interval_secs = 5
//! batch_size = 100
//! max_attempts = 10
//! retention_days = 7
//! ```

use kirana_core::CheckoutPolicy;
use kirana_db::DbConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{DispatchError, DispatchResult};

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Created on first start.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./kirana.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

// =============================================================================
// Dispatch Settings
// =============================================================================

/// Notification dispatcher behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Interval between outbox poll cycles (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Intents handed to the sink per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Failed deliveries before an intent is left alone.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delivered intents older than this are deleted.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_poll_interval() -> u64 {
    5
}
fn default_batch_size() -> u32 {
    100
}
fn default_max_attempts() -> u32 {
    10
}
fn default_retention_days() -> u32 {
    7
}

impl Default for DispatchSettings {
    fn default() -> Self {
        DispatchSettings {
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            retention_days: default_retention_days(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete Kirana configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KiranaConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Fees, slot capacity and loyalty rates.
    #[serde(default)]
    pub checkout: CheckoutPolicy,

    #[serde(default)]
    pub dispatch: DispatchSettings,
}

impl KiranaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (kirana.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> DispatchResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
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
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file as pretty TOML.
    pub fn save(&self, config_path: Option<PathBuf>) -> DispatchResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| DispatchError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DispatchResult<()> {
        if self.database.max_connections == 0 {
            return Err(DispatchError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(DispatchError::InvalidConfig(format!(
                "database.min_connections ({}) exceeds max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }

        if self.dispatch.batch_size == 0 {
            return Err(DispatchError::InvalidConfig(
                "dispatch.batch_size must be greater than 0".into(),
            ));
        }
        if self.dispatch.max_attempts == 0 {
            return Err(DispatchError::InvalidConfig(
                "dispatch.max_attempts must be greater than 0".into(),
            ));
        }
        if self.dispatch.poll_interval_secs == 0 {
            return Err(DispatchError::InvalidConfig(
                "dispatch.poll_interval_secs must be greater than 0".into(),
            ));
        }

        let checkout = &self.checkout;
        if checkout.slot_capacity <= 0 {
            return Err(DispatchError::InvalidConfig(
                "checkout.slot_capacity must be greater than 0".into(),
            ));
        }
        let fees = [
            ("delivery_fee_cents", checkout.delivery_fee_cents),
            ("free_delivery_threshold_cents", checkout.free_delivery_threshold_cents),
            ("peak_slot_surcharge_cents", checkout.peak_slot_surcharge_cents),
            ("max_tip_cents", checkout.max_tip_cents),
            ("loyalty_earn_per_cents", checkout.loyalty_earn_per_cents),
            ("loyalty_point_value_cents", checkout.loyalty_point_value_cents),
        ];
        if let Some((field, value)) = fees.iter().find(|(_, v)| *v < 0) {
            return Err(DispatchError::InvalidConfig(format!(
                "checkout.{} must not be negative, got {}",
                field, value
            )));
        }

        Ok(())
    }

    /// Applies `KIRANA_*` overrides read through `lookup`.
    ///
    /// Unparseable numbers are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("KIRANA_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        override_number(&lookup, "KIRANA_DB_MAX_CONNECTIONS", &mut self.database.max_connections);
        override_number(&lookup, "KIRANA_POLL_INTERVAL_SECS", &mut self.dispatch.poll_interval_secs);
        override_number(&lookup, "KIRANA_BATCH_SIZE", &mut self.dispatch.batch_size);
        override_number(&lookup, "KIRANA_MAX_ATTEMPTS", &mut self.dispatch.max_attempts);
        override_number(&lookup, "KIRANA_DELIVERY_FEE_CENTS", &mut self.checkout.delivery_fee_cents);
        override_number(
            &lookup,
            "KIRANA_FREE_DELIVERY_THRESHOLD_CENTS",
            &mut self.checkout.free_delivery_threshold_cents,
        );
        override_number(&lookup, "KIRANA_SLOT_CAPACITY", &mut self.checkout.slot_capacity);
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("in", "kirana", "kirana")
            .map(|dirs| dirs.config_dir().join("kirana.toml"))
    }

    /// Database settings in the form `kirana_db::Database::new` takes.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .min_connections(self.database.min_connections)
            .checkout_policy(self.checkout.clone())
    }
}

fn override_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.parse::<T>() {
            Ok(value) => {
                debug!(key = %key, value = %raw, "Overriding config from environment");
                *target = value;
            }
            Err(_) => warn!(key = %key, value = %raw, "Ignoring unparseable environment override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = KiranaConfig::default();
        assert_eq!(config.database.path, PathBuf::from("./kirana.db"));
        assert_eq!(config.dispatch.batch_size, 100);
        assert_eq!(config.checkout, CheckoutPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: KiranaConfig = toml::from_str(
            r#"
            [checkout]
            slot_capacity = 8

            [dispatch]
            max_attempts = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.checkout.slot_capacity, 8);
        assert_eq!(config.checkout.delivery_fee_cents, 4000);
        assert_eq!(config.dispatch.max_attempts, 3);
        assert_eq!(config.dispatch.poll_interval_secs, 5);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = KiranaConfig::default();
        config.apply_overrides(lookup_from(&[
            ("KIRANA_DB_PATH", "/tmp/k.db"),
            ("KIRANA_SLOT_CAPACITY", "30"),
            ("KIRANA_DELIVERY_FEE_CENTS", "2500"),
            ("KIRANA_BATCH_SIZE", "not-a-number"),
        ]));

        assert_eq!(config.database.path, PathBuf::from("/tmp/k.db"));
        assert_eq!(config.checkout.slot_capacity, 30);
        assert_eq!(config.checkout.delivery_fee_cents, 2500);
        // Bad value ignored
        assert_eq!(config.dispatch.batch_size, 100);
    }

    #[test]
    fn test_config_validation() {
        let mut config = KiranaConfig::default();
        config.dispatch.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = KiranaConfig::default();
        config.dispatch.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = KiranaConfig::default();
        config.checkout.slot_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = KiranaConfig::default();
        config.checkout.delivery_fee_cents = -1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("delivery_fee_cents"));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("kirana-config-{}", uuid::Uuid::new_v4()))
            .join("kirana.toml");

        let mut config = KiranaConfig::default();
        config.checkout.slot_capacity = 12;
        config.dispatch.retention_days = 30;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[checkout]"));
        assert!(contents.contains("[dispatch]"));

        let loaded: KiranaConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_db_config_carries_policy() {
        let mut config = KiranaConfig::default();
        config.checkout.slot_capacity = 3;
        let db = config.db_config();
        assert_eq!(db.checkout_policy.slot_capacity, 3);
        assert_eq!(db.max_connections, 5);
    }
}
