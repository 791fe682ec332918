//! Ingester configuration.
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! listen_address = "0.0.0.0:42424"
//! flush_interval_secs = 600
//! submit_timeout_secs = 300
//!
//! [ledger]
//! endpoint = "http://127.0.0.1:8080"
//! instance_id = 0
//! signer_key = "<64 hex digits>"
//!
//! [[sensors]]
//! name = "esp8266_kitchen"
//! measurement_kinds = ["temperature", "humidity", "pressure"]
//! storage_granularity = 600
//! query_granularity = 14400
//! ```

use std::{collections::HashSet, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sensor::{MeasurementKind, SensorDescriptor};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,

    /// Upper bound on one sign-and-commit round trip.
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,

    pub ledger: LedgerConfig,

    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub endpoint: String,

    /// Contract instance the measurements are stored in.
    #[serde(default)]
    pub instance_id: u64,

    /// Hex-encoded ed25519 seed.
    pub signer_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    pub name: String,

    #[serde(default)]
    pub measurement_kinds: Vec<String>,

    #[serde(default = "default_storage_granularity")]
    pub storage_granularity: u64,

    #[serde(default = "default_query_granularity")]
    pub query_granularity: u64,
}

fn default_listen_address() -> String {
    "0.0.0.0:42424".to_string()
}

fn default_flush_interval() -> u64 {
    600
}

fn default_submit_timeout() -> u64 {
    300
}

fn default_storage_granularity() -> u64 {
    600
}

fn default_query_granularity() -> u64 {
    4 * 3600
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_interval_secs == 0 {
            return Err(ConfigError::Invalid("flush_interval_secs must be positive".into()));
        }
        if self.submit_timeout_secs == 0 {
            return Err(ConfigError::Invalid("submit_timeout_secs must be positive".into()));
        }
        if self.ledger.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("ledger endpoint is empty".into()));
        }

        let mut seen = HashSet::new();
        for sensor in &self.sensors {
            if !seen.insert(sensor.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate sensor name: {}",
                    sensor.name
                )));
            }
            sensor.descriptor()?;
        }

        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }

    pub fn sensor_names(&self) -> Vec<String> {
        self.sensors.iter().map(|s| s.name.clone()).collect()
    }
}

impl SensorConfig {
    pub fn descriptor(&self) -> Result<SensorDescriptor, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("sensor name is empty".into()));
        }
        if self.storage_granularity == 0 || self.query_granularity % self.storage_granularity != 0
        {
            return Err(ConfigError::Invalid(format!(
                "sensor {}: query_granularity must be a multiple of storage_granularity",
                self.name
            )));
        }

        let measurement_kinds = self
            .measurement_kinds
            .iter()
            .map(|k| k.parse::<MeasurementKind>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::Invalid(format!("sensor {}: {e}", self.name)))?;

        Ok(SensorDescriptor {
            name: self.name.clone(),
            measurement_kinds,
            storage_granularity: self.storage_granularity,
            query_granularity: self.query_granularity,
        })
    }
}
