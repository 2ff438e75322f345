//! Configuration for the binding layer.
//!
//! Selects which bus and well-known names the bindings talk to and how much
//! buffering change channels get. Loaded from TOML; every field has a default.

mod log_level;
mod paths;

use std::{fs, path::Path};

pub use log_level::LogLevel;
pub use paths::ConfigPaths;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{BluezError, Result};

/// Well-known name of the Bluetooth daemon.
pub const BLUEZ_SERVICE: &str = "org.bluez";

/// Well-known name of the OBEX daemon.
pub const OBEX_SERVICE: &str = "org.bluez.obex";

/// Message bus a transport connects to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    /// The system bus, where `bluetoothd` lives.
    #[default]
    System,

    /// The per-user session bus, where `obexd` lives.
    Session,
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct BluezConfig {
    /// Well-known bus name of the Bluetooth daemon.
    pub service: String,

    /// Bus the Bluetooth daemon is reached on.
    pub bus: BusKind,

    /// Well-known bus name of the OBEX daemon.
    pub obex_service: String,

    /// Bus the OBEX daemon is reached on.
    pub obex_bus: BusKind,

    /// Capacity of every event channel created by bindings.
    ///
    /// A consumer that falls this far behind blocks event delivery.
    pub channel_capacity: usize,

    /// Logging level.
    pub log_level: LogLevel,
}

impl Default for BluezConfig {
    fn default() -> Self {
        Self {
            service: BLUEZ_SERVICE.to_string(),
            bus: BusKind::System,
            obex_service: OBEX_SERVICE.to_string(),
            obex_bus: BusKind::Session,
            channel_capacity: 64,
            log_level: LogLevel::Info,
        }
    }
}

impl BluezConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    /// Returns `BluezError::Config` if the text is not valid TOML, contains
    /// unknown keys, or sets a zero channel capacity
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| BluezError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    /// Returns `BluezError::Io` if the file cannot be read, or
    /// `BluezError::Config` if it does not parse
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text).map_err(|e| match e {
            BluezError::Config(details) => {
                BluezError::Config(format!("{}: {details}", path.display()))
            }
            other => other,
        })
    }

    /// Loads the configuration from the default location, falling back to
    /// defaults when no file exists.
    ///
    /// # Errors
    /// Returns an error if an existing file cannot be read or parsed
    pub fn load_default() -> Result<Self> {
        let path = ConfigPaths::config_file()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    /// JSON schema describing the configuration file.
    ///
    /// # Errors
    /// Returns `BluezError::Config` if the schema cannot be rendered
    pub fn schema_json() -> Result<String> {
        let schema = schemars::schema_for!(BluezConfig);
        serde_json::to_string_pretty(&schema).map_err(|e| BluezError::Config(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(BluezError::Config(
                "channel_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
