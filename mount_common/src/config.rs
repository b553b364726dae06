//! Configuration loading traits and types shared by all binaries in the
//! workspace: `mount_hal`, `mount_control` and `mount_scheduler` all embed
//! [`SharedConfig`] in their own TOML config structs and load them through
//! [`ConfigLoader`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Log level for configuration (feeds `tracing_subscriber::EnvFilter`).
///
/// Serializes to lowercase strings: "trace", "debug", "info", "warn", "error".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Render as the string `tracing_subscriber::EnvFilter::new` expects.
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("configuration file not found")]
    FileNotFound,

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Common configuration fields shared across all binaries.
///
/// Embedded in each application's own config struct via `#[serde(flatten)]`
/// or as a named field, depending on the consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    pub service_name: String,
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Geographic location of the mount, used by the coordinate transform (C8)
/// to convert between horizontal and equatorial coordinates.
///
/// Grounded on the original `ratsche/astro.h` / `astro.cpp` observer
/// location: latitude and longitude in degrees, elevation in metres above
/// sea level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObserverLocation {
    /// Geographic latitude, degrees, positive north.
    pub latitude_deg: f64,
    /// Geographic longitude, degrees, positive east.
    pub longitude_deg: f64,
    /// Elevation above sea level, metres.
    pub elevation_m: f64,
}

impl ObserverLocation {
    /// Validate latitude/longitude are within their physical ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(-90.0..=90.0).contains(&self.latitude_deg) {
            return Err(ConfigError::ValidationError(format!(
                "latitude_deg {} out of range [-90, 90]",
                self.latitude_deg
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude_deg) {
            return Err(ConfigError::ValidationError(format!(
                "longitude_deg {} out of range [-180, 180]",
                self.longitude_deg
            )));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist.
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_config_rejects_empty_service_name() {
        let cfg = SharedConfig {
            log_level: LogLevel::Info,
            service_name: String::new(),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn shared_config_accepts_named_service() {
        let cfg = SharedConfig {
            log_level: LogLevel::Debug,
            service_name: "mount-control".to_string(),
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn observer_location_rejects_out_of_range_latitude() {
        let loc = ObserverLocation {
            latitude_deg: 120.0,
            longitude_deg: 0.0,
            elevation_m: 0.0,
        };
        assert!(loc.validate().is_err());
    }

    #[test]
    fn observer_location_accepts_valid_coordinates() {
        let loc = ObserverLocation {
            latitude_deg: 52.2,
            longitude_deg: 21.0,
            elevation_m: 115.0,
        };
        assert!(loc.validate().is_ok());
    }

    #[test]
    fn log_level_filter_strings() {
        assert_eq!(LogLevel::Warn.as_filter_str(), "warn");
        assert_eq!(LogLevel::Trace.as_filter_str(), "trace");
    }
}
