//! Configuration for the mount control binary.
//!
//! Grounded on `mount_common::config`'s `SharedConfig`/`ConfigLoader`
//! pattern; this crate's own struct embeds that plus the observer
//! location, per-axis kinematics/pin wiring and the pointing controller's
//! thresholds.

use mount_common::config::{ConfigError, ObserverLocation, SharedConfig};
use mount_hal::bus::{PwmPin, SpiInterface, SpiMode};
use serde::Deserialize;

use crate::control::AxisThrottle;
use crate::transform::HorizontalCoords;

/// Default overturn guard, matching the spec's `MAX_AZ_OVERTURN`.
pub const DEFAULT_MAX_AZ_OVERTURN: f64 = 0.5;
/// Default overturn guard, matching the spec's `MAX_ALT_OVERTURN`.
pub const DEFAULT_MAX_ALT_OVERTURN: f64 = 5.0 / 360.0;

fn default_min_throttle_az() -> f64 {
    AxisThrottle::AZIMUTH_DEFAULT.min_throttle
}

fn default_min_throttle_alt() -> f64 {
    AxisThrottle::ALTITUDE_DEFAULT.min_throttle
}

fn default_poll_period_ms() -> u64 {
    200
}

/// Pin wiring for one encoder.
#[derive(Debug, Clone, Deserialize)]
pub struct EncoderPinConfig {
    pub interface: SpiInterface,
    pub channel: u8,
    #[serde(default)]
    pub mode: SpiMode,
    pub baudrate_hz: u32,
    #[serde(default = "default_st_bits")]
    pub st_bits: u8,
    #[serde(default = "default_mt_bits")]
    pub mt_bits: u8,
}

fn default_st_bits() -> u8 {
    12
}

fn default_mt_bits() -> u8 {
    12
}

/// Pin wiring for one motor.
#[derive(Debug, Clone, Deserialize)]
pub struct MotorPinConfig {
    pub pwm: PwmPin,
    #[serde(default)]
    pub dir: Option<u32>,
    #[serde(default)]
    pub dir_a: Option<u32>,
    #[serde(default)]
    pub dir_b: Option<u32>,
    #[serde(default)]
    pub enable: Option<u32>,
    #[serde(default)]
    pub fault: Option<u32>,
    #[serde(default)]
    pub invert_direction: bool,
}

/// Per-axis configuration: encoder wiring, gear ratio, zero offset, motor
/// wiring and minimum throttle.
#[derive(Debug, Clone, Deserialize)]
pub struct AxisConfig {
    pub encoder: EncoderPinConfig,
    pub motor: MotorPinConfig,
    /// Encoder turns per one full axis revolution.
    pub gear_ratio: f64,
    /// Zero-point offset, in turns.
    #[serde(default)]
    pub offset_turns: f64,
    /// Overturn guard, in turns past the nominal ±0.5 range. `None` takes
    /// the axis-specific default (azimuth: [`DEFAULT_MAX_AZ_OVERTURN`],
    /// altitude: [`DEFAULT_MAX_ALT_OVERTURN`]) at the call site.
    #[serde(default)]
    pub max_overturn: Option<f64>,
}

fn default_adc_period_ms() -> u64 {
    100
}

fn default_integration_window_ms() -> u64 {
    1000
}

fn default_temp_period_ms() -> u64 {
    5000
}

/// Wiring for one ADC channel sampler (motor current sense or the
/// supply-voltage monitor).
#[derive(Debug, Clone, Deserialize)]
pub struct AdcChannelConfig {
    pub channel: u8,
    #[serde(default = "default_one")]
    pub factor: f64,
    #[serde(default = "default_adc_period_ms")]
    pub period_ms: u64,
    #[serde(default = "default_integration_window_ms")]
    pub integration_window_ms: u64,
}

fn default_one() -> f64 {
    1.0
}

/// Supply-voltage monitor wiring, layered on an ADC channel.
#[derive(Debug, Clone, Deserialize)]
pub struct VoltageMonitorConfig {
    #[serde(flatten)]
    pub adc: AdcChannelConfig,
    pub nominal_voltage: f64,
}

/// One `/sys/class/thermal/.../temp` zone to sample.
#[derive(Debug, Clone, Deserialize)]
pub struct TemperatureZoneConfig {
    pub name: String,
    pub path: String,
}

fn default_temperature_period_ms() -> u64 {
    default_temp_period_ms()
}

/// Top-level mount_control configuration, loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct MountControlConfig {
    #[serde(flatten)]
    pub shared: SharedConfig,
    pub location: ObserverLocation,
    pub azimuth: AxisConfig,
    pub altitude: AxisConfig,
    /// Park position, in horizontal coordinates.
    pub park_position: HorizontalCoords,
    #[serde(default = "default_min_throttle_az")]
    pub min_throttle_az: f64,
    #[serde(default = "default_min_throttle_alt")]
    pub min_throttle_alt: f64,
    #[serde(default = "default_poll_period_ms")]
    pub poll_period_ms: u64,
    #[serde(default)]
    pub current_sense_az: Option<AdcChannelConfig>,
    #[serde(default)]
    pub current_sense_alt: Option<AdcChannelConfig>,
    #[serde(default)]
    pub voltage_monitor: Option<VoltageMonitorConfig>,
    #[serde(default)]
    pub temperature_zones: Vec<TemperatureZoneConfig>,
    #[serde(default = "default_temperature_period_ms")]
    pub temperature_period_ms: u64,
}

impl MountControlConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.location.validate()?;
        if !(0.0..=1.0).contains(&self.min_throttle_az) || !(0.0..=1.0).contains(&self.min_throttle_alt) {
            return Err(ConfigError::ValidationError(
                "min throttle must be within [0, 1]".into(),
            ));
        }
        if self.azimuth.gear_ratio <= 0.0 || self.altitude.gear_ratio <= 0.0 {
            return Err(ConfigError::ValidationError("gear ratio must be positive".into()));
        }
        if self.poll_period_ms == 0 {
            return Err(ConfigError::ValidationError("poll period must be nonzero".into()));
        }
        Ok(())
    }

    pub fn azimuth_max_overturn(&self) -> f64 {
        self.azimuth.max_overturn.unwrap_or(DEFAULT_MAX_AZ_OVERTURN)
    }

    pub fn altitude_max_overturn(&self) -> f64 {
        self.altitude.max_overturn.unwrap_or(DEFAULT_MAX_ALT_OVERTURN)
    }

    pub fn azimuth_throttle(&self) -> AxisThrottle {
        AxisThrottle {
            min_throttle: self.min_throttle_az,
        }
    }

    pub fn altitude_throttle(&self) -> AxisThrottle {
        AxisThrottle {
            min_throttle: self.min_throttle_alt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mount_common::config::ConfigLoader;

    fn sample_toml() -> &'static str {
        r#"
log_level = "info"
service_name = "mount_control"

[location]
latitude_deg = 51.0
longitude_deg = 7.0
elevation_m = 100.0

[azimuth]
gear_ratio = 50.0

[azimuth.encoder]
interface = "Main"
channel = 0
baudrate_hz = 500000

[azimuth.motor]
pwm = "Hw1"
dir = 5

[altitude]
gear_ratio = 50.0

[altitude.encoder]
interface = "Aux"
channel = 1
baudrate_hz = 500000

[altitude.motor]
pwm = "Hw2"
dir = 6

[park_position]
az_deg = 180.0
alt_deg = 89.5
"#
    }

    #[test]
    fn parses_minimal_config() {
        let cfg: MountControlConfig = toml::from_str(sample_toml()).expect("parse");
        assert_eq!(cfg.park_position.alt_deg, 89.5);
        assert!((cfg.min_throttle_az - default_min_throttle_az()).abs() < 1e-12);
        cfg.validate().expect("valid");
    }

    #[test]
    fn loader_rejects_nonexistent_file() {
        let result = MountControlConfig::load(std::path::Path::new("/nonexistent/path.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn zero_gear_ratio_is_rejected() {
        let mut cfg: MountControlConfig = toml::from_str(sample_toml()).unwrap();
        cfg.azimuth.gear_ratio = 0.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::ValidationError(_))));
    }
}
