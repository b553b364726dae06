//! Integration tests for shared config loading.

use mount_common::config::{ConfigError, ConfigLoader, LogLevel, ObserverLocation, SharedConfig};
use serde::Deserialize;
use std::fs;
use tempfile::TempDir;

#[derive(Debug, Deserialize)]
struct DemoConfig {
    shared: SharedConfig,
    location: ObserverLocation,
}

#[test]
fn load_valid_config() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.toml");
    fs::write(
        &path,
        r#"
[shared]
log_level = "debug"
service_name = "mount-control"

[location]
latitude_deg = 52.2
longitude_deg = 21.0
elevation_m = 115.0
"#,
    )
    .unwrap();

    let cfg = DemoConfig::load(&path).expect("should load");
    assert_eq!(cfg.shared.log_level, LogLevel::Debug);
    assert_eq!(cfg.shared.service_name, "mount-control");
    assert!(cfg.location.validate().is_ok());
}

#[test]
fn missing_file_is_file_not_found() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("does_not_exist.toml");
    let result = DemoConfig::load(&path);
    assert!(matches!(result, Err(ConfigError::FileNotFound)));
}

#[test]
fn malformed_toml_is_parse_error() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.toml");
    fs::write(&path, "this is not valid toml =====").unwrap();
    let result = DemoConfig::load(&path);
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn default_log_level_is_info_when_omitted() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.toml");
    fs::write(
        &path,
        r#"
[shared]
service_name = "mount-scheduler"

[location]
latitude_deg = 0.0
longitude_deg = 0.0
elevation_m = 0.0
"#,
    )
    .unwrap();

    let cfg = DemoConfig::load(&path).expect("should load");
    assert_eq!(cfg.shared.log_level, LogLevel::Info);
}
