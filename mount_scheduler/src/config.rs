//! Configuration for the scheduler daemon.
//!
//! Grounded on `mount_common::config`'s `SharedConfig`/`ConfigLoader`
//! pattern, same as `mount_control::config`.

use std::path::PathBuf;

use mount_common::config::{ConfigError, SharedConfig};
use mount_common::consts::{DEFAULT_MAILBOX_PATH, DEFAULT_TASK_STORE_FILE};
use serde::Deserialize;

fn default_mailbox_path() -> PathBuf {
    PathBuf::from(DEFAULT_MAILBOX_PATH)
}

fn default_task_store_path() -> PathBuf {
    PathBuf::from("/var/lib/mount-scheduler").join(DEFAULT_TASK_STORE_FILE)
}

fn default_remote_client_path() -> String {
    "rt_remote_client".to_string()
}

fn default_tick_period_ms() -> u64 {
    20
}

/// Top-level scheduler configuration, loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(flatten)]
    pub shared: SharedConfig,

    /// Unix-domain datagram socket the scheduler mailbox binds.
    #[serde(default = "default_mailbox_path")]
    pub mailbox_path: PathBuf,

    /// Binary task-list persistence file.
    #[serde(default = "default_task_store_path")]
    pub task_store_path: PathBuf,

    /// Directory the variant command lines are exec'd from.
    pub executable_path: String,

    /// Directory observation output files are written under.
    pub data_path: String,

    /// External binary used for the goto/park/unpark remote-property
    /// commands (the remote-control protocol itself is out of scope).
    #[serde(default = "default_remote_client_path")]
    pub remote_client_path: String,

    /// Main loop cadence.
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        if self.executable_path.is_empty() {
            return Err(ConfigError::ValidationError("executable_path cannot be empty".into()));
        }
        if self.tick_period_ms == 0 {
            return Err(ConfigError::ValidationError("tick_period_ms must be nonzero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mount_common::config::ConfigLoader;

    fn sample_toml() -> &'static str {
        r#"
service_name = "mount_scheduler"
executable_path = "/opt/rt/bin"
data_path = "/data/rt"
"#
    }

    #[test]
    fn parses_minimal_config() {
        let cfg: SchedulerConfig = toml::from_str(sample_toml()).expect("parse");
        assert_eq!(cfg.tick_period_ms, 20);
        cfg.validate().expect("valid");
    }

    #[test]
    fn loader_rejects_nonexistent_file() {
        let result = SchedulerConfig::load(std::path::Path::new("/nonexistent/scheduler.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn empty_executable_path_is_rejected() {
        let mut cfg: SchedulerConfig = toml::from_str(sample_toml()).unwrap();
        cfg.executable_path.clear();
        assert!(matches!(cfg.validate(), Err(ConfigError::ValidationError(_))));
    }
}
