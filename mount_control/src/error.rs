//! Error type for the mount control binary.

use mount_common::config::ConfigError;
use mount_hal::HalError;

/// Errors surfaced during RT setup, configuration or the poll cycle.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HAL error: {0}")]
    Hal(#[from] HalError),

    #[error("RT setup failed: {0}")]
    RtSetup(String),

    #[error("poll cycle overrun: {actual_ms}ms > {budget_ms}ms budget")]
    CycleOverrun { actual_ms: u64, budget_ms: u64 },
}
