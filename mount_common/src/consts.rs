//! System-wide constants for the mount control workspace.
//!
//! Single source of truth for numeric limits and default paths shared
//! between `mount_hal`, `mount_control` and `mount_scheduler`.

/// Maximum number of axes (the mount has two: azimuth and elevation,
/// but the bus facade and config loader stay generic over the count).
pub const MAX_AXES: u8 = 8;

/// Default control-loop cycle time in microseconds (100 Hz).
pub const CYCLE_TIME_US: u64 = 10_000;

/// Minimum allowed cycle time [µs] for runtime config.
pub const CYCLE_TIME_US_MIN: u32 = 1_000;

/// Maximum allowed cycle time [µs] for runtime config.
pub const CYCLE_TIME_US_MAX: u32 = 100_000;

/// Encoder poll period in milliseconds, per `SsiPosEncoder`.
pub const ENCODER_POLL_MS: u64 = 50;

/// Consecutive bus read failures before an encoder channel is marked stale.
pub const ENCODER_MAX_CONN_ERRORS: u32 = 10;

/// Turns-per-second above which an encoder sample is rejected as a glitch.
pub const ENCODER_MAX_TURNS_PER_SECOND: f64 = 10.0;

/// Depth of the zero-offset ring buffer used by the current/voltage sampler.
pub const OFFSET_RINGBUFFER_DEPTH: usize = 10;

/// Default motor PWM frequency in Hz.
pub const DEFAULT_PWM_FREQ: u32 = 20_000;

/// Default configuration directory path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/mount-control";

/// Default task persistence file (binary dump of pending tasks).
pub const DEFAULT_TASK_STORE_FILE: &str = "tasks.bin";

/// Default scheduler mailbox socket path.
pub const DEFAULT_MAILBOX_PATH: &str = "/run/mount-scheduler.sock";

/// Retry count for a mailbox send before treating the peer as unreachable,
/// mirroring the original `msgsnd` retry loop.
pub const MAILBOX_SEND_RETRIES: u32 = 100;

/// Delay between mailbox send retries, in milliseconds.
pub const MAILBOX_RETRY_DELAY_MS: u64 = 10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_consistent() {
        assert!(MAX_AXES > 0);
        assert!(CYCLE_TIME_US > 0);
        assert!(CYCLE_TIME_US as u32 >= CYCLE_TIME_US_MIN);
        assert!(CYCLE_TIME_US as u32 <= CYCLE_TIME_US_MAX);
        assert!(ENCODER_MAX_CONN_ERRORS > 0);
        assert!(OFFSET_RINGBUFFER_DEPTH > 0);
    }
}
