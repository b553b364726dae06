//! Per-axis motor command law used by the pointing controller's poll cycle.
//!
//! Structured the way the donor's PID gains/compute pair was (a plain
//! config struct plus a pure `compute` function, unit-tested against
//! literal threshold values) even though the law itself is the spec's
//! threshold-zoned proportional law rather than a PID loop: coarse errors
//! get full throttle, mid-range errors get a proportional ramp floored at
//! a minimum throttle, and errors inside the tracking deadband stop the
//! motor outright.

/// Error magnitude above which the motor runs at full throttle toward the
/// target.
pub const COARSE_THRESHOLD_DEG: f64 = 3.0;
/// Error magnitude below which the motor runs at a fixed minimum throttle.
pub const FINE_THRESHOLD_DEG: f64 = 0.1;
/// Error magnitude below which the motor is considered on-target and
/// stopped.
pub const TRACK_THRESHOLD_DEG: f64 = 0.017;

/// Per-axis throttle configuration.
#[derive(Debug, Clone, Copy)]
pub struct AxisThrottle {
    /// Minimum throttle fraction `(0, 1]` commanded in the fine zone.
    pub min_throttle: f64,
}

impl AxisThrottle {
    pub const AZIMUTH_DEFAULT: AxisThrottle = AxisThrottle { min_throttle: 0.06 };
    pub const ALTITUDE_DEFAULT: AxisThrottle = AxisThrottle { min_throttle: 0.14 };
}

/// Compute the signed motor duty-cycle command `[-1, 1]` for a pointing
/// error `err_deg` (target minus current, already folded into
/// `[-180, 180]`).
pub fn motor_command(err_deg: f64, throttle: AxisThrottle) -> f64 {
    let magnitude = err_deg.abs();
    let sign = err_deg.signum();

    if magnitude <= TRACK_THRESHOLD_DEG {
        0.0
    } else if magnitude <= FINE_THRESHOLD_DEG {
        sign * throttle.min_throttle
    } else if magnitude <= COARSE_THRESHOLD_DEG {
        let proportional = magnitude / COARSE_THRESHOLD_DEG;
        sign * proportional.max(throttle.min_throttle)
    } else {
        sign
    }
}

/// `true` iff the error is within the tracking deadband — used by the
/// poll cycle to decide SLEWING→IDLE/TRACKING and PARKING→PARKED
/// transitions.
pub fn on_target(err_deg: f64) -> bool {
    err_deg.abs() <= TRACK_THRESHOLD_DEG
}

/// Fold an error (in degrees) into `[-180, 180]`.
pub fn fold_error_deg(err_deg: f64) -> f64 {
    let mut v = err_deg % 360.0;
    if v > 180.0 {
        v -= 360.0;
    } else if v < -180.0 {
        v += 360.0;
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coarse_error_commands_full_throttle() {
        assert_eq!(motor_command(10.0, AxisThrottle::AZIMUTH_DEFAULT), 1.0);
        assert_eq!(motor_command(-10.0, AxisThrottle::AZIMUTH_DEFAULT), -1.0);
    }

    #[test]
    fn fine_error_commands_minimum_throttle() {
        assert_eq!(motor_command(0.05, AxisThrottle::AZIMUTH_DEFAULT), 0.06);
        assert_eq!(motor_command(-0.05, AxisThrottle::ALTITUDE_DEFAULT), -0.14);
    }

    #[test]
    fn track_zone_stops_the_motor() {
        assert_eq!(motor_command(0.01, AxisThrottle::AZIMUTH_DEFAULT), 0.0);
    }

    #[test]
    fn mid_zone_is_proportional_and_floored() {
        let throttle = AxisThrottle { min_throttle: 0.5 };
        // 1.0 deg / 3.0 deg = 0.333, below the 0.5 floor.
        assert_eq!(motor_command(1.0, throttle), 0.5);
        // 2.0 deg / 3.0 deg = 0.667, above the floor.
        let cmd = motor_command(2.0, AxisThrottle::AZIMUTH_DEFAULT);
        assert!((cmd - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn on_target_matches_track_threshold() {
        assert!(on_target(0.017));
        assert!(!on_target(0.018));
    }

    #[test]
    fn fold_error_wraps_into_signed_range() {
        assert!((fold_error_deg(270.0) - (-90.0)).abs() < 1e-9);
        assert!((fold_error_deg(-270.0) - 90.0).abs() < 1e-9);
    }
}
