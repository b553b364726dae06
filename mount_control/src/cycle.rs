//! Pointing controller poll cycle (C7 poll cycle, 200 ms cadence).
//!
//! Grounded on `evo_control_unit::cycle`'s `CycleRunner`/`CycleStats`/
//! `rt_setup` shape: pre-allocated runtime state, absolute-time pacing via
//! `clock_nanosleep(TIMER_ABSTIME)` under the `rt` feature, `std::thread::
//! sleep` pacing otherwise, and O(1) per-cycle timing stats. The cycle body
//! itself follows the read→process→write phases of the original but with
//! this crate's own encoder/axis/pointing/motor types in place of the SHM
//! segments the donor read from.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use mount_hal::encoder::Encoder;
use mount_hal::motor::MotorDriver;
use tracing::{debug, warn};

use crate::axis::RotAxis;
use crate::config::MountControlConfig;
use crate::control::{fold_error_deg, motor_command, on_target};
use crate::error::ControlError;
use crate::state_machine::{PointingController, PointingState, TargetSystem};
use crate::transform::{equ_to_hor, hor_to_equ, HorizontalCoords};

/// O(1) per-cycle timing statistics, mirroring the donor's `CycleStats`.
#[derive(Debug, Clone, Default)]
pub struct CycleStats {
    pub cycle_count: u64,
    pub last_cycle_us: u64,
    pub max_cycle_us: u64,
    pub overruns: u64,
}

impl CycleStats {
    fn record(&mut self, duration_us: u64, budget_us: u64) {
        self.cycle_count += 1;
        self.last_cycle_us = duration_us;
        if duration_us > self.max_cycle_us {
            self.max_cycle_us = duration_us;
        }
        if duration_us > budget_us {
            self.overruns += 1;
        }
    }
}

/// Runtime state for one axis's turn accounting.
struct AxisTurns {
    gear_ratio: f64,
    offset_turns: f64,
    max_overturn: f64,
}

impl AxisTurns {
    fn abs_turns(&self, encoder_turns: f64) -> f64 {
        encoder_turns / self.gear_ratio + self.offset_turns
    }
}

/// Owns the hardware handles, pointing state machine and timing stats for
/// the 200 ms poll cycle.
pub struct PollCycle {
    config: MountControlConfig,
    enc_az: Arc<Encoder>,
    enc_alt: Arc<Encoder>,
    motor_az: Arc<MotorDriver>,
    motor_alt: Arc<MotorDriver>,
    az_turns: AxisTurns,
    alt_turns: AxisTurns,
    /// Folds `current_hor.az_deg` into `[0, 360)` (C2).
    az_axis: RotAxis,
    /// Folds `current_hor.alt_deg` into `[-90, 90]` (C2); its flip
    /// callback mirrors a zenith-crossing reflection onto the azimuth
    /// axis by adding a half turn, per the "gimbal flip" pairing.
    alt_axis: RotAxis,
    /// Flip count accumulated by `alt_axis`'s callback since it was last
    /// drained, applied to `az_axis` as whole half-turns in [`tick`].
    pending_az_flips: Arc<AtomicU64>,
    pointing: PointingController,
    stats: CycleStats,
}

impl PollCycle {
    pub fn new(
        config: MountControlConfig,
        enc_az: Arc<Encoder>,
        enc_alt: Arc<Encoder>,
        motor_az: Arc<MotorDriver>,
        motor_alt: Arc<MotorDriver>,
    ) -> Self {
        let az_turns = AxisTurns {
            gear_ratio: config.azimuth.gear_ratio,
            offset_turns: config.azimuth.offset_turns,
            max_overturn: config.azimuth_max_overturn(),
        };
        let alt_turns = AxisTurns {
            gear_ratio: config.altitude.gear_ratio,
            offset_turns: config.altitude.offset_turns,
            max_overturn: config.altitude_max_overturn(),
        };
        let park_position = config.park_position;

        let az_axis = RotAxis::degrees(0.0, 360.0);
        let mut alt_axis = RotAxis::degrees(-90.0, 90.0);
        let pending_az_flips = Arc::new(AtomicU64::new(0));
        let counter = pending_az_flips.clone();
        alt_axis.register_flip_callback(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        PollCycle {
            config,
            enc_az,
            enc_alt,
            motor_az,
            motor_alt,
            az_turns,
            alt_turns,
            az_axis,
            alt_axis,
            pending_az_flips,
            pointing: PointingController::new(park_position),
            stats: CycleStats::default(),
        }
    }

    pub fn pointing(&mut self) -> &mut PointingController {
        &mut self.pointing
    }

    pub fn current_hor(&self) -> HorizontalCoords {
        HorizontalCoords {
            az_deg: self.az_axis.value(),
            alt_deg: self.alt_axis.value(),
        }
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Pick whichever of `dx` and its complementary wrap `dx ∓ 360°` keeps
    /// the resulting absolute-turns projection inside `±(0.5 +
    /// max_overturn)` (the spec's axis-range guard, applied symmetrically
    /// at ±0.25 for altitude via the caller-supplied `half_range`).
    fn guarded_error(abs_turns: f64, dx: f64, half_range: f64, max_overturn: f64) -> f64 {
        let limit = half_range + max_overturn;
        let candidate_turns = abs_turns + dx / 360.0;
        if candidate_turns.abs() <= limit {
            return dx;
        }
        let alt_dx = if dx > 0.0 { dx - 360.0 } else { dx + 360.0 };
        let alt_turns = abs_turns + alt_dx / 360.0;
        if alt_turns.abs() < candidate_turns.abs() {
            alt_dx
        } else {
            dx
        }
    }

    /// Execute one 200 ms poll cycle. `now` is supplied by the caller so
    /// tests can drive the transform deterministically.
    pub fn tick(&mut self, now: SystemTime) -> Result<(), ControlError> {
        let start = Instant::now();

        // 1. Refresh encoders, compute absolute turns.
        let abs_turns_az = self
            .az_turns
            .abs_turns(self.enc_az.absolute_position(self.config.azimuth.encoder.st_bits));
        let abs_turns_alt = self
            .alt_turns
            .abs_turns(self.enc_alt.absolute_position(self.config.altitude.encoder.st_bits));

        // 2. Update current_hor via the C2 axis values, folding each
        // through its RotAxis. A reflection on the altitude axis (crossing
        // zenith/nadir) mirrors onto azimuth as a half-turn, per the
        // gimbal-flip pairing.
        self.az_axis.set_value(360.0 * abs_turns_az);
        self.alt_axis.set_value(360.0 * abs_turns_alt);
        let flips = self.pending_az_flips.swap(0, Ordering::Relaxed);
        for _ in 0..flips {
            self.az_axis.flip();
        }
        let current_hor = self.current_hor();

        // 3. If slewing/tracking/parking, drive the motors.
        if matches!(
            self.pointing.state(),
            PointingState::Slewing | PointingState::Tracking | PointingState::Parking
        ) {
            let target_hor = match self.pointing.target_system() {
                Some(TargetSystem::Equatorial) => {
                    let equ = self.pointing.target_equ().expect("equatorial target set");
                    equ_to_hor(equ, now, self.config.location)
                }
                _ => self.pointing.target_hor().unwrap_or(current_hor),
            };

            let raw_dx = fold_error_deg(target_hor.az_deg - current_hor.az_deg);
            let dy = fold_error_deg(target_hor.alt_deg - current_hor.alt_deg);

            let dx = Self::guarded_error(abs_turns_az, raw_dx, 0.5, self.az_turns.max_overturn);

            let az_cmd = motor_command(dx, self.config.azimuth_throttle());
            let alt_cmd = motor_command(dy, self.config.altitude_throttle());
            self.motor_az.set_target(az_cmd);
            self.motor_alt.set_target(alt_cmd);

            if on_target(dx) && on_target(dy) {
                match self.pointing.state() {
                    PointingState::Slewing => {
                        let _ = self.pointing.abort();
                    }
                    PointingState::Parking => {
                        let _ = self.pointing.position_reached();
                    }
                    _ => {}
                }
            }
        }

        // 4. Motor status / fault publication.
        if self.motor_az.is_fault() {
            warn!(axis = "az", "motor fault asserted");
        }
        if self.motor_alt.is_fault() {
            warn!(axis = "alt", "motor fault asserted");
        }

        let duration_us = start.elapsed().as_micros() as u64;
        self.stats.record(duration_us, self.config.poll_period_ms * 1000);
        if self.stats.overruns > 0 && self.stats.overruns % 50 == 1 {
            debug!(overruns = self.stats.overruns, "poll cycle overrun");
        }
        Ok(())
    }

    /// Resolve the current equatorial coordinates, for callers that want
    /// to start tracking from the present position.
    pub fn current_equ(&self, now: SystemTime) -> crate::transform::EquatorialCoords {
        hor_to_equ(self.current_hor(), now, self.config.location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn az_axis_folds_into_0_360() {
        let mut axis = RotAxis::degrees(0.0, 360.0);
        axis.set_value(370.0);
        assert!((axis.value() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn alt_flip_is_mirrored_onto_azimuth() {
        // Crossing the altitude axis's upper bound (zenith) reflects it
        // and should bump the pending flip counter that `tick` drains
        // onto the azimuth axis.
        let mut az_axis = RotAxis::degrees(0.0, 360.0);
        let mut alt_axis = RotAxis::degrees(-90.0, 90.0);
        let pending = Arc::new(AtomicU64::new(0));
        let counter = pending.clone();
        alt_axis.register_flip_callback(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        az_axis.set_value(10.0);
        alt_axis.set_value(135.0);
        assert_eq!(pending.load(Ordering::Relaxed), 1);

        let flips = pending.swap(0, Ordering::Relaxed);
        for _ in 0..flips {
            az_axis.flip();
        }
        assert!((az_axis.value() - 190.0).abs() < 1e-9);
    }

    #[test]
    fn guarded_error_prefers_path_within_overturn_limit() {
        // Near the +0.5 turn limit, a further positive step should wrap
        // the other way if that keeps it inside range.
        let dx = PollCycle::guarded_error(0.49, 10.0, 0.5, 0.0);
        assert!(dx < 0.0, "expected the complementary wrap, got {dx}");
    }

    #[test]
    fn guarded_error_keeps_direct_path_when_within_limit() {
        let dx = PollCycle::guarded_error(0.0, 10.0, 0.5, 0.0);
        assert_eq!(dx, 10.0);
    }

    #[test]
    fn cycle_stats_count_overruns() {
        let mut stats = CycleStats::default();
        stats.record(300_000, 200_000);
        stats.record(100_000, 200_000);
        assert_eq!(stats.cycle_count, 2);
        assert_eq!(stats.overruns, 1);
    }
}
