//! Pointing controller state machine (C7, transition table).
//!
//! Grounded on `evo_control_unit`'s `MachineStateMachine`/`MachineEvent`
//! pattern: a small enum-keyed transition table returning an explicit
//! `TransitionResult`, rejecting everything the table doesn't name rather
//! than silently ignoring it.

use crate::transform::{EquatorialCoords, HorizontalCoords};

/// Pointing controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointingState {
    Idle,
    Slewing,
    Tracking,
    Parking,
    Parked,
}

/// Coordinate system a commanded target is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSystem {
    Horizontal,
    Equatorial,
}

/// Event driving a pointing controller transition.
#[derive(Debug, Clone, Copy)]
pub enum PointingEvent {
    /// `goto(EQU)`/`goto(HOR)`. Rejected if altitude is below the horizon
    /// (for horizontal targets; equatorial targets are resolved to
    /// horizontal by the caller before this check).
    Goto { system: TargetSystem, below_horizon: bool },
    Abort,
    SetTracking { below_horizon: bool },
    Park,
    PositionReached,
    Unpark,
}

/// Result of a [`PointingState`] transition attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    Ok(PointingState),
    Rejected(&'static str),
}

/// The pointing controller's state plus the target remembered across
/// poll cycles while slewing/tracking/parking.
pub struct PointingController {
    state: PointingState,
    /// State to return to on `abort` — the state the controller was in
    /// before the current SLEWING/PARKING excursion began.
    prior_state: PointingState,
    target_system: Option<TargetSystem>,
    target_hor: Option<HorizontalCoords>,
    target_equ: Option<EquatorialCoords>,
    park_position: HorizontalCoords,
}

impl PointingController {
    pub fn new(park_position: HorizontalCoords) -> Self {
        PointingController {
            state: PointingState::Idle,
            prior_state: PointingState::Idle,
            target_system: None,
            target_hor: None,
            target_equ: None,
            park_position,
        }
    }

    pub fn state(&self) -> PointingState {
        self.state
    }

    pub fn target_system(&self) -> Option<TargetSystem> {
        self.target_system
    }

    pub fn target_hor(&self) -> Option<HorizontalCoords> {
        self.target_hor
    }

    pub fn target_equ(&self) -> Option<EquatorialCoords> {
        self.target_equ
    }

    /// Command a slew to a horizontal target.
    pub fn goto_hor(&mut self, target: HorizontalCoords) -> TransitionResult {
        self.handle(PointingEvent::Goto {
            system: TargetSystem::Horizontal,
            below_horizon: target.alt_deg < 0.0,
        })
        .map(|s| {
            self.target_system = Some(TargetSystem::Horizontal);
            self.target_hor = Some(target);
            self.target_equ = None;
            s
        })
    }

    /// Command a slew to an equatorial target.
    pub fn goto_equ(&mut self, target: EquatorialCoords, currently_below_horizon: bool) -> TransitionResult {
        self.handle(PointingEvent::Goto {
            system: TargetSystem::Equatorial,
            below_horizon: currently_below_horizon,
        })
        .map(|s| {
            self.target_system = Some(TargetSystem::Equatorial);
            self.target_equ = Some(target);
            self.target_hor = None;
            s
        })
    }

    /// Start tracking, capturing `current_hor`/`current_equ` as the
    /// target, per the spec's "target captured from current horizontal →
    /// equatorial".
    pub fn set_tracking(&mut self, current_equ: EquatorialCoords, below_horizon: bool) -> TransitionResult {
        self.handle(PointingEvent::SetTracking { below_horizon }).map(|s| {
            self.target_system = Some(TargetSystem::Equatorial);
            self.target_equ = Some(current_equ);
            self.target_hor = None;
            s
        })
    }

    pub fn abort(&mut self) -> TransitionResult {
        self.handle(PointingEvent::Abort)
    }

    pub fn park(&mut self) -> TransitionResult {
        self.handle(PointingEvent::Park).map(|s| {
            self.target_system = Some(TargetSystem::Horizontal);
            self.target_hor = Some(self.park_position);
            self.target_equ = None;
            s
        })
    }

    pub fn position_reached(&mut self) -> TransitionResult {
        self.handle(PointingEvent::PositionReached)
    }

    pub fn unpark(&mut self) -> TransitionResult {
        self.handle(PointingEvent::Unpark)
    }

    fn handle(&mut self, event: PointingEvent) -> TransitionResult {
        use PointingState::*;

        let next = match (self.state, event) {
            (Idle, PointingEvent::Goto { below_horizon: false, .. })
            | (Tracking, PointingEvent::Goto { below_horizon: false, .. }) => {
                self.prior_state = self.state;
                Slewing
            }
            (_, PointingEvent::Goto { below_horizon: true, .. }) => {
                return TransitionResult::Rejected("target is below the horizon");
            }

            (_, PointingEvent::Abort) => self.prior_state,

            (Idle, PointingEvent::SetTracking { below_horizon: false }) => Tracking,
            (Idle, PointingEvent::SetTracking { below_horizon: true }) => {
                return TransitionResult::Rejected("target is below the horizon");
            }

            (Idle, PointingEvent::Park) | (Tracking, PointingEvent::Park) | (Slewing, PointingEvent::Park) => {
                self.prior_state = self.state;
                Parking
            }

            (Parking, PointingEvent::PositionReached) => Parked,

            (Parked, PointingEvent::Unpark) => Idle,

            _ => return TransitionResult::Rejected("event not valid in current state"),
        };

        self.state = next;
        TransitionResult::Ok(next)
    }
}

impl TransitionResult {
    fn map(self, f: impl FnOnce(PointingState) -> PointingState) -> TransitionResult {
        match self {
            TransitionResult::Ok(s) => TransitionResult::Ok(f(s)),
            rejected => rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equ(ra_h: f64, dec_deg: f64) -> EquatorialCoords {
        EquatorialCoords { ra_h, dec_deg }
    }

    fn hor(az_deg: f64, alt_deg: f64) -> HorizontalCoords {
        HorizontalCoords { az_deg, alt_deg }
    }

    #[test]
    fn idle_goto_above_horizon_slews() {
        let mut pc = PointingController::new(hor(180.0, 89.5));
        assert_eq!(pc.goto_hor(hor(95.0, 45.0)), TransitionResult::Ok(PointingState::Slewing));
    }

    #[test]
    fn idle_goto_below_horizon_is_rejected() {
        let mut pc = PointingController::new(hor(180.0, 89.5));
        assert!(matches!(pc.goto_hor(hor(95.0, -5.0)), TransitionResult::Rejected(_)));
    }

    #[test]
    fn abort_returns_to_idle_from_slewing() {
        let mut pc = PointingController::new(hor(180.0, 89.5));
        pc.goto_hor(hor(95.0, 45.0));
        assert_eq!(pc.abort(), TransitionResult::Ok(PointingState::Idle));
    }

    #[test]
    fn abort_returns_to_tracking_when_slewing_interrupted_tracking() {
        let mut pc = PointingController::new(hor(180.0, 89.5));
        pc.set_tracking(equ(10.0, 30.0), false);
        assert_eq!(pc.state(), PointingState::Tracking);
        pc.goto_hor(hor(95.0, 45.0));
        assert_eq!(pc.state(), PointingState::Slewing);
        assert_eq!(pc.abort(), TransitionResult::Ok(PointingState::Tracking));
    }

    #[test]
    fn set_tracking_from_idle_captures_current_position() {
        let mut pc = PointingController::new(hor(180.0, 89.5));
        let current = equ(12.0, -10.0);
        assert_eq!(pc.set_tracking(current, false), TransitionResult::Ok(PointingState::Tracking));
        assert_eq!(pc.target_equ(), Some(current));
    }

    #[test]
    fn park_from_any_non_parked_state_sets_park_target() {
        let mut pc = PointingController::new(hor(180.0, 89.5));
        assert_eq!(pc.park(), TransitionResult::Ok(PointingState::Parking));
        assert_eq!(pc.target_hor(), Some(hor(180.0, 89.5)));
    }

    #[test]
    fn parking_to_parked_on_position_reached() {
        let mut pc = PointingController::new(hor(180.0, 89.5));
        pc.park();
        assert_eq!(pc.position_reached(), TransitionResult::Ok(PointingState::Parked));
    }

    #[test]
    fn parked_unparks_to_idle() {
        let mut pc = PointingController::new(hor(180.0, 89.5));
        pc.park();
        pc.position_reached();
        assert_eq!(pc.unpark(), TransitionResult::Ok(PointingState::Idle));
    }

    #[test]
    fn set_tracking_rejected_while_parked() {
        let mut pc = PointingController::new(hor(180.0, 89.5));
        pc.park();
        pc.position_reached();
        assert!(matches!(
            pc.set_tracking(equ(1.0, 1.0), false),
            TransitionResult::Rejected(_)
        ));
    }
}
