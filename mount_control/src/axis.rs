//! Rotational axis value (C2).
//!
//! A real number on a cyclic range of period `P`, bounded by `[min, max]`.
//! Grounded on `PiRaTe::RotAxis` (`pirt/axis.h` / `axis.cpp`): reduce-then-
//! reflect assignment algorithm with a registered gimbal-flip callback for
//! the paired axis.

use std::f64::consts::TAU;

/// Maximum number of reflection iterations per assignment before giving up;
/// divergence beyond this is prevented by construction (`min < max`,
/// `period != 0`).
const MAX_REFLECTIONS: u32 = 10;

/// A value living on a periodic axis `[min, max]` with period `period`.
pub struct RotAxis {
    period: f64,
    value: f64,
    min: f64,
    max: f64,
    flip_count: u64,
    on_flip: Option<Box<dyn FnMut() + Send>>,
}

impl RotAxis {
    /// Construct a new axis. `period` defaults to `2*pi` (full turn) when
    /// expressed in radians; callers working in degrees pass `360.0`.
    ///
    /// # Panics
    ///
    /// Panics if `min >= max` or `period == 0.0`, matching the original's
    /// constructor-time invariant.
    pub fn new(min: f64, max: f64, period: f64) -> Self {
        assert!(min < max, "RotAxis requires min < max");
        assert!(period != 0.0, "RotAxis requires a nonzero period");
        RotAxis {
            period,
            value: 0.0,
            min,
            max,
            flip_count: 0,
            on_flip: None,
        }
    }

    /// Convenience constructor for a degrees-valued axis with period 360.
    pub fn degrees(min: f64, max: f64) -> Self {
        Self::new(min, max, 360.0)
    }

    /// Convenience constructor for a radians-valued axis with period `2*pi`.
    pub fn radians(min: f64, max: f64) -> Self {
        Self::new(min, max, TAU)
    }

    /// Register the flip callback invoked once per reflection during
    /// assignment (e.g. mirroring a complementary axis on gimbal flip).
    pub fn register_flip_callback(&mut self, f: impl FnMut() + Send + 'static) {
        self.on_flip = Some(Box::new(f));
    }

    /// Reduce `arg` (a fraction of one period) to its principal value in
    /// `[0, 1)`.
    fn reduce_to_principal(arg: f64) -> f64 {
        let mut v = arg - arg.floor();
        if v < 0.0 {
            v += 1.0;
        }
        v
    }

    /// Assign a new value, folding it into `[min, max]` per the original's
    /// reduce-then-reflect algorithm.
    pub fn set_value(&mut self, val: f64) {
        let mut v = Self::reduce_to_principal(val / self.period);
        if self.min < 0.0 && v > 0.5 {
            v -= 1.0;
        }
        v *= self.period;

        for _ in 0..MAX_REFLECTIONS {
            if v > self.max {
                v = 2.0 * self.max - v;
                self.flip_count += 1;
                if let Some(cb) = self.on_flip.as_mut() {
                    cb();
                }
            } else if v < self.min {
                v = 2.0 * self.min - v;
                self.flip_count += 1;
                if let Some(cb) = self.on_flip.as_mut() {
                    cb();
                }
            } else {
                break;
            }
        }
        self.value = v;
    }

    /// Current raw value, in the axis's own unit (degrees/radians/hours
    /// depending on how it was constructed).
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Number of reflections performed across the axis's lifetime.
    pub fn flip_count(&self) -> u64 {
        self.flip_count
    }

    /// Explicit flip: add half a period and reassign.
    pub fn flip(&mut self) {
        let v = self.value + self.period / 2.0;
        self.set_value(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_stays_within_bounds_after_assignment() {
        let mut axis = RotAxis::degrees(-90.0, 90.0);
        axis.set_value(450.0);
        assert!(axis.value() >= -90.0 && axis.value() <= 90.0);
    }

    #[test]
    fn in_range_value_is_unchanged_modulo_period() {
        let mut axis = RotAxis::degrees(0.0, 360.0);
        axis.set_value(45.0);
        assert!((axis.value() - 45.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_assignment_increments_flip_count() {
        let mut axis = RotAxis::degrees(-90.0, 90.0);
        axis.set_value(135.0);
        assert_eq!(axis.flip_count(), 1);
    }

    #[test]
    fn flip_callback_is_invoked_on_reflection() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let mut axis = RotAxis::degrees(-90.0, 90.0);
        axis.register_flip_callback(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        axis.set_value(135.0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic]
    fn constructing_with_min_ge_max_panics() {
        RotAxis::degrees(90.0, -90.0);
    }

    #[test]
    fn explicit_flip_adds_half_period() {
        let mut axis = RotAxis::degrees(0.0, 360.0);
        axis.set_value(10.0);
        axis.flip();
        assert!((axis.value() - 190.0).abs() < 1e-9);
    }
}
