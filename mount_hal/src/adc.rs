//! ADC sampler (C4).
//!
//! Periodic background task that reads one channel of a 4-channel I²C
//! ADC, optionally keeping a time-windowed mean. Grounded on
//! `PiRaTe::Ads1115Measurement` (`pirt/ads1115_measurement.h/.cpp`): a
//! named single-channel sampler with a scale factor, an integration
//! window, and a "value ready" callback.

use crate::bus::Bus;
use crate::error::HalError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// I²C address of the ADC device (ADS1115-style, 4 single-ended channels).
pub const ADC_I2C_ADDRESS: u8 = 0x48;

/// One timestamped sample.
#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    value: f64,
}

struct Shared {
    current: f64,
    window: VecDeque<Sample>,
}

/// A single-channel periodic ADC sampler.
pub struct AdcSampler {
    name: String,
    channel: u8,
    factor: f64,
    integration_window: Duration,
    shared: Arc<Mutex<Shared>>,
    active: Arc<AtomicBool>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl AdcSampler {
    /// Start a sampler reading `channel` on `bus` every `period`, scaling
    /// raw readings by `factor` (e.g. divider ratio for a voltage input)
    /// and retaining a window of `integration_window` for [`AdcSampler::mean_value`].
    pub fn start(
        name: impl Into<String>,
        bus: Arc<Bus>,
        channel: u8,
        factor: f64,
        period: Duration,
        integration_window: Duration,
    ) -> Result<Self, HalError> {
        let shared = Arc::new(Mutex::new(Shared {
            current: 0.0,
            window: VecDeque::new(),
        }));
        let active = Arc::new(AtomicBool::new(true));

        let thread_shared = shared.clone();
        let thread_active = active.clone();
        let join = std::thread::spawn(move || {
            sample_loop(bus, channel, factor, period, integration_window, thread_shared, thread_active);
        });

        Ok(AdcSampler {
            name: name.into(),
            channel,
            factor,
            integration_window,
            shared,
            active,
            join: Some(join),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Most recent scaled reading.
    pub fn current_value(&self) -> f64 {
        self.shared.lock().expect("adc mutex poisoned").current
    }

    /// Mean of all samples within the integration window.
    pub fn mean_value(&self) -> f64 {
        let s = self.shared.lock().expect("adc mutex poisoned");
        if s.window.is_empty() {
            return 0.0;
        }
        s.window.iter().map(|sample| sample.value).sum::<f64>() / s.window.len() as f64
    }
}

impl Drop for AdcSampler {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

fn read_raw(bus: &Bus, channel: u8) -> Result<i16, HalError> {
    let register = channel;
    let bytes = bus.i2c_read_register(ADC_I2C_ADDRESS, register, 2)?;
    Ok(i16::from_be_bytes([bytes[0], bytes[1]]))
}

fn sample_loop(
    bus: Arc<Bus>,
    channel: u8,
    factor: f64,
    period: Duration,
    integration_window: Duration,
    shared: Arc<Mutex<Shared>>,
    active: Arc<AtomicBool>,
) {
    while active.load(Ordering::Acquire) {
        if let Ok(raw) = read_raw(&bus, channel) {
            let value = raw as f64 * factor;
            let now = Instant::now();
            let mut s = shared.lock().expect("adc mutex poisoned");
            s.current = value;
            s.window.push_back(Sample { at: now, value });
            while let Some(front) = s.window.front() {
                if now.duration_since(front.at) > integration_window {
                    s.window.pop_front();
                } else {
                    break;
                }
            }
        }
        std::thread::sleep(period);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_value_reflects_scaled_register() {
        let bus = Arc::new(Bus::connect().unwrap());
        let _handle = bus.i2c_open(ADC_I2C_ADDRESS).unwrap();
        bus.i2c_write_register(ADC_I2C_ADDRESS, 0, &1000i16.to_be_bytes())
            .unwrap();

        let sampler = AdcSampler::start(
            "rail-12v",
            bus,
            0,
            0.01,
            Duration::from_millis(10),
            Duration::from_secs(1),
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(60));
        assert!((sampler.current_value() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn mean_value_is_zero_with_no_samples_yet() {
        let bus = Arc::new(Bus::connect().unwrap());
        let sampler = AdcSampler::start(
            "idle",
            bus,
            1,
            1.0,
            Duration::from_secs(10),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(sampler.mean_value(), 0.0);
    }
}
