//! Voltage and temperature monitors (C6).
//!
//! Periodic samplers: one over an ADC channel (`VoltageMonitor` in
//! `pirt/voltage_monitor.h`), one over sysfs thermal-zone entries
//! (`RpiTemperatureMonitor` in `pirt/rpi_temperatures.h`). Both publish
//! their latest value via a registered callback, matching the originals'
//! `registerVoltageReadyCallback` / `registerTempReadyCallback`.

use crate::adc::AdcSampler;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Periodic voltage sampler over one ADC channel with a nominal/divider
/// scale, publishing via callback on every sample.
pub struct VoltageMonitor {
    adc: Arc<AdcSampler>,
    nominal_voltage: f64,
    on_ready: Mutex<Option<Box<dyn Fn(f64) + Send>>>,
}

impl VoltageMonitor {
    pub fn new(adc: Arc<AdcSampler>, nominal_voltage: f64) -> Self {
        VoltageMonitor {
            adc,
            nominal_voltage,
            on_ready: Mutex::new(None),
        }
    }

    pub fn register_ready_callback(&self, f: impl Fn(f64) + Send + 'static) {
        *self.on_ready.lock().expect("callback mutex poisoned") = Some(Box::new(f));
    }

    pub fn current_voltage(&self) -> f64 {
        let v = self.adc.current_value();
        if let Some(cb) = self.on_ready.lock().expect("callback mutex poisoned").as_ref() {
            cb(v);
        }
        v
    }

    pub fn mean_voltage(&self) -> f64 {
        self.adc.mean_value()
    }

    pub fn nominal_voltage(&self) -> f64 {
        self.nominal_voltage
    }

    /// A reading more than 20% away from nominal is treated as a fault,
    /// mirroring the original monitor's bus-supervisory role.
    pub fn is_fault(&self) -> bool {
        if self.nominal_voltage == 0.0 {
            return false;
        }
        let deviation = (self.current_voltage() - self.nominal_voltage).abs() / self.nominal_voltage;
        deviation > 0.2
    }
}

/// A single thermal zone reading.
#[derive(Debug, Clone)]
pub struct TemperatureItem {
    pub name: String,
    pub path: String,
    pub temperature_c: f64,
    pub valid: bool,
}

/// Reads `temp` entries under a sysfs thermal-zone subsystem path, one
/// background sample per `period`.
pub struct TemperatureMonitor {
    items: Arc<Mutex<Vec<TemperatureItem>>>,
    active: Arc<std::sync::atomic::AtomicBool>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl TemperatureMonitor {
    /// `read_fn` abstracts the actual sysfs read so tests can substitute a
    /// deterministic source instead of `/sys/class/thermal/...`.
    pub fn start(
        zones: Vec<(String, String)>,
        period: Duration,
        read_fn: impl Fn(&str) -> Option<f64> + Send + Sync + 'static,
    ) -> Self {
        let items = Arc::new(Mutex::new(
            zones
                .iter()
                .map(|(name, path)| TemperatureItem {
                    name: name.clone(),
                    path: path.clone(),
                    temperature_c: 0.0,
                    valid: false,
                })
                .collect::<Vec<_>>(),
        ));
        let active = Arc::new(std::sync::atomic::AtomicBool::new(true));

        let thread_items = items.clone();
        let thread_active = active.clone();
        let join = std::thread::spawn(move || {
            use std::sync::atomic::Ordering;
            while thread_active.load(Ordering::Acquire) {
                {
                    let mut list = thread_items.lock().expect("temperature mutex poisoned");
                    for item in list.iter_mut() {
                        match read_fn(&item.path) {
                            Some(t) => {
                                item.temperature_c = t;
                                item.valid = true;
                            }
                            None => item.valid = false,
                        }
                    }
                }
                std::thread::sleep(period);
            }
        });

        TemperatureMonitor {
            items,
            active,
            join: Some(join),
        }
    }

    pub fn nr_sources(&self) -> usize {
        self.items.lock().expect("temperature mutex poisoned").len()
    }

    pub fn item(&self, index: usize) -> Option<TemperatureItem> {
        self.items
            .lock()
            .expect("temperature mutex poisoned")
            .get(index)
            .cloned()
    }
}

impl Drop for TemperatureMonitor {
    fn drop(&mut self) {
        self.active.store(false, std::sync::atomic::Ordering::Release);
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;

    #[test]
    fn voltage_monitor_flags_large_deviation_as_fault() {
        let bus = Arc::new(Bus::connect().unwrap());
        let _handle = bus.i2c_open(crate::adc::ADC_I2C_ADDRESS).unwrap();
        bus.i2c_write_register(crate::adc::ADC_I2C_ADDRESS, 0, &0i16.to_be_bytes())
            .unwrap();
        let adc = Arc::new(
            AdcSampler::start("12v", bus, 0, 1.0, Duration::from_millis(5), Duration::from_secs(1)).unwrap(),
        );
        std::thread::sleep(Duration::from_millis(30));

        let monitor = VoltageMonitor::new(adc, 12.0);
        assert!(monitor.is_fault());
    }

    #[test]
    fn temperature_monitor_reads_registered_zones() {
        let monitor = TemperatureMonitor::start(
            vec![("cpu".to_string(), "zone0".to_string())],
            Duration::from_millis(5),
            |path| if path == "zone0" { Some(42.5) } else { None },
        );
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(monitor.nr_sources(), 1);
        let item = monitor.item(0).unwrap();
        assert!(item.valid);
        assert!((item.temperature_c - 42.5).abs() < 1e-9);
    }
}
