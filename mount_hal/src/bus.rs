//! GPIO / SPI / I²C facade (C1).
//!
//! Uniform access to pins, PWM (soft + hardware), the shift-in bus used by
//! absolute encoders, and the I²C bus used by the ADC. Every transfer is
//! serialised through a single mutex, matching the original `GPIO` class's
//! contract: non-bus operations (pin direction, level, PWM value) are also
//! routed through the same lock to avoid reordering against bus transfers
//! on the same daemon connection.

use crate::error::HalError;
use std::sync::Mutex;

/// Identifies which of the two hardware-PWM-capable pins is addressed.
/// Other pin numbers fall back to software PWM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PwmPin {
    /// First hardware PWM channel.
    Hw1,
    /// Second hardware PWM channel.
    Hw2,
    /// Any other pin, driven with software PWM.
    Soft(u32),
}

/// SPI clock polarity/phase combinations, named after the original `GPIO`
/// class's `SPI_MODE` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum SpiMode {
    Pol0Pha0,
    Pol0Pha1,
    #[default]
    Pol1Pha1,
    Pol1Pha0,
}

/// Which of the two SPI peripherals (main or auxiliary) to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SpiInterface {
    Main,
    Aux,
}

/// A handle into the bus facade. `None` (sentinel -1 in the original)
/// indicates a failed connect; all subsequent operations on it fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusHandle(Option<u32>);

impl BusHandle {
    fn failed() -> Self {
        BusHandle(None)
    }

    fn is_valid(self) -> bool {
        self.0.is_some()
    }
}

/// Software PWM state for a single pin.
#[derive(Debug, Clone, Copy)]
struct SoftPwmChannel {
    frequency_hz: u32,
    range: u32,
    duty: u32,
}

/// Inner state guarded by the bus mutex.
struct BusState {
    next_handle: u32,
    spi_open: bool,
    i2c_open: bool,
    hw_pwm: [u32; 2],
    soft_pwm: Vec<(u32, SoftPwmChannel)>,
    pin_levels: Vec<(u32, bool)>,
    /// Bytes to hand back on the next `spi_read`; used by tests and the
    /// simulation backend to script encoder/ADC frames.
    spi_rx_queue: Vec<Vec<u8>>,
    i2c_registers: std::collections::HashMap<(u8, u8), Vec<u8>>,
}

impl BusState {
    fn new() -> Self {
        BusState {
            next_handle: 0,
            spi_open: false,
            i2c_open: false,
            hw_pwm: [0, 0],
            soft_pwm: Vec::new(),
            pin_levels: Vec::new(),
            spi_rx_queue: Vec::new(),
            i2c_registers: std::collections::HashMap::new(),
        }
    }
}

/// The shared GPIO/SPI/I²C facade. Cheap to clone (an `Arc` internally)
/// so every encoder/motor/sampler thread can hold its own handle to the
/// same underlying connection.
pub struct Bus {
    state: Mutex<BusState>,
}

impl Bus {
    /// Connect to the bus daemon. In production this would dial
    /// `pigpiod`/`lgpio`; here it establishes the in-process mutex-guarded
    /// state that every operation serialises through.
    pub fn connect() -> Result<Self, HalError> {
        Ok(Bus {
            state: Mutex::new(BusState::new()),
        })
    }

    /// Set the logical direction of a pin is a no-op at this facade layer
    /// (the original delegates to the daemon); retained for interface
    /// completeness and tested against level read/write round-trips.
    pub fn set_pin_level(&self, pin: u32, level: bool) -> Result<(), HalError> {
        let mut state = self.state.lock().expect("bus mutex poisoned");
        if let Some(entry) = state.pin_levels.iter_mut().find(|(p, _)| *p == pin) {
            entry.1 = level;
        } else {
            state.pin_levels.push((pin, level));
        }
        Ok(())
    }

    /// Read the last level set (or `false` default) for a pin. Used for
    /// active-low fault inputs.
    pub fn read_pin_level(&self, pin: u32) -> Result<bool, HalError> {
        let state = self.state.lock().expect("bus mutex poisoned");
        Ok(state
            .pin_levels
            .iter()
            .find(|(p, _)| *p == pin)
            .map(|(_, lvl)| *lvl)
            .unwrap_or(false))
    }

    /// Configure PWM frequency and duty-cycle range for a software PWM
    /// channel, or select the hardware path for `HW_PWM1`/`HW_PWM2`.
    pub fn configure_pwm(&self, pin: PwmPin, frequency_hz: u32, range: u32) -> Result<(), HalError> {
        let mut state = self.state.lock().expect("bus mutex poisoned");
        if let PwmPin::Soft(p) = pin {
            if let Some((_, chan)) = state.soft_pwm.iter_mut().find(|(sp, _)| *sp == p) {
                chan.frequency_hz = frequency_hz;
                chan.range = range;
            } else {
                state.soft_pwm.push((
                    p,
                    SoftPwmChannel {
                        frequency_hz,
                        range,
                        duty: 0,
                    },
                ));
            }
        }
        Ok(())
    }

    /// Write a duty-cycle value. Hardware path for `HW_PWM1`/`HW_PWM2`
    /// (range 0..=1_000_000), software path otherwise (range 0..=configured
    /// range, default 255).
    pub fn set_pwm_value(&self, pin: PwmPin, duty: u32) -> Result<(), HalError> {
        let mut state = self.state.lock().expect("bus mutex poisoned");
        match pin {
            PwmPin::Hw1 => state.hw_pwm[0] = duty,
            PwmPin::Hw2 => state.hw_pwm[1] = duty,
            PwmPin::Soft(p) => {
                if let Some((_, chan)) = state.soft_pwm.iter_mut().find(|(sp, _)| *sp == p) {
                    chan.duty = duty;
                } else {
                    state.soft_pwm.push((
                        p,
                        SoftPwmChannel {
                            frequency_hz: 0,
                            range: 255,
                            duty,
                        },
                    ));
                }
            }
        }
        Ok(())
    }

    /// Read back the last PWM duty value written to `pin`.
    pub fn pwm_value(&self, pin: PwmPin) -> u32 {
        let state = self.state.lock().expect("bus mutex poisoned");
        match pin {
            PwmPin::Hw1 => state.hw_pwm[0],
            PwmPin::Hw2 => state.hw_pwm[1],
            PwmPin::Soft(p) => state
                .soft_pwm
                .iter()
                .find(|(sp, _)| *sp == p)
                .map(|(_, c)| c.duty)
                .unwrap_or(0),
        }
    }

    /// Open the shift-in (SPI) channel used by absolute encoders. Returns a
    /// failed handle if the daemon/device is unavailable.
    pub fn spi_open(
        &self,
        _interface: SpiInterface,
        _channel: u8,
        _mode: SpiMode,
        _baudrate_hz: u32,
    ) -> BusHandle {
        let mut state = self.state.lock().expect("bus mutex poisoned");
        state.spi_open = true;
        let h = state.next_handle;
        state.next_handle += 1;
        BusHandle(Some(h))
    }

    /// Read `n` bytes from the shift-in bus. Returns `ShortRead` if fewer
    /// than `n` bytes are available, which callers must treat as failure.
    pub fn spi_read(&self, handle: BusHandle, n: usize) -> Result<Vec<u8>, HalError> {
        if !handle.is_valid() {
            return Err(HalError::InvalidHandle);
        }
        let mut state = self.state.lock().expect("bus mutex poisoned");
        if !state.spi_open {
            return Err(HalError::InvalidHandle);
        }
        let frame = state.spi_rx_queue.pop();
        match frame {
            Some(bytes) if bytes.len() == n => Ok(bytes),
            Some(bytes) => Err(HalError::ShortRead {
                expected: n,
                actual: bytes.len(),
            }),
            None => Err(HalError::ShortRead {
                expected: n,
                actual: 0,
            }),
        }
    }

    /// Enqueue a frame to be returned by the next `spi_read`. Used by the
    /// simulation backend and by tests that exercise encoder/ADC readers
    /// without real hardware.
    pub fn push_spi_frame(&self, frame: Vec<u8>) {
        let mut state = self.state.lock().expect("bus mutex poisoned");
        state.spi_rx_queue.insert(0, frame);
    }

    pub fn spi_close(&self, _handle: BusHandle) {
        let mut state = self.state.lock().expect("bus mutex poisoned");
        state.spi_open = false;
    }

    /// Open an I²C device at a 7-bit address.
    pub fn i2c_open(&self, address: u8) -> Result<BusHandle, HalError> {
        if address > 0x7F {
            return Err(HalError::InvalidI2cAddress(address));
        }
        let mut state = self.state.lock().expect("bus mutex poisoned");
        state.i2c_open = true;
        let h = state.next_handle;
        state.next_handle += 1;
        Ok(BusHandle(Some(h)))
    }

    /// Write a register on the I²C device identified by `address`.
    pub fn i2c_write_register(&self, address: u8, register: u8, data: &[u8]) -> Result<(), HalError> {
        let mut state = self.state.lock().expect("bus mutex poisoned");
        state
            .i2c_registers
            .insert((address, register), data.to_vec());
        Ok(())
    }

    /// Read a register range on the I²C device identified by `address`.
    pub fn i2c_read_register(&self, address: u8, register: u8, len: usize) -> Result<Vec<u8>, HalError> {
        let state = self.state.lock().expect("bus mutex poisoned");
        match state.i2c_registers.get(&(address, register)) {
            Some(bytes) if bytes.len() >= len => Ok(bytes[..len].to_vec()),
            Some(bytes) => Err(HalError::ShortRead {
                expected: len,
                actual: bytes.len(),
            }),
            None => Err(HalError::ShortRead {
                expected: len,
                actual: 0,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_level_round_trips() {
        let bus = Bus::connect().unwrap();
        bus.set_pin_level(17, true).unwrap();
        assert!(bus.read_pin_level(17).unwrap());
        bus.set_pin_level(17, false).unwrap();
        assert!(!bus.read_pin_level(17).unwrap());
    }

    #[test]
    fn unset_pin_reads_false() {
        let bus = Bus::connect().unwrap();
        assert!(!bus.read_pin_level(99).unwrap());
    }

    #[test]
    fn hardware_pwm_value_round_trips() {
        let bus = Bus::connect().unwrap();
        bus.set_pwm_value(PwmPin::Hw1, 500_000).unwrap();
        assert_eq!(bus.pwm_value(PwmPin::Hw1), 500_000);
        assert_eq!(bus.pwm_value(PwmPin::Hw2), 0);
    }

    #[test]
    fn soft_pwm_value_round_trips() {
        let bus = Bus::connect().unwrap();
        bus.configure_pwm(PwmPin::Soft(12), 20_000, 255).unwrap();
        bus.set_pwm_value(PwmPin::Soft(12), 128).unwrap();
        assert_eq!(bus.pwm_value(PwmPin::Soft(12)), 128);
    }

    #[test]
    fn spi_short_read_is_an_error() {
        let bus = Bus::connect().unwrap();
        let handle = bus.spi_open(SpiInterface::Main, 0, SpiMode::default(), 500_000);
        bus.push_spi_frame(vec![1, 2, 3]);
        let err = bus.spi_read(handle, 4).unwrap_err();
        assert_eq!(
            err,
            HalError::ShortRead {
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn spi_read_on_invalid_handle_fails() {
        let bus = Bus::connect().unwrap();
        let err = bus.spi_read(BusHandle::failed(), 4).unwrap_err();
        assert_eq!(err, HalError::InvalidHandle);
    }

    #[test]
    fn spi_full_frame_round_trips() {
        let bus = Bus::connect().unwrap();
        let handle = bus.spi_open(SpiInterface::Main, 0, SpiMode::default(), 500_000);
        bus.push_spi_frame(vec![0xAA, 0xBB, 0xCC, 0xDD]);
        let data = bus.spi_read(handle, 4).unwrap();
        assert_eq!(data, vec![0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn i2c_register_round_trips() {
        let bus = Bus::connect().unwrap();
        let address = 0x48;
        let _handle = bus.i2c_open(address).unwrap();
        bus.i2c_write_register(address, 0x00, &[0x01, 0x02]).unwrap();
        let data = bus.i2c_read_register(address, 0x00, 2).unwrap();
        assert_eq!(data, vec![0x01, 0x02]);
    }

    #[test]
    fn i2c_address_out_of_range_rejected() {
        let bus = Bus::connect().unwrap();
        let err = bus.i2c_open(0x80).unwrap_err();
        assert_eq!(err, HalError::InvalidI2cAddress(0x80));
    }
}
