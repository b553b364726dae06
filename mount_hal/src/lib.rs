//! # Mount HAL
//!
//! Hardware abstraction layer for the mount: the GPIO/SPI/I²C facade (C1),
//! the encoder reader (C3), the ADC sampler (C4), the motor driver (C5)
//! and the voltage/temperature monitors (C6).
//!
//! `mount_control` links this crate directly and spawns one OS thread per
//! encoder/motor/sampler instance against the shared [`bus::Bus`] facade.
//!
//! # Module Structure
//!
//! - [`bus`] - shared GPIO/SPI/I²C facade
//! - [`encoder`] - absolute rotary encoder reader
//! - [`adc`] - windowed-mean ADC sampler
//! - [`motor`] - ramp-loop motor driver
//! - [`monitor`] - voltage/temperature monitors built on [`adc`]
//! - [`error`] - shared error type

pub mod adc;
pub mod bus;
pub mod encoder;
pub mod error;
pub mod monitor;
pub mod motor;

pub use error::HalError;
