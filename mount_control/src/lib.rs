//! # Mount control
//!
//! The single-process real-time control core: the GPIO/SPI/I²C facade,
//! encoders, motors and monitors from `mount_hal` threaded together with
//! the rotational axis value (C2), coordinate transform (C8) and pointing
//! controller (C7) defined here.
//!
//! # Module Structure
//!
//! - [`axis`] - periodic bounded axis value with gimbal-flip callback (C2)
//! - [`config`] - TOML configuration
//! - [`control`] - per-axis motor command law (C7 poll cycle step 3d)
//! - [`cycle`] - 200 ms pointing controller poll cycle (C7)
//! - [`error`] - crate error type
//! - [`state_machine`] - pointing controller state machine (C7)
//! - [`transform`] - horizontal/equatorial coordinate transform (C8)

pub mod axis;
pub mod config;
pub mod control;
pub mod cycle;
pub mod error;
pub mod state_machine;
pub mod transform;
