//! Error types for the hardware abstraction layer.

use thiserror::Error;

/// Errors returned by [`crate::bus::Bus`] operations and the drivers built
/// on top of it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HalError {
    /// The underlying daemon/device connection could not be established.
    #[error("bus connect failed: {0}")]
    ConnectFailed(String),

    /// An operation was attempted on a handle that failed to connect.
    #[error("operation on invalid handle")]
    InvalidHandle,

    /// A read returned fewer bytes than requested.
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Number of bytes requested.
        expected: usize,
        /// Number of bytes actually returned.
        actual: usize,
    },

    /// A write failed to complete.
    #[error("bus write failed: {0}")]
    WriteFailed(String),

    /// The pin requested is out of the configured range.
    #[error("pin {0} out of range")]
    InvalidPin(u32),

    /// The I2C device address is outside the 7-bit address space.
    #[error("invalid i2c address: {0:#04x}")]
    InvalidI2cAddress(u8),
}
