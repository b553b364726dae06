//! Mount Common Library
//!
//! Shared constants and configuration loading utilities for the mount
//! control workspace: `mount_hal`, `mount_control` and `mount_scheduler`.
//!
//! # Module Structure
//!
//! - [`consts`] - System-wide numeric limits and default paths
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use mount_common::prelude::*;
//! ```

pub mod config;
pub mod consts;
pub mod prelude;
