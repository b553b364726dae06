//! # Mount scheduler
//!
//! Task model (C9) and the scheduler service (C10): a background daemon
//! that accepts submit/query/cancel requests over a mailbox, dispatches at
//! most one task at a time under start-time and timeout rules, launches
//! external observation programs, and reaps them.
//!
//! # Module Structure
//!
//! - [`config`] - TOML configuration
//! - [`error`] - crate error types
//! - [`mailbox`] - inter-process request/reply transport (C10 IPC)
//! - [`service`] - 20 ms scheduler main loop, dedup, persistence (C10)
//! - [`task`] - task lifecycle and variants (C9)
//! - [`task_file`] - text task-file import format

pub mod config;
pub mod error;
pub mod mailbox;
pub mod service;
pub mod task;
pub mod task_file;
