//! Error types for the task scheduler.

use thiserror::Error;

/// Errors raised while a [`crate::task::Task`] transitions state or spawns
/// its child process.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("no child process recorded for task {0}")]
    NoChild(u64),

    #[error("failed to spawn child process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("failed to signal process group {0}: {1}")]
    SignalFailed(i32, String),
}

/// Errors raised by the mailbox transport.
#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("socket i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode message: {0}")]
    Encode(String),

    #[error("failed to decode message: {0}")]
    Decode(String),

    #[error("gave up sending after {0} retries")]
    RetriesExhausted(u32),
}

/// Top-level error for the scheduler service and its persistence layer.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error(transparent)]
    Config(#[from] mount_common::config::ConfigError),

    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("failed to persist task list to {path}: {source}")]
    PersistFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load task list from {path}: {source}")]
    LoadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed task-file import at line {line}: {reason}")]
    ImportMalformed { line: usize, reason: String },
}
