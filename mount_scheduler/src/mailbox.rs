//! Scheduler mailbox (C10 IPC).
//!
//! Grounded on `ratsche/ratsche_message.h`'s `message_t`/`task_struct` and
//! `ratsche_main.cpp`'s send/receive retry loop. Per the Design Notes, the
//! original System V message queue (a single queue keyed by `-k <keyID>`)
//! is replaced by a Unix-domain `SOCK_DGRAM` socket: the server binds one
//! well-known path and `recv_from`s it non-blockingly once per main-loop
//! tick; each client binds its own ephemeral path so the server can reply
//! via the peer address `recv_from` hands back, without needing a sender
//! field to route by.

use std::os::unix::net::{SocketAddr, UnixDatagram};
use std::path::{Path, PathBuf};
use std::time::Duration;

use mount_common::consts::{MAILBOX_RETRY_DELAY_MS, MAILBOX_SEND_RETRIES};
use tracing::{debug, error, warn};

use crate::error::MailboxError;
use crate::task::TaskRecord;

/// Action codes, matching `ratsche_message.h`'s `AC_*` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Action {
    None = 0,
    Ping = 1,
    List = 2,
    Add = 4,
    Delete = 8,
    Cancel = 16,
    Stop = 32,
    Clear = 64,
}

/// Sort direction for a LIST request, carried in `sub_action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SortDirection {
    Ascending = 0,
    Descending = 1,
}

/// One datagram, matching `message_t`'s `(mtype, sender_id, action,
/// sub_action, series_id, series_count, task)` tuple. `mtype` (the SysV
/// routing key) has no counterpart on a point-to-point datagram socket and
/// is dropped; `sub_action` folds the original's `int` into an enum plus
/// an optional task id, since its meaning is action-dependent (sort order
/// for LIST, a task id for DELETE/CANCEL/STOP).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub sender_id: u32,
    pub action: Action,
    pub sort_direction: SortDirection,
    pub task_id: Option<u64>,
    pub series_id: u32,
    pub series_count: u32,
    pub task: Option<TaskRecord>,
}

impl Message {
    pub fn request(sender_id: u32, action: Action) -> Self {
        Message {
            sender_id,
            action,
            sort_direction: SortDirection::Ascending,
            task_id: None,
            series_id: 0,
            series_count: 0,
            task: None,
        }
    }
}

fn encode(msg: &Message) -> Result<Vec<u8>, MailboxError> {
    bincode::serialize(msg).map_err(|e| MailboxError::Encode(e.to_string()))
}

fn decode(buf: &[u8]) -> Result<Message, MailboxError> {
    bincode::deserialize(buf).map_err(|e| MailboxError::Decode(e.to_string()))
}

/// Maximum single-datagram size; a LIST reply carrying one `TaskRecord`
/// with its longest `comment`/`user` strings comfortably fits.
const MAX_DATAGRAM_BYTES: usize = 8192;

/// The scheduler-side end of the mailbox: owns the well-known socket.
pub struct Mailbox {
    socket: UnixDatagram,
    path: PathBuf,
}

impl Mailbox {
    /// Bind the server socket, removing any stale socket file left behind
    /// by a prior run (matching the original's "clear queue" startup step
    /// for zombie messages).
    pub fn bind(path: &Path) -> Result<Self, MailboxError> {
        if path.exists() {
            warn!(path = %path.display(), "removing stale mailbox socket from a prior run");
            let _ = std::fs::remove_file(path);
        }
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let socket = UnixDatagram::bind(path).map_err(MailboxError::Io)?;
        socket.set_nonblocking(true).map_err(MailboxError::Io)?;
        Ok(Mailbox {
            socket,
            path: path.to_path_buf(),
        })
    }

    /// Drain at most one message, per the main loop's "drain at most one
    /// message per tick" contract. Returns `Ok(None)` when the socket is
    /// empty.
    pub fn try_recv(&self) -> Result<Option<(Message, SocketAddr)>, MailboxError> {
        let mut buf = [0u8; MAX_DATAGRAM_BYTES];
        match self.socket.recv_from(&mut buf) {
            Ok((len, addr)) => {
                let msg = decode(&buf[..len])?;
                Ok(Some((msg, addr)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(MailboxError::Io(e)),
        }
    }

    pub fn reply(&self, msg: &Message, to: &SocketAddr) -> Result<(), MailboxError> {
        let Some(path) = to.as_pathname() else {
            return Ok(()); // client sent an unnamed/anonymous socket; nothing we can reply to
        };
        let bytes = encode(msg)?;
        self.socket.send_to(&bytes, path).map_err(MailboxError::Io)?;
        Ok(())
    }
}

impl Drop for Mailbox {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Client-side handle: binds an ephemeral socket of its own and talks to
/// the server's well-known path.
pub struct MailboxClient {
    socket: UnixDatagram,
    server_path: PathBuf,
}

impl MailboxClient {
    pub fn connect(server_path: &Path) -> Result<Self, MailboxError> {
        let client_path = std::env::temp_dir().join(format!("mount-scheduler-client-{}.sock", std::process::id()));
        let _ = std::fs::remove_file(&client_path);
        let socket = UnixDatagram::bind(&client_path).map_err(MailboxError::Io)?;
        Ok(MailboxClient {
            socket,
            server_path: server_path.to_path_buf(),
        })
    }

    /// Send with the original's retry/backoff: up to
    /// [`MAILBOX_SEND_RETRIES`] attempts, [`MAILBOX_RETRY_DELAY_MS`]
    /// apart, giving up (and logging CRIT) rather than blocking forever.
    pub fn send_with_retry(&self, msg: &Message) -> Result<(), MailboxError> {
        let bytes = encode(msg)?;
        for attempt in 0..MAILBOX_SEND_RETRIES {
            match self.socket.send_to(&bytes, &self.server_path) {
                Ok(_) => return Ok(()),
                Err(e) => {
                    debug!(attempt, error = %e, "mailbox send failed, retrying");
                    std::thread::sleep(Duration::from_millis(MAILBOX_RETRY_DELAY_MS));
                }
            }
        }
        error!("unable to access scheduler mailbox after {MAILBOX_SEND_RETRIES} retries");
        Err(MailboxError::RetriesExhausted(MAILBOX_SEND_RETRIES))
    }

    pub fn recv_reply(&self, timeout: Duration) -> Result<Message, MailboxError> {
        self.socket.set_read_timeout(Some(timeout)).map_err(MailboxError::Io)?;
        let mut buf = [0u8; MAX_DATAGRAM_BYTES];
        let (len, _addr) = self.socket.recv_from(&mut buf).map_err(MailboxError::Io)?;
        decode(&buf[..len])
    }
}

impl Drop for MailboxClient {
    fn drop(&mut self) {
        if let Ok(local) = self.socket.local_addr() {
            if let Some(path) = local.as_pathname() {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Coords, TaskKind};
    use tempfile::tempdir;

    #[test]
    fn ping_round_trips_over_the_socket() {
        let dir = tempdir().unwrap();
        let server_path = dir.path().join("mailbox.sock");
        let server = Mailbox::bind(&server_path).unwrap();
        let client = MailboxClient::connect(&server_path).unwrap();

        let request = Message::request(42, Action::Ping);
        client.send_with_retry(&request).unwrap();

        std::thread::sleep(Duration::from_millis(20));
        let (received, from) = server.try_recv().unwrap().expect("message present");
        assert_eq!(received.sender_id, 42);
        assert_eq!(received.action, Action::Ping);

        let reply = Message::request(1, Action::Ping);
        server.reply(&reply, &from).unwrap();

        let got = client.recv_reply(Duration::from_millis(500)).unwrap();
        assert_eq!(got.action, Action::Ping);
    }

    #[test]
    fn try_recv_returns_none_on_empty_socket() {
        let dir = tempdir().unwrap();
        let server = Mailbox::bind(&dir.path().join("mailbox2.sock")).unwrap();
        assert!(server.try_recv().unwrap().is_none());
    }

    #[test]
    fn message_with_task_record_round_trips_through_bincode() {
        let record = TaskRecord {
            id: 7,
            kind: TaskKind::Drift {
                target: Coords { x: 1.0, y: 2.0 },
            },
            start_time: 0,
            submit_time: 0,
            priority: 1,
            alt_period_hours: 0.0,
            user: "alice".into(),
            int_time_s: 1.0,
            ref_cycle: 1,
            duration_hours: 0.0,
            elapsed_hours: 0.0,
            eta_hours: 0.0,
            state: crate::task::TaskState::Idle,
            comment: String::new(),
        };
        let mut msg = Message::request(1, Action::Add);
        msg.task = Some(record.clone());
        let bytes = encode(&msg).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!(back.task, Some(record));
    }
}
