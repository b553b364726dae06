//! Task model (C9): abstract task lifecycle and its concrete variants.
//!
//! Grounded on `ratsche/rttask.h` / `rttask.cpp`'s `RTTask` base class and
//! its nine subclasses. The base class's virtual `Start`/`Stop`/`Cancel`/
//! `Process` become free functions operating on [`Task`], dispatching on
//! [`TaskKind`] only where the donor's subclasses actually differed (the
//! shell command line).

use std::time::{SystemTime, UNIX_EPOCH};

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, error, info, warn};

use crate::error::TaskError;

/// Maximum number of 10 ms polls `stop()` will spend waiting for a killed
/// process group to be reaped before giving up and logging an error. The
/// donor's `RTTask::Stop()` loops unconditionally; an unkillable zombie
/// would wedge the whole scheduler tick forever, so this is bounded here.
const MAX_STOP_POLLS: u32 = 500;

/// Lifecycle state of a task, matching `RTTask::TASKSTATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TaskState {
    Idle,
    Waiting,
    Active,
    Finished,
    Stopped,
    Cancelled,
    Error,
    Timeout,
}

impl TaskState {
    /// Terminal states: `process()` is a no-op once here.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Finished | TaskState::Stopped | TaskState::Cancelled | TaskState::Error | TaskState::Timeout
        )
    }
}

/// Discriminant matching the wire/persisted `type` field, per
/// `ratsche_message.h`'s task record layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum TaskType {
    Drift = 0,
    Track = 1,
    HorScan = 2,
    EquScan = 3,
    GotoHor = 4,
    GotoEqu = 5,
    Park = 6,
    Maintenance = 7,
    Unpark = 8,
}

/// A horizontal or equatorial coordinate pair, shaped to match the wire
/// record's generic `(x, y)` coords fields.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Coords {
    pub x: f64,
    pub y: f64,
}

/// The variant-specific part of a task: coordinates and scan steps.
/// Mirrors the donor's per-subclass fields (`DriftScanTask::fStartCoords`,
/// `HorScanTask::fStartCoords`/`fEndCoords`/`fStepAz`/`fStepAlt`, etc).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum TaskKind {
    Drift { target: Coords },
    Track { target: Coords },
    HorScan { start: Coords, end: Coords, step_az: f64, step_alt: f64 },
    EquScan { start: Coords, end: Coords, step_ra: f64, step_dec: f64 },
    GotoHor { target: Coords },
    GotoEqu { target: Coords },
    Park,
    Unpark,
    Maintenance,
}

impl TaskKind {
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskKind::Drift { .. } => TaskType::Drift,
            TaskKind::Track { .. } => TaskType::Track,
            TaskKind::HorScan { .. } => TaskType::HorScan,
            TaskKind::EquScan { .. } => TaskType::EquScan,
            TaskKind::GotoHor { .. } => TaskType::GotoHor,
            TaskKind::GotoEqu { .. } => TaskType::GotoEqu,
            TaskKind::Park => TaskType::Park,
            TaskKind::Unpark => TaskType::Unpark,
            TaskKind::Maintenance => TaskType::Maintenance,
        }
    }
}

/// The wire/persisted task record, matching `ratsche_message.h`'s
/// `task_struct` layout field-for-field (fixed `char[16]`/`char[128]`
/// buffers become owned `String`s — the original's C-string discipline has
/// no Rust counterpart worth keeping).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TaskRecord {
    pub id: u64,
    pub kind: TaskKind,
    pub start_time: i64,
    pub submit_time: i64,
    pub priority: u8,
    pub alt_period_hours: f64,
    pub user: String,
    pub int_time_s: f64,
    pub ref_cycle: i32,
    pub duration_hours: f64,
    pub elapsed_hours: f64,
    pub eta_hours: f64,
    pub state: TaskState,
    pub comment: String,
}

pub fn now_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// A live task: the persisted record plus the scheduler's own runtime-only
/// bookkeeping (the process group it spawned).
#[derive(Debug)]
pub struct Task {
    pub record: TaskRecord,
    pids: Vec<i32>,
}

impl Task {
    pub fn new(id: u64, kind: TaskKind, priority: u8, schedule_time: i64, int_time_s: f64, ref_cycle: i32, alt_period_hours: f64) -> Self {
        Task {
            record: TaskRecord {
                id,
                kind,
                start_time: schedule_time,
                submit_time: now_epoch_secs(),
                priority,
                alt_period_hours,
                user: String::from("N/A"),
                int_time_s,
                ref_cycle,
                duration_hours: 0.0,
                elapsed_hours: 0.0,
                eta_hours: 0.0,
                state: TaskState::Idle,
                comment: String::new(),
            },
            pids: Vec::new(),
        }
    }

    pub fn from_record(record: TaskRecord) -> Self {
        Task { record, pids: Vec::new() }
    }

    pub fn id(&self) -> u64 {
        self.record.id
    }

    pub fn state(&self) -> TaskState {
        self.record.state
    }

    pub fn schedule_time(&self) -> i64 {
        self.record.start_time
    }

    /// Remaining hours until `max_run_time` elapses, matching `Eta()`.
    pub fn eta_hours(&self, max_run_time_hours: f64) -> f64 {
        if self.record.state.is_terminal() {
            return 0.0;
        }
        max_run_time_hours - self.record.elapsed_hours
    }

    /// Build the shell invocation for this task's variant, per §6's
    /// command template table. `remote_client` names the external binary
    /// used to set remote-control properties for the goto/park/unpark
    /// variants, whose protocol is out of scope here.
    pub fn command_line(&self, executable_path: &str, data_path: &str, remote_client: &str) -> String {
        let data_file = self.data_filename();
        let out = if data_path.is_empty() {
            data_file.clone()
        } else {
            format!("{data_path}/{data_file}")
        };
        let int_time_suffix = if self.record.int_time_s.is_normal() {
            format!(" {}", self.record.int_time_s as i64)
        } else {
            String::new()
        };
        match &self.record.kind {
            TaskKind::Drift { target } => {
                format!("{executable_path}/rt_transitscan {} {} {out}{int_time_suffix}", target.x, target.y)
            }
            TaskKind::Track { target } => {
                format!("{executable_path}/rt_track {} {} {out}{int_time_suffix}", target.x, target.y)
            }
            TaskKind::HorScan { start, end, step_az, step_alt } => {
                format!(
                    "{executable_path}/rt_scan_hor {} {} {} {} {out} {step_az} {step_alt}{int_time_suffix}",
                    start.x, end.x, start.y, end.y
                )
            }
            TaskKind::EquScan { start, end, step_ra, step_dec } => {
                format!(
                    "{executable_path}/rt_scan_equ {} {} {} {} {out} {step_ra} {step_dec}{int_time_suffix}",
                    start.x, end.x, start.y, end.y
                )
            }
            TaskKind::GotoHor { target } => {
                format!("{remote_client} --set AZ={} --set ALT={} --wait SCOPE_IDLE=1", target.x, target.y)
            }
            TaskKind::GotoEqu { target } => {
                format!("{remote_client} --set RA={} --set DEC={} --wait SCOPE_IDLE=1", target.x, target.y)
            }
            TaskKind::Park => format!("{remote_client} --set PARK=On --wait SCOPE_PARKED=1"),
            TaskKind::Unpark => format!("{remote_client} --set UNPARK=On --wait SCOPE_IDLE=1"),
            TaskKind::Maintenance => format!("sleep {}", (self.record.duration_hours * 3600.0) as i64),
        }
    }

    fn data_filename(&self) -> String {
        let kind_tag = match &self.record.kind {
            TaskKind::Drift { .. } => "drift",
            TaskKind::Track { .. } => "track",
            TaskKind::HorScan { .. } => "horscan",
            TaskKind::EquScan { .. } => "equscan",
            TaskKind::GotoHor { .. } => "gotohor",
            TaskKind::GotoEqu { .. } => "gotoequ",
            TaskKind::Park => "park",
            TaskKind::Unpark => "unpark",
            TaskKind::Maintenance => "maintenance",
        };
        let day_start = (self.record.start_time / 86_400) * 86_400;
        let seconds_of_day = self.record.start_time - day_start;
        let (y, m, d) = civil_from_epoch_day(self.record.start_time / 86_400);
        format!("task_{kind_tag}{y:04}{m:02}{d:02}_{seconds_of_day:05}")
    }

    /// `start()`: spawns the child process group if no other task is
    /// active, else marks itself WAITING. Mirrors `RTTask::Start()`.
    pub fn start(&mut self, any_active: &mut bool, executable_path: &str, data_path: &str, remote_client: &str) -> Result<(), TaskError> {
        if self.record.state.is_terminal() {
            return Ok(());
        }
        if self.record.state == TaskState::Active {
            return Ok(());
        }
        if *any_active {
            self.record.state = TaskState::Waiting;
            return Ok(());
        }

        let cmd = self.command_line(executable_path, data_path, remote_client);
        debug!(task_id = self.record.id, %cmd, "executing task command");

        match spawn_detached(&cmd) {
            Ok(pid) => {
                info!(task_id = self.record.id, pid, "task started");
                self.pids = vec![pid];
                self.record.state = TaskState::Active;
                self.record.start_time = now_epoch_secs();
                *any_active = true;
                Ok(())
            }
            Err(e) => {
                error!(task_id = self.record.id, error = %e, "failed to start task");
                self.record.state = TaskState::Error;
                Err(e)
            }
        }
    }

    /// `stop()`: SIGKILL every recorded process group and reap it.
    /// Mirrors `RTTask::Stop()`.
    pub fn stop(&mut self, any_active: &mut bool) -> Result<(), TaskError> {
        if self.record.state == TaskState::Finished {
            return Ok(());
        }
        if self.record.state == TaskState::Active {
            for pgid in self.pids.drain(..).collect::<Vec<_>>() {
                let pid = Pid::from_raw(pgid);
                let mut reaped = false;
                for _ in 0..MAX_STOP_POLLS {
                    if let Err(e) = kill(Pid::from_raw(-pgid), Signal::SIGKILL) {
                        warn!(task_id = self.record.id, pgid, error = %e, "signalling process group failed");
                    }
                    std::thread::sleep(std::time::Duration::from_millis(10));
                    match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                        Ok(WaitStatus::StillAlive) => continue,
                        Ok(_) => {
                            reaped = true;
                            break;
                        }
                        Err(_) => {
                            reaped = true;
                            break;
                        }
                    }
                }
                if !reaped {
                    error!(task_id = self.record.id, pgid, "gave up waiting for process group to die");
                }
            }
            self.record.state = TaskState::Stopped;
            *any_active = false;
        } else if self.record.state.is_terminal() {
            return Ok(());
        } else {
            self.record.state = TaskState::Stopped;
        }
        Ok(())
    }

    /// `cancel()`: stop, then mark CANCELLED.
    pub fn cancel(&mut self, any_active: &mut bool) -> Result<(), TaskError> {
        self.stop(any_active)?;
        self.record.state = TaskState::Cancelled;
        Ok(())
    }

    /// One scheduler tick for this task. Mirrors `RTTask::Process()`.
    pub fn process(
        &mut self,
        any_active: &mut bool,
        now: i64,
        max_run_time_hours: f64,
        executable_path: &str,
        data_path: &str,
        remote_client: &str,
    ) -> Result<(), TaskError> {
        if self.record.state.is_terminal() {
            return Ok(());
        }

        if self.record.state == TaskState::Active {
            if let Some(&pgid) = self.pids.first() {
                match waitpid(Pid::from_raw(pgid), Some(WaitPidFlag::WNOHANG)) {
                    Ok(WaitStatus::StillAlive) => {}
                    Ok(_) => {
                        debug!(task_id = self.record.id, pgid, "child process reaped");
                        self.pids.clear();
                        *any_active = false;
                        self.record.state = TaskState::Finished;
                        return Ok(());
                    }
                    Err(e) => {
                        warn!(task_id = self.record.id, error = %e, "waitpid error");
                        self.stop(any_active)?;
                        self.record.state = TaskState::Error;
                        return Ok(());
                    }
                }
            }
            self.record.elapsed_hours = (now - self.record.start_time) as f64 / 3600.0;
            if self.record.elapsed_hours > max_run_time_hours {
                info!(task_id = self.record.id, "maximum runtime exceeded, stopping");
                self.stop(any_active)?;
                self.record.state = TaskState::Timeout;
            }
            return Ok(());
        }

        // IDLE or WAITING.
        if self.record.start_time <= now {
            if !*any_active {
                self.start(any_active, executable_path, data_path, remote_client)?;
            } else {
                self.record.state = TaskState::Waiting;
                if (self.record.start_time as f64 + max_run_time_hours * 3600.0) < now as f64 {
                    if self.record.alt_period_hours < -1e-4 {
                        self.record.state = TaskState::Cancelled;
                    } else if self.record.alt_period_hours > 1e-4 {
                        self.record.start_time += (self.record.alt_period_hours * 3600.0) as i64;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Spawn `cmd` via `sh -c` in its own process group (pgid == pid), stdio
/// detached to `/dev/null`, returning the child's pid (== pgid).
fn spawn_detached(cmd: &str) -> Result<i32, TaskError> {
    use std::os::unix::process::CommandExt;
    use std::process::{Command, Stdio};

    let child = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()?;
    Ok(child.id() as i32)
}

/// Civil (year, month, day) from a days-since-epoch count, Howard
/// Hinnant's `civil_from_days` algorithm (proleptic Gregorian).
fn civil_from_epoch_day(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_drift(schedule_time: i64) -> Task {
        Task::new(
            1,
            TaskKind::Drift {
                target: Coords { x: 10.0, y: 20.0 },
            },
            1,
            schedule_time,
            1.0,
            1,
            0.0,
        )
    }

    #[test]
    fn command_line_for_drift_task() {
        let task = sample_drift(0);
        let cmd = task.command_line("/opt/rt/bin", "/data", "rt_remote_client");
        assert!(cmd.starts_with("/opt/rt/bin/rt_transitscan 10 20 "));
        assert!(cmd.contains("task_drift"));
    }

    #[test]
    fn maintenance_command_is_sleep() {
        let mut task = Task::new(2, TaskKind::Maintenance, 5, 0, 0.0, 0, 0.0);
        task.record.duration_hours = 1.0;
        let cmd = task.command_line("/opt/rt/bin", "/data", "rt_remote_client");
        assert_eq!(cmd, "sleep 3600");
    }

    #[test]
    fn process_waits_if_another_task_is_active() {
        let mut task = sample_drift(0);
        let mut any_active = true;
        task.process(&mut any_active, 0, 1.0, "/bin", "/data", "client").unwrap();
        assert_eq!(task.state(), TaskState::Waiting);
    }

    #[test]
    fn process_cancels_when_schedule_window_passed_and_alt_period_negative() {
        let mut task = sample_drift(-10_000);
        task.record.alt_period_hours = -1.0;
        let mut any_active = true;
        task.process(&mut any_active, 0, 0.0001, "/bin", "/data", "client").unwrap();
        assert_eq!(task.state(), TaskState::Cancelled);
    }

    #[test]
    fn process_reschedules_when_alt_period_positive() {
        let mut task = sample_drift(-10_000);
        task.record.alt_period_hours = 2.0;
        let mut any_active = true;
        task.process(&mut any_active, 0, 0.0001, "/bin", "/data", "client").unwrap();
        assert_eq!(task.state(), TaskState::Waiting);
        assert_eq!(task.record.start_time, -10_000 + 7200);
    }

    #[test]
    fn eta_is_zero_for_terminal_states() {
        let mut task = sample_drift(0);
        task.record.state = TaskState::Cancelled;
        assert_eq!(task.eta_hours(2.0), 0.0);
    }

    #[test]
    fn civil_date_matches_known_epoch_day() {
        assert_eq!(civil_from_epoch_day(0), (1970, 1, 1));
    }
}
