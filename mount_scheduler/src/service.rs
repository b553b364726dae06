//! Scheduler service (C10): the 20 ms main loop, task list and
//! persistence. Grounded on `ratsche_main.cpp`'s server loop and
//! `RTTask`-list handling (`processTaskList`-equivalent dedup/sort/process
//! sequence), with the message-queue `msgrcv`/`msgsnd` pair replaced by
//! [`crate::mailbox::Mailbox`].

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::SchedulerConfig;
use crate::error::ScheduleError;
use crate::mailbox::{Action, Mailbox, Message, SortDirection};
use crate::task::{Task, TaskRecord, TaskState};

/// Two tasks within these windows of each other are considered duplicate
/// submissions, per §4.8's dedup rule.
const DEDUP_START_TIME_WINDOW_S: i64 = 30;
const DEDUP_INT_TIME_WINDOW_S: f64 = 1e-3;
const DEDUP_REF_INTERVAL_WINDOW: i32 = 5;

pub struct SchedulerService {
    config: SchedulerConfig,
    tasks: Vec<Task>,
    last_task_id: u64,
    any_active: bool,
    mailbox: Mailbox,
}

impl SchedulerService {
    /// Start up: bind the mailbox, restore the task list from disk
    /// (demoting any ACTIVE task found there to STOPPED, since its child
    /// process died with the prior server), and discard whatever stale
    /// datagrams a prior run left unread.
    pub fn start(config: SchedulerConfig) -> Result<Self, ScheduleError> {
        let mailbox = Mailbox::bind(&config.mailbox_path)?;
        let mut tasks = load_tasks(&config.task_store_path).unwrap_or_default();
        for task in &mut tasks {
            if task.record.state == TaskState::Active {
                warn!(task_id = task.id(), "found ACTIVE task on disk at startup, demoting to STOPPED");
                task.record.state = TaskState::Stopped;
            }
        }
        let last_task_id = tasks.iter().map(Task::id).max().unwrap_or(0);
        info!(count = tasks.len(), "scheduler service started");
        Ok(SchedulerService {
            config,
            tasks,
            last_task_id,
            any_active: false,
            mailbox,
        })
    }

    /// One iteration of the 20 ms main loop: drain at most one mailbox
    /// message, dispatch it, then `processTaskList()` and persist.
    pub fn tick(&mut self, now: i64) -> Result<(), ScheduleError> {
        if let Some((msg, from)) = self.mailbox.try_recv()? {
            self.dispatch(msg, from);
        }
        self.process_task_list(now);
        self.persist()?;
        Ok(())
    }

    fn dispatch(&mut self, msg: Message, from: std::os::unix::net::SocketAddr) {
        match msg.action {
            Action::None => {}
            Action::Ping => {
                let reply = Message::request(0, Action::Ping);
                let _ = self.mailbox.reply(&reply, &from);
            }
            Action::List => {
                let mut ids: Vec<usize> = (0..self.tasks.len()).collect();
                match msg.sort_direction {
                    SortDirection::Ascending => ids.sort_by_key(|&i| self.tasks[i].schedule_time()),
                    SortDirection::Descending => {
                        ids.sort_by_key(|&i| self.tasks[i].schedule_time());
                        ids.reverse();
                    }
                }
                let count = ids.len() as u32;
                if count == 0 {
                    let mut reply = Message::request(0, Action::List);
                    reply.series_count = 0;
                    let _ = self.mailbox.reply(&reply, &from);
                } else {
                    for (n, &i) in ids.iter().enumerate() {
                        let mut reply = Message::request(0, Action::List);
                        reply.series_id = n as u32 + 1;
                        reply.series_count = count;
                        reply.task = Some(self.tasks[i].record.clone());
                        let _ = self.mailbox.reply(&reply, &from);
                    }
                }
            }
            Action::Add => {
                if let Some(mut record) = msg.task {
                    self.last_task_id += 1;
                    record.id = self.last_task_id;
                    record.submit_time = crate::task::now_epoch_secs();
                    record.state = TaskState::Idle;
                    info!(task_id = record.id, "task added");
                    self.tasks.push(Task::from_record(record));
                }
            }
            Action::Delete => {
                if let Some(id) = msg.task_id {
                    if let Some(idx) = self.tasks.iter().position(|t| t.id() == id) {
                        if self.tasks[idx].state() == TaskState::Active {
                            let _ = self.tasks[idx].cancel(&mut self.any_active);
                        }
                        self.tasks.remove(idx);
                        info!(task_id = id, "task deleted");
                    }
                }
            }
            Action::Cancel => {
                if let Some(id) = msg.task_id {
                    if let Some(task) = self.tasks.iter_mut().find(|t| t.id() == id) {
                        let _ = task.cancel(&mut self.any_active);
                    }
                }
            }
            Action::Stop => {
                if let Some(id) = msg.task_id {
                    if let Some(task) = self.tasks.iter_mut().find(|t| t.id() == id) {
                        let _ = task.stop(&mut self.any_active);
                    }
                }
            }
            Action::Clear => {
                for task in &mut self.tasks {
                    let _ = task.cancel(&mut self.any_active);
                }
                self.tasks.clear();
                info!("task list cleared");
            }
        }
    }

    fn process_task_list(&mut self, now: i64) {
        self.dedup();
        self.tasks.sort_by_key(|t| t.schedule_time());
        for task in &mut self.tasks {
            let max_run_time = task.record.duration_hours;
            if let Err(e) = task.process(
                &mut self.any_active,
                now,
                max_run_time,
                &self.config.executable_path,
                &self.config.data_path,
                &self.config.remote_client_path,
            ) {
                warn!(task_id = task.id(), error = %e, "task process() failed");
            }
        }
    }

    fn dedup(&mut self) {
        let mut to_remove = Vec::new();
        for i in 0..self.tasks.len() {
            if to_remove.contains(&i) {
                continue;
            }
            for j in (i + 1)..self.tasks.len() {
                if to_remove.contains(&j) {
                    continue;
                }
                if Self::are_duplicates(&self.tasks[i], &self.tasks[j]) {
                    let (earlier, later) = if self.tasks[i].record.submit_time <= self.tasks[j].record.submit_time {
                        (i, j)
                    } else {
                        (j, i)
                    };
                    warn!(
                        keep = self.tasks[earlier].id(),
                        drop = self.tasks[later].id(),
                        "discarding duplicate task submission"
                    );
                    to_remove.push(later);
                }
            }
        }
        to_remove.sort_unstable();
        to_remove.dedup();
        for &i in to_remove.iter().rev() {
            self.tasks.remove(i);
        }
    }

    fn are_duplicates(a: &Task, b: &Task) -> bool {
        a.record.kind.task_type() == b.record.kind.task_type()
            && (a.record.start_time - b.record.start_time).abs() <= DEDUP_START_TIME_WINDOW_S
            && (a.record.int_time_s - b.record.int_time_s).abs() <= DEDUP_INT_TIME_WINDOW_S
            && (a.record.ref_cycle - b.record.ref_cycle).abs() <= DEDUP_REF_INTERVAL_WINDOW
    }

    fn persist(&self) -> Result<(), ScheduleError> {
        save_tasks(&self.config.task_store_path, &self.tasks)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

fn load_tasks(path: &Path) -> Option<Vec<Task>> {
    let mut file = std::fs::File::open(path).ok()?;
    let mut count_buf = [0u8; 4];
    file.read_exact(&mut count_buf).ok()?;
    let count = u32::from_le_bytes(count_buf);
    let mut tasks = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut len_buf = [0u8; 4];
        file.read_exact(&mut len_buf).ok()?;
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        file.read_exact(&mut body).ok()?;
        let record: TaskRecord = bincode::deserialize(&body).ok()?;
        tasks.push(Task::from_record(record));
    }
    Some(tasks)
}

/// Persist the task list: a 32-bit little-endian count, then each record
/// length-prefixed (also little-endian), matching the spec's "binary file
/// with count followed by records" layout with variable-length framing
/// for the records' owned strings.
fn save_tasks(path: &PathBuf, tasks: &[Task]) -> Result<(), ScheduleError> {
    let tmp_path = path.with_extension("tmp");
    let write = || -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(&(tasks.len() as u32).to_le_bytes())?;
        for task in tasks {
            let bytes = bincode::serialize(&task.record).map_err(|e| std::io::Error::other(e.to_string()))?;
            file.write_all(&(bytes.len() as u32).to_le_bytes())?;
            file.write_all(&bytes)?;
        }
        Ok(())
    };
    write().map_err(|e| ScheduleError::PersistFailed {
        path: tmp_path.display().to_string(),
        source: e,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|e| ScheduleError::PersistFailed {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Coords, TaskKind};
    use tempfile::tempdir;

    fn test_config(dir: &Path) -> SchedulerConfig {
        SchedulerConfig {
            shared: mount_common::config::SharedConfig {
                log_level: mount_common::config::LogLevel::Info,
                service_name: "mount_scheduler".into(),
            },
            mailbox_path: dir.join("mailbox.sock"),
            task_store_path: dir.join("tasks.bin"),
            executable_path: "/opt/rt/bin".into(),
            data_path: "/data".into(),
            remote_client_path: "rt_remote_client".into(),
            tick_period_ms: 20,
        }
    }

    #[test]
    fn fresh_service_has_empty_task_list() {
        let dir = tempdir().unwrap();
        let service = SchedulerService::start(test_config(dir.path())).unwrap();
        assert_eq!(service.task_count(), 0);
    }

    #[test]
    fn persisted_tasks_round_trip_across_restart() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        {
            let mut service = SchedulerService::start(config.clone()).unwrap();
            let record = TaskRecord {
                id: 0,
                kind: TaskKind::Maintenance,
                start_time: 1_000,
                submit_time: 0,
                priority: 1,
                alt_period_hours: 0.0,
                user: "bob".into(),
                int_time_s: 0.0,
                ref_cycle: 0,
                duration_hours: 0.01,
                elapsed_hours: 0.0,
                eta_hours: 0.0,
                state: TaskState::Idle,
                comment: "test".into(),
            };
            let mut msg = Message::request(99, Action::Add);
            msg.task = Some(record);
            service.dispatch(msg, fake_addr());
            service.persist().unwrap();
            assert_eq!(service.task_count(), 1);
        }
        drop(std::fs::remove_file(dir.path().join("mailbox.sock")));
        let service = SchedulerService::start(test_config(dir.path())).unwrap();
        assert_eq!(service.task_count(), 1);
    }

    #[test]
    fn dedup_discards_the_later_duplicate() {
        let dir = tempdir().unwrap();
        let mut service = SchedulerService::start(test_config(dir.path())).unwrap();
        let mk = |start: i64, submit: i64| {
            let mut t = Task::new(0, TaskKind::Maintenance, 1, start, 1.0, 10, 0.0);
            t.record.submit_time = submit;
            t
        };
        service.tasks.push(mk(1_000, 0));
        service.tasks.push(mk(1_010, 10));
        service.dedup();
        assert_eq!(service.tasks.len(), 1);
        assert_eq!(service.tasks[0].record.submit_time, 0);
    }

    fn fake_addr() -> std::os::unix::net::SocketAddr {
        // An unbound datagram socket yields an "unnamed" local address,
        // good enough to exercise dispatch() without a real peer.
        std::os::unix::net::UnixDatagram::unbound().unwrap().local_addr().unwrap()
    }
}
