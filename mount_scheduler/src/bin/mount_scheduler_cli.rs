//! Scheduler CLI client, per §6's flag set: list, add, cancel, stop,
//! erase, clear and text export, talking to the daemon over the mailbox.
//! `-d`/`-x`/`-o` (run as daemon / executable / data paths) have no
//! counterpart here — those are `mount_scheduler`'s own config-file
//! fields now that daemon and client are separate binaries, matching the
//! one-binary-per-component split already used elsewhere in the
//! workspace.

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mount_common::consts::DEFAULT_MAILBOX_PATH;
use mount_scheduler::mailbox::{Action, MailboxClient, Message, SortDirection};
use mount_scheduler::task::{TaskKind, TaskRecord};
use mount_scheduler::task_file::parse_task_file;
use tracing::{error, Level};
use tracing_subscriber::EnvFilter;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Scheduler CLI client.
#[derive(Parser, Debug)]
#[command(name = "mount_scheduler_cli")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Submit, list and cancel radio-telescope observation tasks")]
struct Args {
    /// List all tasks.
    #[arg(short = 'l', long)]
    list: bool,

    /// Reverse sort order for `--list`.
    #[arg(short = 'r', long)]
    reverse: bool,

    /// Print the listing in the plain-text task-file format instead of a
    /// table.
    #[arg(short = 'p', long)]
    as_text: bool,

    /// Mailbox socket path suffix (appended to the default path), mirrors
    /// the original's `-k <keyID>` message-queue key.
    #[arg(short = 'k', long)]
    key: Option<String>,

    /// Add tasks from a file (or `-` for stdin), in the task-file text
    /// format.
    #[arg(short = 'a', long, value_name = "FILE")]
    add: Option<String>,

    /// Cancel a task by id.
    #[arg(short = 'c', long, value_name = "ID")]
    cancel: Option<u64>,

    /// Stop a running task by id.
    #[arg(short = 's', long, value_name = "ID")]
    stop: Option<u64>,

    /// Erase (delete) a task by id.
    #[arg(short = 'e', long, value_name = "ID")]
    erase: Option<u64>,

    /// Clear the entire task list.
    #[arg(short = 'E', long)]
    clear: bool,

    /// Increase logging verbosity.
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn mailbox_path(args: &Args) -> PathBuf {
    match &args.key {
        Some(key) => PathBuf::from(format!("{DEFAULT_MAILBOX_PATH}.{key}")),
        None => PathBuf::from(DEFAULT_MAILBOX_PATH),
    }
}

fn main() {
    let args = Args::parse();
    let level = if args.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    std::process::exit(run(&args));
}

fn run(args: &Args) -> i32 {
    let client = match MailboxClient::connect(&mailbox_path(args)) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to access scheduler mailbox: {e}");
            return 1;
        }
    };

    if let Some(source) = &args.add {
        return add_tasks(&client, source);
    }
    if let Some(id) = args.cancel {
        return send_task_action(&client, Action::Cancel, id);
    }
    if let Some(id) = args.stop {
        return send_task_action(&client, Action::Stop, id);
    }
    if let Some(id) = args.erase {
        return send_task_action(&client, Action::Delete, id);
    }
    if args.clear {
        return send_simple_action(&client, Action::Clear);
    }
    if args.list {
        return list_tasks(&client, args);
    }

    eprintln!("no action requested; see --help");
    1
}

fn add_tasks(client: &MailboxClient, source: &str) -> i32 {
    let content = if source == "-" {
        let mut buf = String::new();
        if std::io::stdin().read_to_string(&mut buf).is_err() {
            return 1;
        }
        buf
    } else {
        match std::fs::read_to_string(source) {
            Ok(c) => c,
            Err(e) => {
                error!("failed to read {source}: {e}");
                return 1;
            }
        }
    };

    let records = match parse_task_file(&content) {
        Ok(r) => r,
        Err(e) => {
            error!("failed to parse task file: {e}");
            return 1;
        }
    };

    for record in records {
        let mut msg = Message::request(std::process::id(), Action::Add);
        msg.task = Some(record);
        if client.send_with_retry(&msg).is_err() {
            return 1;
        }
    }
    0
}

fn send_task_action(client: &MailboxClient, action: Action, id: u64) -> i32 {
    let mut msg = Message::request(std::process::id(), action);
    msg.task_id = Some(id);
    match client.send_with_retry(&msg) {
        Ok(()) => 0,
        Err(e) => {
            error!("failed to send request: {e}");
            1
        }
    }
}

fn send_simple_action(client: &MailboxClient, action: Action) -> i32 {
    let msg = Message::request(std::process::id(), action);
    match client.send_with_retry(&msg) {
        Ok(()) => 0,
        Err(e) => {
            error!("failed to send request: {e}");
            1
        }
    }
}

fn list_tasks(client: &MailboxClient, args: &Args) -> i32 {
    let mut msg = Message::request(std::process::id(), Action::List);
    msg.sort_direction = if args.reverse { SortDirection::Descending } else { SortDirection::Ascending };
    if client.send_with_retry(&msg).is_err() {
        return 1;
    }

    let first = match client.recv_reply(REPLY_TIMEOUT) {
        Ok(m) => m,
        Err(e) => {
            error!("no reply from scheduler: {e}");
            return 1;
        }
    };
    let total = first.series_count;
    if total == 0 {
        println!("(no tasks scheduled)");
        return 0;
    }

    let mut records = Vec::with_capacity(total as usize);
    if let Some(t) = first.task {
        records.push(t);
    }
    while (records.len() as u32) < total {
        match client.recv_reply(REPLY_TIMEOUT) {
            Ok(m) => {
                if let Some(t) = m.task {
                    records.push(t);
                }
            }
            Err(e) => {
                error!("truncated listing: {e}");
                break;
            }
        }
    }

    if args.as_text {
        for record in &records {
            println!("{}", render_as_text(record));
        }
    } else {
        println!("{:>6}  {:<10}  {:<12}  {:>9}  {}", "id", "type", "state", "priority", "comment");
        for record in &records {
            println!(
                "{:>6}  {:<10}  {:<12?}  {:>9}  {}",
                record.id,
                kind_name(&record.kind),
                record.state,
                record.priority,
                record.comment
            );
        }
    }
    0
}

fn kind_name(kind: &TaskKind) -> &'static str {
    match kind {
        TaskKind::Drift { .. } => "drift",
        TaskKind::Track { .. } => "track",
        TaskKind::HorScan { .. } => "horscan",
        TaskKind::EquScan { .. } => "equscan",
        TaskKind::GotoHor { .. } => "gotohor",
        TaskKind::GotoEqu { .. } => "gotoequ",
        TaskKind::Park => "park",
        TaskKind::Unpark => "unpark",
        TaskKind::Maintenance => "maintenance",
    }
}

fn render_as_text(record: &TaskRecord) -> String {
    format!(
        "{} {} {} {} {} {:?} \"{}\"",
        record.start_time, record.priority, record.alt_period_hours, record.user, kind_name(&record.kind), record.state, record.comment
    )
}
