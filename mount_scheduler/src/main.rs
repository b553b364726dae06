//! # Mount Scheduler
//!
//! The task scheduler daemon: a 20 ms main loop draining the mailbox,
//! dispatching ADD/LIST/DELETE/CANCEL/STOP/CLEAR requests, and stepping
//! every task's lifecycle.
//!
//! ```bash
//! mount_scheduler --config /etc/mount-scheduler/scheduler.toml
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mount_common::config::ConfigLoader;
use mount_scheduler::config::SchedulerConfig;
use mount_scheduler::error::ScheduleError;
use mount_scheduler::service::SchedulerService;
use mount_scheduler::task::now_epoch_secs;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "/etc/mount-scheduler/scheduler.toml";

/// Mount scheduler — task queue and dispatch daemon.
#[derive(Parser, Debug)]
#[command(name = "mount_scheduler")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Radio-telescope observation task scheduler")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable verbose (debug) logging.
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn setup_tracing(args: &Args) {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    if args.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    if let Err(e) = run(&args) {
        error!("mount_scheduler stopping: {e}");
        // Per the error-handling design, an uncaught fault frees the task
        // list (the process simply exits, dropping it) and exits non-zero.
        std::process::exit(3);
    }
}

fn run(args: &Args) -> Result<(), ScheduleError> {
    let config = SchedulerConfig::load(&args.config)?;
    config.validate()?;
    info!(service = %config.shared.service_name, "starting mount scheduler");

    let mut service = SchedulerService::start(config.clone())?;
    let period = Duration::from_millis(config.tick_period_ms);

    info!("entering scheduler main loop");
    loop {
        let tick_start = std::time::Instant::now();
        if let Err(e) = service.tick(now_epoch_secs()) {
            error!("scheduler tick error: {e}");
        }
        if let Some(remaining) = period.checked_sub(tick_start.elapsed()) {
            std::thread::sleep(remaining);
        }
    }
}
