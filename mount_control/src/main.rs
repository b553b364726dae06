//! # Mount Control
//!
//! The real-time control core: threads the GPIO/SPI/I²C facade (C1), both
//! encoder readers (C3), both motor drivers (C5), the optional current
//! sense/voltage/temperature monitors (C4/C6) and the pointing controller
//! poll cycle (C7) together in a single process, per the component table's
//! single-process-wide concurrency model.
//!
//! ```bash
//! mount_control --config /etc/mount/control.toml
//! mount_control --config ./control.toml --verbose
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use clap::Parser;
use mount_common::config::ConfigLoader;
use mount_hal::adc::AdcSampler;
use mount_hal::bus::Bus;
use mount_hal::encoder::{Encoder, EncoderConfig};
use mount_hal::monitor::{TemperatureMonitor, VoltageMonitor};
use mount_hal::motor::{MotorDriver, MotorPins, DEFAULT_RAMP_PER_MS};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use mount_common::consts::DEFAULT_PWM_FREQ;
use mount_control::config::MountControlConfig;
use mount_control::cycle::PollCycle;
use mount_control::error::ControlError;

/// Default configuration file, under [`mount_common::consts::DEFAULT_CONFIG_PATH`].
const DEFAULT_CONFIG_FILE: &str = "/etc/mount-control/control.toml";

/// Mount control — pointing controller, encoders and motors in one process.
#[derive(Parser, Debug)]
#[command(name = "mount_control")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Radio-telescope mount control core")]
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
        error!("mount_control startup failed: {e}");
        std::process::exit(1);
    }
}

fn motor_pins_from(cfg: &mount_control::config::MotorPinConfig) -> MotorPins {
    MotorPins {
        pwm: cfg.pwm,
        dir: cfg.dir,
        dir_a: cfg.dir_a,
        dir_b: cfg.dir_b,
        enable: cfg.enable,
        fault: cfg.fault,
    }
}

fn encoder_config_from(cfg: &mount_control::config::EncoderPinConfig) -> EncoderConfig {
    EncoderConfig {
        interface: cfg.interface,
        channel: cfg.channel,
        mode: cfg.mode,
        baudrate_hz: cfg.baudrate_hz,
        st_bits: cfg.st_bits,
        mt_bits: cfg.mt_bits,
        max_turns_per_second: mount_common::consts::ENCODER_MAX_TURNS_PER_SECOND,
    }
}

fn run(args: &Args) -> Result<(), ControlError> {
    let config = MountControlConfig::load(&args.config)?;
    config.validate()?;
    info!(service = %config.shared.service_name, "starting mount control");

    let bus = Arc::new(Bus::connect()?);

    let current_sense_az = config
        .current_sense_az
        .as_ref()
        .map(|adc| {
            AdcSampler::start(
                "motor_az_current",
                bus.clone(),
                adc.channel,
                adc.factor,
                Duration::from_millis(adc.period_ms),
                Duration::from_millis(adc.integration_window_ms),
            )
            .map(Arc::new)
        })
        .transpose()?;
    let current_sense_alt = config
        .current_sense_alt
        .as_ref()
        .map(|adc| {
            AdcSampler::start(
                "motor_alt_current",
                bus.clone(),
                adc.channel,
                adc.factor,
                Duration::from_millis(adc.period_ms),
                Duration::from_millis(adc.integration_window_ms),
            )
            .map(Arc::new)
        })
        .transpose()?;

    let enc_az = Arc::new(Encoder::connect(bus.clone(), encoder_config_from(&config.azimuth.encoder))?);
    let enc_alt = Arc::new(Encoder::connect(bus.clone(), encoder_config_from(&config.altitude.encoder))?);

    let motor_az = Arc::new(MotorDriver::connect(
        bus.clone(),
        motor_pins_from(&config.azimuth.motor),
        config.azimuth.motor.invert_direction,
        current_sense_az,
        DEFAULT_RAMP_PER_MS,
        DEFAULT_PWM_FREQ,
        255,
    )?);
    let motor_alt = Arc::new(MotorDriver::connect(
        bus.clone(),
        motor_pins_from(&config.altitude.motor),
        config.altitude.motor.invert_direction,
        current_sense_alt,
        DEFAULT_RAMP_PER_MS,
        DEFAULT_PWM_FREQ,
        255,
    )?);

    let _voltage_monitor = config.voltage_monitor.as_ref().and_then(|vm| {
        let result = AdcSampler::start(
            "supply_voltage",
            bus.clone(),
            vm.adc.channel,
            vm.adc.factor,
            Duration::from_millis(vm.adc.period_ms),
            Duration::from_millis(vm.adc.integration_window_ms),
        );
        match result {
            Ok(adc) => Some(VoltageMonitor::new(Arc::new(adc), vm.nominal_voltage)),
            Err(e) => {
                error!("failed to start voltage monitor: {e}");
                None
            }
        }
    });

    let _temperature_monitor = if config.temperature_zones.is_empty() {
        None
    } else {
        let zones = config
            .temperature_zones
            .iter()
            .map(|z| (z.name.clone(), z.path.clone()))
            .collect();
        Some(TemperatureMonitor::start(
            zones,
            Duration::from_millis(config.temperature_period_ms),
            |path| std::fs::read_to_string(path).ok()?.trim().parse::<f64>().ok().map(|v| v / 1000.0),
        ))
    };

    if !enc_az.status_ok() {
        info!("azimuth encoder not yet synchronised, continuing");
    }

    let period = Duration::from_millis(config.poll_period_ms);
    let mut cycle = PollCycle::new(config, enc_az, enc_alt, motor_az, motor_alt);

    info!("entering pointing controller poll cycle");
    loop {
        let cycle_start = std::time::Instant::now();
        if let Err(e) = cycle.tick(SystemTime::now()) {
            error!("poll cycle error: {e}");
        }
        if let Some(remaining) = period.checked_sub(cycle_start.elapsed()) {
            std::thread::sleep(remaining);
        }
    }
}
