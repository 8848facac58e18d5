//! Spinner Emu - the controller's communication core on a host
//!
//! Runs the dispatcher with the spinner subsystem on a simulated stepper,
//! talking the line protocol over a serial port. Pair it with `comm-tester`
//! through a null-modem or a pty pair.
//!
//! # Usage
//!
//! ```bash
//! spinner-emu /dev/ttyUSB0 --baud 115200 --config spinner.toml
//! ```
//!
//! The optional configuration file holds a `[dispatcher]` table (buffer,
//! pool and queue sizes) and a `[spinner]` table (channel count, spindown
//! rate, tick interval).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use serial_dispatch::dispatch::Dispatcher;
use serial_dispatch::link::SerialLink;
use serial_dispatch::sched::{Step, Worker};
use serial_dispatch::spinner::{
    SimulatedStepper, SpinnerCatalog, SpinnerController, SpinnerSettings, StepperDriver, SUBSYSTEM_NAME,
};
use serial_dispatch::{Config, Result};

/// Shaft speed of the simulated motors at 100% rate
const FULL_SPEED_DEG_PER_SEC: f32 = 360.0;

/// Spinner emulator
#[derive(Parser, Debug)]
#[command(name = "spinner-emu")]
#[command(about = "Serial dispatcher and spinner subsystem on a simulated stepper")]
#[command(version)]
struct Args {
    /// Serial device path
    device: String,

    /// Baud rate
    #[arg(short, long, default_value = "115200")]
    baud: u32,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Contents of the configuration file
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
struct EmulatorConfig {
    dispatcher: Config,
    spinner: SpinnerSettings,
}

impl EmulatorConfig {
    fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: EmulatorConfig = toml::from_str(&text)?;
        config.dispatcher.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = match &args.config {
        Some(path) => EmulatorConfig::load(path)?,
        None => EmulatorConfig::default(),
    };
    info!("Spinner emulator v{}", serial_dispatch::VERSION);
    debug!("Configuration: {:?}", config);

    let settings = config.spinner.clone();
    let priority = config.dispatcher.task_priority;
    let idle = config.dispatcher.idle_poll_interval;

    let link = SerialLink::open(&args.device, args.baud, &config.dispatcher)?;

    let catalog = SpinnerCatalog::new(&config.dispatcher);
    let mut dispatcher = Dispatcher::new(config.dispatcher)?;
    let handle = dispatcher.register(SUBSYSTEM_NAME, catalog)?;

    let stepper = SimulatedStepper::new(settings.channel_count, FULL_SPEED_DEG_PER_SEC);
    let controller = Arc::new(Mutex::new(SpinnerController::new(handle, stepper, &settings)));

    let comm = dispatcher.start(link.rx.clone(), link.tx.clone());

    let requests = {
        let controller = Arc::clone(&controller);
        Worker::spawn("spinner", priority, idle, move || controller.lock().step())
    };

    let ticker = {
        let controller = Arc::clone(&controller);
        let mut last = Instant::now();
        Worker::spawn("spinner_tick", priority, settings.tick_interval, move || {
            let now = Instant::now();
            let dt = now - last;
            last = now;

            let mut controller = controller.lock();
            controller.tick(dt);
            controller.driver_mut().advance(dt);
            Step::Idle
        })
    };

    info!("Listening on {} at {} baud", args.device, args.baud);
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    requests.shutdown().await?;
    ticker.shutdown().await?;
    comm.shutdown().await?;

    {
        let controller = controller.lock();
        for channel in 0..settings.channel_count {
            debug!(
                channel,
                position = controller.driver().position(channel),
                "Final stepper position"
            );
        }
    }

    link.close()
}
