//! Chamber controller: binary entry point.
//!
//! Wires the simulated chamber, the CSV data log and the log event sink
//! into a [`ChamberService`] and runs it for a fixed time or until killed.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │                                                              │
//! │  SimulatedChamber    CsvDataLog     LogEventSink   JsonFile  │
//! │  (Sensor+Actuator)   (Persistence)  (EventSink)    (Config)  │
//! │                                                              │
//! │  ─────────────────── Port Trait Boundary ──────────────────  │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │ ChamberService: acquisition · temperature · CO2 loops  │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use chamber::adapters::config_file::JsonFileConfig;
use chamber::adapters::datalog::CsvDataLog;
use chamber::adapters::log_sink::LogEventSink;
use chamber::adapters::sim::SimulatedChamber;
use chamber::app::ports::ConfigPort;
use chamber::app::service::ChamberService;
use chamber::scheduler::{Clock, SystemClock, Wake};

#[derive(Parser, Debug)]
#[command(name = "chamber", version, about = "Environmental chamber acquisition and control")]
struct Args {
    /// JSON configuration file; defaults apply if it does not exist
    #[arg(long, default_value = "chamber.json")]
    config: PathBuf,

    /// CSV data log, appended to across runs
    #[arg(long, default_value = "sensor_data.csv")]
    datalog: PathBuf,

    /// Stop after this many seconds instead of running until killed
    #[arg(long)]
    duration: Option<u64>,

    /// Starting temperature of the simulated chamber (°C)
    #[arg(long, default_value_t = 35.0)]
    start_temperature: f32,

    /// Starting CO2 of the simulated chamber (%)
    #[arg(long, default_value_t = 3.0)]
    start_co2: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = JsonFileConfig::new(&args.config)
        .load()
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let sim = Arc::new(SimulatedChamber::new(
        Arc::clone(&clock),
        args.start_temperature,
        args.start_co2,
    ));
    let datalog = CsvDataLog::open(&args.datalog)
        .with_context(|| format!("opening data log {}", args.datalog.display()))?;

    let mut service = ChamberService::new(
        config,
        sim.clone(),
        sim,
        Box::new(datalog),
        clock,
        Arc::new(LogEventSink::new()),
    )
    .context("invalid configuration")?;
    service.start()?;

    let observer = service.attach_observer();
    thread::Builder::new()
        .name("observer".into())
        .spawn(move || {
            for reading in observer {
                match reading.to_json() {
                    Ok(json) => info!("OBS   | {json}"),
                    Err(e) => warn!("Could not encode reading: {e}"),
                }
            }
        })
        .context("spawning observer thread")?;

    let stop = service.stop_token();
    match args.duration {
        Some(secs) => {
            stop.wait_timeout(Duration::from_secs(secs));
        }
        None => while stop.wait_timeout(Duration::from_secs(3_600)) == Wake::Elapsed {},
    }

    let report = service.shutdown();
    if !report.lagging.is_empty() {
        warn!("Exiting with loops still running: {:?}", report.lagging);
    }
    Ok(())
}
