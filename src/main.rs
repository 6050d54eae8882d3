//! CLI entry point for cryomon.
//!
//! Three ways to drive the monitor:
//! - `run`: scan-convert-persist cycles forever (the unattended mode)
//! - `scan`: one cycle, with the readings printed as a table
//! - `read`: one single-point readback of the currently selected channel
//!
//! # Usage
//!
//! Monitor the fridge with the simulated bridge:
//! ```bash
//! cryomon run --simulate
//! ```
//!
//! One real sweep of the rotator probe's mixing-chamber channels:
//! ```bash
//! cryomon scan --rig probe2 --channels 3,4
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use cryomon::acquisition::{AcquisitionCycle, AcquisitionLoop};
use cryomon::bridge::{BridgeConnector, SimulatedBridge};
use cryomon::config::{MonitorConfig, DEFAULT_CONFIG_PATH};
use cryomon::registry::{CalibrationRegistry, Rig};
use cryomon::scan::ScanProtocol;
use cryomon::storage::LogStore;
use cryomon::MonitorError;

#[derive(Parser)]
#[command(name = "cryomon")]
#[command(version, about = "Cryostat temperature monitor for the AVS-47 bridge")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// Configuration file path.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Rig to monitor (fridge, probe1, probe2, probe3); overrides the
    /// configuration file.
    #[arg(long)]
    rig: Option<Rig>,

    /// Channels to scan, comma separated; overrides the configuration file.
    #[arg(long, value_delimiter = ',')]
    channels: Option<Vec<u8>>,

    /// Talk to the simulated bridge instead of real hardware.
    #[arg(long)]
    simulate: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor continuously until interrupted.
    Run {
        #[command(flatten)]
        common: CommonArgs,

        /// Seconds between cycles; overrides the configuration file.
        #[arg(long)]
        delay: Option<u64>,
    },
    /// Run one acquisition cycle and print the readings.
    Scan {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Read the channel the bridge multiplexer currently selects.
    Read {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { common, delay } => {
            let config = load_config(&common, delay)?;
            run_monitor(config).await
        }
        Commands::Scan { common } => {
            let config = load_config(&common, None)?;
            scan_once(config).await
        }
        Commands::Read { common } => {
            let config = load_config(&common, None)?;
            read_once(config).await
        }
    }
}

/// Load the configuration file, apply CLI overrides and validate.
fn load_config(common: &CommonArgs, delay: Option<u64>) -> Result<MonitorConfig> {
    let mut config = MonitorConfig::load_from(&common.config)
        .with_context(|| format!("loading configuration from {}", common.config.display()))?;
    if let Some(rig) = common.rig {
        config.acquisition.rig = rig;
    }
    if let Some(channels) = &common.channels {
        config.acquisition.channels = channels.clone();
    }
    if common.simulate {
        config.instrument.simulate = true;
    }
    if let Some(delay) = delay {
        config.acquisition.delay_secs = delay;
    }
    config.validate()?;
    cryomon::logging::init(&config.log.filter);
    Ok(config)
}

/// Build the bridge connector the configuration asks for.
///
/// The simulator is seeded with a plausible mid-cooldown snapshot so that
/// demo scans produce believable numbers: 3K stage and magnet a few
/// kelvin, still below one kelvin, mixing chamber cold enough that the
/// Pt1000 is already out of its calibrated range.
async fn make_connector(config: &MonitorConfig) -> Result<Box<dyn BridgeConnector>> {
    if config.instrument.simulate {
        let sim = SimulatedBridge::with_resistances([
            (0, 15_000.0),
            (1, 100_000.0),
            (2, 5_000.0),
            (3, 10_000.0),
            (4, 12.0),
            (5, 16_000.0),
        ]);
        sim.set_noise_ohms(config.instrument.sim_noise_ohms).await;
        return Ok(Box::new(sim.connector()));
    }
    #[cfg(feature = "instrument_visa")]
    {
        Ok(Box::new(cryomon::bridge::VisaConnector::new(
            config.instrument.resource.clone(),
        )))
    }
    #[cfg(not(feature = "instrument_visa"))]
    {
        anyhow::bail!(
            "built without VISA support; rebuild with --features instrument_visa or pass --simulate"
        )
    }
}

/// `run`: cycles until Ctrl-C.
async fn run_monitor(config: MonitorConfig) -> Result<()> {
    let connector = make_connector(&config).await?;
    let registry = CalibrationRegistry::for_rig(config.acquisition.rig);
    let store = LogStore::new(config.storage.dir.clone(), config.storage_prefix());
    let cycle = AcquisitionCycle::new(
        connector.as_ref(),
        &registry,
        &store,
        &config.acquisition.channels,
        config.scan.sweep.clone(),
        Duration::from_secs(config.scan.poll_timeout_secs),
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping after the current cycle");
            let _ = cancel_tx.send(true);
        }
    });

    info!(
        rig = %config.acquisition.rig,
        channels = ?config.acquisition.channels,
        delay_secs = config.acquisition.delay_secs,
        "monitoring started"
    );
    let monitor = AcquisitionLoop::new(
        cycle,
        Duration::from_secs(config.acquisition.delay_secs),
        cancel_rx,
    );
    monitor.run().await?;
    Ok(())
}

/// `scan`: one cycle, readings printed like the old console table.
async fn scan_once(config: MonitorConfig) -> Result<()> {
    let connector = make_connector(&config).await?;
    let registry = CalibrationRegistry::for_rig(config.acquisition.rig);
    let store = LogStore::new(config.storage.dir.clone(), config.storage_prefix());
    let cycle = AcquisitionCycle::new(
        connector.as_ref(),
        &registry,
        &store,
        &config.acquisition.channels,
        config.scan.sweep.clone(),
        Duration::from_secs(config.scan.poll_timeout_secs),
    );

    let report = cycle.run().await?;
    for reading in &report.readings {
        println!(
            "{:>15}\t{:>10.2} Ω\t{:>10.5} K",
            reading.sensor, reading.resistance_ohms, reading.temperature_kelvin
        );
    }
    println!("Scanned in {:.1} seconds.", report.elapsed.as_secs_f64());
    Ok(())
}

/// `read`: single-point readback of the active channel.
async fn read_once(config: MonitorConfig) -> Result<()> {
    let connector = make_connector(&config).await?;
    let registry = CalibrationRegistry::for_rig(config.acquisition.rig);

    let mut transport = connector.connect().await?;
    let mut protocol = ScanProtocol::with_settings(
        &mut *transport,
        config.scan.sweep.clone(),
        Duration::from_secs(config.scan.poll_timeout_secs),
    );
    match protocol.read_active_channel().await {
        Ok(reading) => {
            let binding = registry.lookup(reading.channel)?;
            let temperature = binding.curve.evaluate(reading.resistance_ohms);
            println!(
                "Channel {}\t{}\tResistance {} Ω\tTemperature {:.4} K",
                reading.channel, binding.name, reading.resistance_ohms, temperature
            );
        }
        Err(MonitorError::Overload { channel }) => {
            println!("Channel {channel}: overloaded, reading discarded");
        }
        Err(err) => return Err(err.into()),
    }
    Ok(())
}
