//! temper1
//!
//! Reads TEMPer1 USB thermometers and writes calibrated readings as CSV.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use common::{SensorBridge, SensorCommand, create_sensor_bridge, setup_logging};
use protocol::TemperatureUnit;
use reader::usb::spawn_usb_worker;
use reader::{CsvSink, OutputSink, ReaderConfig};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "temper1")]
#[command(author, version, about = "Read TEMPer1 USB thermometers")]
#[command(long_about = "
Polls every attached TEMPer1 (0c45:7401) thermometer and prints one CSV line
per reading: unix timestamp, temperature and the bus-port the sensor is
plugged into. Per-port calibration corrects unit-to-unit drift.

EXAMPLES:
    # Read every sensor once
    temper1

    # Read in Fahrenheit every 30 seconds until Ctrl+C
    temper1 --unit F --interval 30 --cycles 0

    # Append readings to a file using a calibration file
    temper1 --output ~/temps.csv --calibration ~/.config/temper1/calibration

    # List attached sensors without reading them
    temper1 --list-devices

CONFIGURATION:
    The reader looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/temper1/reader.toml
    3. /etc/temper1/reader.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List attached sensors and exit
    #[arg(long)]
    list_devices: bool,

    /// Temperature unit (C, F or K)
    #[arg(short, long, value_name = "UNIT")]
    unit: Option<TemperatureUnit>,

    /// Seconds between poll cycles
    #[arg(short, long, value_name = "SECS")]
    interval: Option<u64>,

    /// Number of poll cycles (0 = until Ctrl+C)
    #[arg(short = 'n', long, value_name = "N")]
    cycles: Option<u64>,

    /// Append readings to this file instead of stdout
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Calibration file (port scale offset per line)
    #[arg(long, value_name = "PATH")]
    calibration: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

impl Args {
    /// Overlay command-line values on the loaded configuration
    fn apply(&self, config: &mut ReaderConfig) {
        if let Some(level) = &self.log_level {
            config.reader.log_level = level.clone();
        }
        if let Some(unit) = self.unit {
            config.reader.unit = unit;
        }
        if let Some(interval) = self.interval {
            config.reader.poll_interval_secs = interval;
        }
        if let Some(cycles) = self.cycles {
            config.reader.cycles = cycles;
        }
        if let Some(output) = &self.output {
            config.reader.output = Some(output.clone());
        }
        if let Some(calibration) = &self.calibration {
            config.reader.calibration_file = Some(calibration.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = ReaderConfig::default();
        let path = ReaderConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        ReaderConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        ReaderConfig::load_or_default()
    };
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    setup_logging(&config.reader.log_level).context("Failed to setup logging")?;

    info!("temper1 v{}", env!("CARGO_PKG_VERSION"));

    let settings = config.poll_settings()?;
    let calibration = config
        .calibration_table()
        .context("Failed to load calibration")?;
    info!("{} calibration profile(s) loaded", calibration.len());

    // Initialize USB subsystem
    let (bridge, worker) = create_sensor_bridge();
    let worker_handle =
        spawn_usb_worker(worker, settings, calibration).context("Failed to spawn USB worker")?;

    let result = if args.list_devices {
        list_devices_mode(&bridge).await
    } else {
        run_poll_loop(&config, &bridge).await
    };

    // Cleanup: release every session and stop the worker
    info!("Shutting down USB subsystem...");
    if let Err(e) = bridge.send_command(SensorCommand::Shutdown).await {
        // Worker already gone; its own exit status says why
        warn!("Could not send shutdown: {}", e);
    }
    drop(bridge);

    match worker_handle.join() {
        Ok(Ok(())) => result,
        Ok(Err(e)) => Err(anyhow::Error::new(e).context("USB worker failed")),
        Err(e) => {
            error!("USB worker thread panicked: {:?}", e);
            result.and(Err(anyhow!("USB worker thread panicked")))
        }
    }
}

/// List attached sensors and exit
async fn list_devices_mode(bridge: &SensorBridge) -> Result<()> {
    let sensors = bridge.list().await.context("Failed to list sensors")?;

    if sensors.is_empty() {
        println!("No TEMPer1 sensors found.");
    } else {
        println!("Found {} sensor(s):\n", sensors.len());
        for sensor in sensors {
            println!("  {}  port {}", sensor.identity, sensor.port);
        }
    }

    Ok(())
}

/// Run poll cycles until the cycle count is reached or Ctrl+C
///
/// Fails on the first cycle whose enumeration fails.
async fn run_poll_loop(config: &ReaderConfig, bridge: &SensorBridge) -> Result<()> {
    let unit = config.reader.unit;
    let cycles = config.reader.cycles;
    let mut sink = CsvSink::open(config.output_path().as_deref())?;

    let mut ticker = tokio::time::interval(Duration::from_secs(config.reader.poll_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    if cycles == 0 {
        info!("Polling every {}s, press Ctrl+C to stop", config.reader.poll_interval_secs);
    }

    let mut completed = 0u64;
    while cycles == 0 || completed < cycles {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut ctrl_c => {
                info!("Received Ctrl+C, shutting down gracefully...");
                break;
            }
        }

        let report = tokio::select! {
            report = bridge.poll(unit) => report,
            _ = &mut ctrl_c => {
                info!("Received Ctrl+C, shutting down gracefully...");
                break;
            }
        };
        completed += 1;

        match report {
            Ok(report) => {
                for reading in &report.readings {
                    sink.emit(reading)?;
                }
                if !report.failures.is_empty() {
                    warn!(
                        "Cycle {}: {} of {} sensor(s) failed",
                        completed,
                        report.failures.len(),
                        report.devices_seen()
                    );
                }
            }
            // A cycle only fails as a whole when enumeration fails
            Err(common::Error::Sensor(e)) => {
                error!("Cycle {}: {}", completed, e);
                return Err(e).context("Cannot enumerate USB devices");
            }
            Err(e) => return Err(e).context("USB worker unavailable"),
        }
    }

    Ok(())
}
