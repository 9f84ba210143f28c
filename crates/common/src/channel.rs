//! Async channel bridge between Tokio runtime and USB thread

use async_channel::{Receiver, Sender, bounded};
use protocol::{BusPortDescriptor, DeviceIdentity, Reading, SensorError, TemperatureUnit};

/// Commands from Tokio runtime to USB thread
#[derive(Debug)]
pub enum SensorCommand {
    /// List attached sensors without talking to them
    ListSensors {
        /// Channel to send response back
        response: tokio::sync::oneshot::Sender<Result<Vec<SensorInfo>, SensorError>>,
    },

    /// Read every attached sensor once, in enumeration order
    PollSensors {
        /// Unit readings are reported in
        unit: TemperatureUnit,
        /// Channel to send response back
        response: tokio::sync::oneshot::Sender<Result<CycleReport, SensorError>>,
    },

    /// Release all sessions and stop the USB thread
    Shutdown,
}

/// A sensor found during enumeration
#[derive(Debug, Clone, PartialEq)]
pub struct SensorInfo {
    pub identity: DeviceIdentity,
    pub port: BusPortDescriptor,
    /// Whether a session is currently held for this device
    pub session_open: bool,
}

/// A device whose pipeline failed during a poll cycle
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceFailure {
    pub identity: DeviceIdentity,
    pub port: BusPortDescriptor,
    pub error: SensorError,
}

/// Outcome of one poll cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// One reading per device that completed its exchange
    pub readings: Vec<Reading>,
    /// Devices that failed; other devices were still processed
    pub failures: Vec<DeviceFailure>,
}

impl CycleReport {
    /// Number of matching devices seen in the cycle
    pub fn devices_seen(&self) -> usize {
        self.readings.len() + self.failures.len()
    }
}

/// Handle for Tokio runtime (async)
#[derive(Clone)]
pub struct SensorBridge {
    cmd_tx: Sender<SensorCommand>,
}

impl SensorBridge {
    /// Send a command to the USB thread
    pub async fn send_command(&self, cmd: SensorCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Run one poll cycle and wait for its report
    pub async fn poll(&self, unit: TemperatureUnit) -> crate::Result<CycleReport> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send_command(SensorCommand::PollSensors { unit, response: tx })
            .await?;

        let report = rx
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))??;
        Ok(report)
    }

    /// List attached sensors
    pub async fn list(&self) -> crate::Result<Vec<SensorInfo>> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send_command(SensorCommand::ListSensors { response: tx })
            .await?;

        let sensors = rx
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))??;
        Ok(sensors)
    }
}

/// Handle for USB thread (blocking)
pub struct SensorWorker {
    pub(crate) cmd_rx: Receiver<SensorCommand>,
}

impl SensorWorker {
    /// Receive a command from Tokio runtime (blocking)
    pub fn recv_command(&self) -> crate::Result<SensorCommand> {
        self.cmd_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Try to receive a command without blocking
    pub fn try_recv_command(&self) -> Option<SensorCommand> {
        self.cmd_rx.try_recv().ok()
    }
}

/// Create the channel bridge between Tokio and USB thread
///
/// Returns (SensorBridge for Tokio, SensorWorker for USB thread)
pub fn create_sensor_bridge() -> (SensorBridge, SensorWorker) {
    let (cmd_tx, cmd_rx) = bounded(16);

    (SensorBridge { cmd_tx }, SensorWorker { cmd_rx })
}
