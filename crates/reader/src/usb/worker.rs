//! USB worker thread
//!
//! Dedicated thread owning the USB context and every open session.
//! Communicates with the Tokio runtime via channels.
//!
//! All libusb calls are blocking, so they run here rather than on the async
//! runtime. The thread blocks on the command channel between poll cycles.

use crate::usb::backend::{RusbBackend, UsbBackend};
use crate::usb::poller::{PollSettings, SensorPoller};
use crate::usb::sysfs::{PortResolver, SysfsPortResolver};
use common::{SensorCommand, SensorWorker};
use protocol::{CalibrationTable, UsbError};
use tracing::{debug, error, info, warn};

/// USB worker thread
///
/// Owns the poller (and with it the session store) and processes commands
/// from the Tokio runtime.
pub struct UsbWorkerThread<B: UsbBackend, R: PortResolver> {
    poller: SensorPoller<B, R>,
    /// Communication channel with Tokio runtime
    worker: SensorWorker,
}

impl<B: UsbBackend, R: PortResolver> UsbWorkerThread<B, R> {
    pub fn new(worker: SensorWorker, poller: SensorPoller<B, R>) -> Self {
        Self { poller, worker }
    }

    /// Run the command loop
    ///
    /// Returns once a Shutdown command arrives or every bridge handle has
    /// been dropped. All sessions are released before returning.
    pub fn run(mut self) {
        info!("USB worker thread started");

        loop {
            match self.worker.recv_command() {
                Ok(SensorCommand::Shutdown) => {
                    info!("USB worker shutting down");
                    break;
                }
                Ok(cmd) => self.handle_command(cmd),
                Err(e) => {
                    debug!("Command channel closed: {}", e);
                    break;
                }
            }
        }

        self.poller.shutdown();
        info!("USB worker thread stopped");
    }

    /// Handle a command from the Tokio runtime
    fn handle_command(&mut self, cmd: SensorCommand) {
        // Wrap in catch_unwind to prevent panics from crashing the USB thread
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.handle_command_inner(cmd)
        }));

        if let Err(e) = result {
            error!("Panic in USB command handler: {:?}", e);
        }
    }

    fn handle_command_inner(&mut self, cmd: SensorCommand) {
        match cmd {
            SensorCommand::ListSensors { response } => {
                let result = self.poller.list_sensors();
                if let Ok(sensors) = &result {
                    debug!("Listing {} sensors", sensors.len());
                }
                let _ = response.send(result);
            }

            SensorCommand::PollSensors { unit, response } => {
                let result = self.poller.poll_cycle(unit);
                match &result {
                    Ok(report) => debug!(
                        "Cycle done: {} readings, {} failures",
                        report.readings.len(),
                        report.failures.len()
                    ),
                    Err(e) => warn!("Poll cycle failed: {}", e),
                }
                if response.send(result).is_err() {
                    debug!("Poll requester went away before the report was ready");
                }
            }

            SensorCommand::Shutdown => {
                // Already handled in run()
            }
        }
    }
}

/// Spawn the USB worker thread on the libusb backend
///
/// The USB context is created inside the thread; a failure to create it is
/// returned through the join handle.
pub fn spawn_usb_worker(
    worker: SensorWorker,
    settings: PollSettings,
    calibration: CalibrationTable,
) -> std::io::Result<std::thread::JoinHandle<Result<(), UsbError>>> {
    std::thread::Builder::new()
        .name("usb-worker".to_string())
        .spawn(move || {
            let backend = RusbBackend::new()?;
            let poller = SensorPoller::new(
                backend,
                SysfsPortResolver::default(),
                calibration,
                settings,
            );
            UsbWorkerThread::new(worker, poller).run();
            Ok(())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::mock::{MockBackend, MockDevice};
    use common::create_sensor_bridge;
    use protocol::TemperatureUnit;

    struct NoSysfs;

    impl PortResolver for NoSysfs {
        fn resolve(&self, _bus: u8, _address: u8) -> Option<String> {
            None
        }
    }

    fn spawn_mock(backend: &MockBackend) -> (common::SensorBridge, std::thread::JoinHandle<()>) {
        let (bridge, worker) = create_sensor_bridge();
        let poller = SensorPoller::new(
            backend.clone(),
            NoSysfs,
            CalibrationTable::new(),
            PollSettings::default(),
        );
        let handle = std::thread::spawn(move || UsbWorkerThread::new(worker, poller).run());
        (bridge, handle)
    }

    #[tokio::test]
    async fn test_poll_through_bridge() {
        let device = MockDevice::temper(1, 4).with_sample(0x1900);
        let backend = MockBackend::new(vec![device]);
        let (bridge, handle) = spawn_mock(&backend);

        let report = bridge.poll(TemperatureUnit::Kelvin).await.unwrap();
        assert_eq!(report.readings.len(), 1);
        assert!((report.readings[0].temperature - 298.15).abs() < 1e-9);

        bridge.send_command(SensorCommand::Shutdown).await.unwrap();
        handle.join().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_releases_sessions() {
        let device = MockDevice::temper(1, 4).with_kernel_driver().with_sample(0x1900);
        let id = device.identity;
        let backend = MockBackend::new(vec![device]);
        let (bridge, handle) = spawn_mock(&backend);

        bridge.poll(TemperatureUnit::Celsius).await.unwrap();
        assert!(!backend.driver_active(&id, 0));

        bridge.send_command(SensorCommand::Shutdown).await.unwrap();
        handle.join().unwrap();

        assert!(backend.driver_active(&id, 0));
        assert!(backend.driver_active(&id, 1));
    }

    #[tokio::test]
    async fn test_dropped_bridge_stops_worker() {
        let device = MockDevice::temper(1, 4).with_kernel_driver().with_sample(0x1900);
        let id = device.identity;
        let backend = MockBackend::new(vec![device]);
        let (bridge, handle) = spawn_mock(&backend);

        let sensors = bridge.list().await.unwrap();
        assert_eq!(sensors.len(), 1);
        bridge.poll(TemperatureUnit::Celsius).await.unwrap();
        drop(bridge);

        handle.join().unwrap();
        assert!(backend.driver_active(&id, 1));
    }
}
