//! End-to-end pipeline tests
//!
//! Drives the worker thread through the async bridge against the in-memory
//! USB backend, then writes the readings through the CSV sink.

use common::test_utils::{DEFAULT_TEST_TIMEOUT, with_timeout};
use common::{SensorBridge, SensorCommand, create_sensor_bridge};
use protocol::{CalibrationProfile, CalibrationTable, SensorError, Stage, TemperatureUnit, UsbError};
use reader::usb::mock::{MockBackend, MockDevice};
use reader::usb::{PollSettings, PortResolver, SensorPoller, UsbWorkerThread};
use reader::{CsvSink, OutputSink};
use std::thread::JoinHandle;

/// Resolves every device to a fixed sysfs-style name
struct StaticResolver;

impl PortResolver for StaticResolver {
    fn resolve(&self, bus_number: u8, device_address: u8) -> Option<String> {
        Some(format!("{}-{}.1", bus_number, device_address))
    }
}

fn start(backend: &MockBackend, calibration: CalibrationTable) -> (SensorBridge, JoinHandle<()>) {
    let (bridge, worker) = create_sensor_bridge();
    let poller = SensorPoller::new(
        backend.clone(),
        StaticResolver,
        calibration,
        PollSettings::default(),
    );
    let handle = std::thread::spawn(move || UsbWorkerThread::new(worker, poller).run());
    (bridge, handle)
}

async fn stop(bridge: SensorBridge, handle: JoinHandle<()>) {
    bridge.send_command(SensorCommand::Shutdown).await.unwrap();
    handle.join().unwrap();
}

#[tokio::test]
async fn test_calibrated_readings_to_csv() {
    let backend = MockBackend::new(vec![
        // 0x1900 = 25.0 C
        MockDevice::temper(1, 4).with_ports(&[1, 2]).with_sample(0x1900),
        // 0xFF00 = -256 counts = -1.0 C
        MockDevice::temper(1, 7).with_sample(0xFF00),
    ]);
    let calibration: CalibrationTable = [CalibrationProfile::new("1-1.2", 1.0287, -0.85)]
        .into_iter()
        .collect();
    let (bridge, handle) = start(&backend, calibration);

    let report = with_timeout(DEFAULT_TEST_TIMEOUT, bridge.poll(TemperatureUnit::Celsius))
        .await
        .unwrap()
        .unwrap();
    stop(bridge, handle).await;

    let mut sink = CsvSink::new(Vec::new());
    for reading in &report.readings {
        sink.emit(reading).unwrap();
    }
    let lines: Vec<String> = String::from_utf8(sink.into_inner())
        .unwrap()
        .lines()
        .map(|l| l.split_once(',').unwrap().1.to_string())
        .collect();

    // 25.0 * 1.0287 - 0.85 = 24.8675
    assert_eq!(lines, vec!["24.87,1-1.2", "-1.00,1-7.1"]);
}

#[tokio::test]
async fn test_failure_reported_alongside_readings() {
    let broken = MockDevice::temper(1, 4)
        .with_kernel_driver()
        .failing_at(Stage::SetConfiguration, UsbError::Busy);
    let broken_id = broken.identity;
    let backend = MockBackend::new(vec![broken, MockDevice::temper(1, 5).with_sample(0x1900)]);
    let (bridge, handle) = start(&backend, CalibrationTable::new());

    let report = bridge.poll(TemperatureUnit::Fahrenheit).await.unwrap();
    stop(bridge, handle).await;

    assert_eq!(report.readings.len(), 1);
    assert_eq!(report.readings[0].temperature, 77.0);
    assert_eq!(report.failures.len(), 1);

    let failure = &report.failures[0];
    assert_eq!(failure.identity, broken_id);
    assert_eq!(
        failure.error,
        SensorError::InterfaceClaim {
            stage: Stage::SetConfiguration,
            error: UsbError::Busy
        }
    );
    assert_eq!(failure.error.code(), Some(-6));
    // Drivers given back after the failed claim
    assert!(backend.driver_active(&broken_id, 0));
    assert!(backend.driver_active(&broken_id, 1));
}

#[tokio::test]
async fn test_replugged_sensor_gets_new_session() {
    let device = MockDevice::temper(2, 3).with_sample(0x1900);
    let old_id = device.identity;
    let backend = MockBackend::new(vec![device]);
    let (bridge, handle) = start(&backend, CalibrationTable::new());

    bridge.poll(TemperatureUnit::Celsius).await.unwrap();

    // Replug: the kernel hands out a new address
    backend.remove_device(&old_id);
    let replugged = MockDevice::temper(2, 9).with_sample(0x1A00);
    let new_id = replugged.identity;
    backend.add_device(replugged);

    let report = bridge.poll(TemperatureUnit::Celsius).await.unwrap();
    let sensors = bridge.list().await.unwrap();
    stop(bridge, handle).await;

    assert_eq!(report.readings.len(), 1);
    assert_eq!(report.readings[0].temperature, 26.0);
    assert_eq!(sensors.len(), 1);
    assert_eq!(sensors[0].identity, new_id);
    assert!(sensors[0].session_open);
    assert_eq!(backend.opens(&new_id), 1);
}

#[tokio::test]
async fn test_enumeration_failure_surfaces() {
    let backend = MockBackend::failing_enumeration(UsbError::Access);
    let (bridge, handle) = start(&backend, CalibrationTable::new());

    let result = bridge.poll(TemperatureUnit::Celsius).await;
    stop(bridge, handle).await;

    assert!(matches!(
        result,
        Err(common::Error::Sensor(SensorError::Enumeration(UsbError::Access)))
    ));
}
