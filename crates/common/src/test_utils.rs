//! Test utilities for temper1
//!
//! Provides mock values and helper functions for testing across crates.
//!
//! # Example
//!
//! ```
//! use common::test_utils::create_mock_identity;
//!
//! let id = create_mock_identity(1, 4);
//! assert_eq!(id.vendor_id, 0x0c45);
//! ```

use crate::channel::{CycleReport, DeviceFailure, SensorInfo};
use protocol::commands::{PRODUCT_ID, VENDOR_ID};
use protocol::{BusPortDescriptor, DeviceIdentity, Reading, SensorError, TemperatureUnit};
use std::future::Future;
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a TEMPer1 identity at the given bus/address
pub fn create_mock_identity(bus_number: u8, device_address: u8) -> DeviceIdentity {
    DeviceIdentity {
        vendor_id: VENDOR_ID,
        product_id: PRODUCT_ID,
        bus_number,
        device_address,
    }
}

/// Create a mock SensorInfo
pub fn create_mock_sensor_info(bus_number: u8, device_address: u8) -> SensorInfo {
    SensorInfo {
        identity: create_mock_identity(bus_number, device_address),
        port: BusPortDescriptor::new(format!("{}-1.{}", bus_number, device_address)),
        session_open: false,
    }
}

/// Create a list of mock sensors on bus 1
pub fn create_mock_sensor_list(count: u8) -> Vec<SensorInfo> {
    (1..=count).map(|i| create_mock_sensor_info(1, i)).collect()
}

/// Create a Celsius reading for `port`
pub fn create_mock_reading(port: &str, temperature: f64) -> Reading {
    Reading {
        timestamp_secs: 1_700_000_000,
        temperature,
        unit: TemperatureUnit::Celsius,
        port: BusPortDescriptor::from(port),
    }
}

/// Create a report with one reading per port and one failure per error
pub fn create_mock_report(ports: &[&str], failures: Vec<SensorError>) -> CycleReport {
    let readings = ports
        .iter()
        .enumerate()
        .map(|(i, port)| create_mock_reading(port, 20.0 + i as f64))
        .collect();

    let failures = failures
        .into_iter()
        .enumerate()
        .map(|(i, error)| {
            let identity = create_mock_identity(2, i as u8 + 1);
            DeviceFailure {
                identity,
                port: BusPortDescriptor::fallback(identity.bus_number, identity.device_address),
                error,
            }
        })
        .collect();

    CycleReport { readings, failures }
}

/// Run an async operation with a timeout
///
/// # Example
/// ```ignore
/// use common::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// #[tokio::test]
/// async fn test_with_timeout() {
///     let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await.unwrap();
///     assert_eq!(result, 42);
/// }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}
