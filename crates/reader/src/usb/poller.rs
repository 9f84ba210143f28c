//! Poll cycles
//!
//! One cycle walks every matching device in enumeration order and drives it
//! through discovery, session acquisition (open + claim), the exchange and
//! decoding. A device that fails at any step is recorded in the report and
//! the cycle moves on to the next device.

use crate::usb::backend::UsbBackend;
use crate::usb::enumerator::{DiscoveredDevice, MatchingDevices, list_matching_devices};
use crate::usb::session::SessionStore;
use crate::usb::sysfs::PortResolver;
use crate::usb::transfers::read_sample;
use common::{CycleReport, DeviceFailure, SensorInfo};
use protocol::{
    BusPortDescriptor, CalibrationTable, Reading, SensorError, TemperatureUnit, decode, to_celsius,
};
use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Which devices to poll and how long to keep them
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Keep sessions claimed between cycles instead of releasing each
    /// device once its reading is taken
    pub keep_sessions_open: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            vendor_id: protocol::commands::VENDOR_ID,
            product_id: protocol::commands::PRODUCT_ID,
            keep_sessions_open: true,
        }
    }
}

/// Owns everything a poll cycle needs
pub struct SensorPoller<B: UsbBackend, R: PortResolver> {
    backend: B,
    resolver: R,
    calibration: CalibrationTable,
    settings: PollSettings,
    sessions: SessionStore<B::Handle>,
}

impl<B: UsbBackend, R: PortResolver> SensorPoller<B, R> {
    pub fn new(backend: B, resolver: R, calibration: CalibrationTable, settings: PollSettings) -> Self {
        Self {
            backend,
            resolver,
            calibration,
            settings,
            sessions: SessionStore::new(),
        }
    }

    pub fn sessions(&self) -> &SessionStore<B::Handle> {
        &self.sessions
    }

    /// List matching devices without opening them
    pub fn list_sensors(&self) -> Result<Vec<SensorInfo>, SensorError> {
        let devices = self.discover()?;

        Ok(devices
            .map(|device| SensorInfo {
                port: device.port_descriptor(&self.resolver),
                session_open: self.sessions.contains(&device.identity),
                identity: device.identity,
            })
            .collect())
    }

    /// Read every matching device once
    ///
    /// Fails only if enumeration fails; per-device failures are collected in
    /// the report.
    pub fn poll_cycle(&mut self, unit: TemperatureUnit) -> Result<CycleReport, SensorError> {
        let devices = self.discover()?;
        let mut report = CycleReport::default();
        let mut seen = HashSet::new();

        for device in devices {
            let identity = device.identity;
            let port = device.port_descriptor(&self.resolver);
            seen.insert(identity);

            match self.read_device(&device, &port, unit) {
                Ok(reading) => {
                    debug!(
                        "{} on {}: {:.2} {}",
                        identity, port, reading.temperature, unit
                    );
                    report.readings.push(reading);
                }
                Err(error) => {
                    match (error.stage(), error.code()) {
                        (Some(stage), Some(code)) => {
                            warn!("{} on {}: {} failed, code {}", identity, port, stage, code)
                        }
                        _ => warn!("{} on {}: {}", identity, port, error),
                    }

                    // A failed exchange leaves the device in an unknown state;
                    // start over with a fresh session next cycle.
                    if matches!(
                        error,
                        SensorError::Protocol { .. } | SensorError::ShortRead { .. }
                    ) {
                        self.release(&identity);
                    }

                    report.failures.push(DeviceFailure {
                        identity,
                        port,
                        error,
                    });
                }
            }

            if !self.settings.keep_sessions_open {
                self.release(&identity);
            }
        }

        self.sessions.release_missing(&seen);

        if report.devices_seen() == 0 {
            info!(
                "No {:04x}:{:04x} devices found",
                self.settings.vendor_id, self.settings.product_id
            );
        }
        Ok(report)
    }

    /// Release every session
    pub fn shutdown(&mut self) {
        let open = self.sessions.len();
        for (identity, error) in self.sessions.release_all() {
            warn!("Teardown of {} failed: {}", identity, error);
        }
        debug!("Released {} sessions", open);
    }

    fn discover(&self) -> Result<MatchingDevices, SensorError> {
        list_matching_devices(
            &self.backend,
            self.settings.vendor_id,
            self.settings.product_id,
        )
    }

    fn read_device(
        &mut self,
        device: &DiscoveredDevice,
        port: &BusPortDescriptor,
        unit: TemperatureUnit,
    ) -> Result<Reading, SensorError> {
        let session = self.sessions.acquire(&self.backend, &device.identity)?;
        let raw = read_sample(session)?;

        let celsius = to_celsius(decode(&raw), port, &self.calibration);

        Ok(Reading {
            timestamp_secs: unix_now(),
            temperature: unit.convert(celsius),
            unit,
            port: port.clone(),
        })
    }

    fn release(&mut self, identity: &protocol::DeviceIdentity) {
        if let Some(Err(e)) = self.sessions.release(identity) {
            warn!("Teardown of {} failed: {}", identity, e);
        }
    }
}

impl<B: UsbBackend, R: PortResolver> Drop for SensorPoller<B, R> {
    fn drop(&mut self) {
        if !self.sessions.is_empty() {
            self.shutdown();
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
