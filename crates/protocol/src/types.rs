//! Device and reading type definitions
//!
//! This module defines the identifiers used to address a sensor on the bus,
//! the stable port descriptor used as calibration key, the USB error codes
//! surfaced by the transport, and the reading handed to the output sink.

use crate::units::TemperatureUnit;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identity of an attached USB device
///
/// Supplied by enumeration. The bus number and device address are assigned
/// by the USB stack and are not stable across replug, so they identify a
/// device only for the lifetime of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Bus number
    pub bus_number: u8,
    /// Device address on the bus
    pub device_address: u8,
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} (bus {:03} device {:03})",
            self.vendor_id, self.product_id, self.bus_number, self.device_address
        )
    }
}

/// Stable physical attachment point of a device (bus + port chain)
///
/// Rendered the way Linux names devices under `/sys/bus/usb/devices`,
/// e.g. `1-1.2` for bus 1, port 1, then port 2 on the hub behind it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusPortDescriptor(String);

impl BusPortDescriptor {
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self(descriptor.into())
    }

    /// Build a descriptor from the port chain reported by the USB stack
    ///
    /// Returns None for an empty chain (root hubs, or stacks that do not
    /// expose topology).
    pub fn from_port_chain(bus_number: u8, ports: &[u8]) -> Option<Self> {
        if ports.is_empty() {
            return None;
        }

        let chain = ports
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(".");
        Some(Self(format!("{}-{}", bus_number, chain)))
    }

    /// Last-resort descriptor built from the (unstable) bus address
    pub fn fallback(bus_number: u8, device_address: u8) -> Self {
        Self(format!("{}-{}", bus_number, device_address))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BusPortDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BusPortDescriptor {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// USB transport error
///
/// Mirrors the libusb error set so the numeric code can be reported
/// alongside the failing step.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum UsbError {
    /// Input/output error
    #[error("input/output error")]
    Io,
    /// Invalid parameter
    #[error("invalid parameter")]
    InvalidParam,
    /// Access denied (permissions)
    #[error("access denied (insufficient permissions)")]
    Access,
    /// Device was disconnected
    #[error("no such device (it may have been disconnected)")]
    NoDevice,
    /// Entity not found (also: no kernel driver attached)
    #[error("entity not found")]
    NotFound,
    /// Resource busy
    #[error("resource busy")]
    Busy,
    /// Transfer timed out
    #[error("operation timed out")]
    Timeout,
    /// Buffer overflow
    #[error("overflow")]
    Overflow,
    /// Endpoint stalled
    #[error("pipe error")]
    Pipe,
    /// System call interrupted
    #[error("system call interrupted")]
    Interrupted,
    /// Insufficient memory
    #[error("insufficient memory")]
    NoMem,
    /// Operation not supported on this platform
    #[error("operation not supported or unimplemented on this platform")]
    NotSupported,
    /// Other error with message
    #[error("{message}")]
    Other { message: String },
}

impl UsbError {
    /// libusb numeric error code
    pub fn code(&self) -> i32 {
        match self {
            UsbError::Io => -1,
            UsbError::InvalidParam => -2,
            UsbError::Access => -3,
            UsbError::NoDevice => -4,
            UsbError::NotFound => -5,
            UsbError::Busy => -6,
            UsbError::Timeout => -7,
            UsbError::Overflow => -8,
            UsbError::Pipe => -9,
            UsbError::Interrupted => -10,
            UsbError::NoMem => -11,
            UsbError::NotSupported => -12,
            UsbError::Other { .. } => -99,
        }
    }
}

/// A decoded, calibrated and unit-converted temperature
///
/// Produced once per successful exchange and handed to the output sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Seconds since the Unix epoch at decode time
    pub timestamp_secs: u64,
    /// Temperature in `unit`
    pub temperature: f64,
    /// Unit of `temperature`
    pub unit: TemperatureUnit,
    /// Physical port the sensor is attached to
    pub port: BusPortDescriptor,
}
