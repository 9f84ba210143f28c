//! Sensor error types

use crate::types::{DeviceIdentity, UsbError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Step of the device pipeline that produced an error
///
/// The display form is the short tag written to the log next to the
/// numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    DetachKernelDriver(u8),
    SetConfiguration,
    ClaimInterface(u8),
    ReleaseInterface(u8),
    AttachKernelDriver(u8),
    /// Control transfer addressed to the given interface index
    ControlTransfer(u16),
    InterruptTransfer,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::DetachKernelDriver(i) => write!(f, "detach_kernel_driver({})", i),
            Stage::SetConfiguration => f.write_str("set_configuration"),
            Stage::ClaimInterface(i) => write!(f, "claim_interface({})", i),
            Stage::ReleaseInterface(i) => write!(f, "release_interface({})", i),
            Stage::AttachKernelDriver(i) => write!(f, "attach_kernel_driver({})", i),
            Stage::ControlTransfer(i) => write!(f, "control_transfer({})", i),
            Stage::InterruptTransfer => f.write_str("interrupt_transfer"),
        }
    }
}

/// Errors raised while talking to a sensor
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    /// The USB subsystem could not list devices
    #[error("USB enumeration failed: {0} (code {code})", code = .0.code())]
    Enumeration(UsbError),

    /// A matching device could not be opened
    #[error("Failed to open {device}: {error} (code {code})", code = .error.code())]
    DeviceOpen {
        device: DeviceIdentity,
        error: UsbError,
    },

    /// A step of the interface claim pipeline failed
    #[error("{stage} failed: {error} (code {code})", code = .error.code())]
    InterfaceClaim { stage: Stage, error: UsbError },

    /// The command or response phase of an exchange failed
    #[error("{stage} failed: {error} (code {code})", code = .error.code())]
    Protocol { stage: Stage, error: UsbError },

    /// The response loop gave up before collecting a full sample
    #[error("Short read: expected {expected} bytes, got {received}")]
    ShortRead { expected: usize, received: usize },

    /// Releasing interfaces or restoring kernel drivers failed
    #[error("{stage} failed during teardown: {error} (code {code})", code = .error.code())]
    Teardown { stage: Stage, error: UsbError },
}

impl SensorError {
    /// Pipeline step that failed, if the error is tied to one
    pub fn stage(&self) -> Option<Stage> {
        match self {
            SensorError::InterfaceClaim { stage, .. }
            | SensorError::Protocol { stage, .. }
            | SensorError::Teardown { stage, .. } => Some(*stage),
            SensorError::ShortRead { .. } => Some(Stage::InterruptTransfer),
            SensorError::Enumeration(_) | SensorError::DeviceOpen { .. } => None,
        }
    }

    /// Underlying libusb error code, if any
    pub fn code(&self) -> Option<i32> {
        match self {
            SensorError::Enumeration(error)
            | SensorError::DeviceOpen { error, .. }
            | SensorError::InterfaceClaim { error, .. }
            | SensorError::Protocol { error, .. }
            | SensorError::Teardown { error, .. } => Some(error.code()),
            SensorError::ShortRead { .. } => None,
        }
    }
}

/// Type alias for sensor results
pub type Result<T> = std::result::Result<T, SensorError>;
