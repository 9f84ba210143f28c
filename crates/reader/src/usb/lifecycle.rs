//! Interface claim pipeline
//!
//! Before the sensor can be driven, both of its HID interfaces have to be
//! taken away from the kernel's usbhid driver and claimed:
//!
//! 1. detach kernel driver from interface 0
//! 2. detach kernel driver from interface 1
//! 3. set configuration 1
//! 4. claim interface 0
//! 5. claim interface 1
//!
//! Each stage runs only if the previous one succeeded; the first failure is
//! returned and nothing after it is attempted. Teardown mirrors the claim:
//! release interface 1, release interface 0, then reattach the kernel driver
//! to interface 1 and 0, but only where one was actually detached.

use crate::usb::backend::SensorHandle;
use protocol::commands::{CONFIGURATION, INTERFACES};
use protocol::{SensorError, Stage, UsbError};
use tracing::{debug, warn};

/// What the claim pipeline has done to a device so far
///
/// Teardown only undoes steps recorded here, and clears each record as it
/// goes, so running it twice is harmless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClaimState {
    /// A kernel driver was detached from interface 0/1
    detached: [bool; 2],
    /// Interface 0/1 is claimed
    claimed: [bool; 2],
}

impl ClaimState {
    pub fn driver_detached(&self, iface: u8) -> bool {
        self.detached.get(iface as usize).copied().unwrap_or(false)
    }

    pub fn interface_claimed(&self, iface: u8) -> bool {
        self.claimed.get(iface as usize).copied().unwrap_or(false)
    }

    /// Both interfaces claimed
    pub fn is_claimed(&self) -> bool {
        self.claimed.iter().all(|c| *c)
    }

    /// Something remains to be undone
    pub fn needs_teardown(&self) -> bool {
        self.detached.iter().chain(self.claimed.iter()).any(|s| *s)
    }
}

/// Run the claim pipeline, recording progress in `state`
///
/// On error the caller is responsible for calling [`release`] to undo the
/// stages that did complete.
pub fn claim<H: SensorHandle>(handle: &mut H, state: &mut ClaimState) -> Result<(), SensorError> {
    for (slot, &iface) in INTERFACES.iter().enumerate() {
        state.detached[slot] = detach_driver(handle, iface)?;
    }

    handle
        .set_active_configuration(CONFIGURATION)
        .map_err(|error| claim_error(Stage::SetConfiguration, error))?;
    debug!("Set configuration {}", CONFIGURATION);

    for (slot, &iface) in INTERFACES.iter().enumerate() {
        handle
            .claim_interface(iface)
            .map_err(|error| claim_error(Stage::ClaimInterface(iface), error))?;
        state.claimed[slot] = true;
        debug!("Claimed interface {}", iface);
    }

    Ok(())
}

/// Undo whatever `claim` did
///
/// Every recorded step is attempted even if an earlier one fails; the first
/// failure is returned.
pub fn release<H: SensorHandle>(handle: &mut H, state: &mut ClaimState) -> Result<(), SensorError> {
    let mut first_error = None;

    for (slot, &iface) in INTERFACES.iter().enumerate().rev() {
        if !state.claimed[slot] {
            continue;
        }
        state.claimed[slot] = false;

        match handle.release_interface(iface) {
            Ok(()) => debug!("Released interface {}", iface),
            Err(error) => {
                warn!("Failed to release interface {}: {} (code {})", iface, error, error.code());
                first_error.get_or_insert(SensorError::Teardown {
                    stage: Stage::ReleaseInterface(iface),
                    error,
                });
            }
        }
    }

    for (slot, &iface) in INTERFACES.iter().enumerate().rev() {
        if !state.detached[slot] {
            continue;
        }
        state.detached[slot] = false;

        match handle.attach_kernel_driver(iface) {
            Ok(()) => debug!("Reattached kernel driver to interface {}", iface),
            Err(error) => {
                warn!(
                    "Failed to reattach kernel driver to interface {}: {} (code {})",
                    iface,
                    error,
                    error.code()
                );
                first_error.get_or_insert(SensorError::Teardown {
                    stage: Stage::AttachKernelDriver(iface),
                    error,
                });
            }
        }
    }

    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Detach the kernel driver from `iface`
///
/// Returns whether a driver was actually detached. An interface with no
/// driver bound (or a platform without kernel drivers) is not an error.
fn detach_driver<H: SensorHandle>(handle: &mut H, iface: u8) -> Result<bool, SensorError> {
    let stage = Stage::DetachKernelDriver(iface);

    match handle.kernel_driver_active(iface) {
        Ok(true) => {}
        Ok(false) => {
            debug!("No kernel driver active on interface {}", iface);
            return Ok(false);
        }
        Err(UsbError::NotSupported) => {
            debug!("Kernel driver query not supported for interface {}", iface);
            return Ok(false);
        }
        Err(error) => return Err(claim_error(stage, error)),
    }

    match handle.detach_kernel_driver(iface) {
        Ok(()) => {
            debug!("Detached kernel driver from interface {}", iface);
            Ok(true)
        }
        Err(UsbError::NotFound) => {
            debug!("Kernel driver already gone from interface {}", iface);
            Ok(false)
        }
        Err(error) => Err(claim_error(stage, error)),
    }
}

fn claim_error(stage: Stage, error: UsbError) -> SensorError {
    SensorError::InterfaceClaim { stage, error }
}
