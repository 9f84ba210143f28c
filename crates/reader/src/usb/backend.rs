//! USB access seam
//!
//! The sensor pipeline talks to the bus through two small traits so the
//! claim/exchange logic can run against libusb in production and against
//! an in-memory device in tests. `RusbBackend` is the libusb implementation.

use protocol::{DeviceIdentity, UsbError};
use rusb::{Context, DeviceHandle, UsbContext};
use std::time::Duration;
use tracing::debug;

/// Operations the sensor pipeline needs from an open device
pub trait SensorHandle {
    /// Whether a kernel driver is bound to `iface`
    fn kernel_driver_active(&self, iface: u8) -> Result<bool, UsbError>;

    fn detach_kernel_driver(&mut self, iface: u8) -> Result<(), UsbError>;

    fn attach_kernel_driver(&mut self, iface: u8) -> Result<(), UsbError>;

    fn set_active_configuration(&mut self, config: u8) -> Result<(), UsbError>;

    fn claim_interface(&mut self, iface: u8) -> Result<(), UsbError>;

    fn release_interface(&mut self, iface: u8) -> Result<(), UsbError>;

    /// Host-to-device control transfer; returns the bytes written
    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, UsbError>;

    /// Interrupt IN transfer; returns the bytes read
    fn read_interrupt(
        &self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError>;
}

/// One attached device as seen by enumeration
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub bus_number: u8,
    pub device_address: u8,
    /// (vendor, product) from the device descriptor
    pub ids: Result<(u16, u16), UsbError>,
    /// Port chain from the root hub, empty when the stack does not report it
    pub port_numbers: Vec<u8>,
}

/// Access to the set of attached devices
pub trait UsbBackend {
    type Handle: SensorHandle;

    /// Snapshot of all attached devices
    fn devices(&self) -> Result<Vec<DeviceRecord>, UsbError>;

    /// Open the device currently at the identity's bus/address
    fn open(&self, identity: &DeviceIdentity) -> Result<Self::Handle, UsbError>;
}

/// libusb backend
pub struct RusbBackend {
    context: Context,
}

impl RusbBackend {
    /// Initialize a libusb context
    pub fn new() -> Result<Self, UsbError> {
        let context = Context::new().map_err(map_rusb_error)?;
        Ok(Self { context })
    }
}

impl UsbBackend for RusbBackend {
    type Handle = DeviceHandle<Context>;

    fn devices(&self) -> Result<Vec<DeviceRecord>, UsbError> {
        let list = self.context.devices().map_err(map_rusb_error)?;

        let records = list
            .iter()
            .map(|device| DeviceRecord {
                bus_number: device.bus_number(),
                device_address: device.address(),
                ids: device
                    .device_descriptor()
                    .map(|d| (d.vendor_id(), d.product_id()))
                    .map_err(map_rusb_error),
                port_numbers: device.port_numbers().unwrap_or_default(),
            })
            .collect::<Vec<_>>();

        debug!("Enumerated {} USB devices", records.len());
        Ok(records)
    }

    fn open(&self, identity: &DeviceIdentity) -> Result<Self::Handle, UsbError> {
        let list = self.context.devices().map_err(map_rusb_error)?;

        let device = list
            .iter()
            .find(|d| {
                d.bus_number() == identity.bus_number && d.address() == identity.device_address
            })
            .ok_or(UsbError::NoDevice)?;

        let handle = device.open().map_err(map_rusb_error)?;
        debug!("Opened device {}", identity);
        Ok(handle)
    }
}

impl<T: UsbContext> SensorHandle for DeviceHandle<T> {
    fn kernel_driver_active(&self, iface: u8) -> Result<bool, UsbError> {
        DeviceHandle::kernel_driver_active(self, iface).map_err(map_rusb_error)
    }

    fn detach_kernel_driver(&mut self, iface: u8) -> Result<(), UsbError> {
        DeviceHandle::detach_kernel_driver(self, iface).map_err(map_rusb_error)
    }

    fn attach_kernel_driver(&mut self, iface: u8) -> Result<(), UsbError> {
        DeviceHandle::attach_kernel_driver(self, iface).map_err(map_rusb_error)
    }

    fn set_active_configuration(&mut self, config: u8) -> Result<(), UsbError> {
        DeviceHandle::set_active_configuration(self, config).map_err(map_rusb_error)
    }

    fn claim_interface(&mut self, iface: u8) -> Result<(), UsbError> {
        DeviceHandle::claim_interface(self, iface).map_err(map_rusb_error)
    }

    fn release_interface(&mut self, iface: u8) -> Result<(), UsbError> {
        DeviceHandle::release_interface(self, iface).map_err(map_rusb_error)
    }

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        DeviceHandle::write_control(self, request_type, request, value, index, data, timeout)
            .map_err(map_rusb_error)
    }

    fn read_interrupt(
        &self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        DeviceHandle::read_interrupt(self, endpoint, buf, timeout).map_err(map_rusb_error)
    }
}

/// Map rusb::Error to protocol::UsbError
pub fn map_rusb_error(err: rusb::Error) -> UsbError {
    match err {
        rusb::Error::Io => UsbError::Io,
        rusb::Error::InvalidParam => UsbError::InvalidParam,
        rusb::Error::Access => UsbError::Access,
        rusb::Error::NoDevice => UsbError::NoDevice,
        rusb::Error::NotFound => UsbError::NotFound,
        rusb::Error::Busy => UsbError::Busy,
        rusb::Error::Timeout => UsbError::Timeout,
        rusb::Error::Overflow => UsbError::Overflow,
        rusb::Error::Pipe => UsbError::Pipe,
        rusb::Error::Interrupted => UsbError::Interrupted,
        rusb::Error::NoMem => UsbError::NoMem,
        rusb::Error::NotSupported => UsbError::NotSupported,
        _ => UsbError::Other {
            message: err.to_string(),
        },
    }
}
