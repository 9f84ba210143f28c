//! In-memory USB backend for tests
//!
//! `MockBackend` holds a set of scripted devices. Every call made through a
//! `MockHandle` is recorded per device, kernel driver binding is tracked,
//! and failures can be injected at any pipeline stage.

use crate::usb::backend::{DeviceRecord, SensorHandle, UsbBackend};
use protocol::commands::{PRODUCT_ID, VENDOR_ID};
use protocol::{DeviceIdentity, Stage, UsbError};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A call observed on a mock handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    KernelDriverActive(u8),
    DetachKernelDriver(u8),
    AttachKernelDriver(u8),
    SetConfiguration(u8),
    ClaimInterface(u8),
    ReleaseInterface(u8),
    WriteControl {
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: Vec<u8>,
    },
    ReadInterrupt(u8),
}

/// Scripted device
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub identity: DeviceIdentity,
    pub port_numbers: Vec<u8>,
    pub descriptor_error: Option<UsbError>,
    pub open_error: Option<UsbError>,
    /// Error returned by kernel driver queries (e.g. NotSupported)
    pub driver_query_error: Option<UsbError>,
    /// Kernel driver bound to interfaces 0 and 1
    pub driver_active: [bool; 2],
    pub failures: Vec<(Stage, UsbError)>,
    /// Chunks returned by successive interrupt reads; empty means 0 bytes
    pub responses: VecDeque<Vec<u8>>,
}

impl MockDevice {
    /// A TEMPer1 with no kernel driver bound
    pub fn temper(bus_number: u8, device_address: u8) -> Self {
        Self::new(DeviceIdentity {
            vendor_id: VENDOR_ID,
            product_id: PRODUCT_ID,
            bus_number,
            device_address,
        })
    }

    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity,
            port_numbers: Vec::new(),
            descriptor_error: None,
            open_error: None,
            driver_query_error: None,
            driver_active: [false, false],
            failures: Vec::new(),
            responses: VecDeque::new(),
        }
    }

    pub fn with_ports(mut self, ports: &[u8]) -> Self {
        self.port_numbers = ports.to_vec();
        self
    }

    /// Bind usbhid to both interfaces
    pub fn with_kernel_driver(mut self) -> Self {
        self.driver_active = [true, true];
        self
    }

    pub fn with_descriptor_error(mut self, error: UsbError) -> Self {
        self.descriptor_error = Some(error);
        self
    }

    pub fn with_open_error(mut self, error: UsbError) -> Self {
        self.open_error = Some(error);
        self
    }

    pub fn with_driver_query_error(mut self, error: UsbError) -> Self {
        self.driver_query_error = Some(error);
        self
    }

    pub fn failing_at(mut self, stage: Stage, error: UsbError) -> Self {
        self.failures.push((stage, error));
        self
    }

    /// Queue a full 8-byte sample carrying `value` in bytes 2-3
    pub fn with_sample(mut self, value: u16) -> Self {
        self.responses.push_back(sample_bytes(value).to_vec());
        self
    }

    /// Queue a raw chunk returned by one interrupt read
    pub fn with_chunk(mut self, chunk: &[u8]) -> Self {
        self.responses.push_back(chunk.to_vec());
        self
    }

    fn failure(&self, stage: Stage) -> Option<UsbError> {
        self.failures
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, e)| e.clone())
    }
}

/// An 8-byte response carrying `value` big-endian in bytes 2-3
pub fn sample_bytes(value: u16) -> [u8; 8] {
    let [high, low] = value.to_be_bytes();
    [0x80, 0x02, high, low, 0x4e, 0x20, 0x00, 0x00]
}

#[derive(Debug, Default)]
struct MockState {
    devices: Vec<MockDevice>,
    enumeration_error: Option<UsbError>,
    opens: HashMap<DeviceIdentity, usize>,
    calls: HashMap<DeviceIdentity, Vec<Call>>,
}

impl MockState {
    fn device_mut(&mut self, identity: &DeviceIdentity) -> Option<&mut MockDevice> {
        self.devices.iter_mut().find(|d| d.identity == *identity)
    }
}

/// Scripted backend; clones share state
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new(devices: Vec<MockDevice>) -> Self {
        let backend = Self::default();
        backend.lock().devices = devices;
        backend
    }

    /// Make the enumeration call itself fail
    pub fn failing_enumeration(error: UsbError) -> Self {
        let backend = Self::default();
        backend.lock().enumeration_error = Some(error);
        backend
    }

    pub fn add_device(&self, device: MockDevice) {
        self.lock().devices.push(device);
    }

    /// Unplug a device; open handles start failing with NoDevice
    pub fn remove_device(&self, identity: &DeviceIdentity) {
        self.lock().devices.retain(|d| d.identity != *identity);
    }

    /// Queue another sample on an attached device
    pub fn push_sample(&self, identity: &DeviceIdentity, value: u16) {
        if let Some(device) = self.lock().device_mut(identity) {
            device.responses.push_back(sample_bytes(value).to_vec());
        }
    }

    /// Number of times `open` succeeded for the device
    pub fn opens(&self, identity: &DeviceIdentity) -> usize {
        self.lock().opens.get(identity).copied().unwrap_or(0)
    }

    /// Calls recorded on handles of the device, in order
    pub fn calls(&self, identity: &DeviceIdentity) -> Vec<Call> {
        self.lock().calls.get(identity).cloned().unwrap_or_default()
    }

    /// Whether a kernel driver is currently bound to `iface`
    pub fn driver_active(&self, identity: &DeviceIdentity, iface: u8) -> bool {
        let state = self.lock();
        state
            .devices
            .iter()
            .find(|d| d.identity == *identity)
            .map(|d| d.driver_active[iface as usize])
            .unwrap_or(false)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl UsbBackend for MockBackend {
    type Handle = MockHandle;

    fn devices(&self) -> Result<Vec<DeviceRecord>, UsbError> {
        let state = self.lock();
        if let Some(error) = &state.enumeration_error {
            return Err(error.clone());
        }

        Ok(state
            .devices
            .iter()
            .map(|d| DeviceRecord {
                bus_number: d.identity.bus_number,
                device_address: d.identity.device_address,
                ids: match &d.descriptor_error {
                    Some(e) => Err(e.clone()),
                    None => Ok((d.identity.vendor_id, d.identity.product_id)),
                },
                port_numbers: d.port_numbers.clone(),
            })
            .collect())
    }

    fn open(&self, identity: &DeviceIdentity) -> Result<MockHandle, UsbError> {
        let mut state = self.lock();
        let device = state.device_mut(identity).ok_or(UsbError::NoDevice)?;
        if let Some(error) = &device.open_error {
            return Err(error.clone());
        }

        *state.opens.entry(*identity).or_insert(0) += 1;
        Ok(MockHandle {
            identity: *identity,
            state: Arc::clone(&self.state),
        })
    }
}

/// Handle onto a scripted device
#[derive(Debug)]
pub struct MockHandle {
    identity: DeviceIdentity,
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// Record `call`, then run `f` against the device (NoDevice if unplugged)
    fn with_device<T>(
        &self,
        call: Call,
        f: impl FnOnce(&mut MockDevice) -> Result<T, UsbError>,
    ) -> Result<T, UsbError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.entry(self.identity).or_default().push(call);
        let device = state
            .device_mut(&self.identity)
            .ok_or(UsbError::NoDevice)?;
        f(device)
    }

    fn fail_or<T>(
        &self,
        call: Call,
        stage: Stage,
        f: impl FnOnce(&mut MockDevice) -> T,
    ) -> Result<T, UsbError> {
        self.with_device(call, |device| match device.failure(stage) {
            Some(error) => Err(error),
            None => Ok(f(device)),
        })
    }
}

impl SensorHandle for MockHandle {
    fn kernel_driver_active(&self, iface: u8) -> Result<bool, UsbError> {
        self.with_device(Call::KernelDriverActive(iface), |device| {
            match &device.driver_query_error {
                Some(error) => Err(error.clone()),
                None => Ok(device.driver_active[iface as usize]),
            }
        })
    }

    fn detach_kernel_driver(&mut self, iface: u8) -> Result<(), UsbError> {
        let stage = Stage::DetachKernelDriver(iface);
        self.with_device(Call::DetachKernelDriver(iface), |device| {
            if let Some(error) = device.failure(stage) {
                return Err(error);
            }
            if !device.driver_active[iface as usize] {
                return Err(UsbError::NotFound);
            }
            device.driver_active[iface as usize] = false;
            Ok(())
        })
    }

    fn attach_kernel_driver(&mut self, iface: u8) -> Result<(), UsbError> {
        self.fail_or(
            Call::AttachKernelDriver(iface),
            Stage::AttachKernelDriver(iface),
            |device| device.driver_active[iface as usize] = true,
        )
    }

    fn set_active_configuration(&mut self, config: u8) -> Result<(), UsbError> {
        self.fail_or(
            Call::SetConfiguration(config),
            Stage::SetConfiguration,
            |_| (),
        )
    }

    fn claim_interface(&mut self, iface: u8) -> Result<(), UsbError> {
        self.fail_or(
            Call::ClaimInterface(iface),
            Stage::ClaimInterface(iface),
            |_| (),
        )
    }

    fn release_interface(&mut self, iface: u8) -> Result<(), UsbError> {
        self.fail_or(
            Call::ReleaseInterface(iface),
            Stage::ReleaseInterface(iface),
            |_| (),
        )
    }

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<usize, UsbError> {
        let call = Call::WriteControl {
            request_type,
            request,
            value,
            index,
            data: data.to_vec(),
        };
        self.fail_or(call, Stage::ControlTransfer(index), |_| data.len())
    }

    fn read_interrupt(
        &self,
        endpoint: u8,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, UsbError> {
        self.fail_or(
            Call::ReadInterrupt(endpoint),
            Stage::InterruptTransfer,
            |device| match device.responses.pop_front() {
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    n
                }
                None => 0,
            },
        )
    }
}
