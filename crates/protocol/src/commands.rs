//! TEMPer1 wire constants and command payloads

use std::time::Duration;

/// Vendor ID of the TEMPer1 sensor family (Microdia)
pub const VENDOR_ID: u16 = 0x0c45;
/// Product ID of the TEMPer1 sensor family
pub const PRODUCT_ID: u16 = 0x7401;

/// Interfaces claimed for the exchange, in claim order
pub const INTERFACES: [u8; 2] = [0, 1];
/// The sensor's single configuration value
pub const CONFIGURATION: u8 = 0x01;

/// Host-to-device, class request, interface recipient
pub const CONTROL_REQUEST_TYPE: u8 = 0x21;
/// HID SET_REPORT
pub const CONTROL_REQUEST: u8 = 0x09;
/// Output report, id 0
pub const CONTROL_VALUE: u16 = 0x0200;

/// Interrupt IN endpoint carrying the response
pub const READ_ENDPOINT: u8 = 0x82;

/// Timeout for control transfers
pub const CONTROL_TIMEOUT: Duration = Duration::from_millis(5000);
/// Timeout for each interrupt read attempt
pub const READ_TIMEOUT: Duration = Duration::from_millis(5000);

/// Size of a response sample
pub const SAMPLE_LEN: usize = 8;

/// Read attempts allowed before a partial response is reported as short
pub const MAX_READ_ATTEMPTS: usize = 4;

/// Commands understood by the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Put the sensor in reporting mode; sent once per session
    Initialise,
    /// Ask for the current temperature
    QueryTemperature,
}

impl Command {
    /// Report payload sent with the control transfer
    pub fn payload(&self) -> &'static [u8] {
        match self {
            Command::Initialise => &[0x01, 0x01],
            Command::QueryTemperature => &[0x01, 0x80, 0x33, 0x01, 0x00, 0x00, 0x00, 0x00],
        }
    }

    /// wIndex of the control transfer
    pub fn interface(&self) -> u16 {
        match self {
            Command::Initialise => 0,
            Command::QueryTemperature => 1,
        }
    }
}
