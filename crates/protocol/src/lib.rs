//! Protocol library for temper1
//!
//! This crate defines everything about the TEMPer1 sensor that does not
//! touch the USB transport: device identifiers, wire constants and command
//! payloads, the error taxonomy, raw sample decoding, per-port calibration
//! and unit conversion.
//!
//! # Example
//!
//! ```
//! use protocol::{BusPortDescriptor, CalibrationTable, TemperatureUnit};
//! use protocol::{decode, to_celsius};
//!
//! // Bytes 2-3 carry 0x1900 = 6400 counts = 25.0 C
//! let raw = [0x80, 0x02, 0x19, 0x00, 0x4e, 0x20, 0x00, 0x00];
//! let port = BusPortDescriptor::from("1-1.2");
//!
//! let celsius = to_celsius(decode(&raw), &port, &CalibrationTable::new());
//! assert_eq!(celsius, 25.0);
//! assert_eq!(TemperatureUnit::Fahrenheit.convert(celsius), 77.0);
//! ```

pub mod calibration;
pub mod commands;
pub mod decode;
pub mod error;
pub mod types;
pub mod units;

pub use calibration::{Calibration, CalibrationProfile, CalibrationTable};
pub use commands::Command;
pub use decode::{RawSample, decode, to_celsius};
pub use error::{Result, SensorError, Stage};
pub use types::{BusPortDescriptor, DeviceIdentity, Reading, UsbError};
pub use units::{TemperatureUnit, convert_unit};
