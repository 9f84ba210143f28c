//! temper1 reader
//!
//! Polls TEMPer1 USB thermometers and emits calibrated readings. The
//! `temper1` binary wires these modules to the command line.

pub mod config;
pub mod output;
pub mod usb;

pub use config::ReaderConfig;
pub use output::{CsvSink, OutputSink};
