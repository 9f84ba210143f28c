//! Common utilities for temper1
//!
//! This crate provides the pieces shared around the sensor core: error
//! handling, logging setup, and the async channel bridge between the Tokio
//! runtime and the blocking USB worker thread.

pub mod channel;
pub mod error;
pub mod logging;
pub mod test_utils;

pub use channel::{
    CycleReport, DeviceFailure, SensorBridge, SensorCommand, SensorInfo, SensorWorker,
    create_sensor_bridge,
};
pub use error::{Error, Result};
pub use logging::setup_logging;
