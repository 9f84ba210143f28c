//! USB subsystem
//!
//! Everything that talks to the sensors:
//! - Device enumeration and bus-port naming
//! - Interface claim and teardown
//! - Command/response transfers
//! - Session caching and poll cycles
//!
//! The subsystem runs in a dedicated thread (worker) to avoid blocking
//! the Tokio async runtime.

pub mod backend;
pub mod enumerator;
pub mod lifecycle;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod poller;
pub mod session;
pub mod sysfs;
pub mod transfers;
pub mod worker;

// Re-export public types
pub use backend::{RusbBackend, SensorHandle, UsbBackend};
pub use enumerator::{DiscoveredDevice, list_matching_devices};
pub use poller::{PollSettings, SensorPoller};
pub use session::{Session, SessionStore};
pub use sysfs::{PortResolver, SysfsPortResolver};
pub use worker::{UsbWorkerThread, spawn_usb_worker};
