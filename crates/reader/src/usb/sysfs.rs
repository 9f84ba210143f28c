//! Bus-port resolution through sysfs
//!
//! When the USB stack does not report a device's port chain, the stable
//! physical name can still be found under `/sys/bus/usb/devices`: each
//! device directory (e.g. `1-1.2`) carries `busnum`, `devnum` and `devpath`
//! attributes, and the one whose numbers match the bus/address is the
//! device we are looking for.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Default sysfs directory listing USB devices
pub const SYSFS_USB_DEVICES: &str = "/sys/bus/usb/devices";

/// Maps a (bus, address) pair to a stable port name
pub trait PortResolver {
    fn resolve(&self, bus_number: u8, device_address: u8) -> Option<String>;
}

/// Resolver scanning a sysfs device tree
#[derive(Debug, Clone)]
pub struct SysfsPortResolver {
    root: PathBuf,
}

impl SysfsPortResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn matches(&self, dir: &Path, name: &str, bus_number: u8, device_address: u8) -> bool {
        let Some(devnum) = read_number(&dir.join("devnum")) else {
            return false;
        };
        if devnum != device_address as u32 {
            return false;
        }

        match read_number(&dir.join("busnum")) {
            Some(busnum) => busnum == bus_number as u32,
            None => name.starts_with(&format!("{}-", bus_number)),
        }
    }
}

impl Default for SysfsPortResolver {
    fn default() -> Self {
        Self::new(SYSFS_USB_DEVICES)
    }
}

impl PortResolver for SysfsPortResolver {
    fn resolve(&self, bus_number: u8, device_address: u8) -> Option<String> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot scan {}: {}", self.root.display(), e);
                return None;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            // Interface directories ("1-1.2:1.0") have no devnum of their own
            if name.starts_with('.') || name.contains(':') {
                continue;
            }

            let dir = entry.path();
            if !self.matches(&dir, &name, bus_number, device_address) {
                continue;
            }

            trace!("Bus {} device {} is {}", bus_number, device_address, name);
            let devpath = fs::read_to_string(dir.join("devpath"))
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty() && s != "0");

            return Some(match devpath {
                Some(devpath) => format!("{}-{}", bus_number, devpath),
                None => name,
            });
        }

        debug!(
            "No sysfs entry for bus {} device {} under {}",
            bus_number,
            device_address,
            self.root.display()
        );
        None
    }
}

fn read_number(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn add_device(root: &Path, name: &str, attrs: &[(&str, &str)]) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        for (attr, value) in attrs {
            fs::write(dir.join(attr), format!("{}\n", value)).unwrap();
        }
    }

    #[test]
    fn test_resolves_by_busnum_and_devnum() {
        let tmp = tempdir().unwrap();
        add_device(tmp.path(), "usb1", &[("busnum", "1"), ("devnum", "1"), ("devpath", "0")]);
        add_device(tmp.path(), "1-1", &[("busnum", "1"), ("devnum", "2"), ("devpath", "1")]);
        add_device(tmp.path(), "1-1.2", &[("busnum", "1"), ("devnum", "7"), ("devpath", "1.2")]);
        add_device(tmp.path(), "1-1.2:1.0", &[]);

        let resolver = SysfsPortResolver::new(tmp.path());

        assert_eq!(resolver.resolve(1, 7).as_deref(), Some("1-1.2"));
        assert_eq!(resolver.resolve(1, 2).as_deref(), Some("1-1"));
    }

    #[test]
    fn test_bus_number_must_match() {
        let tmp = tempdir().unwrap();
        add_device(tmp.path(), "1-3", &[("busnum", "1"), ("devnum", "5"), ("devpath", "3")]);
        add_device(tmp.path(), "10-4", &[("busnum", "10"), ("devnum", "5"), ("devpath", "4")]);

        let resolver = SysfsPortResolver::new(tmp.path());

        assert_eq!(resolver.resolve(10, 5).as_deref(), Some("10-4"));
        assert_eq!(resolver.resolve(1, 5).as_deref(), Some("1-3"));
        assert_eq!(resolver.resolve(2, 5), None);
    }

    #[test]
    fn test_falls_back_to_entry_name() {
        let tmp = tempdir().unwrap();
        add_device(tmp.path(), "2-1.4", &[("devnum", "9")]);

        let resolver = SysfsPortResolver::new(tmp.path());

        assert_eq!(resolver.resolve(2, 9).as_deref(), Some("2-1.4"));
        assert_eq!(resolver.resolve(3, 9), None);
    }

    #[test]
    fn test_missing_root() {
        let resolver = SysfsPortResolver::new("/nonexistent/sys/bus/usb/devices");
        assert_eq!(resolver.resolve(1, 1), None);
    }

    #[test]
    fn test_no_match() {
        let tmp = tempdir().unwrap();
        add_device(tmp.path(), "1-1", &[("busnum", "1"), ("devnum", "2"), ("devpath", "1")]);

        let resolver = SysfsPortResolver::new(tmp.path());
        assert_eq!(resolver.resolve(1, 3), None);
    }
}
