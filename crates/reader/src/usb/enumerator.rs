//! Sensor discovery
//!
//! Lists attached USB devices and keeps the ones whose descriptor carries
//! the requested vendor/product pair.

use crate::usb::backend::{DeviceRecord, UsbBackend};
use crate::usb::sysfs::PortResolver;
use protocol::{BusPortDescriptor, DeviceIdentity, SensorError};
use tracing::{debug, trace};

/// A device matching the requested vendor/product
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredDevice {
    pub identity: DeviceIdentity,
    /// Port chain reported by the USB stack (may be empty)
    pub port_numbers: Vec<u8>,
}

impl DiscoveredDevice {
    /// Stable port name used as calibration key
    ///
    /// Prefers the stack's port chain, then the resolver, then
    /// `"{bus}-{address}"`.
    pub fn port_descriptor(&self, resolver: &dyn PortResolver) -> BusPortDescriptor {
        let bus = self.identity.bus_number;
        let address = self.identity.device_address;

        BusPortDescriptor::from_port_chain(bus, &self.port_numbers)
            .or_else(|| resolver.resolve(bus, address).map(BusPortDescriptor::new))
            .unwrap_or_else(|| BusPortDescriptor::fallback(bus, address))
    }
}

/// Matching devices from one enumeration snapshot
///
/// Finite and single-pass: the snapshot is consumed as it is iterated.
pub struct MatchingDevices {
    records: std::vec::IntoIter<DeviceRecord>,
    vendor_id: u16,
    product_id: u16,
}

impl Iterator for MatchingDevices {
    type Item = DiscoveredDevice;

    fn next(&mut self) -> Option<Self::Item> {
        for record in self.records.by_ref() {
            let (vendor_id, product_id) = match record.ids {
                Ok(ids) => ids,
                Err(e) => {
                    debug!(
                        "Skipping bus {} device {}: descriptor read failed: {}",
                        record.bus_number, record.device_address, e
                    );
                    continue;
                }
            };

            if vendor_id != self.vendor_id || product_id != self.product_id {
                trace!(
                    "Ignoring {:04x}:{:04x} at bus {} device {}",
                    vendor_id, product_id, record.bus_number, record.device_address
                );
                continue;
            }

            return Some(DiscoveredDevice {
                identity: DeviceIdentity {
                    vendor_id,
                    product_id,
                    bus_number: record.bus_number,
                    device_address: record.device_address,
                },
                port_numbers: record.port_numbers,
            });
        }

        None
    }
}

/// List attached devices matching `vendor_id:product_id`
///
/// Fails only if the enumeration itself fails; devices whose descriptor
/// cannot be read are skipped.
pub fn list_matching_devices<B: UsbBackend>(
    backend: &B,
    vendor_id: u16,
    product_id: u16,
) -> Result<MatchingDevices, SensorError> {
    let records = backend.devices().map_err(SensorError::Enumeration)?;

    Ok(MatchingDevices {
        records: records.into_iter(),
        vendor_id,
        product_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::mock::{MockBackend, MockDevice};
    use protocol::UsbError;
    use protocol::commands::{PRODUCT_ID, VENDOR_ID};

    struct FixedResolver(Option<&'static str>);

    impl PortResolver for FixedResolver {
        fn resolve(&self, _bus: u8, _address: u8) -> Option<String> {
            self.0.map(String::from)
        }
    }

    fn other_device(bus: u8, address: u8) -> MockDevice {
        MockDevice::new(DeviceIdentity {
            vendor_id: 0x046d,
            product_id: 0xc52b,
            bus_number: bus,
            device_address: address,
        })
    }

    #[test]
    fn test_filters_by_vendor_and_product() {
        let backend = MockBackend::new(vec![
            other_device(1, 2),
            MockDevice::temper(1, 4),
            other_device(1, 5),
            MockDevice::temper(2, 3),
        ]);

        let found: Vec<_> = list_matching_devices(&backend, VENDOR_ID, PRODUCT_ID)
            .unwrap()
            .map(|d| (d.identity.bus_number, d.identity.device_address))
            .collect();

        assert_eq!(found, vec![(1, 4), (2, 3)]);
    }

    #[test]
    fn test_product_must_match_exactly() {
        let mut near = MockDevice::temper(1, 6);
        near.identity.product_id = 0x7402;
        let backend = MockBackend::new(vec![near]);

        assert_eq!(
            list_matching_devices(&backend, VENDOR_ID, PRODUCT_ID)
                .unwrap()
                .count(),
            0
        );
    }

    #[test]
    fn test_descriptor_error_skips_device() {
        let backend = MockBackend::new(vec![
            MockDevice::temper(1, 4).with_descriptor_error(UsbError::Io),
            MockDevice::temper(1, 5),
        ]);

        let found: Vec<_> = list_matching_devices(&backend, VENDOR_ID, PRODUCT_ID)
            .unwrap()
            .collect();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].identity.device_address, 5);
    }

    #[test]
    fn test_enumeration_failure() {
        let backend = MockBackend::failing_enumeration(UsbError::NoMem);

        let result = list_matching_devices(&backend, VENDOR_ID, PRODUCT_ID);

        assert!(matches!(
            result,
            Err(SensorError::Enumeration(UsbError::NoMem))
        ));
    }

    #[test]
    fn test_port_descriptor_prefers_port_chain() {
        let device = DiscoveredDevice {
            identity: MockDevice::temper(1, 9).identity,
            port_numbers: vec![1, 2],
        };
        let resolver = FixedResolver(Some("1-4"));

        assert_eq!(device.port_descriptor(&resolver).as_str(), "1-1.2");
    }

    #[test]
    fn test_port_descriptor_uses_resolver() {
        let device = DiscoveredDevice {
            identity: MockDevice::temper(1, 9).identity,
            port_numbers: Vec::new(),
        };

        assert_eq!(
            device.port_descriptor(&FixedResolver(Some("1-4"))).as_str(),
            "1-4"
        );
    }

    #[test]
    fn test_port_descriptor_fallback() {
        let device = DiscoveredDevice {
            identity: MockDevice::temper(3, 9).identity,
            port_numbers: Vec::new(),
        };

        assert_eq!(device.port_descriptor(&FixedResolver(None)).as_str(), "3-9");
    }
}
