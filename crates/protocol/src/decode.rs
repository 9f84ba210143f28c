//! Raw sample decoding
//!
//! The sensor answers a temperature query with an 8-byte report. Bytes 2
//! and 3 hold the reading as a big-endian two's complement value in units
//! of 1/256 °C; the remaining bytes are unused by this sensor family.

use crate::calibration::CalibrationTable;
use crate::commands::SAMPLE_LEN;
use crate::types::BusPortDescriptor;

/// Fixed-size response buffer returned by the device
pub type RawSample = [u8; SAMPLE_LEN];

/// Celsius per raw count
const CELSIUS_PER_COUNT: f64 = 125.0 / 32000.0;

/// Decode the signed 16-bit magnitude carried in bytes 2-3
pub fn decode(raw: &RawSample) -> i16 {
    let high = raw[2] as i32;
    let low = raw[3] as i32;
    let value = (low & 0xFF) | (high << 8);

    // Sign bit set: take the two's complement magnitude and negate it.
    let signed = if high & 0x80 != 0 {
        -((value ^ 0xFFFF) + 1)
    } else {
        value
    };

    signed as i16
}

/// Convert a raw magnitude into calibrated Celsius for the sensor on `port`
pub fn to_celsius(raw: i16, port: &BusPortDescriptor, calibration: &CalibrationTable) -> f64 {
    let celsius = raw as f64 * CELSIUS_PER_COUNT;
    calibration.lookup(port).apply(celsius)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationProfile;

    fn sample(high: u8, low: u8) -> RawSample {
        [0x80, 0x02, high, low, 0x4e, 0x20, 0x00, 0x00]
    }

    #[test]
    fn test_decode_positive() {
        assert_eq!(decode(&sample(0x00, 0x01)), 1);
        assert_eq!(decode(&sample(0x19, 0x00)), 6400);
        assert_eq!(decode(&sample(0x7F, 0xFF)), i16::MAX);
    }

    #[test]
    fn test_decode_negative() {
        assert_eq!(decode(&sample(0x80, 0x00)), -32768);
        assert_eq!(decode(&sample(0xFF, 0xFF)), -1);
        assert_eq!(decode(&sample(0xFF, 0x00)), -256);
    }

    #[test]
    fn test_decode_ignores_other_bytes() {
        let a = [0x00, 0x00, 0x12, 0x34, 0x00, 0x00, 0x00, 0x00];
        let b = [0xFF, 0xFF, 0x12, 0x34, 0xFF, 0xFF, 0xFF, 0xFF];
        assert_eq!(decode(&a), decode(&b));
    }

    #[test]
    fn test_to_celsius_default_calibration() {
        let table = CalibrationTable::new();
        let port = BusPortDescriptor::from("1-1");

        assert_eq!(to_celsius(0, &port, &table), 0.0);
        assert_eq!(to_celsius(256, &port, &table), 1.0);
        assert_eq!(to_celsius(-256, &port, &table), -1.0);
    }

    #[test]
    fn test_to_celsius_with_profile() {
        let mut table = CalibrationTable::new();
        table.insert(CalibrationProfile::new("1-1.2", 1.0287, -0.85));

        let port = BusPortDescriptor::from("1-1.2");
        let raw = 5760; // 22.5 C
        let expected = raw as f64 * 125.0 / 32000.0 * 1.0287 - 0.85;

        assert!((to_celsius(raw, &port, &table) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_to_celsius_profile_is_per_port() {
        let mut table = CalibrationTable::new();
        table.insert(CalibrationProfile::new("1-1.2", 2.0, 1.0));

        let other = BusPortDescriptor::from("1-1.3");
        assert_eq!(to_celsius(256, &other, &table), 1.0);
    }
}
