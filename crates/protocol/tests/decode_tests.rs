//! Integration tests for sample decoding, calibration and unit conversion
//!
//! Covers the full path from an 8-byte device report to the value handed to
//! the output sink:
//! - Sign handling of the 16-bit magnitude
//! - Default and per-port calibration
//! - Unit conversion

use protocol::{
    BusPortDescriptor, CalibrationProfile, CalibrationTable, RawSample, TemperatureUnit,
    convert_unit, decode, to_celsius,
};

fn sample(value: u16) -> RawSample {
    let [high, low] = value.to_be_bytes();
    [0x80, 0x02, high, low, 0x00, 0x00, 0x00, 0x00]
}

mod decoding {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_min_and_max() {
        assert_eq!(decode(&sample(0x8000)), -32768);
        assert_eq!(decode(&sample(0x7FFF)), 32767);
        assert_eq!(decode(&sample(0x0001)), 1);
        assert_eq!(decode(&sample(0x0000)), 0);
    }

    proptest! {
        /// Property: values with the sign bit clear decode unchanged
        #[test]
        fn prop_positive_unchanged(value in 0u16..0x8000u16) {
            prop_assert_eq!(decode(&sample(value)) as i32, value as i32);
        }

        /// Property: values with the sign bit set decode to value - 65536
        #[test]
        fn prop_negative_wraps(value in 0x8000u16..=0xFFFFu16) {
            prop_assert_eq!(decode(&sample(value)) as i32, value as i32 - 65536);
        }

        /// Property: decoding agrees with native two's complement
        #[test]
        fn prop_matches_native(value in any::<u16>()) {
            prop_assert_eq!(decode(&sample(value)), i16::from_be_bytes(value.to_be_bytes()));
        }
    }
}

mod calibration {
    use super::*;

    #[test]
    fn test_default_calibration() {
        let table = CalibrationTable::new();
        let port = BusPortDescriptor::from("1-1");

        assert_eq!(to_celsius(0, &port, &table), 0.0);
        assert_eq!(to_celsius(256, &port, &table), 1.0);
    }

    #[test]
    fn test_profile_composition() {
        let table: CalibrationTable = [CalibrationProfile::new("1-1.2", 1.0287, -0.85)]
            .into_iter()
            .collect();
        let port = BusPortDescriptor::from("1-1.2");

        for raw in [-4096i16, 0, 256, 6400, 12800] {
            let expected = raw as f64 * 125.0 / 32000.0 * 1.0287 - 0.85;
            let actual = to_celsius(raw, &port, &table);
            assert!(
                (actual - expected).abs() < 1e-9,
                "raw {}: expected {}, got {}",
                raw,
                expected,
                actual
            );
        }
    }

    #[test]
    fn test_unknown_port_uses_identity() {
        let table: CalibrationTable = [CalibrationProfile::new("1-1.2", 1.0287, -0.85)]
            .into_iter()
            .collect();
        let calibration = table.lookup(&BusPortDescriptor::from("3-2"));

        assert_eq!(calibration.scale, 1.0);
        assert_eq!(calibration.offset, 0.0);
    }
}

mod units {
    use super::*;

    #[test]
    fn test_reference_points() {
        assert_eq!(convert_unit(0.0, 'F'), 32.0);
        assert_eq!(convert_unit(0.0, 'K'), 273.15);
        assert_eq!(convert_unit(25.0, 'C'), 25.0);
        assert_eq!(convert_unit(-40.0, 'f'), -40.0);
    }

    #[test]
    fn test_end_to_end_fahrenheit() {
        // 0x1900 = 6400 counts = 25.0 C = 77.0 F
        let raw = decode(&sample(0x1900));
        let celsius = to_celsius(raw, &BusPortDescriptor::from("1-1"), &CalibrationTable::new());

        assert_eq!(celsius, 25.0);
        assert_eq!(TemperatureUnit::Fahrenheit.convert(celsius), 77.0);
    }

    #[test]
    fn test_end_to_end_below_freezing() {
        // 0xFB00 = -1280 counts = -5.0 C
        let raw = decode(&sample(0xFB00));
        let celsius = to_celsius(raw, &BusPortDescriptor::from("1-1"), &CalibrationTable::new());

        assert_eq!(raw, -1280);
        assert_eq!(celsius, -5.0);
        assert!((TemperatureUnit::Kelvin.convert(celsius) - 268.15).abs() < 1e-9);
    }
}
