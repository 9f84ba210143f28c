//! Integration tests for configuration loading
//!
//! Covers TOML files on disk, the line-oriented calibration file and how
//! the two calibration sources combine.

use protocol::{BusPortDescriptor, CalibrationProfile, TemperatureUnit};
use reader::ReaderConfig;
use std::fs;
use tempfile::tempdir;

const FULL_CONFIG: &str = r#"
[reader]
log_level = "debug"
unit = "K"
poll_interval_secs = 30
cycles = 0
output = "/var/lib/temper1/readings.csv"

[usb]
vendor_id = "0x0c45"
product_id = "0x7401"
keep_sessions_open = false

[[calibration]]
port = "1-1.2"
scale = 1.0287
offset = -0.85

[[calibration]]
port = "1-1.3"
scale = 0.99
offset = 0.1
"#;

mod toml_files {
    use super::*;

    #[test]
    fn test_load_full_config() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("reader.toml");
        fs::write(&path, FULL_CONFIG).unwrap();

        let config = ReaderConfig::load(Some(path)).unwrap();

        assert_eq!(config.reader.log_level, "debug");
        assert_eq!(config.reader.unit, TemperatureUnit::Kelvin);
        assert_eq!(config.reader.poll_interval_secs, 30);
        assert_eq!(config.reader.cycles, 0);
        assert!(!config.usb.keep_sessions_open);
        assert_eq!(config.calibration.len(), 2);
        assert_eq!(
            config.calibration[0],
            CalibrationProfile::new("1-1.2", 1.0287, -0.85)
        );
    }

    #[test]
    fn test_missing_file_is_error() {
        let tmp = tempdir().unwrap();

        let result = ReaderConfig::load(Some(tmp.path().join("absent.toml")));

        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            FULL_CONFIG.replace("\"debug\"", "\"verbose\""),
            FULL_CONFIG.replace("poll_interval_secs = 30", "poll_interval_secs = 0"),
            FULL_CONFIG.replace("\"0x0c45\"", "\"0c45\""),
            FULL_CONFIG.replace("scale = 0.99", "scale = 0.0"),
            FULL_CONFIG.replace("unit = \"K\"", "unit = \"X\""),
        ];

        for case in cases {
            assert!(ReaderConfig::parse(&case).is_err(), "accepted:\n{}", case);
        }
    }

    #[test]
    fn test_save_then_load() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("reader.toml");
        let mut config = ReaderConfig::default();
        config.reader.unit = TemperatureUnit::Fahrenheit;

        config.save(&path).unwrap();
        let loaded = ReaderConfig::load(Some(path)).unwrap();

        assert_eq!(loaded, config);
    }
}

mod calibration_sources {
    use super::*;

    #[test]
    fn test_file_overrides_toml_entries() {
        let tmp = tempdir().unwrap();
        let cal_path = tmp.path().join("calibration");
        fs::write(&cal_path, "# recalibrated\n1-1.2 1.0 -0.5\n2-4,1.01,0\n").unwrap();

        let mut config = ReaderConfig::parse(FULL_CONFIG).unwrap();
        config.reader.calibration_file = Some(cal_path);

        let table = config.calibration_table().unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.lookup(&BusPortDescriptor::from("1-1.2")).offset, -0.5);
        assert_eq!(table.lookup(&BusPortDescriptor::from("1-1.3")).scale, 0.99);
        assert_eq!(table.lookup(&BusPortDescriptor::from("2-4")).scale, 1.01);
    }

    #[test]
    fn test_malformed_file_names_line() {
        let tmp = tempdir().unwrap();
        let cal_path = tmp.path().join("calibration");
        fs::write(&cal_path, "1-1.2 1.0 -0.5\n1-1.3 one 0\n").unwrap();

        let mut config = ReaderConfig::default();
        config.reader.calibration_file = Some(cal_path);

        let err = config.calibration_table().unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }

    #[test]
    fn test_missing_file_is_error() {
        let mut config = ReaderConfig::default();
        config.reader.calibration_file = Some("/nonexistent/temper1/calibration".into());

        assert!(config.calibration_table().is_err());
    }

    #[test]
    fn test_no_sources_is_empty_table() {
        let table = ReaderConfig::default().calibration_table().unwrap();
        assert!(table.is_empty());
    }
}
