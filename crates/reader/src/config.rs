//! Reader configuration management

use crate::usb::PollSettings;
use anyhow::{Context, Result, anyhow};
use protocol::{CalibrationProfile, CalibrationTable, TemperatureUnit};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderConfig {
    pub reader: ReaderSettings,
    pub usb: UsbSettings,
    /// Per-port calibration profiles
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calibration: Vec<CalibrationProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderSettings {
    #[serde(default = "ReaderSettings::default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub unit: TemperatureUnit,
    #[serde(default = "ReaderSettings::default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Number of poll cycles; 0 runs until interrupted
    #[serde(default = "ReaderSettings::default_cycles")]
    pub cycles: u64,
    /// CSV output file (appended to); stdout when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    /// Line-oriented calibration file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibration_file: Option<PathBuf>,
}

impl ReaderSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }

    fn default_poll_interval() -> u64 {
        60
    }

    fn default_cycles() -> u64 {
        1
    }
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            unit: TemperatureUnit::default(),
            poll_interval_secs: Self::default_poll_interval(),
            cycles: Self::default_cycles(),
            output: None,
            calibration_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsbSettings {
    #[serde(default = "UsbSettings::default_vendor_id")]
    pub vendor_id: String,
    #[serde(default = "UsbSettings::default_product_id")]
    pub product_id: String,
    /// Keep devices claimed between cycles
    #[serde(default = "UsbSettings::default_keep_sessions_open")]
    pub keep_sessions_open: bool,
}

impl UsbSettings {
    fn default_vendor_id() -> String {
        format!("{:#06x}", protocol::commands::VENDOR_ID)
    }

    fn default_product_id() -> String {
        format!("{:#06x}", protocol::commands::PRODUCT_ID)
    }

    fn default_keep_sessions_open() -> bool {
        true
    }
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            vendor_id: Self::default_vendor_id(),
            product_id: Self::default_product_id(),
            keep_sessions_open: Self::default_keep_sessions_open(),
        }
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            reader: ReaderSettings::default(),
            usb: UsbSettings::default(),
            calibration: Vec::new(),
        }
    }
}

impl ReaderConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            expand_path(&p)
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/temper1/reader.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Parse and validate TOML content
    pub fn parse(content: &str) -> Result<Self> {
        let config: ReaderConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("{}", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("temper1").join("reader.toml")
        } else {
            PathBuf::from(".config/temper1/reader.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.reader.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.reader.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.reader.poll_interval_secs == 0 {
            return Err(anyhow!("poll_interval_secs must be greater than 0"));
        }

        Self::parse_hex_id(&self.usb.vendor_id, "vendor_id")?;
        Self::parse_hex_id(&self.usb.product_id, "product_id")?;

        for profile in &self.calibration {
            validate_profile(profile)?;
        }

        Ok(())
    }

    /// Parse a hex ID (`0x` followed by 1-4 hex digits)
    pub fn parse_hex_id(id: &str, name: &str) -> Result<u16> {
        let Some(hex_part) = id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) else {
            return Err(anyhow!(
                "Invalid {} '{}', must start with '0x' (e.g., '0x0c45')",
                name,
                id
            ));
        };

        if hex_part.is_empty() || hex_part.len() > 4 {
            return Err(anyhow!(
                "Invalid {} '{}', hex part must be 1-4 digits",
                name,
                id
            ));
        }

        u16::from_str_radix(hex_part, 16)
            .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))
    }

    /// Device selection and session policy for the USB worker
    pub fn poll_settings(&self) -> Result<PollSettings> {
        Ok(PollSettings {
            vendor_id: Self::parse_hex_id(&self.usb.vendor_id, "vendor_id")?,
            product_id: Self::parse_hex_id(&self.usb.product_id, "product_id")?,
            keep_sessions_open: self.usb.keep_sessions_open,
        })
    }

    /// Build the calibration table
    ///
    /// `[[calibration]]` entries come first; records from the calibration
    /// file replace entries for the same port.
    pub fn calibration_table(&self) -> Result<CalibrationTable> {
        let mut table: CalibrationTable = self.calibration.iter().cloned().collect();

        if let Some(path) = &self.reader.calibration_file {
            let profiles = load_calibration_file(&expand_path(path))?;
            tracing::debug!("Loaded {} calibration records", profiles.len());
            table.extend(profiles);
        }

        Ok(table)
    }

    /// Output file with `~` expanded
    pub fn output_path(&self) -> Option<PathBuf> {
        self.reader.output.as_deref().map(expand_path)
    }
}

fn validate_profile(profile: &CalibrationProfile) -> Result<()> {
    if profile.port.as_str().is_empty() {
        return Err(anyhow!("Calibration entry with empty port"));
    }
    if !profile.scale.is_finite() || profile.scale == 0.0 {
        return Err(anyhow!(
            "Invalid calibration scale {} for port {}, must be finite and non-zero",
            profile.scale,
            profile.port
        ));
    }
    if !profile.offset.is_finite() {
        return Err(anyhow!(
            "Invalid calibration offset {} for port {}",
            profile.offset,
            profile.port
        ));
    }
    Ok(())
}

/// Expand a leading `~` in a path
pub fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}

/// Read a calibration file
pub fn load_calibration_file(path: &Path) -> Result<Vec<CalibrationProfile>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read calibration file: {}", path.display()))?;

    parse_calibration(&content)
        .with_context(|| format!("Invalid calibration file: {}", path.display()))
}

/// Parse `port scale offset` records, one per line
///
/// Fields are separated by whitespace or commas. Blank lines and `#`
/// comments are ignored.
pub fn parse_calibration(content: &str) -> Result<Vec<CalibrationProfile>> {
    let mut profiles = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        let record = line.split('#').next().unwrap_or("").trim();
        if record.is_empty() {
            continue;
        }

        let fields: Vec<&str> = record
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|f| !f.is_empty())
            .collect();

        let [port, scale, offset] = fields.as_slice() else {
            return Err(anyhow!(
                "line {}: expected 'port scale offset', got {} fields",
                line_no,
                fields.len()
            ));
        };

        let scale: f64 = scale
            .parse()
            .map_err(|_| anyhow!("line {}: invalid scale '{}'", line_no, scale))?;
        let offset: f64 = offset
            .parse()
            .map_err(|_| anyhow!("line {}: invalid offset '{}'", line_no, offset))?;

        let profile = CalibrationProfile::new(*port, scale, offset);
        validate_profile(&profile).with_context(|| format!("line {}", line_no))?;
        profiles.push(profile);
    }

    Ok(profiles)
}
