//! Temperature units

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TemperatureUnit {
    #[default]
    #[serde(rename = "C", alias = "c", alias = "celsius")]
    Celsius,
    #[serde(rename = "F", alias = "f", alias = "fahrenheit")]
    Fahrenheit,
    #[serde(rename = "K", alias = "k", alias = "kelvin")]
    Kelvin,
}

impl TemperatureUnit {
    /// Map a unit character, case-insensitively
    ///
    /// Unrecognized characters select Celsius.
    pub fn from_char(c: char) -> Self {
        match c.to_ascii_uppercase() {
            'F' => TemperatureUnit::Fahrenheit,
            'K' => TemperatureUnit::Kelvin,
            _ => TemperatureUnit::Celsius,
        }
    }

    /// Convert a Celsius value into this unit
    pub fn convert(&self, celsius: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => celsius,
            TemperatureUnit::Fahrenheit => celsius * 1.8 + 32.0,
            TemperatureUnit::Kelvin => celsius + 273.15,
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            TemperatureUnit::Celsius => 'C',
            TemperatureUnit::Fahrenheit => 'F',
            TemperatureUnit::Kelvin => 'K',
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for TemperatureUnit {
    type Err = String;

    /// Strict parse for configuration and command-line values
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "c" | "celsius" => Ok(TemperatureUnit::Celsius),
            "f" | "fahrenheit" => Ok(TemperatureUnit::Fahrenheit),
            "k" | "kelvin" => Ok(TemperatureUnit::Kelvin),
            other => Err(format!(
                "Invalid temperature unit '{}', must be one of: C, F, K",
                other
            )),
        }
    }
}

/// Convert a Celsius value into the unit named by `unit`
pub fn convert_unit(celsius: f64, unit: char) -> f64 {
    TemperatureUnit::from_char(unit).convert(celsius)
}
