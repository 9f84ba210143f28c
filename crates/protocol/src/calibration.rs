//! Per-port linear calibration
//!
//! Sensors of this family drift by a fraction of a degree from unit to
//! unit. Each physical port gets its own scale/offset pair, keyed by the
//! port rather than the device address because the address changes on
//! every replug.

use crate::types::BusPortDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Linear correction `celsius * scale + offset`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub scale: f64,
    pub offset: f64,
}

impl Calibration {
    /// No correction
    pub const IDENTITY: Calibration = Calibration {
        scale: 1.0,
        offset: 0.0,
    };

    pub fn apply(&self, celsius: f64) -> f64 {
        celsius * self.scale + self.offset
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Calibration record for one port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    pub port: BusPortDescriptor,
    pub scale: f64,
    pub offset: f64,
}

impl CalibrationProfile {
    pub fn new(port: impl Into<String>, scale: f64, offset: f64) -> Self {
        Self {
            port: BusPortDescriptor::new(port),
            scale,
            offset,
        }
    }

    pub fn calibration(&self) -> Calibration {
        Calibration {
            scale: self.scale,
            offset: self.offset,
        }
    }
}

/// In-memory calibration table, ordered by port
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationTable {
    profiles: BTreeMap<BusPortDescriptor, Calibration>,
}

impl CalibrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a profile, replacing any previous one for the same port
    pub fn insert(&mut self, profile: CalibrationProfile) -> Option<Calibration> {
        let calibration = profile.calibration();
        self.profiles.insert(profile.port, calibration)
    }

    /// Calibration for `port`, identity when the port has no profile
    pub fn lookup(&self, port: &BusPortDescriptor) -> Calibration {
        self.profiles.get(port).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Profiles in port order
    pub fn profiles(&self) -> impl Iterator<Item = CalibrationProfile> + '_ {
        self.profiles.iter().map(|(port, c)| CalibrationProfile {
            port: port.clone(),
            scale: c.scale,
            offset: c.offset,
        })
    }
}

impl FromIterator<CalibrationProfile> for CalibrationTable {
    fn from_iter<I: IntoIterator<Item = CalibrationProfile>>(iter: I) -> Self {
        let mut table = CalibrationTable::new();
        for profile in iter {
            table.insert(profile);
        }
        table
    }
}

impl Extend<CalibrationProfile> for CalibrationTable {
    fn extend<I: IntoIterator<Item = CalibrationProfile>>(&mut self, iter: I) {
        for profile in iter {
            self.insert(profile);
        }
    }
}
