//! Supported Alpaca device kinds

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The ten device kinds the Alpaca device API defines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Camera,
    CoverCalibrator,
    Dome,
    FilterWheel,
    Focuser,
    ObservingConditions,
    Rotator,
    SafetyMonitor,
    Switch,
    Telescope,
}

impl DeviceType {
    pub const ALL: [DeviceType; 10] = [
        DeviceType::Camera,
        DeviceType::CoverCalibrator,
        DeviceType::Dome,
        DeviceType::FilterWheel,
        DeviceType::Focuser,
        DeviceType::ObservingConditions,
        DeviceType::Rotator,
        DeviceType::SafetyMonitor,
        DeviceType::Switch,
        DeviceType::Telescope,
    ];

    /// Lower-case URL path element, e.g. `covercalibrator`
    pub const fn path(self) -> &'static str {
        match self {
            DeviceType::Camera => "camera",
            DeviceType::CoverCalibrator => "covercalibrator",
            DeviceType::Dome => "dome",
            DeviceType::FilterWheel => "filterwheel",
            DeviceType::Focuser => "focuser",
            DeviceType::ObservingConditions => "observingconditions",
            DeviceType::Rotator => "rotator",
            DeviceType::SafetyMonitor => "safetymonitor",
            DeviceType::Switch => "switch",
            DeviceType::Telescope => "telescope",
        }
    }

    /// Display name as used in ASCOM documentation
    pub const fn display_name(self) -> &'static str {
        match self {
            DeviceType::Camera => "Camera",
            DeviceType::CoverCalibrator => "CoverCalibrator",
            DeviceType::Dome => "Dome",
            DeviceType::FilterWheel => "FilterWheel",
            DeviceType::Focuser => "Focuser",
            DeviceType::ObservingConditions => "ObservingConditions",
            DeviceType::Rotator => "Rotator",
            DeviceType::SafetyMonitor => "SafetyMonitor",
            DeviceType::Switch => "Switch",
            DeviceType::Telescope => "Telescope",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for DeviceType {
    type Err = crate::ConformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceType::ALL
            .into_iter()
            .find(|kind| kind.path().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::ConformError::Config(format!("Unknown device type: {}", s)))
    }
}
