//! Member tables: every property and method exercised for each device kind
//!
//! The common `Device` members come first, followed by the device-specific
//! members in the order they are exercised. Members whose execution moves
//! hardware or changes persistent state carry a [`Gate`] so they can be
//! switched off in the configuration.

use serde::{Deserialize, Serialize};

use crate::device::DeviceType;
use crate::io::HttpMethod;
use crate::validator::AdditionalCheck;

/// Wire type of a member parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Bool,
    Int,
    Float,
    Text,
}

impl ParamKind {
    /// Text parameters accept any value, so malformed-value variants are not generated for them
    pub fn is_typed(self) -> bool {
        !matches!(self, ParamKind::Text)
    }
}

/// Where the value of a member parameter comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSource {
    Fixed(&'static str),
    /// Read the member's own getter first, falling back when the read fails
    Current { fallback: &'static str },
    /// Read the `Value` of another GET member first, falling back when the read fails
    Read {
        member: &'static str,
        query: &'static [(&'static str, &'static str)],
        fallback: &'static str,
    },
}

/// A declared member parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub source: ValueSource,
}

impl ParamSpec {
    pub fn fixed(name: &'static str, kind: ParamKind, value: &'static str) -> Self {
        Self {
            name,
            kind,
            source: ValueSource::Fixed(value),
        }
    }

    pub fn read(
        name: &'static str,
        kind: ParamKind,
        member: &'static str,
        fallback: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            source: ValueSource::Read {
                member,
                query: &[],
                fallback,
            },
        }
    }

    pub fn read_with(
        name: &'static str,
        kind: ParamKind,
        member: &'static str,
        query: &'static [(&'static str, &'static str)],
        fallback: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            source: ValueSource::Read {
                member,
                query,
                fallback,
            },
        }
    }
}

/// Configuration switch guarding members that move hardware or change state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    Park,
    Slews,
    Sync,
    Shutter,
    Exposures,
    SwitchWrites,
    CoverCalibrator,
    Moves,
    Commands,
}

/// Completion predicate polled after an asynchronous member returns
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettleCheck {
    /// Busy while the boolean member reads true
    WhileTrue(&'static str),
    /// Busy while the boolean member reads false
    WhileFalse(&'static str),
    /// Busy while the integer member reads the given value
    WhileEquals(&'static str, i64),
}

impl SettleCheck {
    pub fn member(&self) -> &'static str {
        match self {
            SettleCheck::WhileTrue(m) | SettleCheck::WhileFalse(m) => m,
            SettleCheck::WhileEquals(m, _) => m,
        }
    }

    /// Whether the freshly read `Value` means the operation is still running
    pub fn is_busy(&self, value: &serde_json::Value) -> bool {
        match self {
            SettleCheck::WhileTrue(_) => value.as_bool() == Some(true),
            SettleCheck::WhileFalse(_) => value.as_bool() == Some(false),
            SettleCheck::WhileEquals(_, busy) => value.as_i64() == Some(*busy),
        }
    }
}

/// One (member, HTTP verb) pair to run through the permutation matrix
#[derive(Debug, Clone, PartialEq)]
pub struct MemberTest {
    /// ASCOM member name, e.g. `AxisRates`; the URL element is its lower-case form
    pub name: &'static str,
    pub method: HttpMethod,
    pub params: Vec<ParamSpec>,
    pub check: AdditionalCheck,
    pub gate: Option<Gate>,
    pub settle: Option<SettleCheck>,
    /// Member returns image data and may use an alternate transfer encoding
    pub image: bool,
}

impl MemberTest {
    pub fn get(name: &'static str) -> Self {
        Self {
            name,
            method: HttpMethod::Get,
            params: Vec::new(),
            check: AdditionalCheck::None,
            gate: None,
            settle: None,
            image: false,
        }
    }

    pub fn put(name: &'static str) -> Self {
        Self {
            method: HttpMethod::Put,
            ..Self::get(name)
        }
    }

    /// A property setter that writes back the value its getter currently returns
    pub fn setter(name: &'static str, kind: ParamKind, fallback: &'static str) -> Self {
        Self::put(name).with_param(ParamSpec {
            name,
            kind,
            source: ValueSource::Current { fallback },
        })
    }

    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn checked(mut self, check: AdditionalCheck) -> Self {
        self.check = check;
        self
    }

    pub fn gated(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn settles(mut self, settle: SettleCheck) -> Self {
        self.settle = Some(settle);
        self
    }

    pub fn image(mut self) -> Self {
        self.image = true;
        self
    }

    /// Lower-case URL path element
    pub fn path(&self) -> String {
        self.name.to_lowercase()
    }

    /// Whether this member writes back its own getter's value
    pub fn is_setter(&self) -> bool {
        self.method == HttpMethod::Put
            && self.params.len() == 1
            && matches!(self.params[0].source, ValueSource::Current { .. })
    }
}

/// Members common to every device kind
pub fn common_members() -> Vec<MemberTest> {
    use ParamKind::*;

    vec![
        MemberTest::get("Connected"),
        MemberTest::setter("Connected", Bool, "true"),
        MemberTest::get("Description"),
        MemberTest::get("DriverInfo"),
        MemberTest::get("DriverVersion"),
        MemberTest::get("InterfaceVersion"),
        MemberTest::get("Name"),
        MemberTest::get("SupportedActions"),
        MemberTest::get("DeviceState").checked(AdditionalCheck::DeviceState),
        MemberTest::get("Connecting"),
        MemberTest::put("Connect").settles(SettleCheck::WhileTrue("connecting")),
        MemberTest::put("Action")
            .with_param(ParamSpec::fixed("Action", Text, "ConformUnknownAction"))
            .with_param(ParamSpec::fixed("Parameters", Text, ""))
            .gated(Gate::Commands),
        MemberTest::put("CommandBlind")
            .with_param(ParamSpec::fixed("Command", Text, ""))
            .with_param(ParamSpec::fixed("Raw", Bool, "false"))
            .gated(Gate::Commands),
        MemberTest::put("CommandBool")
            .with_param(ParamSpec::fixed("Command", Text, ""))
            .with_param(ParamSpec::fixed("Raw", Bool, "false"))
            .gated(Gate::Commands),
        MemberTest::put("CommandString")
            .with_param(ParamSpec::fixed("Command", Text, ""))
            .with_param(ParamSpec::fixed("Raw", Bool, "false"))
            .gated(Gate::Commands),
    ]
}

/// Members specific to one device kind
pub fn device_members(kind: DeviceType) -> Vec<MemberTest> {
    match kind {
        DeviceType::Camera => camera(),
        DeviceType::CoverCalibrator => cover_calibrator(),
        DeviceType::Dome => dome(),
        DeviceType::FilterWheel => filter_wheel(),
        DeviceType::Focuser => focuser(),
        DeviceType::ObservingConditions => observing_conditions(),
        DeviceType::Rotator => rotator(),
        DeviceType::SafetyMonitor => vec![MemberTest::get("IsSafe")],
        DeviceType::Switch => switch(),
        DeviceType::Telescope => telescope(),
    }
}

fn gets(names: &[&'static str]) -> Vec<MemberTest> {
    names.iter().map(|name| MemberTest::get(name)).collect()
}

fn camera() -> Vec<MemberTest> {
    use ParamKind::*;

    let mut members = gets(&[
        "BayerOffsetX",
        "BayerOffsetY",
        "BinX",
        "BinY",
        "CameraState",
        "CameraXSize",
        "CameraYSize",
        "CanAbortExposure",
        "CanAsymmetricBin",
        "CanFastReadout",
        "CanGetCoolerPower",
        "CanPulseGuide",
        "CanSetCCDTemperature",
        "CanStopExposure",
        "CCDTemperature",
        "CoolerOn",
        "CoolerPower",
        "ElectronsPerADU",
        "ExposureMax",
        "ExposureMin",
        "ExposureResolution",
        "FastReadout",
        "FullWellCapacity",
        "Gain",
        "GainMax",
        "GainMin",
        "Gains",
        "HasShutter",
        "HeatSinkTemperature",
        "ImageReady",
        "IsPulseGuiding",
        "LastExposureDuration",
        "LastExposureStartTime",
        "MaxADU",
        "MaxBinX",
        "MaxBinY",
        "NumX",
        "NumY",
        "Offset",
        "OffsetMax",
        "OffsetMin",
        "Offsets",
        "PercentCompleted",
        "PixelSizeX",
        "PixelSizeY",
        "ReadoutMode",
        "ReadoutModes",
        "SensorName",
        "SensorType",
        "SetCCDTemperature",
        "StartX",
        "StartY",
        "SubExposureDuration",
    ]);
    members.extend([
        MemberTest::setter("BinX", Int, "1"),
        MemberTest::setter("BinY", Int, "1"),
        MemberTest::setter("CoolerOn", Bool, "false"),
        MemberTest::setter("FastReadout", Bool, "false"),
        MemberTest::setter("Gain", Int, "0"),
        MemberTest::setter("NumX", Int, "1"),
        MemberTest::setter("NumY", Int, "1"),
        MemberTest::setter("Offset", Int, "0"),
        MemberTest::setter("ReadoutMode", Int, "0"),
        MemberTest::setter("SetCCDTemperature", Float, "0"),
        MemberTest::setter("StartX", Int, "0"),
        MemberTest::setter("StartY", Int, "0"),
        MemberTest::setter("SubExposureDuration", Float, "1"),
        MemberTest::put("PulseGuide")
            .with_param(ParamSpec::fixed("Direction", Int, "0"))
            .with_param(ParamSpec::fixed("Duration", Int, "1"))
            .gated(Gate::Exposures)
            .settles(SettleCheck::WhileTrue("ispulseguiding")),
        MemberTest::put("StartExposure")
            .with_param(ParamSpec::fixed("Duration", Float, "1"))
            .with_param(ParamSpec::fixed("Light", Bool, "true"))
            .gated(Gate::Exposures)
            .settles(SettleCheck::WhileFalse("imageready")),
        MemberTest::get("ImageArray")
            .checked(AdditionalCheck::ImageArray)
            .image(),
        MemberTest::put("StopExposure").gated(Gate::Exposures),
        MemberTest::put("AbortExposure").gated(Gate::Exposures),
    ]);
    members
}

fn cover_calibrator() -> Vec<MemberTest> {
    use ParamKind::*;

    // CoverStatus::Moving and CalibratorStatus::NotReady are both 2
    let mut members = gets(&[
        "Brightness",
        "CalibratorState",
        "CoverState",
        "MaxBrightness",
        "CalibratorChanging",
        "CoverMoving",
    ]);
    members.extend([
        MemberTest::put("CalibratorOn")
            .with_param(ParamSpec::read("Brightness", Int, "brightness", "0"))
            .gated(Gate::CoverCalibrator)
            .settles(SettleCheck::WhileEquals("calibratorstate", 2)),
        MemberTest::put("CalibratorOff")
            .gated(Gate::CoverCalibrator)
            .settles(SettleCheck::WhileEquals("calibratorstate", 2)),
        MemberTest::put("OpenCover")
            .gated(Gate::CoverCalibrator)
            .settles(SettleCheck::WhileEquals("coverstate", 2)),
        MemberTest::put("HaltCover").gated(Gate::CoverCalibrator),
        MemberTest::put("CloseCover")
            .gated(Gate::CoverCalibrator)
            .settles(SettleCheck::WhileEquals("coverstate", 2)),
    ]);
    members
}

fn dome() -> Vec<MemberTest> {
    use ParamKind::*;

    let mut members = gets(&[
        "Altitude",
        "AtHome",
        "AtPark",
        "Azimuth",
        "CanFindHome",
        "CanPark",
        "CanSetAltitude",
        "CanSetAzimuth",
        "CanSetPark",
        "CanSetShutter",
        "CanSlave",
        "CanSyncAzimuth",
        "ShutterStatus",
        "Slaved",
        "Slewing",
    ]);
    // ShutterState::Opening is 2, ShutterState::Closing is 3
    members.extend([
        MemberTest::setter("Slaved", Bool, "false"),
        MemberTest::put("OpenShutter")
            .gated(Gate::Shutter)
            .settles(SettleCheck::WhileEquals("shutterstatus", 2)),
        MemberTest::put("CloseShutter")
            .gated(Gate::Shutter)
            .settles(SettleCheck::WhileEquals("shutterstatus", 3)),
        MemberTest::put("SlewToAltitude")
            .with_param(ParamSpec::read("Altitude", Float, "altitude", "45"))
            .gated(Gate::Slews)
            .settles(SettleCheck::WhileTrue("slewing")),
        MemberTest::put("SlewToAzimuth")
            .with_param(ParamSpec::read("Azimuth", Float, "azimuth", "0"))
            .gated(Gate::Slews)
            .settles(SettleCheck::WhileTrue("slewing")),
        MemberTest::put("SyncToAzimuth")
            .with_param(ParamSpec::read("Azimuth", Float, "azimuth", "0"))
            .gated(Gate::Sync),
        MemberTest::put("AbortSlew").gated(Gate::Slews),
        MemberTest::put("FindHome")
            .gated(Gate::Park)
            .settles(SettleCheck::WhileTrue("slewing")),
        MemberTest::put("Park")
            .gated(Gate::Park)
            .settles(SettleCheck::WhileTrue("slewing")),
        MemberTest::put("SetPark").gated(Gate::Park),
    ]);
    members
}

fn filter_wheel() -> Vec<MemberTest> {
    let mut members = gets(&["FocusOffsets", "Names", "Position"]);
    // Position reads -1 while the wheel is moving
    members.push(
        MemberTest::setter("Position", ParamKind::Int, "0")
            .gated(Gate::Moves)
            .settles(SettleCheck::WhileEquals("position", -1)),
    );
    members
}

fn focuser() -> Vec<MemberTest> {
    use ParamKind::*;

    let mut members = gets(&[
        "Absolute",
        "IsMoving",
        "MaxIncrement",
        "MaxStep",
        "Position",
        "StepSize",
        "TempComp",
        "TempCompAvailable",
        "Temperature",
    ]);
    members.extend([
        MemberTest::setter("TempComp", Bool, "false"),
        MemberTest::put("Move")
            .with_param(ParamSpec::read("Position", Int, "position", "0"))
            .gated(Gate::Moves)
            .settles(SettleCheck::WhileTrue("ismoving")),
        MemberTest::put("Halt").gated(Gate::Moves),
    ]);
    members
}

fn observing_conditions() -> Vec<MemberTest> {
    use ParamKind::*;

    let mut members = gets(&[
        "AveragePeriod",
        "CloudCover",
        "DewPoint",
        "Humidity",
        "Pressure",
        "RainRate",
        "SkyBrightness",
        "SkyQuality",
        "SkyTemperature",
        "StarFWHM",
        "Temperature",
        "WindDirection",
        "WindGust",
        "WindSpeed",
    ]);
    members.extend([
        MemberTest::get("SensorDescription").with_param(ParamSpec::fixed(
            "SensorName",
            Text,
            "Temperature",
        )),
        MemberTest::get("TimeSinceLastUpdate").with_param(ParamSpec::fixed(
            "SensorName",
            Text,
            "",
        )),
        MemberTest::setter("AveragePeriod", Float, "0"),
        MemberTest::put("Refresh"),
    ]);
    members
}

fn rotator() -> Vec<MemberTest> {
    use ParamKind::*;

    let mut members = gets(&[
        "CanReverse",
        "IsMoving",
        "MechanicalPosition",
        "Position",
        "Reverse",
        "StepSize",
        "TargetPosition",
    ]);
    members.extend([
        MemberTest::setter("Reverse", Bool, "false"),
        MemberTest::put("Move")
            .with_param(ParamSpec::fixed("Position", Float, "0"))
            .gated(Gate::Moves)
            .settles(SettleCheck::WhileTrue("ismoving")),
        MemberTest::put("MoveAbsolute")
            .with_param(ParamSpec::read("Position", Float, "position", "0"))
            .gated(Gate::Moves)
            .settles(SettleCheck::WhileTrue("ismoving")),
        MemberTest::put("MoveMechanical")
            .with_param(ParamSpec::read(
                "Position",
                Float,
                "mechanicalposition",
                "0",
            ))
            .gated(Gate::Moves)
            .settles(SettleCheck::WhileTrue("ismoving")),
        MemberTest::put("Sync")
            .with_param(ParamSpec::read("Position", Float, "position", "0"))
            .gated(Gate::Sync),
        MemberTest::put("Halt").gated(Gate::Moves),
    ]);
    members
}

const SWITCH_ZERO: &[(&str, &str)] = &[("Id", "0")];

fn switch() -> Vec<MemberTest> {
    use ParamKind::*;

    let id = || ParamSpec::fixed("Id", Int, "0");
    let mut members = vec![MemberTest::get("MaxSwitch")];
    for name in [
        "CanWrite",
        "GetSwitch",
        "GetSwitchDescription",
        "GetSwitchName",
        "GetSwitchValue",
        "MinSwitchValue",
        "MaxSwitchValue",
        "SwitchStep",
    ] {
        members.push(MemberTest::get(name).with_param(id()));
    }
    members.extend([
        MemberTest::put("SetSwitch")
            .with_param(id())
            .with_param(ParamSpec::read_with(
                "State",
                Bool,
                "getswitch",
                SWITCH_ZERO,
                "false",
            ))
            .gated(Gate::SwitchWrites),
        MemberTest::put("SetSwitchName")
            .with_param(id())
            .with_param(ParamSpec::read_with(
                "Name",
                Text,
                "getswitchname",
                SWITCH_ZERO,
                "Switch 0",
            ))
            .gated(Gate::SwitchWrites),
        MemberTest::put("SetSwitchValue")
            .with_param(id())
            .with_param(ParamSpec::read_with(
                "Value",
                Float,
                "getswitchvalue",
                SWITCH_ZERO,
                "0",
            ))
            .gated(Gate::SwitchWrites),
    ]);
    members
}

fn telescope() -> Vec<MemberTest> {
    use ParamKind::*;

    let ra = || ParamSpec::read("RightAscension", Float, "rightascension", "0");
    let dec = || ParamSpec::read("Declination", Float, "declination", "0");
    let az = || ParamSpec::read("Azimuth", Float, "azimuth", "0");
    let alt = || ParamSpec::read("Altitude", Float, "altitude", "45");
    let axis = || ParamSpec::fixed("Axis", Int, "0");

    let mut members = gets(&[
        "AlignmentMode",
        "Altitude",
        "ApertureArea",
        "ApertureDiameter",
        "AtHome",
        "AtPark",
        "Azimuth",
        "CanFindHome",
        "CanPark",
        "CanPulseGuide",
        "CanSetDeclinationRate",
        "CanSetGuideRates",
        "CanSetPark",
        "CanSetPierSide",
        "CanSetRightAscensionRate",
        "CanSetTracking",
        "CanSlew",
        "CanSlewAltAz",
        "CanSlewAltAzAsync",
        "CanSlewAsync",
        "CanSync",
        "CanSyncAltAz",
        "CanUnpark",
        "Declination",
        "DeclinationRate",
        "DoesRefraction",
        "EquatorialSystem",
        "FocalLength",
        "GuideRateDeclination",
        "GuideRateRightAscension",
        "IsPulseGuiding",
        "RightAscension",
        "RightAscensionRate",
        "SideOfPier",
        "SiderealTime",
        "SiteElevation",
        "SiteLatitude",
        "SiteLongitude",
        "Slewing",
        "SlewSettleTime",
        "TargetDeclination",
        "TargetRightAscension",
        "Tracking",
        "TrackingRate",
        "TrackingRates",
        "UTCDate",
    ]);
    members.extend([
        MemberTest::get("AxisRates")
            .with_param(axis())
            .checked(AdditionalCheck::AxisRates),
        MemberTest::get("CanMoveAxis").with_param(axis()),
        MemberTest::get("DestinationSideOfPier")
            .with_param(ra())
            .with_param(dec()),
        MemberTest::setter("DeclinationRate", Float, "0"),
        MemberTest::setter("DoesRefraction", Bool, "false"),
        MemberTest::setter("GuideRateDeclination", Float, "0.004"),
        MemberTest::setter("GuideRateRightAscension", Float, "0.004"),
        MemberTest::setter("RightAscensionRate", Float, "0"),
        MemberTest::setter("SideOfPier", Int, "0").gated(Gate::Slews),
        MemberTest::setter("SiteElevation", Float, "0"),
        MemberTest::setter("SiteLatitude", Float, "0"),
        MemberTest::setter("SiteLongitude", Float, "0"),
        MemberTest::setter("SlewSettleTime", Int, "0"),
        MemberTest::setter("TargetDeclination", Float, "0"),
        MemberTest::setter("TargetRightAscension", Float, "0"),
        MemberTest::setter("Tracking", Bool, "false"),
        MemberTest::setter("TrackingRate", Int, "0"),
        MemberTest::setter("UTCDate", Text, "2000-01-01T00:00:00.000Z"),
        MemberTest::put("Unpark").gated(Gate::Park),
        MemberTest::put("MoveAxis")
            .with_param(axis())
            .with_param(ParamSpec::fixed("Rate", Float, "0"))
            .gated(Gate::Slews),
        MemberTest::put("PulseGuide")
            .with_param(ParamSpec::fixed("Direction", Int, "0"))
            .with_param(ParamSpec::fixed("Duration", Int, "1"))
            .gated(Gate::Slews)
            .settles(SettleCheck::WhileTrue("ispulseguiding")),
        MemberTest::put("SlewToCoordinatesAsync")
            .with_param(ra())
            .with_param(dec())
            .gated(Gate::Slews)
            .settles(SettleCheck::WhileTrue("slewing")),
        MemberTest::put("SlewToTargetAsync")
            .gated(Gate::Slews)
            .settles(SettleCheck::WhileTrue("slewing")),
        MemberTest::put("SlewToAltAzAsync")
            .with_param(az())
            .with_param(alt())
            .gated(Gate::Slews)
            .settles(SettleCheck::WhileTrue("slewing")),
        MemberTest::put("SyncToCoordinates")
            .with_param(ra())
            .with_param(dec())
            .gated(Gate::Sync),
        MemberTest::put("SyncToTarget").gated(Gate::Sync),
        MemberTest::put("SyncToAltAz")
            .with_param(az())
            .with_param(alt())
            .gated(Gate::Sync),
        MemberTest::put("AbortSlew").gated(Gate::Slews),
        MemberTest::put("FindHome")
            .gated(Gate::Park)
            .settles(SettleCheck::WhileTrue("slewing")),
        MemberTest::put("SetPark").gated(Gate::Park),
        MemberTest::put("Park")
            .gated(Gate::Park)
            .settles(SettleCheck::WhileTrue("slewing")),
    ]);
    members
}

/// Whether `members` also exposes `member`'s path under the other HTTP verb
pub fn has_other_verb(members: &[MemberTest], member: &MemberTest) -> bool {
    members
        .iter()
        .any(|m| m.method != member.method && m.name.eq_ignore_ascii_case(member.name))
}
