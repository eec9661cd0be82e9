//! Configuration types for the Alpaca conformance checker

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::DeviceType;
use crate::members::{Gate, MemberTest};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub tests: TestsConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

/// Address of the device under test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_alpaca_port")]
    pub port: u16,
    #[serde(default = "default_device_type")]
    pub device_type: DeviceType,
    #[serde(default)]
    pub device_number: u32,
}

impl DeviceConfig {
    /// `scheme://host:port`
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// HTTP Basic credentials
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// How camera image data is requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImageTransfer {
    #[default]
    Json,
    ImageBytes,
    Base64Handoff,
}

/// Protocol policy and timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Strict mode reports every ambiguous outcome as an issue
    #[serde(default)]
    pub strict_mode: bool,
    /// Treat NotImplemented errors on a matching status as OK rather than information
    #[serde(default = "default_true")]
    pub suppress_not_implemented: bool,
    #[serde(default = "default_long_response_timeout", with = "humantime_serde")]
    pub long_response_timeout: Duration,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(default = "default_settle_timeout", with = "humantime_serde")]
    pub settle_timeout: Duration,
    #[serde(default)]
    pub image_transfer: ImageTransfer,
    #[serde(default = "default_true")]
    pub decompress: bool,
    #[serde(default = "default_client_id")]
    pub client_id: u32,
    /// First ClientTransactionID; every member test uses the next value
    #[serde(default = "default_client_transaction_id")]
    pub client_transaction_id: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            suppress_not_implemented: true,
            long_response_timeout: default_long_response_timeout(),
            poll_interval: default_poll_interval(),
            settle_timeout: default_settle_timeout(),
            image_transfer: ImageTransfer::default(),
            decompress: true,
            client_id: default_client_id(),
            client_transaction_id: default_client_transaction_id(),
        }
    }
}

/// Switches for members that move hardware or change persistent state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestsConfig {
    #[serde(default)]
    pub park: bool,
    #[serde(default)]
    pub slews: bool,
    #[serde(default)]
    pub sync: bool,
    #[serde(default)]
    pub shutter: bool,
    #[serde(default)]
    pub exposures: bool,
    #[serde(default)]
    pub switch_writes: bool,
    #[serde(default)]
    pub cover_calibrator: bool,
    #[serde(default)]
    pub moves: bool,
    #[serde(default)]
    pub commands: bool,
    #[serde(default = "default_true")]
    pub bad_uris: bool,
    /// Member names (case-insensitive) never to exercise
    #[serde(default)]
    pub skip_members: Vec<String>,
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            park: false,
            slews: false,
            sync: false,
            shutter: false,
            exposures: false,
            switch_writes: false,
            cover_calibrator: false,
            moves: false,
            commands: false,
            bad_uris: true,
            skip_members: Vec::new(),
        }
    }
}

impl TestsConfig {
    pub fn gate_enabled(&self, gate: Gate) -> bool {
        match gate {
            Gate::Park => self.park,
            Gate::Slews => self.slews,
            Gate::Sync => self.sync,
            Gate::Shutter => self.shutter,
            Gate::Exposures => self.exposures,
            Gate::SwitchWrites => self.switch_writes,
            Gate::CoverCalibrator => self.cover_calibrator,
            Gate::Moves => self.moves,
            Gate::Commands => self.commands,
        }
    }

    /// Whether a member test should run under this configuration
    pub fn member_enabled(&self, member: &MemberTest) -> bool {
        let skipped = self
            .skip_members
            .iter()
            .any(|name| name.eq_ignore_ascii_case(member.name));
        !skipped && member.gate.map_or(true, |gate| self.gate_enabled(gate))
    }
}

/// Report output
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReportConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_alpaca_port() -> u16 {
    11111
}

fn default_device_type() -> DeviceType {
    DeviceType::Telescope
}

fn default_true() -> bool {
    true
}

fn default_long_response_timeout() -> Duration {
    Duration::from_secs(100)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_settle_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_client_id() -> u32 {
    123456
}

fn default_client_transaction_id() -> u32 {
    67890
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            host: default_host(),
            port: default_alpaca_port(),
            device_type: default_device_type(),
            device_number: 0,
        }
    }
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::ConformError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}
