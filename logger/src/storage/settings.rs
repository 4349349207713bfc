//! Settings file management

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::LoggerError;
use crate::logs::LogLevel;
use crate::models::device::{AuthMode, DeviceTarget};
use crate::rotation::policy::RotationPolicy;
use crate::storage::layout::DEFAULT_LOG_DIR;
use crate::supervisor::backoff::ReconnectOptions;

/// Default settings file location
pub const DEFAULT_SETTINGS_PATH: &str = "/data/options.json";

/// Logger settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Devices to capture, in order
    #[serde(default)]
    pub devices: Vec<DeviceSettings>,

    /// Directory for device log files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Zone identifier for record timestamps; `TZ` is used when absent
    #[serde(default)]
    pub timezone: Option<String>,

    /// Level of the logger's own status output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit status output as JSON
    #[serde(default)]
    pub json_logs: bool,

    #[serde(default)]
    pub rotation: RotationSettings,

    #[serde(default)]
    pub reconnect: ReconnectSettings,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_DIR)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            log_dir: default_log_dir(),
            timezone: None,
            log_level: LogLevel::Info,
            json_logs: false,
            rotation: RotationSettings::default(),
            reconnect: ReconnectSettings::default(),
        }
    }
}

impl Settings {
    /// Resolve the configured devices.
    ///
    /// Names must be present and unique since they become file names.
    pub fn device_targets(&self) -> Result<Vec<DeviceTarget>, LoggerError> {
        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(self.devices.len());

        for device in &self.devices {
            let name = device.name.trim();
            if name.is_empty() {
                return Err(LoggerError::ConfigError("Device name must not be empty".to_string()));
            }
            if name.contains(['/', '\\']) {
                return Err(LoggerError::ConfigError(format!(
                    "Device name must not contain path separators: {name}"
                )));
            }
            if !seen.insert(name.to_string()) {
                return Err(LoggerError::ConfigError(format!("Duplicate device name: {name}")));
            }
            if device.host.trim().is_empty() {
                return Err(LoggerError::ConfigError(format!("Device {name} has no host")));
            }

            targets.push(DeviceTarget {
                name: name.to_string(),
                host: device.host.trim().to_string(),
                port: device.port,
                auth: AuthMode::resolve(device.password.as_deref(), device.encryption_key.as_deref()),
            });
        }

        Ok(targets)
    }
}

/// One configured device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    pub name: String,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub encryption_key: Option<String>,
}

fn default_port() -> u16 {
    device_api::DEFAULT_PORT
}

/// Rotation thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationSettings {
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,

    #[serde(default = "default_max_lines")]
    pub max_lines: u64,

    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
}

fn default_max_size_bytes() -> u64 {
    RotationPolicy::default().max_size_bytes
}

fn default_max_lines() -> u64 {
    RotationPolicy::default().max_lines
}

fn default_max_backups() -> u32 {
    RotationPolicy::default().max_backups
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            max_size_bytes: default_max_size_bytes(),
            max_lines: default_max_lines(),
            max_backups: default_max_backups(),
        }
    }
}

impl From<&RotationSettings> for RotationPolicy {
    fn from(settings: &RotationSettings) -> Self {
        RotationPolicy {
            max_size_bytes: settings.max_size_bytes,
            max_lines: settings.max_lines,
            max_backups: settings.max_backups,
        }
    }
}

/// Reconnect timing, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectSettings {
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,

    #[serde(default = "default_duplicate_session_delay")]
    pub duplicate_session_delay_secs: u64,

    #[serde(default = "default_disconnect_grace")]
    pub disconnect_grace_secs: u64,
}

fn default_base_delay() -> u64 {
    10
}

fn default_max_delay() -> u64 {
    60
}

fn default_duplicate_session_delay() -> u64 {
    30
}

fn default_disconnect_grace() -> u64 {
    2
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay(),
            max_delay_secs: default_max_delay(),
            duplicate_session_delay_secs: default_duplicate_session_delay(),
            disconnect_grace_secs: default_disconnect_grace(),
        }
    }
}

impl From<&ReconnectSettings> for ReconnectOptions {
    fn from(settings: &ReconnectSettings) -> Self {
        ReconnectOptions {
            base_delay: Duration::from_secs(settings.base_delay_secs),
            max_delay: Duration::from_secs(settings.max_delay_secs),
            duplicate_session_delay: Duration::from_secs(settings.duplicate_session_delay_secs),
            disconnect_grace: Duration::from_secs(settings.disconnect_grace_secs),
            ..Default::default()
        }
    }
}
