// src/settings.rs
//
// Bridge configuration. Every field has a default so an empty file (or no file
// at all) gives the stock 0.0.0.0:8000 -> 0.0.0.0:9000 bridge.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bridge::{SessionConfig, SupervisorConfig};
use crate::io::serial::{DeviceLocator, LineSettings, SystemSerial, DEFAULT_KNOWN_DEVICES};
use crate::io::{IoError, SocketPair};

const CONFIG_DIR_NAME: &str = "sliplink";
const CONFIG_FILE_NAME: &str = "sliplink.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    #[serde(default = "default_host")]
    pub receive_host: String,
    #[serde(default = "default_receive_port")]
    pub receive_port: u16,
    #[serde(default = "default_host")]
    pub target_host: String,
    #[serde(default = "default_target_port")]
    pub target_port: u16,
    /// Exact port name to bridge. When unset the first port whose description
    /// mentions one of `known_devices` is used.
    #[serde(default)]
    pub serial_device: Option<String>,
    #[serde(default = "default_known_devices")]
    pub known_devices: Vec<String>,
    #[serde(default)]
    pub verbose: u8,
    #[serde(default)]
    pub multicast_groups: Vec<Ipv4Addr>,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,
    /// Bound on every blocking read, serial and UDP
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default)]
    pub serial: LineSettings,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_receive_port() -> u16 {
    8000
}

fn default_target_port() -> u16 {
    9000
}

fn default_known_devices() -> Vec<String> {
    DEFAULT_KNOWN_DEVICES.iter().map(|s| s.to_string()).collect()
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_stats_interval_ms() -> u64 {
    1000
}

fn default_read_timeout_ms() -> u64 {
    100
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            receive_host: default_host(),
            receive_port: default_receive_port(),
            target_host: default_host(),
            target_port: default_target_port(),
            serial_device: None,
            known_devices: default_known_devices(),
            verbose: 0,
            multicast_groups: Vec::new(),
            log_dir: None,
            retry_delay_ms: default_retry_delay_ms(),
            stats_interval_ms: default_stats_interval_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            serial: LineSettings::default(),
        }
    }
}

impl BridgeConfig {
    /// `<config dir>/sliplink/sliplink.toml`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load an explicitly named file (which must exist), else the default path
    /// when present, else built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.is_file() => {
                tlog!("[settings] Loading {}", path.display());
                Self::from_file(path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.receive_host.trim().is_empty() {
            return Err(ConfigError::Invalid("receive_host is empty".into()));
        }
        if self.target_host.trim().is_empty() {
            return Err(ConfigError::Invalid("target_host is empty".into()));
        }
        if self.target_port == 0 {
            return Err(ConfigError::Invalid("target_port must be non-zero".into()));
        }

        for (name, value) in [
            ("retry_delay_ms", self.retry_delay_ms),
            ("stats_interval_ms", self.stats_interval_ms),
            ("read_timeout_ms", self.read_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be non-zero", name)));
            }
        }

        if self.serial_device.is_none() && self.known_devices.iter().all(|k| k.is_empty()) {
            return Err(ConfigError::Invalid(
                "no serial_device given and known_devices is empty".into(),
            ));
        }

        if let Some(group) = self.multicast_groups.iter().find(|g| !g.is_multicast()) {
            return Err(ConfigError::Invalid(format!(
                "{} is not a multicast address",
                group
            )));
        }

        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Invalid("serial.baud_rate must be non-zero".into()));
        }

        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Bind the receive socket and resolve the target
    pub fn open_sockets(&self) -> Result<SocketPair, IoError> {
        SocketPair::open(
            &self.receive_host,
            self.receive_port,
            &self.target_host,
            self.target_port,
            &self.multicast_groups,
            self.read_timeout(),
        )
    }

    pub fn locator(&self) -> DeviceLocator {
        DeviceLocator::new(self.serial_device.clone(), self.known_devices.clone())
    }

    pub fn serial_backend(&self) -> SystemSerial {
        SystemSerial::new(self.serial.clone(), self.read_timeout())
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            retry_delay: self.retry_delay(),
            session: SessionConfig {
                stats_interval: self.stats_interval(),
                verbosity: self.verbose,
            },
            ..SupervisorConfig::default()
        }
    }
}
