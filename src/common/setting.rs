//! settings loaded from `config_{ENV}.toml`, overridable by `XAPPER__SECTION__KEY` env vars

use std::env;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use super::error::ConfigError;
use crate::driver::xap::entity::{DeviceType, InitPolicy};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Env {
    pub env: String,
    pub log_level: String,
    /// print every Tx/Rx frame
    pub verbose: bool,
}

impl Default for Env {
    fn default() -> Self {
        Env {
            env: String::from("dev"),
            log_level: String::from("info"),
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Web {
    pub web_host: String,
    pub web_port: u16,
}

impl Default for Web {
    fn default() -> Self {
        Web {
            web_host: String::from("0.0.0.0"),
            web_port: 1776,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Real,
    /// talk to an in-process simulated unit instead of the serial port
    Dummy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Serial {
    pub port: String,
    pub baudrate: u32,
    pub read_timeout_millis: u64,
    pub mode: TransportMode,
}

impl Default for Serial {
    fn default() -> Self {
        Serial {
            port: String::from("COM3"),
            baudrate: 38400,
            read_timeout_millis: 1000,
            mode: TransportMode::Real,
        }
    }
}

impl Serial {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_millis)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Device {
    pub id: i64,
    pub device_type: String,
    /// registry slot the http layer addresses the device by
    pub slot: usize,
    pub heartbeat_millis: i64,
    pub inputs: Option<usize>,
    pub outputs: Option<usize>,
    pub init_policy: InitPolicy,
}

impl Default for Device {
    fn default() -> Self {
        Device {
            id: 0,
            device_type: String::from("XAP800"),
            slot: 0,
            heartbeat_millis: 1000,
            inputs: None,
            outputs: None,
            init_policy: InitPolicy::Abort,
        }
    }
}

impl Device {
    pub fn device_id(&self) -> Result<u8, ConfigError> {
        match u8::try_from(self.id) {
            Ok(id) if id <= 7 => Ok(id),
            _ => Err(ConfigError::InvalidDeviceId(self.id)),
        }
    }

    pub fn device_type(&self) -> Result<DeviceType, ConfigError> {
        self.device_type
            .parse()
            .map_err(|_| ConfigError::UnknownDeviceType(self.device_type.clone()))
    }

    pub fn heartbeat_interval(&self) -> Result<Duration, ConfigError> {
        if self.heartbeat_millis <= 0 {
            return Err(ConfigError::InvalidHeartbeat(self.heartbeat_millis));
        }
        Ok(Duration::from_millis(self.heartbeat_millis as u64))
    }

    /// provisioned (inputs, outputs); explicit settings win over the model's advertised counts
    pub fn channel_counts(&self) -> Result<(usize, usize), ConfigError> {
        let device_type = self.device_type()?;
        let inputs = self.inputs.or_else(|| usize::try_from(device_type.inputs()).ok());
        let outputs = self.outputs.or_else(|| usize::try_from(device_type.outputs()).ok());
        match (inputs, outputs) {
            (Some(inputs), Some(outputs)) => Ok((inputs, outputs)),
            _ => Err(ConfigError::UnknownChannelCount(device_type.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub env: Env,
    pub web: Web,
    pub serial: Serial,
    pub device: Device,
}

impl Settings {
    /// load `config_{ENV}.toml` (optional) layered with environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let env = env::var("ENV").unwrap_or_else(|_| String::from("dev"));
        let file_name = format!("config_{}", env);

        let settings: Settings = Config::builder()
            .add_source(File::with_name(&file_name).required(false))
            .add_source(
                Environment::with_prefix("XAPPER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    #[cfg(test)]
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(content, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.device.device_id()?;
        self.device.heartbeat_interval()?;
        self.device.channel_counts()?;
        if self.device.slot >= crate::device_controller::device_registry::MAX_DEVICES {
            return Err(ConfigError::SlotOutOfRange(self.device.slot));
        }
        Ok(())
    }

    /// effective log level, `verbose` lifts it to debug so frames are visible
    pub fn log_level(&self) -> &str {
        if self.env.verbose && matches!(self.env.log_level.as_str(), "info" | "warn" | "error") {
            "debug"
        } else {
            self.env.log_level.as_str()
        }
    }
}
