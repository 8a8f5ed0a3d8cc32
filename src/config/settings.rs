use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::modbus::client::ClientConfig;
use crate::modbus::protocol::MAX_SLAVE_ADDRESS;
use crate::modbus::timing::{DEFAULT_DELAY_MULTIPLIER, DEFAULT_GUARD_DELAY};
use crate::utils::error::ModbusError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub client: ClientSettings,
}

/// Physical link settings, handed to the serial transport as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub parity: ParityConfig,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub timeout_ms: u64,
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        let port = if cfg!(target_os = "windows") {
            "COM1"
        } else {
            "/dev/ttyUSB0"
        };
        Self {
            port: port.to_string(),
            baud_rate: 9600,
            parity: ParityConfig::None,
            data_bits: 8,
            stop_bits: 1,
            timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub delay_multiplier: u32,
    pub guard_delay_ms: u64,
    pub min_slave: u8,
    pub max_slave: u8,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            delay_multiplier: DEFAULT_DELAY_MULTIPLIER,
            guard_delay_ms: DEFAULT_GUARD_DELAY.as_millis() as u64,
            min_slave: 1,
            max_slave: MAX_SLAVE_ADDRESS,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModbusError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ModbusError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ModbusError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ModbusError::Config(e.to_string()))?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ModbusError::Config(e.to_string()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ModbusError> {
        if self.serial.baud_rate == 0 {
            return Err(ModbusError::Config("baud_rate must be positive".to_string()));
        }
        let client = &self.client;
        if client.max_slave > MAX_SLAVE_ADDRESS || client.min_slave > client.max_slave {
            return Err(ModbusError::Config(format!(
                "slave bounds {}..={} must lie within 0..={}",
                client.min_slave, client.max_slave, MAX_SLAVE_ADDRESS
            )));
        }
        Ok(())
    }

    /// Port settings for opening the serial transport, checked first.
    pub fn serial_settings(&self) -> Result<&SerialConfig, ModbusError> {
        self.validate()?;
        if self.serial.port.trim().is_empty() {
            return Err(ModbusError::Config("serial port name is empty".to_string()));
        }
        Ok(&self.serial)
    }

    /// Timing and addressing settings for the RTU client. The serial baud
    /// rate is the one the timing model uses.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            baud_rate: Some(self.serial.baud_rate),
            delay_multiplier: self.client.delay_multiplier,
            guard_delay: Duration::from_millis(self.client.guard_delay_ms),
            min_slave: self.client.min_slave,
            max_slave: self.client.max_slave,
        }
    }
}
