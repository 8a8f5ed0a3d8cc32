//! Modbus RTU master
//!
//! Encodes requests, frames them with slave address and CRC-16, and runs each
//! exchange over a half-duplex serial link with baud-rate derived silence
//! intervals. One transaction is in flight at a time.

pub mod cli;
pub mod config;
pub mod modbus;
pub mod output;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use modbus::{AsyncRtuClient, ClientConfig, ModbusClientTrait, RtuClient, Transport};
#[cfg(feature = "serial")]
pub use modbus::SerialTransport;
pub use output::{HexFormatter, JsonFormatter, ResultFormatter, TextFormatter};
pub use utils::error::{ExceptionCode, FrameError, ModbusError, ValidationError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
