pub mod async_client;
pub mod client;
pub mod crc;
pub mod observer;
pub mod protocol;
pub mod timing;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use async_client::{AsyncRtuClient, ModbusClientTrait};
pub use client::{ClientConfig, RtuClient};
pub use crc::crc16_modbus;
pub use observer::{FrameEvent, FrameObserver, LogObserver, RecordingObserver};
pub use protocol::{expected_response_len, unpack_bits, FunctionCode, ModbusRequest, ModbusResponse, Pdu};
pub use transport::Transport;
#[cfg(feature = "serial")]
pub use transport::SerialTransport;
