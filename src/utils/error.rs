use std::fmt;
use std::io;
use thiserror::Error;

/// Request parameters rejected before any byte reaches the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("slave address {slave} outside {min}..={max}")]
    SlaveOutOfRange { slave: u8, min: u8, max: u8 },

    #[error("quantity {quantity} outside {min}..={max}")]
    QuantityOutOfRange { quantity: u16, min: u16, max: u16 },

    #[error("value buffer holds {actual} bytes, expected {expected}")]
    ValueLengthMismatch { expected: usize, actual: usize },

    #[error("read requests cannot be broadcast")]
    BroadcastRead,
}

/// A response that does not fit the request it answers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("response too short: {len} bytes")]
    TooShort { len: usize },

    #[error("slave mismatch: expected {expected}, got {actual}")]
    SlaveMismatch { expected: u8, actual: u8 },

    #[error("function code mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    FunctionMismatch { expected: u8, actual: u8 },

    #[error("CRC mismatch: computed 0x{expected:04X}, received 0x{actual:04X}")]
    Crc { expected: u16, actual: u16 },

    #[error("expected {expected} data bytes, got {actual}")]
    ByteCount { expected: usize, actual: usize },

    #[error("write echo mismatch: sent {sent:02X?}, echoed {echoed:02X?}")]
    Echo { sent: [u8; 4], echoed: [u8; 4] },
}

/// Exception codes a slave may return in place of a normal response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    ServerDeviceFailure,
    Acknowledge,
    ServerDeviceBusy,
    MemoryParityError,
    GatewayPathUnavailable,
    GatewayTargetFailedToRespond,
    Unknown(u8),
}

impl From<u8> for ExceptionCode {
    fn from(code: u8) -> Self {
        match code {
            0x01 => Self::IllegalFunction,
            0x02 => Self::IllegalDataAddress,
            0x03 => Self::IllegalDataValue,
            0x04 => Self::ServerDeviceFailure,
            0x05 => Self::Acknowledge,
            0x06 => Self::ServerDeviceBusy,
            0x08 => Self::MemoryParityError,
            0x0A => Self::GatewayPathUnavailable,
            0x0B => Self::GatewayTargetFailedToRespond,
            other => Self::Unknown(other),
        }
    }
}

impl ExceptionCode {
    pub fn code(self) -> u8 {
        match self {
            Self::IllegalFunction => 0x01,
            Self::IllegalDataAddress => 0x02,
            Self::IllegalDataValue => 0x03,
            Self::ServerDeviceFailure => 0x04,
            Self::Acknowledge => 0x05,
            Self::ServerDeviceBusy => 0x06,
            Self::MemoryParityError => 0x08,
            Self::GatewayPathUnavailable => 0x0A,
            Self::GatewayTargetFailedToRespond => 0x0B,
            Self::Unknown(code) => code,
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IllegalFunction => "illegal function",
            Self::IllegalDataAddress => "illegal data address",
            Self::IllegalDataValue => "illegal data value",
            Self::ServerDeviceFailure => "server device failure",
            Self::Acknowledge => "acknowledge",
            Self::ServerDeviceBusy => "server device busy",
            Self::MemoryParityError => "memory parity error",
            Self::GatewayPathUnavailable => "gateway path unavailable",
            Self::GatewayTargetFailedToRespond => "gateway target failed to respond",
            Self::Unknown(_) => "unknown exception",
        };
        write!(f, "{} (0x{:02X})", name, self.code())
    }
}

#[derive(Error, Debug)]
pub enum ModbusError {
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Write failed: {0}")]
    Write(#[source] io::Error),

    #[error("Read failed: {0}")]
    Read(#[source] io::Error),

    #[error("Flush failed: {0}")]
    Flush(#[source] io::Error),

    #[error("Short write: {written} of {expected} bytes accepted")]
    ShortWrite { written: usize, expected: usize },

    #[error("Timeout occurred")]
    Timeout,

    #[error("Invalid response: {0}")]
    Frame(#[from] FrameError),

    #[error("Slave {slave} raised exception for function 0x{function:02X}: {code}")]
    Exception {
        slave: u8,
        function: u8,
        code: ExceptionCode,
    },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Blocking task failed: {0}")]
    Join(String),
}

impl ModbusError {
    /// Transient failures where the same request may simply be sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Frame(_) | Self::Read(_))
    }

    /// The link state is undefined and the transport should be reopened.
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, Self::ShortWrite { .. })
    }
}

impl From<toml::de::Error> for ModbusError {
    fn from(err: toml::de::Error) -> Self {
        ModbusError::Config(format!("TOML error: {}", err))
    }
}

impl From<toml::ser::Error> for ModbusError {
    fn from(err: toml::ser::Error) -> Self {
        ModbusError::Config(format!("TOML error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_code_round_trips_known_and_unknown() {
        assert_eq!(ExceptionCode::from(0x02), ExceptionCode::IllegalDataAddress);
        assert_eq!(ExceptionCode::from(0x02).code(), 0x02);
        assert_eq!(ExceptionCode::from(0x7F), ExceptionCode::Unknown(0x7F));
        assert_eq!(ExceptionCode::Unknown(0x7F).code(), 0x7F);
    }

    #[test]
    fn test_error_kinds_classify_for_callers() {
        assert!(ModbusError::Timeout.is_retryable());
        assert!(ModbusError::from(FrameError::TooShort { len: 2 }).is_retryable());
        assert!(!ModbusError::from(ValidationError::BroadcastRead).is_retryable());

        let short = ModbusError::ShortWrite { written: 3, expected: 8 };
        assert!(short.requires_reconnect());
        assert!(!short.is_retryable());
        assert_eq!(short.to_string(), "Short write: 3 of 8 bytes accepted");
    }
}
