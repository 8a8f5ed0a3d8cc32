pub mod error;

pub use error::{ExceptionCode, FrameError, ModbusError, ValidationError};
