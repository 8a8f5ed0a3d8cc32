use std::io;

/// Byte link the RTU client drives. Implementations own their read timeout:
/// a read that returns `Ok(0)` means nothing arrived before it elapsed.
pub trait Transport: Send {
    /// Discards unread buffered input.
    fn flush(&mut self) -> io::Result<()>;
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Configured line speed, 0 if unknown.
    fn baud_rate(&self) -> u32;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn baud_rate(&self) -> u32 {
        (**self).baud_rate()
    }
}

#[cfg(feature = "serial")]
pub use serial::{available_ports, SerialTransport};

#[cfg(feature = "serial")]
mod serial {
    use log::{error, info};
    use serialport::{ClearBuffer, SerialPort};
    use std::io::{self, Read, Write};

    use super::Transport;
    use crate::config::settings::{ParityConfig, SerialConfig};
    use crate::utils::error::ModbusError;

    pub struct SerialTransport {
        port: Box<dyn SerialPort>,
        baud_rate: u32,
    }

    impl SerialTransport {
        pub fn open(config: &SerialConfig) -> Result<Self, ModbusError> {
            info!("🔌 Connecting to Modbus RTU port: {}", config.port);
            info!(
                "⚙️  Configuration: {} baud, {} data bits, {:?} parity, {} stop bit(s)",
                config.baud_rate, config.data_bits, config.parity, config.stop_bits
            );

            let parity = match config.parity {
                ParityConfig::None => serialport::Parity::None,
                ParityConfig::Even => serialport::Parity::Even,
                ParityConfig::Odd => serialport::Parity::Odd,
            };
            let data_bits = match config.data_bits {
                5 => serialport::DataBits::Five,
                6 => serialport::DataBits::Six,
                7 => serialport::DataBits::Seven,
                8 => serialport::DataBits::Eight,
                other => {
                    return Err(ModbusError::Config(format!("unsupported data bits: {}", other)))
                }
            };
            let stop_bits = match config.stop_bits {
                1 => serialport::StopBits::One,
                2 => serialport::StopBits::Two,
                other => {
                    return Err(ModbusError::Config(format!("unsupported stop bits: {}", other)))
                }
            };

            let port = serialport::new(&config.port, config.baud_rate)
                .timeout(config.timeout())
                .data_bits(data_bits)
                .stop_bits(stop_bits)
                .parity(parity)
                .open()
                .map_err(|e| {
                    error!("❌ Failed to open serial port {}: {}", config.port, e);
                    ModbusError::Connection(format!("Failed to open port: {}", e))
                })?;

            info!("✅ Modbus RTU connection established successfully");
            Ok(Self {
                port,
                baud_rate: config.baud_rate,
            })
        }
    }

    impl Transport for SerialTransport {
        fn flush(&mut self) -> io::Result<()> {
            self.port.clear(ClearBuffer::Input).map_err(io::Error::from)
        }

        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            let written = Write::write(&mut self.port, data)?;
            Write::flush(&mut self.port)?;
            Ok(written)
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match Read::read(&mut self.port, buf) {
                Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
                other => other,
            }
        }

        fn baud_rate(&self) -> u32 {
            self.baud_rate
        }
    }

    /// Names of the serial ports visible to the OS.
    pub fn available_ports() -> Result<Vec<String>, ModbusError> {
        let ports = serialport::available_ports()
            .map_err(|e| ModbusError::Connection(format!("Failed to enumerate ports: {}", e)))?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }
}
