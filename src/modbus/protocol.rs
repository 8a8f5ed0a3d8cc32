//! Modbus RTU request framing and response decoding.
//!
//! Address, quantity and value fields travel big-endian; only the CRC trailer
//! is little-endian.

use super::crc::{append_crc, frame_crc};
use crate::utils::error::{ExceptionCode, FrameError, ModbusError, ValidationError};

/// address(1) + function code(1) + crc(2)
pub const RTU_ADU_MIN_SIZE: usize = 4;
pub const BROADCAST_ADDRESS: u8 = 0;
pub const MAX_SLAVE_ADDRESS: u8 = 247;

pub const MAX_READ_BITS: u16 = 2000;
pub const MAX_READ_REGISTERS: u16 = 125;
pub const MAX_WRITE_REGISTERS: u16 = 123;

const COIL_ON: u16 = 0xFF00;
const COIL_OFF: u16 = 0x0000;
const EXCEPTION_FLAG: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    ReadCoils,
    ReadDiscreteInputs,
    ReadHoldingRegisters,
    ReadInputRegisters,
    WriteSingleCoil,
    WriteSingleRegister,
    WriteMultipleCoils,
    WriteMultipleRegisters,
}

impl FunctionCode {
    pub fn code(self) -> u8 {
        match self {
            Self::ReadCoils => 0x01,
            Self::ReadDiscreteInputs => 0x02,
            Self::ReadHoldingRegisters => 0x03,
            Self::ReadInputRegisters => 0x04,
            Self::WriteSingleCoil => 0x05,
            Self::WriteSingleRegister => 0x06,
            Self::WriteMultipleCoils => 0x0F,
            Self::WriteMultipleRegisters => 0x10,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::ReadCoils),
            0x02 => Some(Self::ReadDiscreteInputs),
            0x03 => Some(Self::ReadHoldingRegisters),
            0x04 => Some(Self::ReadInputRegisters),
            0x05 => Some(Self::WriteSingleCoil),
            0x06 => Some(Self::WriteSingleRegister),
            0x0F => Some(Self::WriteMultipleCoils),
            0x10 => Some(Self::WriteMultipleRegisters),
            _ => None,
        }
    }

    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::WriteSingleCoil
                | Self::WriteSingleRegister
                | Self::WriteMultipleCoils
                | Self::WriteMultipleRegisters
        )
    }

    /// Response bytes beyond the address/function/CRC envelope.
    fn response_body_len(self, quantity: u16) -> usize {
        match self {
            Self::ReadCoils | Self::ReadDiscreteInputs => 1 + (quantity as usize).div_ceil(8),
            Self::ReadHoldingRegisters | Self::ReadInputRegisters => 1 + 2 * quantity as usize,
            // echoed address + quantity/value
            _ => 4,
        }
    }
}

/// Function code plus payload, independent of the serial envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub function: FunctionCode,
    pub payload: Vec<u8>,
}

impl Pdu {
    pub fn new(function: FunctionCode, payload: Vec<u8>) -> Self {
        Self { function, payload }
    }

    /// Wraps the PDU in `[slave][pdu][crc_lo][crc_hi]`.
    pub fn into_adu(self, slave: u8) -> Vec<u8> {
        let mut adu = Vec::with_capacity(self.payload.len() + RTU_ADU_MIN_SIZE);
        adu.push(slave);
        adu.push(self.function.code());
        adu.extend_from_slice(&self.payload);
        append_crc(adu)
    }
}

/// Packs each value as a big-endian byte pair.
pub fn u16s_to_be_bytes(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// `[address][quantity][byte count][values..]` for multi-register writes.
/// The byte count is one byte wide; callers validate the block length first.
fn multi_write_block(address: u16, quantity: u16, values: &[u8]) -> Vec<u8> {
    let mut block = u16s_to_be_bytes(&[address, quantity]);
    block.push(values.len() as u8);
    block.extend_from_slice(values);
    block
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusRequest {
    ReadCoils {
        slave: u8,
        address: u16,
        quantity: u16,
    },
    ReadDiscreteInputs {
        slave: u8,
        address: u16,
        quantity: u16,
    },
    ReadHoldingRegisters {
        slave: u8,
        address: u16,
        quantity: u16,
    },
    ReadInputRegisters {
        slave: u8,
        address: u16,
        quantity: u16,
    },
    WriteSingleCoil {
        slave: u8,
        address: u16,
        value: bool,
    },
    WriteSingleRegister {
        slave: u8,
        address: u16,
        value: u16,
    },
    WriteMultipleRegisters {
        slave: u8,
        address: u16,
        quantity: u16,
        values: Vec<u8>,
    },
}

impl ModbusRequest {
    pub fn slave(&self) -> u8 {
        match self {
            Self::ReadCoils { slave, .. }
            | Self::ReadDiscreteInputs { slave, .. }
            | Self::ReadHoldingRegisters { slave, .. }
            | Self::ReadInputRegisters { slave, .. }
            | Self::WriteSingleCoil { slave, .. }
            | Self::WriteSingleRegister { slave, .. }
            | Self::WriteMultipleRegisters { slave, .. } => *slave,
        }
    }

    pub fn function(&self) -> FunctionCode {
        match self {
            Self::ReadCoils { .. } => FunctionCode::ReadCoils,
            Self::ReadDiscreteInputs { .. } => FunctionCode::ReadDiscreteInputs,
            Self::ReadHoldingRegisters { .. } => FunctionCode::ReadHoldingRegisters,
            Self::ReadInputRegisters { .. } => FunctionCode::ReadInputRegisters,
            Self::WriteSingleCoil { .. } => FunctionCode::WriteSingleCoil,
            Self::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
            Self::WriteMultipleRegisters { .. } => FunctionCode::WriteMultipleRegisters,
        }
    }

    /// Checks protocol bounds. `min_slave`/`max_slave` come from the client
    /// configuration; a zero `min_slave` admits broadcast writes.
    pub fn validate(&self, min_slave: u8, max_slave: u8) -> Result<(), ValidationError> {
        let slave = self.slave();
        if slave < min_slave || slave > max_slave {
            return Err(ValidationError::SlaveOutOfRange {
                slave,
                min: min_slave,
                max: max_slave,
            });
        }
        if slave == BROADCAST_ADDRESS && !self.function().is_write() {
            return Err(ValidationError::BroadcastRead);
        }

        match self {
            Self::ReadCoils { quantity, .. } | Self::ReadDiscreteInputs { quantity, .. } => {
                check_quantity(*quantity, MAX_READ_BITS)
            }
            Self::ReadHoldingRegisters { quantity, .. }
            | Self::ReadInputRegisters { quantity, .. } => {
                check_quantity(*quantity, MAX_READ_REGISTERS)
            }
            Self::WriteMultipleRegisters {
                quantity, values, ..
            } => {
                check_quantity(*quantity, MAX_WRITE_REGISTERS)?;
                let expected = 2 * *quantity as usize;
                if values.len() != expected {
                    return Err(ValidationError::ValueLengthMismatch {
                        expected,
                        actual: values.len(),
                    });
                }
                Ok(())
            }
            Self::WriteSingleCoil { .. } | Self::WriteSingleRegister { .. } => Ok(()),
        }
    }

    pub fn pdu(&self) -> Pdu {
        let payload = match self {
            Self::ReadCoils {
                address, quantity, ..
            }
            | Self::ReadDiscreteInputs {
                address, quantity, ..
            }
            | Self::ReadHoldingRegisters {
                address, quantity, ..
            }
            | Self::ReadInputRegisters {
                address, quantity, ..
            } => u16s_to_be_bytes(&[*address, *quantity]),
            Self::WriteSingleCoil { address, value, .. } => {
                let state = if *value { COIL_ON } else { COIL_OFF };
                u16s_to_be_bytes(&[*address, state])
            }
            Self::WriteSingleRegister { address, value, .. } => {
                u16s_to_be_bytes(&[*address, *value])
            }
            Self::WriteMultipleRegisters {
                address,
                quantity,
                values,
                ..
            } => multi_write_block(*address, *quantity, values),
        };
        Pdu::new(self.function(), payload)
    }

    /// Full on-wire frame. Deterministic: equal requests give equal bytes.
    /// Does not validate; a value block over 255 bytes would not fit its
    /// byte-count field. Use [`ModbusRequest::encode`] for unchecked input.
    pub fn to_adu(&self) -> Vec<u8> {
        self.pdu().into_adu(self.slave())
    }

    /// Validates against the slave bounds, then frames.
    pub fn encode(&self, min_slave: u8, max_slave: u8) -> Result<Vec<u8>, ValidationError> {
        self.validate(min_slave, max_slave)?;
        Ok(self.to_adu())
    }
}

fn check_quantity(quantity: u16, max: u16) -> Result<(), ValidationError> {
    if quantity == 0 || quantity > max {
        return Err(ValidationError::QuantityOutOfRange {
            quantity,
            min: 1,
            max,
        });
    }
    Ok(())
}

/// Predicts the exact response length for an outgoing ADU. Unknown function
/// codes, and frames too short to carry a quantity, predict only the envelope.
pub fn expected_response_len(adu: &[u8]) -> usize {
    let Some(function) = adu.get(1).copied().and_then(FunctionCode::from_code) else {
        return RTU_ADU_MIN_SIZE;
    };
    if function.is_write() {
        return RTU_ADU_MIN_SIZE + function.response_body_len(0);
    }
    match adu.get(4..6) {
        Some(qty) => {
            let quantity = u16::from_be_bytes([qty[0], qty[1]]);
            RTU_ADU_MIN_SIZE + function.response_body_len(quantity)
        }
        None => RTU_ADU_MIN_SIZE,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusResponse {
    /// Byte-packed statuses, least significant bit first.
    Bits(Vec<u8>),
    Registers(Vec<u16>),
    WriteAck,
}

/// Decodes a raw response against the request that produced it.
pub fn decode_response(request: &ModbusRequest, response: &[u8]) -> Result<ModbusResponse, ModbusError> {
    let slave = request.slave();
    match request {
        ModbusRequest::ReadCoils { quantity, .. } | ModbusRequest::ReadDiscreteInputs { quantity, .. } => {
            decode_bits(slave, request.function(), *quantity, response).map(ModbusResponse::Bits)
        }
        ModbusRequest::ReadHoldingRegisters { quantity, .. }
        | ModbusRequest::ReadInputRegisters { quantity, .. } => {
            decode_registers(slave, request.function(), *quantity, response)
                .map(ModbusResponse::Registers)
        }
        _ => decode_write_ack(request, response).map(|_| ModbusResponse::WriteAck),
    }
}

/// Coil or discrete input statuses, still byte-packed.
pub fn decode_bits(
    slave: u8,
    function: FunctionCode,
    quantity: u16,
    response: &[u8],
) -> Result<Vec<u8>, ModbusError> {
    let data = read_payload(slave, function, response)?;
    let expected = (quantity as usize).div_ceil(8);
    if data.len() != expected {
        return Err(FrameError::ByteCount {
            expected,
            actual: data.len(),
        }
        .into());
    }
    Ok(data.to_vec())
}

pub fn decode_registers(
    slave: u8,
    function: FunctionCode,
    quantity: u16,
    response: &[u8],
) -> Result<Vec<u16>, ModbusError> {
    let data = read_payload(slave, function, response)?;
    let expected = 2 * quantity as usize;
    if data.len() != expected {
        return Err(FrameError::ByteCount {
            expected,
            actual: data.len(),
        }
        .into());
    }
    Ok(data
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

/// Header check plus verification that the slave echoed the written
/// address and value/quantity.
pub fn decode_write_ack(request: &ModbusRequest, response: &[u8]) -> Result<(), ModbusError> {
    check_header(request.slave(), request.function(), response)?;
    let expected_len = RTU_ADU_MIN_SIZE + request.function().response_body_len(0);
    if response.len() < expected_len {
        return Err(FrameError::TooShort {
            len: response.len(),
        }
        .into());
    }

    let pdu = request.pdu();
    let mut sent = [0u8; 4];
    sent.copy_from_slice(&pdu.payload[..4]);
    let mut echoed = [0u8; 4];
    echoed.copy_from_slice(&response[2..6]);
    if sent != echoed {
        return Err(FrameError::Echo { sent, echoed }.into());
    }
    Ok(())
}

/// Strips address, function code, byte count and CRC from a read response.
fn read_payload(slave: u8, function: FunctionCode, response: &[u8]) -> Result<&[u8], ModbusError> {
    check_header(slave, function, response)?;
    // byte count field must be present in addition to the envelope
    if response.len() < RTU_ADU_MIN_SIZE + 1 {
        return Err(FrameError::TooShort {
            len: response.len(),
        }
        .into());
    }

    let data = &response[3..response.len() - 2];
    let declared = response[2] as usize;
    if declared != data.len() {
        return Err(FrameError::ByteCount {
            expected: declared,
            actual: data.len(),
        }
        .into());
    }
    Ok(data)
}

/// Length, slave address, exception and function code checks, then CRC.
fn check_header(slave: u8, function: FunctionCode, response: &[u8]) -> Result<(), ModbusError> {
    if response.len() < RTU_ADU_MIN_SIZE {
        return Err(FrameError::TooShort {
            len: response.len(),
        }
        .into());
    }
    if response[0] != slave {
        return Err(FrameError::SlaveMismatch {
            expected: slave,
            actual: response[0],
        }
        .into());
    }

    let code = function.code();
    if response[1] == code | EXCEPTION_FLAG && response.len() >= RTU_ADU_MIN_SIZE + 1 {
        let frame = &response[..RTU_ADU_MIN_SIZE + 1];
        verify_crc(frame)?;
        return Err(ModbusError::Exception {
            slave,
            function: code,
            code: ExceptionCode::from(frame[2]),
        });
    }
    if response[1] != code {
        return Err(FrameError::FunctionMismatch {
            expected: code,
            actual: response[1],
        }
        .into());
    }
    verify_crc(response)
}

fn verify_crc(frame: &[u8]) -> Result<(), ModbusError> {
    match frame_crc(frame) {
        Some((expected, actual)) if expected != actual => {
            Err(FrameError::Crc { expected, actual }.into())
        }
        Some(_) => Ok(()),
        None => Err(FrameError::TooShort { len: frame.len() }.into()),
    }
}

/// Expands byte-packed statuses into `quantity` booleans.
pub fn unpack_bits(bytes: &[u8], quantity: u16) -> Vec<bool> {
    (0..quantity as usize)
        .map(|i| {
            bytes
                .get(i / 8)
                .map(|byte| byte & (1 << (i % 8)) != 0)
                .unwrap_or(false)
        })
        .collect()
}
