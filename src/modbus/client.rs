use log::{debug, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use super::observer::FrameObserver;
use super::protocol::{
    decode_bits, decode_registers, decode_response, decode_write_ack, expected_response_len,
    FunctionCode, ModbusRequest, ModbusResponse, BROADCAST_ADDRESS, MAX_SLAVE_ADDRESS,
};
use super::timing::{inter_frame_delay, DEFAULT_DELAY_MULTIPLIER, DEFAULT_GUARD_DELAY};
use super::transport::Transport;
use crate::utils::error::ModbusError;

/// Fixed for the client's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Overrides the transport's reported baud rate for timing purposes.
    pub baud_rate: Option<u32>,
    pub delay_multiplier: u32,
    /// Slept before every write, for RTS/line-driver turnaround.
    pub guard_delay: Duration,
    pub min_slave: u8,
    pub max_slave: u8,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            baud_rate: None,
            delay_multiplier: DEFAULT_DELAY_MULTIPLIER,
            guard_delay: DEFAULT_GUARD_DELAY,
            min_slave: 1,
            max_slave: MAX_SLAVE_ADDRESS,
        }
    }
}

/// Modbus RTU master. Every transaction holds the link from the guard delay
/// until the response has been read, so concurrent callers are serialized.
pub struct RtuClient<T: Transport> {
    link: Mutex<T>,
    config: ClientConfig,
    observer: RwLock<Option<Arc<dyn FrameObserver>>>,
}

impl<T: Transport> RtuClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    pub fn with_config(transport: T, config: ClientConfig) -> Self {
        Self {
            link: Mutex::new(transport),
            config,
            observer: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn set_observer(&self, observer: Arc<dyn FrameObserver>) {
        match self.observer.write() {
            Ok(mut slot) => *slot = Some(observer),
            Err(poisoned) => *poisoned.into_inner() = Some(observer),
        }
    }

    pub fn clear_observer(&self) {
        match self.observer.write() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    /// Gives the transport back, e.g. to close or reopen the port.
    pub fn into_transport(self) -> T {
        self.link.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reads 1 to 2000 contiguous coils; statuses come back byte-packed.
    pub fn read_coils(&self, slave: u8, address: u16, quantity: u16) -> Result<Vec<u8>, ModbusError> {
        let request = ModbusRequest::ReadCoils {
            slave,
            address,
            quantity,
        };
        let response = self.exchange(&request)?;
        decode_bits(slave, FunctionCode::ReadCoils, quantity, &response)
    }

    /// Reads 1 to 2000 contiguous discrete inputs; statuses come back byte-packed.
    pub fn read_discrete_inputs(
        &self,
        slave: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u8>, ModbusError> {
        let request = ModbusRequest::ReadDiscreteInputs {
            slave,
            address,
            quantity,
        };
        let response = self.exchange(&request)?;
        decode_bits(slave, FunctionCode::ReadDiscreteInputs, quantity, &response)
    }

    pub fn read_holding_registers(
        &self,
        slave: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        let request = ModbusRequest::ReadHoldingRegisters {
            slave,
            address,
            quantity,
        };
        let response = self.exchange(&request)?;
        decode_registers(slave, FunctionCode::ReadHoldingRegisters, quantity, &response)
    }

    pub fn read_input_registers(
        &self,
        slave: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        let request = ModbusRequest::ReadInputRegisters {
            slave,
            address,
            quantity,
        };
        let response = self.exchange(&request)?;
        decode_registers(slave, FunctionCode::ReadInputRegisters, quantity, &response)
    }

    pub fn write_single_coil(&self, slave: u8, address: u16, on: bool) -> Result<(), ModbusError> {
        self.write(ModbusRequest::WriteSingleCoil {
            slave,
            address,
            value: on,
        })
    }

    pub fn write_single_register(&self, slave: u8, address: u16, value: u16) -> Result<(), ModbusError> {
        self.write(ModbusRequest::WriteSingleRegister {
            slave,
            address,
            value,
        })
    }

    /// `values` holds the big-endian register contents, exactly 2 × `quantity` bytes.
    pub fn write_multiple_registers(
        &self,
        slave: u8,
        address: u16,
        quantity: u16,
        values: &[u8],
    ) -> Result<(), ModbusError> {
        self.write(ModbusRequest::WriteMultipleRegisters {
            slave,
            address,
            quantity,
            values: values.to_vec(),
        })
    }

    /// Runs any request and decodes its response generically.
    pub fn execute(&self, request: &ModbusRequest) -> Result<ModbusResponse, ModbusError> {
        let response = self.exchange(request)?;
        if request.slave() == BROADCAST_ADDRESS {
            return Ok(ModbusResponse::WriteAck);
        }
        decode_response(request, &response)
    }

    fn write(&self, request: ModbusRequest) -> Result<(), ModbusError> {
        let response = self.exchange(&request)?;
        if request.slave() == BROADCAST_ADDRESS {
            return Ok(());
        }
        decode_write_ack(&request, &response)
    }

    /// Validates, frames and sends `request`, returning the raw response.
    /// Broadcast writes return an empty response without reading.
    fn exchange(&self, request: &ModbusRequest) -> Result<Vec<u8>, ModbusError> {
        let adu = request.encode(self.config.min_slave, self.config.max_slave)?;
        let slave = request.slave();

        let mut link = self.lock_link();

        thread::sleep(self.config.guard_delay);
        link.flush().map_err(ModbusError::Flush)?;

        self.notify(|observer| observer.on_send(slave, &adu));
        let written = link.write(&adu).map_err(ModbusError::Write)?;
        if written != adu.len() {
            return Err(ModbusError::ShortWrite {
                written,
                expected: adu.len(),
            });
        }

        let baud_rate = self.config.baud_rate.unwrap_or_else(|| link.baud_rate());
        if slave == BROADCAST_ADDRESS {
            // nobody answers; keep the turnaround silence before releasing the line
            thread::sleep(inter_frame_delay(baud_rate, adu.len(), self.config.delay_multiplier));
            return Ok(Vec::new());
        }

        let expected = expected_response_len(&adu);
        let delay = inter_frame_delay(baud_rate, adu.len() + expected, self.config.delay_multiplier);
        debug!(
            "⏱️  slave {} fc 0x{:02X}: expecting {} bytes, waiting {:?}",
            slave,
            adu[1],
            expected,
            delay
        );
        thread::sleep(delay);

        let mut response = vec![0u8; expected];
        let read = link.read(&mut response).map_err(ModbusError::Read)?;
        if read == 0 {
            return Err(ModbusError::Timeout);
        }
        response.truncate(read);
        drop(link);

        self.notify(|observer| observer.on_receive(slave, &response));
        Ok(response)
    }

    fn lock_link(&self) -> MutexGuard<'_, T> {
        self.link.lock().unwrap_or_else(|poisoned| {
            warn!("⚠️  Serial link lock was poisoned, continuing with the same transport");
            poisoned.into_inner()
        })
    }

    fn notify(&self, f: impl FnOnce(&dyn FrameObserver)) {
        let observer = match self.observer.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(observer) = observer {
            f(observer.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::crc::append_crc;
    use crate::modbus::mock::{MockTransport, Reply};
    use crate::modbus::observer::{Direction, RecordingObserver};
    use crate::utils::error::{ExceptionCode, FrameError, ValidationError};
    use std::io;
    use std::time::Instant;

    fn fast_config() -> ClientConfig {
        ClientConfig {
            guard_delay: Duration::ZERO,
            delay_multiplier: 1,
            ..ClientConfig::default()
        }
    }

    fn client(mock: &MockTransport) -> RtuClient<MockTransport> {
        RtuClient::with_config(mock.clone(), fast_config())
    }

    #[test]
    fn test_read_holding_registers_full_transaction() {
        let mock = MockTransport::new(115_200);
        mock.reply(Reply::Bytes(append_crc(vec![0x0D, 0x03, 0x04, 0x00, 0x2A, 0x01, 0x00])));

        let registers = client(&mock).read_holding_registers(13, 0, 2).unwrap();
        assert_eq!(registers, vec![0x002A, 0x0100]);

        let state = mock.state();
        assert_eq!(state.calls, vec!["flush", "write", "read"]);
        assert_eq!(state.flushes, 1);
        assert_eq!(state.writes, vec![vec![0x0D, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0xC7]]);
        // bounded by the predicted length
        assert_eq!(state.read_requests, vec![9]);
    }

    #[test]
    fn test_read_coils_returns_packed_bytes() {
        let mock = MockTransport::new(9600);
        mock.reply(Reply::Bytes(append_crc(vec![0x0A, 0x01, 0x03, 0xFF, 0x0F, 0x0A])));

        let bits = client(&mock).read_coils(10, 0, 20).unwrap();
        assert_eq!(bits, vec![0xFF, 0x0F, 0x0A]);
        assert_eq!(mock.state().read_requests, vec![8]);
    }

    #[test]
    fn test_read_discrete_and_input_registers_use_their_function_codes() {
        let mock = MockTransport::new(19_200);
        mock.reply(Reply::Bytes(append_crc(vec![0x02, 0x02, 0x01, 0x05])))
            .reply(Reply::Bytes(append_crc(vec![0x02, 0x04, 0x02, 0x12, 0x34])));
        let client = client(&mock);

        assert_eq!(client.read_discrete_inputs(2, 8, 3).unwrap(), vec![0x05]);
        assert_eq!(client.read_input_registers(2, 8, 1).unwrap(), vec![0x1234]);

        let state = mock.state();
        assert_eq!(state.writes[0][1], 0x02);
        assert_eq!(state.writes[1][1], 0x04);
    }

    #[test]
    fn test_write_single_coil_sends_on_pattern_and_checks_echo() {
        let mock = MockTransport::new(9600);
        let request = ModbusRequest::WriteSingleCoil {
            slave: 10,
            address: 4,
            value: true,
        };
        mock.reply(Reply::Bytes(request.to_adu()));

        client(&mock).write_single_coil(10, 4, true).unwrap();
        let state = mock.state();
        assert_eq!(&state.writes[0][4..6], &[0xFF, 0x00]);
        assert_eq!(state.read_requests, vec![8]);
    }

    #[test]
    fn test_write_single_register_round_trip() {
        let mock = MockTransport::new(9600);
        mock.reply(Reply::Bytes(vec![0x01, 0x06, 0x00, 0x01, 0x00, 0x03, 0x98, 0x0B]));
        client(&mock).write_single_register(1, 1, 3).unwrap();
    }

    #[test]
    fn test_write_multiple_registers_rejects_bad_quantity_without_io() {
        let mock = MockTransport::new(9600);
        let client = client(&mock);

        for quantity in [0u16, 124] {
            let values = vec![0u8; 2 * quantity as usize];
            let err = client.write_multiple_registers(1, 0, quantity, &values).unwrap_err();
            assert!(matches!(
                err,
                ModbusError::Validation(ValidationError::QuantityOutOfRange { .. })
            ));
        }
        let err = client.write_multiple_registers(1, 0, 2, &[0, 1, 2]).unwrap_err();
        assert!(matches!(
            err,
            ModbusError::Validation(ValidationError::ValueLengthMismatch { expected: 4, actual: 3 })
        ));
        let err = client.write_multiple_registers(248, 0, 1, &[0, 1]).unwrap_err();
        assert!(matches!(err, ModbusError::Validation(ValidationError::SlaveOutOfRange { .. })));

        let state = mock.state();
        assert!(state.calls.is_empty());
        assert!(state.writes.is_empty());
    }

    #[test]
    fn test_write_multiple_registers_success() {
        let mock = MockTransport::new(9600);
        mock.reply(Reply::Bytes(append_crc(vec![0x11, 0x10, 0x00, 0x01, 0x00, 0x02])));
        client(&mock)
            .write_multiple_registers(0x11, 1, 2, &[0x00, 0x0A, 0x01, 0x02])
            .unwrap();
        let state = mock.state();
        assert_eq!(state.writes[0].len(), 13);
        assert_eq!(state.writes[0][6], 4);
    }

    #[test]
    fn test_silent_slave_times_out() {
        let mock = MockTransport::new(9600);
        mock.reply(Reply::Silence);
        let err = client(&mock).read_holding_registers(1, 0, 1).unwrap_err();
        assert!(matches!(err, ModbusError::Timeout));
    }

    #[test]
    fn test_transport_faults_map_to_their_step() {
        let mock = MockTransport::new(9600);
        mock.reply(Reply::Fail(io::ErrorKind::BrokenPipe));
        let err = client(&mock).read_holding_registers(1, 0, 1).unwrap_err();
        assert!(matches!(err, ModbusError::Read(_)));

        let mock = MockTransport::new(9600);
        mock.state().write_error = Some(io::ErrorKind::BrokenPipe);
        let err = client(&mock).read_holding_registers(1, 0, 1).unwrap_err();
        assert!(matches!(err, ModbusError::Write(_)));
        assert!(mock.state().read_requests.is_empty());

        let mock = MockTransport::new(9600);
        mock.state().flush_error = Some(io::ErrorKind::Other);
        let err = client(&mock).read_coils(1, 0, 1).unwrap_err();
        assert!(matches!(err, ModbusError::Flush(_)));
        assert_eq!(mock.state().calls, vec!["flush"]);
    }

    #[test]
    fn test_transport_is_returned_after_use() {
        let mock = MockTransport::new(4800);
        mock.reply(Reply::Bytes(append_crc(vec![0x01, 0x03, 0x02, 0x00, 0x01])));
        let client = client(&mock);
        assert_eq!(client.config(), &fast_config());

        client.read_holding_registers(1, 0, 1).unwrap();
        let transport = client.into_transport();
        assert_eq!(transport.baud_rate(), 4800);
        assert_eq!(transport.state().calls, vec!["flush", "write", "read"]);
    }

    #[test]
    fn test_short_write_stops_before_reading() {
        let mock = MockTransport::new(9600);
        mock.state().write_limit = Some(5);
        let err = client(&mock).write_single_register(1, 1, 3).unwrap_err();
        assert!(err.requires_reconnect());
        match err {
            ModbusError::ShortWrite { written, expected } => {
                assert_eq!(written, 5);
                assert_eq!(expected, 8);
            }
            other => panic!("expected short write, got {:?}", other),
        }
        assert_eq!(mock.state().calls, vec!["flush", "write"]);
    }

    #[test]
    fn test_wrong_responder_is_a_frame_error() {
        let mock = MockTransport::new(9600);
        mock.reply(Reply::Bytes(append_crc(vec![0x08, 0x03, 0x02, 0x00, 0x01])));
        let err = client(&mock).read_holding_registers(9, 0, 1).unwrap_err();
        assert!(matches!(
            err,
            ModbusError::Frame(FrameError::SlaveMismatch { expected: 9, actual: 8 })
        ));
    }

    #[test]
    fn test_exception_response_is_decoded() {
        let mock = MockTransport::new(9600);
        mock.reply(Reply::Bytes(append_crc(vec![0x01, 0x86, 0x02])));
        let err = client(&mock).write_single_register(1, 0xFFFF, 1).unwrap_err();
        assert!(matches!(
            err,
            ModbusError::Exception {
                slave: 1,
                function: 0x06,
                code: ExceptionCode::IllegalDataAddress
            }
        ));
    }

    #[test]
    fn test_broadcast_write_skips_read() {
        let mock = MockTransport::new(9600);
        let config = ClientConfig {
            min_slave: 0,
            ..fast_config()
        };
        let client = RtuClient::with_config(mock.clone(), config);

        client.write_single_register(0, 1, 1).unwrap();
        assert!(matches!(
            client.read_coils(0, 0, 1),
            Err(ModbusError::Validation(ValidationError::BroadcastRead))
        ));
        let state = mock.state();
        assert_eq!(state.calls, vec!["flush", "write"]);
    }

    #[test]
    fn test_observer_sees_both_directions() {
        let mock = MockTransport::new(9600);
        let response = append_crc(vec![0x05, 0x03, 0x02, 0x00, 0x07]);
        mock.reply(Reply::Bytes(response.clone()));
        let client = client(&mock);
        let observer = Arc::new(RecordingObserver::new());
        client.set_observer(observer.clone());

        client.read_holding_registers(5, 0, 1).unwrap();
        let events = observer.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].direction, Direction::Sent);
        assert_eq!(events[0].frame, mock.state().writes[0]);
        assert_eq!(events[1].direction, Direction::Received);
        assert_eq!(events[1].frame, response);

        client.clear_observer();
        mock.reply(Reply::Bytes(response));
        client.read_holding_registers(5, 0, 1).unwrap();
        assert_eq!(observer.events().len(), 2);
    }

    #[test]
    fn test_execute_decodes_generically() {
        let mock = MockTransport::new(9600);
        mock.reply(Reply::Bytes(append_crc(vec![0x01, 0x04, 0x02, 0xAB, 0xCD])));
        let response = client(&mock)
            .execute(&ModbusRequest::ReadInputRegisters {
                slave: 1,
                address: 0,
                quantity: 1,
            })
            .unwrap();
        assert_eq!(response, ModbusResponse::Registers(vec![0xABCD]));
    }

    #[test]
    fn test_guard_delay_is_applied_before_write() {
        let mock = MockTransport::new(115_200);
        mock.reply(Reply::Silence);
        let config = ClientConfig {
            guard_delay: Duration::from_millis(30),
            delay_multiplier: 0,
            ..ClientConfig::default()
        };
        let client = RtuClient::with_config(mock, config);

        let started = Instant::now();
        let _ = client.read_coils(1, 0, 1);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_concurrent_callers_are_serialized() {
        let mock = MockTransport::new(115_200);
        for slave in 1..=4u8 {
            mock.reply(Reply::Bytes(append_crc(vec![slave, 0x03, 0x02, 0x00, slave])));
        }
        let client = Arc::new(client(&mock));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let client = Arc::clone(&client);
                thread::spawn(move || {
                    let _ = client.read_holding_registers(1, 0, 1);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let calls = mock.state().calls.clone();
        assert_eq!(calls.len(), 12);
        for chunk in calls.chunks(3) {
            assert_eq!(chunk, ["flush", "write", "read"]);
        }
    }
}
