/// CRC-16/MODBUS: polynomial 0xA001 (reflected 0x8005), initial value 0xFFFF.
pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    let poly: u16 = 0xA001;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ poly;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Appends the CRC trailer, low byte first.
pub fn append_crc(mut data: Vec<u8>) -> Vec<u8> {
    let crc = crc16_modbus(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    data
}

/// Splits a received frame into the CRC it carries and the one computed over
/// the rest. Frames shorter than the trailer yield `None`.
pub fn frame_crc(frame: &[u8]) -> Option<(u16, u16)> {
    if frame.len() < 2 {
        return None;
    }
    let data_len = frame.len() - 2;
    let received = u16::from_le_bytes([frame[data_len], frame[data_len + 1]]);
    Some((crc16_modbus(&frame[..data_len]), received))
}
