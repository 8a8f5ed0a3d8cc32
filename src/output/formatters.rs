use chrono::Utc;

use crate::modbus::observer::FrameEvent;
use crate::modbus::protocol::unpack_bits;

/// Renders operation results for the command line.
pub trait ResultFormatter: Send + Sync {
    fn format_bits(&self, slave: u8, address: u16, quantity: u16, packed: &[u8]) -> String;
    fn format_registers(&self, slave: u8, address: u16, registers: &[u16]) -> String;
    fn format_write(&self, slave: u8, description: &str) -> String;
    fn format_trace(&self, events: &[FrameEvent]) -> String;
}

pub struct TextFormatter;

impl ResultFormatter for TextFormatter {
    fn format_bits(&self, slave: u8, address: u16, quantity: u16, packed: &[u8]) -> String {
        let mut output = format!("🔹 Slave {} statuses:\n", slave);
        for (offset, on) in unpack_bits(packed, quantity).into_iter().enumerate() {
            output.push_str(&format!(
                "  {:>5}: {}\n",
                address as usize + offset,
                if on { "ON" } else { "OFF" }
            ));
        }
        output
    }

    fn format_registers(&self, slave: u8, address: u16, registers: &[u16]) -> String {
        let mut output = format!("🔹 Slave {} registers:\n", slave);
        for (offset, value) in registers.iter().enumerate() {
            output.push_str(&format!(
                "  {:>5}: {:>5} (0x{:04X})\n",
                address as usize + offset,
                value,
                value
            ));
        }
        output
    }

    fn format_write(&self, slave: u8, description: &str) -> String {
        format!("✅ Slave {}: {}\n", slave, description)
    }

    fn format_trace(&self, events: &[FrameEvent]) -> String {
        events
            .iter()
            .map(|event| {
                format!(
                    "{} {:?} [{}] {}\n",
                    event.timestamp.format("%H:%M:%S%.3f"),
                    event.direction,
                    event.slave,
                    event.hex()
                )
            })
            .collect()
    }
}

pub struct JsonFormatter;

impl ResultFormatter for JsonFormatter {
    fn format_bits(&self, slave: u8, address: u16, quantity: u16, packed: &[u8]) -> String {
        let json_data = serde_json::json!({
            "slave": slave,
            "address": address,
            "quantity": quantity,
            "timestamp": Utc::now().to_rfc3339(),
            "packed": hex::encode_upper(packed),
            "statuses": unpack_bits(packed, quantity),
        });

        serde_json::to_string_pretty(&json_data).unwrap_or_default()
    }

    fn format_registers(&self, slave: u8, address: u16, registers: &[u16]) -> String {
        let json_data = serde_json::json!({
            "slave": slave,
            "address": address,
            "timestamp": Utc::now().to_rfc3339(),
            "registers": registers,
        });

        serde_json::to_string_pretty(&json_data).unwrap_or_default()
    }

    fn format_write(&self, slave: u8, description: &str) -> String {
        let json_data = serde_json::json!({
            "slave": slave,
            "timestamp": Utc::now().to_rfc3339(),
            "result": "ok",
            "operation": description,
        });

        serde_json::to_string_pretty(&json_data).unwrap_or_default()
    }

    fn format_trace(&self, events: &[FrameEvent]) -> String {
        let frames: Vec<serde_json::Value> = events
            .iter()
            .map(|event| {
                serde_json::json!({
                    "timestamp": event.timestamp.to_rfc3339(),
                    "direction": event.direction,
                    "slave": event.slave,
                    "frame": event.hex(),
                })
            })
            .collect();

        serde_json::to_string_pretty(&frames).unwrap_or_default()
    }
}

/// Raw data bytes only, for piping into other tools.
pub struct HexFormatter;

impl ResultFormatter for HexFormatter {
    fn format_bits(&self, _slave: u8, _address: u16, _quantity: u16, packed: &[u8]) -> String {
        format!("{}\n", hex::encode_upper(packed))
    }

    fn format_registers(&self, _slave: u8, _address: u16, registers: &[u16]) -> String {
        let bytes: Vec<u8> = registers.iter().flat_map(|r| r.to_be_bytes()).collect();
        format!("{}\n", hex::encode_upper(bytes))
    }

    fn format_write(&self, _slave: u8, _description: &str) -> String {
        String::new()
    }

    fn format_trace(&self, events: &[FrameEvent]) -> String {
        events.iter().map(|event| format!("{}\n", event.hex())).collect()
    }
}
