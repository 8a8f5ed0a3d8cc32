use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use std::sync::Mutex;

/// Trace points of a transaction. Implementations must not block for long:
/// `on_send` runs while the link is held, `on_receive` right after release.
pub trait FrameObserver: Send + Sync {
    fn on_send(&self, slave: u8, frame: &[u8]);
    fn on_receive(&self, slave: u8, frame: &[u8]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameEvent {
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub slave: u8,
    pub frame: Vec<u8>,
}

impl FrameEvent {
    pub fn hex(&self) -> String {
        hex::encode_upper(&self.frame)
    }
}

/// Forwards frames to the `log` facade at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl FrameObserver for LogObserver {
    fn on_send(&self, slave: u8, frame: &[u8]) {
        debug!("📤 [{}] TX {} ({} bytes)", slave, hex::encode_upper(frame), frame.len());
    }

    fn on_receive(&self, slave: u8, frame: &[u8]) {
        debug!("📥 [{}] RX {} ({} bytes)", slave, hex::encode_upper(frame), frame.len());
    }
}

/// Keeps every frame in memory, for `--trace` output and tests.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<FrameEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<FrameEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    fn record(&self, direction: Direction, slave: u8, frame: &[u8]) {
        if let Ok(mut events) = self.events.lock() {
            events.push(FrameEvent {
                timestamp: Utc::now(),
                direction,
                slave,
                frame: frame.to_vec(),
            });
        }
    }
}

impl FrameObserver for RecordingObserver {
    fn on_send(&self, slave: u8, frame: &[u8]) {
        self.record(Direction::Sent, slave, frame);
    }

    fn on_receive(&self, slave: u8, frame: &[u8]) {
        self.record(Direction::Received, slave, frame);
    }
}
