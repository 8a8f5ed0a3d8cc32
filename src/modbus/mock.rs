use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use super::transport::Transport;

#[derive(Debug, Clone)]
pub enum Reply {
    Bytes(Vec<u8>),
    Silence,
    Fail(io::ErrorKind),
}

#[derive(Debug, Default)]
pub struct MockState {
    pub flushes: usize,
    pub writes: Vec<Vec<u8>>,
    pub read_requests: Vec<usize>,
    pub replies: VecDeque<Reply>,
    /// Accept only this many bytes per write.
    pub write_limit: Option<usize>,
    pub flush_error: Option<io::ErrorKind>,
    pub write_error: Option<io::ErrorKind>,
    /// Ordered log of calls, e.g. "flush", "write", "read".
    pub calls: Vec<&'static str>,
}

/// Scripted transport. Clones share state so tests can inspect calls after
/// the transport has moved into a client.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    baud_rate: u32,
}

impl MockTransport {
    pub fn new(baud_rate: u32) -> Self {
        Self {
            state: Arc::default(),
            baud_rate,
        }
    }

    pub fn reply(&self, reply: Reply) -> &Self {
        self.state.lock().unwrap().replies.push_back(reply);
        self
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

impl Transport for MockTransport {
    fn flush(&mut self) -> io::Result<()> {
        let mut state = self.state();
        state.flushes += 1;
        state.calls.push("flush");
        match state.flush_error {
            Some(kind) => Err(io::Error::new(kind, "scripted flush failure")),
            None => Ok(()),
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.state();
        state.calls.push("write");
        if let Some(kind) = state.write_error {
            return Err(io::Error::new(kind, "scripted write failure"));
        }
        let accepted = state.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
        state.writes.push(data[..accepted].to_vec());
        Ok(accepted)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        state.calls.push("read");
        state.read_requests.push(buf.len());
        match state.replies.pop_front().unwrap_or(Reply::Silence) {
            Reply::Bytes(bytes) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Reply::Silence => Ok(0),
            Reply::Fail(kind) => Err(io::Error::new(kind, "scripted read failure")),
        }
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}
