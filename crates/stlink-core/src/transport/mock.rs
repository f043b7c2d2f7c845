//! Mock USB transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::traits::{TransportError, UsbTransport};
use crate::protocol::constants::{STLINK_PRODUCT_IDS, STLINK_VENDOR_ID};

/// Mock transport for unit testing protocol logic without hardware.
pub struct MockTransport {
    /// Queued replies to return on read.
    reply_queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// Captured writes.
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Truncate every write to this many bytes when set.
    write_limit: Arc<Mutex<Option<usize>>>,
    /// Simulated VID/PID.
    vid: u16,
    pid: u16,
    /// Whether device is "connected".
    connected: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            reply_queue: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            write_limit: Arc::new(Mutex::new(None)),
            vid: STLINK_VENDOR_ID,
            pid: STLINK_PRODUCT_IDS[0],
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Queue a raw reply to be returned on next read.
    pub fn queue_reply(&self, bytes: &[u8]) {
        self.reply_queue.lock().unwrap().push_back(bytes.to_vec());
    }

    /// Queue a 6-byte GET_STATUS reply.
    pub fn queue_status(&self, status: u8, poll_timeout_ms: u32, state: u8) {
        let poll = poll_timeout_ms.to_le_bytes();
        self.queue_reply(&[status, poll[0], poll[1], poll[2], state, 0]);
    }

    /// Queue the busy-then-idle status pair of a successful download.
    pub fn queue_download_ok(&self) {
        use crate::protocol::status::{DfuState, StatusCode};
        self.queue_status(StatusCode::Ok.into(), 0, DfuState::DnBusy.into());
        self.queue_status(StatusCode::Ok.into(), 0, DfuState::DnloadIdle.into());
    }

    /// Number of replies not consumed yet.
    pub fn pending_replies(&self) -> usize {
        self.reply_queue.lock().unwrap().len()
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().unwrap().clone()
    }

    /// Make subsequent writes report at most `limit` bytes transferred.
    pub fn limit_writes(&self, limit: Option<usize>) {
        *self.write_limit.lock().unwrap() = limit;
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbTransport for MockTransport {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        self.write_log.lock().unwrap().push(data.to_vec());
        let written = match *self.write_limit.lock().unwrap() {
            Some(limit) => data.len().min(limit),
            None => data.len(),
        };
        Ok(written)
    }

    fn read(&self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        let mut reply = self
            .reply_queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(TransportError::Timeout { timeout_ms: 5000 })?;
        reply.truncate(max_len);
        Ok(reply)
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
