//! Named in-process event channels
//!
//! The process host publishes every line the server writes to stdout/stderr
//! on the `server-log` channel; anyone interested subscribes by name.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::broadcast;

pub struct LogBus {
    /// Per-subscriber buffer before a slow reader starts lagging
    buffer: usize,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl LogBus {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        let mut channels = self.channels.lock();
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer).0)
            .clone()
    }

    /// Publish one payload. Returns how many subscribers received it; a
    /// payload nobody listens for is dropped.
    pub fn emit(&self, channel: &str, payload: impl Into<String>) -> usize {
        self.sender(channel).send(payload.into()).unwrap_or(0)
    }

    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        self.sender(channel).subscribe()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .get(channel)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for LogBus {
    fn default() -> Self {
        Self::new(crate::defaults::LOG_BUS_BUFFER)
    }
}
