//! In-memory channels for tests: a collecting outbound half and a pipe
//! feeding a messenger's receive loop.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::channel::{Channel, TransportError};

/// A channel that collects transmitted wires, with failure injection.
#[derive(Debug, Default)]
pub struct InMemoryChannel {
    wires: Mutex<Vec<String>>,
    fail_next: AtomicBool,
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// All wires transmitted so far, in transmit order.
    pub fn sent_wires(&self) -> Vec<String> {
        self.wires.lock().clone()
    }

    pub fn wire_count(&self) -> usize {
        self.wires.lock().len()
    }

    /// Make the next transmit fail with a transport error.
    pub fn fail_next_transmit(&self) {
        self.fail_next.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl Channel for InMemoryChannel {
    async fn transmit(&self, wire: String) -> Result<(), TransportError> {
        if self.fail_next.swap(false, Ordering::Relaxed) {
            return Err(TransportError::send_failed("injected failure"));
        }
        self.wires.lock().push(wire);
        Ok(())
    }
}

/// Outbound half of an in-process pipe: transmits land in the paired
/// receiver, which is typically handed to a messenger's receive loop.
#[derive(Debug)]
pub struct PipeChannel {
    tx: mpsc::UnboundedSender<String>,
}

/// Create a pipe: the channel transmits into the returned receiver.
pub fn pipe() -> (PipeChannel, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PipeChannel { tx }, rx)
}

#[async_trait]
impl Channel for PipeChannel {
    async fn transmit(&self, wire: String) -> Result<(), TransportError> {
        self.tx.send(wire).map_err(|_| TransportError::Closed)
    }
}
