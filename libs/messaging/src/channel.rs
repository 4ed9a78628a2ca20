//! The abstract duplex pipe to a worker.
//!
//! The host implements [`Channel`] for the outbound half; inbound data is
//! delivered through the mpsc receiver handed to
//! [`WorkerMessenger::spawn_receive_loop`]. No handshake or
//! acknowledgement protocol exists at this layer.
//!
//! [`WorkerMessenger::spawn_receive_loop`]: crate::messenger::WorkerMessenger::spawn_receive_loop

use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

/// Channel-level send failures, surfaced synchronously to send callers.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("Send failed: {reason}")]
    SendFailed { reason: String },

    #[error("Channel closed")]
    Closed,
}

impl TransportError {
    pub fn send_failed(reason: impl Into<String>) -> Self {
        TransportError::SendFailed {
            reason: reason.into(),
        }
    }

    /// A closed channel never recovers; a rejected send might.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransportError::SendFailed { .. })
    }
}

/// Outbound half of the duplex pipe to a worker.
#[async_trait]
pub trait Channel: Send + Sync + Debug {
    /// Transmit one wire string. Fire-and-forget: no acknowledgement, no
    /// delivery-order guarantee across the boundary.
    async fn transmit(&self, wire: String) -> Result<(), TransportError>;
}
