//! # Strand Worker Messaging
//!
//! Transport core for structured messages between isolated execution
//! units. Combines the envelope codec, an abstract duplex [`Channel`], a
//! TTL-based [`CorrelationTracker`], and a priority-bucketed
//! [`BatchManager`] behind the per-domain [`WorkerMessenger`] façade.
//!
//! ## Concurrency model
//!
//! Everything timer-driven — the periodic batch flush and correlation TTL
//! expiries — runs as tokio tasks owned by the messenger and cancelled by
//! [`WorkerMessenger::destroy`]. Shared state sits behind locks because
//! multiple messengers feed a shared dashboard; a messenger only ever
//! mutates its own state.
//!
//! ## Ordering guarantees
//!
//! Envelopes submitted to the same open batch preserve submission order
//! inside that batch. There is no cross-batch or cross-priority ordering
//! guarantee, and channel delivery order is not guaranteed across process
//! boundaries.
//!
//! [`Channel`]: channel::Channel
//! [`CorrelationTracker`]: correlation::CorrelationTracker
//! [`BatchManager`]: batch::BatchManager
//! [`WorkerMessenger`]: messenger::WorkerMessenger

pub mod batch;
pub mod channel;
pub mod correlation;
pub mod messenger;
pub mod metrics;
pub mod test_utils;

use strand_codec::CodecError;
use thiserror::Error;

pub use batch::{is_batchable_kind, BatchManager, BATCH_INTERVAL_MS, MAX_BATCH_SIZE};
pub use channel::{Channel, TransportError};
pub use correlation::CorrelationTracker;
pub use messenger::{
    BatchReceipt, MessengerConfig, SendOptions, SendReceipt, WorkerMessenger,
};
pub use metrics::{
    HealthReport, HealthStatus, MessengerCounters, MessengerMetrics, MetricsSource, EMA_ALPHA,
};

/// Messenger-level errors surfaced to send-path callers.
#[derive(Debug, Error)]
pub enum MessengerError {
    /// The channel rejected a transmit. Upstream domain logic decides
    /// whether to retry; there is no automatic retry here.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Operation on a messenger after [`WorkerMessenger::destroy`].
    ///
    /// [`WorkerMessenger::destroy`]: messenger::WorkerMessenger::destroy
    #[error("Messenger for domain '{0}' has been destroyed")]
    Destroyed(String),
}

pub type MessengerResult<T> = Result<T, MessengerError>;
