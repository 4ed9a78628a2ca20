use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::payload::MessagePayload;

/// Envelope schema version carried in every metadata block.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Default correlation TTL when the sender does not specify one (5 minutes).
pub const DEFAULT_TTL_MS: u64 = 300_000;

/// Message priority for batching and queueing decisions.
///
/// Ordered so that `Critical > High > Normal > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl Priority {
    /// All priorities, highest first. Used when draining batch buckets.
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];
}

/// Routing and lifecycle metadata attached to every envelope.
///
/// The correlation id is assigned exactly once, at send time, and is never
/// reused while the entry is still tracked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub correlation_id: String,

    /// ISO-8601 creation timestamp.
    pub timestamp: String,

    /// Envelope schema version, currently [`PROTOCOL_VERSION`].
    pub version: String,

    pub source_domain: String,
    pub target_domain: String,

    #[serde(default)]
    pub priority: Priority,

    /// How long a pending correlation entry is retained, in milliseconds.
    #[serde(default = "default_ttl")]
    pub ttl_ms: u64,

    /// Whether the sender requested compression for this envelope.
    #[serde(default)]
    pub compression: bool,

    /// Present only on envelopes that traveled inside a batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}

fn default_ttl() -> u64 {
    DEFAULT_TTL_MS
}

impl Metadata {
    /// Mint fresh metadata with a new correlation id and current timestamp.
    pub fn mint(source_domain: impl Into<String>, target_domain: impl Into<String>) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: PROTOCOL_VERSION.to_string(),
            source_domain: source_domain.into(),
            target_domain: target_domain.into(),
            priority: Priority::Normal,
            ttl_ms: DEFAULT_TTL_MS,
            compression: false,
            batch_id: None,
        }
    }

    /// Set priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set correlation TTL in milliseconds
    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    /// Mark the envelope as compression-requested
    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }

    /// Attach a batch id
    pub fn with_batch_id(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }
}

/// The structured unit of transmission: type tag + metadata + payload.
///
/// Immutable once sent; created by the worker messenger, never mutated
/// downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Message type tag, e.g. `SETTLEMENT_UPDATE`.
    pub kind: String,
    pub metadata: Metadata,
    pub payload: MessagePayload,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, metadata: Metadata, payload: MessagePayload) -> Self {
        Self {
            kind: kind.into(),
            metadata,
            payload,
        }
    }

    /// Correlation id shorthand.
    pub fn correlation_id(&self) -> &str {
        &self.metadata.correlation_id
    }
}
