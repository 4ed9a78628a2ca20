//! # Strand Unified Types Library
//!
//! Shared type definitions for the Strand worker messaging system.
//!
//! ## Design Philosophy
//!
//! - **Single Source of Truth**: every crate in the workspace speaks these
//!   envelope and payload types; nothing re-declares them locally
//! - **Immutable Envelopes**: an [`Envelope`] is constructed once at send
//!   time and never mutated downstream
//! - **Closed Payload Set**: message payloads are a tagged enum validated
//!   against a schema table at decode time, not free-form maps
//! - **Clear Boundaries**: no transport logic (lives in `strand-messaging`)
//!   and no wire encoding (lives in `strand-codec`)
//!
//! ## Quick Start
//!
//! ```rust
//! use strand_types::{Envelope, Metadata, MessagePayload, Priority, SettlementUpdate};
//!
//! let metadata = Metadata::mint("settlement", "dashboard")
//!     .with_priority(Priority::High)
//!     .with_ttl_ms(60_000);
//!
//! let payload = MessagePayload::SettlementUpdate(SettlementUpdate {
//!     settlement_id: "PEN_001".to_string(),
//!     amount: 166.67,
//!     currency: None,
//!     status: None,
//! });
//!
//! let envelope = Envelope::new(strand_types::kind::SETTLEMENT_UPDATE, metadata, payload);
//! assert_eq!(envelope.metadata.priority, Priority::High);
//! ```

pub mod envelope;
pub mod error;
pub mod events;
pub mod payload;

pub use envelope::{Envelope, Metadata, Priority, DEFAULT_TTL_MS, PROTOCOL_VERSION};
pub use error::{PayloadError, PayloadResult};
pub use events::DomainEvent;
pub use payload::{
    kind, BalanceUpdated, BatchPayload, BonusAwarded, CommissionCalculated, MessagePayload,
    SettlementUpdate,
};
