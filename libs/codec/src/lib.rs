//! # Strand Envelope Codec
//!
//! ## Purpose
//!
//! This crate contains the "rules" layer of the Strand messaging system:
//! - Wire document encoding/decoding for [`strand_types::Envelope`]
//! - Required-field validation at decode time
//! - The compression wrapper (marker prefix + pluggable strategy)
//!
//! ## Architecture Role
//!
//! ```text
//! strand-types → [codec] → strand-messaging
//!     ↑             ↓            ↓
//! Pure Data    Wire Rules    Transport
//! Structures   Validation    Channels
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Transport logic (belongs in `strand-messaging`)
//! - Payload type definitions (belong in `strand-types`)
//!
//! The codec is a pure transform: encoding and decoding have no side
//! effects and keep no state beyond the configured compression strategy.

pub mod compression;
pub mod error;

mod envelope_codec;

pub use compression::{
    Base64Strategy, CompressionStrategy, NoCompression, COMPRESSION_MARKER,
    COMPRESSION_THRESHOLD_BYTES,
};
pub use envelope_codec::EnvelopeCodec;
pub use error::{CodecError, CodecResult};
