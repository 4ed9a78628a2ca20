use std::sync::Arc;

use strand_types::Envelope;

use crate::compression::{
    Base64Strategy, CompressionStrategy, COMPRESSION_MARKER, COMPRESSION_THRESHOLD_BYTES,
};
use crate::error::{CodecError, CodecResult};

/// Encodes and decodes envelopes to/from the compact textual wire form.
///
/// Pure transform: no side effects, no logging on success. Cloning shares
/// the compression strategy.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    strategy: Arc<dyn CompressionStrategy>,
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new(Arc::new(Base64Strategy))
    }
}

impl EnvelopeCodec {
    pub fn new(strategy: Arc<dyn CompressionStrategy>) -> Self {
        Self { strategy }
    }

    /// Serialize an envelope. With `compress` set, documents over the
    /// compression threshold are wrapped behind the marker prefix.
    ///
    /// Returns the wire string and the achieved compression ratio
    /// (serialized size / wire size; `1.0` when the document went out
    /// unwrapped).
    pub fn encode(&self, envelope: &Envelope, compress: bool) -> CodecResult<(String, f64)> {
        let document = envelope.to_wire_value().to_string();

        if compress && document.len() > COMPRESSION_THRESHOLD_BYTES {
            let body = self.strategy.compress(&document);
            let wire = format!("{COMPRESSION_MARKER}{body}");
            let ratio = document.len() as f64 / wire.len() as f64;
            return Ok((wire, ratio));
        }

        Ok((document, 1.0))
    }

    /// Parse a wire string back into an envelope, reversing the
    /// compression wrapper when the marker is present.
    pub fn decode(&self, wire: &str) -> CodecResult<Envelope> {
        let document = match wire.strip_prefix(COMPRESSION_MARKER) {
            Some(body) => self.strategy.decompress(body)?,
            None => wire.to_string(),
        };

        let value: serde_json::Value = serde_json::from_str(&document)
            .map_err(|e| CodecError::invalid_document(e.to_string(), &document))?;

        Envelope::from_wire_value(&value).map_err(CodecError::MalformedMessage)
    }
}
