//! Compression wrapping for oversized wire documents.
//!
//! Compression is a pluggable strategy: the codec only decides *when* to
//! wrap (document length over [`COMPRESSION_THRESHOLD_BYTES`]) and prefixes
//! the result with [`COMPRESSION_MARKER`] so decode can detect it. The
//! shipped default is a reversible base64 transform; a byte-level
//! compressor can be swapped in without touching the codec.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{CodecError, CodecResult};

/// Marker prefix identifying a compressed wire document.
pub const COMPRESSION_MARKER: &str = "STRAND:Z1:";

/// Documents at or below this serialized size are never wrapped.
pub const COMPRESSION_THRESHOLD_BYTES: usize = 1024;

/// A reversible text transform applied to wire documents over the
/// compression threshold.
pub trait CompressionStrategy: Send + Sync + std::fmt::Debug {
    /// Transform the serialized document body (marker excluded).
    fn compress(&self, document: &str) -> String;

    /// Reverse [`Self::compress`].
    fn decompress(&self, body: &str) -> CodecResult<String>;
}

/// Default strategy: base64 of the UTF-8 document.
#[derive(Debug, Default, Clone, Copy)]
pub struct Base64Strategy;

impl CompressionStrategy for Base64Strategy {
    fn compress(&self, document: &str) -> String {
        BASE64.encode(document.as_bytes())
    }

    fn decompress(&self, body: &str) -> CodecResult<String> {
        let bytes = BASE64
            .decode(body.trim())
            .map_err(|e| CodecError::compression(format!("base64 decode failed: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|e| CodecError::compression(format!("decoded body is not UTF-8: {e}")))
    }
}

/// Identity strategy for callers that want the marker framing with no
/// transform, e.g. when measuring wrapper overhead.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCompression;

impl CompressionStrategy for NoCompression {
    fn compress(&self, document: &str) -> String {
        document.to_string()
    }

    fn decompress(&self, body: &str) -> CodecResult<String> {
        Ok(body.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_round_trip() {
        let strategy = Base64Strategy;
        let document = r#"{"type":"SETTLEMENT_UPDATE","payload":{}}"#;
        let packed = strategy.compress(document);
        assert_ne!(packed, document);
        assert_eq!(strategy.decompress(&packed).unwrap(), document);
    }

    #[test]
    fn test_base64_rejects_garbage() {
        let strategy = Base64Strategy;
        assert!(matches!(
            strategy.decompress("!!not base64!!"),
            Err(CodecError::Compression(_))
        ));
    }

    #[test]
    fn test_no_compression_is_identity() {
        let strategy = NoCompression;
        assert_eq!(strategy.compress("abc"), "abc");
        assert_eq!(strategy.decompress("abc").unwrap(), "abc");
    }
}
