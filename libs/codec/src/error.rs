//! Decode and encode errors for the envelope codec.

use strand_types::PayloadError;
use thiserror::Error;

/// Errors produced while encoding or decoding wire documents.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    /// A required envelope field is missing or malformed. Receive paths
    /// drop the message and count the error; the messenger stays up.
    #[error("Malformed message: {0}")]
    MalformedMessage(#[from] PayloadError),

    /// The wire text is not a JSON document at all.
    #[error("Invalid wire document: {reason} (first bytes: {prefix:?})")]
    InvalidDocument { reason: String, prefix: String },

    /// The compression wrapper could not be reversed.
    #[error("Compression wrapper error: {0}")]
    Compression(String),
}

impl CodecError {
    pub fn invalid_document(reason: impl Into<String>, wire: &str) -> Self {
        CodecError::InvalidDocument {
            reason: reason.into(),
            prefix: wire.chars().take(24).collect(),
        }
    }

    pub fn compression(reason: impl Into<String>) -> Self {
        CodecError::Compression(reason.into())
    }

    /// Decode-side failures are contained in the receive path; they never
    /// require tearing down the messenger.
    pub fn is_recoverable(&self) -> bool {
        true
    }
}

pub type CodecResult<T> = Result<T, CodecError>;
