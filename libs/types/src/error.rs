use thiserror::Error;

/// Payload schema violations found while validating a decoded document.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PayloadError {
    /// A field the schema table requires for this message type is absent.
    #[error("Missing required field '{field}' for message type {kind}")]
    MissingField { kind: String, field: String },

    /// A required field is present but has the wrong shape.
    #[error("Invalid field '{field}' for message type {kind}: {reason}")]
    InvalidField {
        kind: String,
        field: String,
        reason: String,
    },

    /// The payload is not a JSON object at all.
    #[error("Payload for message type {kind} is not an object")]
    NotAnObject { kind: String },
}

impl PayloadError {
    pub fn missing(kind: impl Into<String>, field: impl Into<String>) -> Self {
        PayloadError::MissingField {
            kind: kind.into(),
            field: field.into(),
        }
    }

    pub fn invalid(
        kind: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        PayloadError::InvalidField {
            kind: kind.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type PayloadResult<T> = Result<T, PayloadError>;
