//! Error types for costore core.

use thiserror::Error;

use crate::types::CoId;

/// How a failure should be handled by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Tampered or corrupt data: header/id mismatch, bad signature,
    /// conflicting header. Never retried.
    Integrity,
    /// Lost a race for an index or for the database lock. Re-derive and retry.
    Contention,
    /// The peer or caller sent something that does not fit local state.
    Protocol,
    /// Anything else the storage engine reports.
    Storage,
}

impl ErrorClass {
    pub fn is_transient(self) -> bool {
        self == ErrorClass::Contention
    }
}

/// Core errors that can occur while encoding, hashing, signing or sealing.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid {kind}: {value:?}")]
    InvalidId { kind: &'static str, value: String },

    #[error("header does not hash to its id: claimed {claimed}, computed {computed}")]
    HeaderIdMismatch { claimed: CoId, computed: CoId },

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error("seal error: {0}")]
    SealError(String),

    #[error("unseal error: {0}")]
    UnsealError(String),
}

impl CoreError {
    pub(crate) fn invalid_id(kind: &'static str, value: &str) -> Self {
        CoreError::InvalidId {
            kind,
            value: value.to_string(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        if self.is_integrity() {
            ErrorClass::Integrity
        } else {
            ErrorClass::Protocol
        }
    }

    /// True when the error means the data was tampered with or corrupted,
    /// as opposed to being merely malformed input.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidSignature | CoreError::HeaderIdMismatch { .. }
        )
    }
}

/// Validation errors for incoming session batches.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("signature verification failed for session {0}")]
    SignatureFailed(String),

    #[error("batch for session {0} carries no transactions")]
    EmptyBatch(String),

    #[error("header does not hash to its id: claimed {claimed}, computed {computed}")]
    HeaderIdMismatch { claimed: CoId, computed: CoId },

    #[error("structural error: {0}")]
    StructuralError(String),
}

impl ValidationError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ValidationError::SignatureFailed(_) | ValidationError::HeaderIdMismatch { .. } => {
                ErrorClass::Integrity
            }
            ValidationError::EmptyBatch(_) | ValidationError::StructuralError(_) => {
                ErrorClass::Protocol
            }
        }
    }
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::HeaderIdMismatch { claimed, computed } => {
                ValidationError::HeaderIdMismatch { claimed, computed }
            }
            CoreError::InvalidSignature | CoreError::InvalidPublicKey => {
                ValidationError::SignatureFailed(String::new())
            }
            other => ValidationError::StructuralError(other.to_string()),
        }
    }
}
