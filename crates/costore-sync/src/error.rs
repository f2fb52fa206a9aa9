//! Error types for the sync module.

use costore_core::{CoreError, ErrorClass, ValidationError};
use costore_store::StoreError;
use thiserror::Error;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Message could not be decoded or violates the message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A known state claims sessions without claiming the header.
    #[error("malformed known state for {0}: sessions without header")]
    MalformedKnownState(String),

    /// Content arrived for a coValue whose header is neither stored nor included.
    #[error("content for {0} arrived without a header")]
    MissingHeader(String),

    /// A batch does not start at the local transaction count of its session.
    #[error("out-of-order batch for {session} of {id}: local count {expected}, batch after {got}")]
    OutOfOrder {
        id: String,
        session: String,
        expected: u64,
        got: u64,
    },

    /// Storage changed between the reads of one diff.
    #[error("{session} of {id} changed while reading: expected {expected} transactions, read {got}")]
    ConcurrentChange {
        id: String,
        session: String,
        expected: u64,
        got: u64,
    },

    /// Header or signature verification failed.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The outgoing queue no longer accepts messages.
    #[error("outgoing queue closed")]
    QueueClosed,
}

impl From<CoreError> for SyncError {
    fn from(e: CoreError) -> Self {
        SyncError::Validation(e.into())
    }
}

impl SyncError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SyncError::InvalidMessage(_)
            | SyncError::MalformedKnownState(_)
            | SyncError::MissingHeader(_)
            | SyncError::OutOfOrder { .. } => ErrorClass::Protocol,
            SyncError::ConcurrentChange { .. } => ErrorClass::Contention,
            SyncError::Validation(e) => e.class(),
            SyncError::Store(e) => e.class(),
            SyncError::QueueClosed => ErrorClass::Storage,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class().is_transient()
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
