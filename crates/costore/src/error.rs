//! Error types for the Node.

use costore_core::{CoreError, ErrorClass, ValidationError};
use costore_store::StoreError;
use costore_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during Node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Encoding, id or crypto error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// The session belongs to a different signer than this node.
    #[error("session {0} is not owned by this node")]
    ForeignSession(String),

    /// Invalid operation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl NodeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            NodeError::Validation(e) => e.class(),
            NodeError::Core(e) => e.class(),
            NodeError::Store(e) => e.class(),
            NodeError::Sync(e) => e.class(),
            NodeError::ForeignSession(_) | NodeError::InvalidOperation(_) => ErrorClass::Protocol,
        }
    }
}

/// Result type for Node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
