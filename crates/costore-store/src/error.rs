//! Error types for the store module.

use costore_core::ErrorClass;
use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A different header is already stored under this id.
    #[error("coValue {id} already exists with a different header")]
    HeaderConflict { id: String },

    /// The batch does not start at the session's current transaction count.
    #[error("index conflict in {session} of {id}: expected batch after {expected}, got {got}")]
    IndexConflict {
        id: String,
        session: String,
        expected: u64,
        got: u64,
    },

    /// Sessions were written for a coValue whose header is not stored.
    #[error("unknown coValue: {0}")]
    UnknownCoValue(String),

    /// A batch with no transactions.
    #[error("empty batch for session {0}")]
    EmptyBatch(String),

    /// Header or payload serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking task running the operation failed or the engine's lock
    /// was poisoned.
    #[error("background task failed: {0}")]
    Background(String),
}

impl StoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            StoreError::HeaderConflict { .. } | StoreError::InvalidData(_) => ErrorClass::Integrity,
            StoreError::IndexConflict { .. } => ErrorClass::Contention,
            StoreError::UnknownCoValue(_) | StoreError::EmptyBatch(_) => ErrorClass::Protocol,
            StoreError::Database(e) if is_contention(e) => ErrorClass::Contention,
            _ => ErrorClass::Storage,
        }
    }

    /// True for failures a caller may retry after re-reading state.
    pub fn is_transient(&self) -> bool {
        self.class().is_transient()
    }
}

fn is_contention(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => match err.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => true,
            ErrorCode::ConstraintViolation => {
                err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            }
            _ => false,
        },
        _ => false,
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
