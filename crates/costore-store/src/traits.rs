//! Store traits: the abstract interfaces for coValue persistence.
//!
//! Two capability interfaces are offered and chosen at construction time:
//! [`BlockingStore`] runs each operation to completion on the calling
//! thread, [`Store`] is its async counterpart. Any blocking engine becomes
//! an async one through [`AsyncStore`](crate::AsyncStore).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use costore_core::{
    CoId, CoValueHeader, KnownState, SessionBatch, SessionId, SessionState, Transaction,
};

use crate::error::{Result, StoreError};

/// Protocol action that produced a write. Recorded for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentAction {
    Load,
    Known,
    Content,
    Done,
}

/// Delivery priority of a coValue's content. Lower is more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub u8);

impl Priority {
    pub const HIGH: Self = Self(0);
    pub const MEDIUM: Self = Self(3);
    pub const LOW: Self = Self(6);
}

impl Default for Priority {
    fn default() -> Self {
        Self::HIGH
    }
}

/// A coValue to insert, with any session content that arrives alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCoValue {
    pub id: CoId,
    pub header: CoValueHeader,
    pub action: ContentAction,
    pub priority: Priority,
    /// Batches appended in the same write transaction as the header.
    pub new_content: Vec<SessionBatch>,
}

impl NewCoValue {
    /// A bare header insert with no content.
    pub fn new(id: CoId, header: CoValueHeader) -> Self {
        Self {
            id,
            header,
            action: ContentAction::Content,
            priority: Priority::HIGH,
            new_content: Vec::new(),
        }
    }

    pub fn with_content(mut self, batches: Vec<SessionBatch>) -> Self {
        self.new_content = batches;
        self
    }
}

/// Result of inserting a coValue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The header was stored.
    Inserted,
    /// The identical header was already stored (idempotent, not an error).
    AlreadyExists,
}

/// Blocking interface for coValue persistence.
///
/// # Design Notes
///
/// - **Idempotent inserts**: Adding the same header twice returns `AlreadyExists`.
///   A different header under the same id is `HeaderConflict`.
/// - **Compare-and-swap appends**: Every batch names how many transactions
///   precede it. The check and the write happen in one transaction, so two
///   writers racing for the same index see exactly one `IndexConflict`.
/// - **All or nothing**: A call either lands every batch it was given or none.
pub trait BlockingStore: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────
    // CoValue Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a header if absent, then append `new_content`, atomically.
    fn add_co_value(&self, new: &NewCoValue) -> Result<AddOutcome>;

    /// Get a header by id.
    fn get_co_value(&self, id: &CoId) -> Result<Option<CoValueHeader>>;

    /// Delete a coValue with all of its sessions and transactions.
    ///
    /// Returns false when nothing was stored under `id`.
    fn delete_co_value(&self, id: &CoId) -> Result<bool>;

    /// Overwrite the stored header in place.
    ///
    /// This breaks the binding between id and header. It exists for
    /// workloads that measure raw header rewrites and is never used by sync.
    fn replace_header_unbound(&self, id: &CoId, header: &CoValueHeader) -> Result<bool>;

    /// All stored coValue ids, oldest first.
    fn list_co_values(&self) -> Result<Vec<CoId>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Session Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append batches to sessions of `id`, atomically.
    ///
    /// Returns the resulting state of each touched session in batch order.
    fn append_batches(&self, id: &CoId, batches: &[SessionBatch]) -> Result<Vec<SessionState>>;

    /// Append a single batch.
    fn append_transactions(&self, id: &CoId, batch: &SessionBatch) -> Result<SessionState> {
        self.append_batches(id, std::slice::from_ref(batch))?
            .pop()
            .ok_or_else(|| StoreError::EmptyBatch(batch.session_id.to_string()))
    }

    /// Get the state of one session.
    fn get_session(&self, id: &CoId, session_id: &SessionId) -> Result<Option<SessionState>>;

    /// Get the state of every session of a coValue, ordered by session id.
    fn get_sessions(&self, id: &CoId) -> Result<Vec<SessionState>>;

    /// Get transactions with `from <= idx <= to_inclusive`, ordered by idx.
    fn get_transactions(
        &self,
        id: &CoId,
        session_id: &SessionId,
        from: u64,
        to_inclusive: u64,
    ) -> Result<Vec<Transaction>>;

    /// What this store has of `id`. Empty when the coValue is unknown.
    fn known_state(&self, id: &CoId) -> Result<KnownState>;

    /// Wrap this engine for use from async code.
    fn into_async(self) -> crate::AsyncStore<Self>
    where
        Self: Sized,
    {
        crate::AsyncStore::new(self)
    }
}

/// The Store trait: async interface for coValue persistence.
///
/// Mirrors [`BlockingStore`] operation for operation. Implementations must
/// not block the runtime; [`AsyncStore`](crate::AsyncStore) moves each call
/// onto the blocking thread pool. A caller that stops awaiting an operation
/// does not cancel it: the write may still complete.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // CoValue Operations
    // ─────────────────────────────────────────────────────────────────────────

    async fn add_co_value(&self, new: &NewCoValue) -> Result<AddOutcome>;

    async fn get_co_value(&self, id: &CoId) -> Result<Option<CoValueHeader>>;

    async fn delete_co_value(&self, id: &CoId) -> Result<bool>;

    async fn replace_header_unbound(&self, id: &CoId, header: &CoValueHeader) -> Result<bool>;

    async fn list_co_values(&self) -> Result<Vec<CoId>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Session Operations
    // ─────────────────────────────────────────────────────────────────────────

    async fn append_batches(&self, id: &CoId, batches: &[SessionBatch])
        -> Result<Vec<SessionState>>;

    async fn append_transactions(&self, id: &CoId, batch: &SessionBatch) -> Result<SessionState> {
        self.append_batches(id, std::slice::from_ref(batch))
            .await?
            .pop()
            .ok_or_else(|| StoreError::EmptyBatch(batch.session_id.to_string()))
    }

    async fn get_session(&self, id: &CoId, session_id: &SessionId)
        -> Result<Option<SessionState>>;

    async fn get_sessions(&self, id: &CoId) -> Result<Vec<SessionState>>;

    async fn get_transactions(
        &self,
        id: &CoId,
        session_id: &SessionId,
        from: u64,
        to_inclusive: u64,
    ) -> Result<Vec<Transaction>>;

    async fn known_state(&self, id: &CoId) -> Result<KnownState>;
}
