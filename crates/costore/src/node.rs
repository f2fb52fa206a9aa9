//! The Node: one identity writing to one store.
//!
//! The Node brings together signing, storage and sync into a cohesive
//! interface for building applications.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use costore_core::{
    genesis_hash, id_for_header, Blake3Ed25519, CoId, CoValueHeader, CryptoProvider,
    Ed25519PublicKey, Keypair, KnownState, SessionBatch, SessionId, SessionState, Transaction,
};
use costore_store::{AddOutcome, NewCoValue, Store};
use costore_sync::{OutgoingQueue, SyncConfig, SyncManager};

use crate::error::{NodeError, Result};

/// Configuration for the Node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// How many times `append` re-reads session state and retries after
    /// losing an index race.
    pub append_retries: u32,
    /// Base delay between retries; attempt `n` waits `n * retry_backoff`.
    pub retry_backoff: Duration,
    /// Sync configuration.
    pub sync: SyncConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            append_retries: 5,
            retry_backoff: Duration::from_millis(10),
            sync: SyncConfig::default(),
        }
    }
}

/// Result of creating a coValue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    pub id: CoId,
    pub outcome: AddOutcome,
    /// The session holding the initial transactions, if any were given.
    pub session: Option<SessionState>,
}

/// The main Node struct.
///
/// Provides a unified API for:
/// - Creating coValues
/// - Appending signed transactions to this node's sessions
/// - Querying headers, sessions and transactions
/// - Syncing with peers
pub struct Node<S: Store> {
    /// The identity keypair for this node.
    keypair: Keypair,
    crypto: Arc<dyn CryptoProvider>,
    /// The storage backend.
    store: Arc<S>,
    /// Configuration.
    config: NodeConfig,
}

impl<S: Store> Node<S> {
    /// Create a new node instance.
    pub fn new(keypair: Keypair, store: S, config: NodeConfig) -> Self {
        Self {
            keypair,
            crypto: Arc::new(Blake3Ed25519),
            store: Arc::new(store),
            config,
        }
    }

    /// Use a different crypto provider for ids and signatures.
    pub fn with_crypto(mut self, crypto: Arc<dyn CryptoProvider>) -> Self {
        self.crypto = crypto;
        self
    }

    /// Get the node's public key.
    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Open a fresh session for this node's signer.
    pub fn new_session(&self) -> SessionId {
        SessionId::random(self.keypair.public_key())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Write Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a header, optionally with initial transactions in a new session.
    ///
    /// Header and transactions land in one write or not at all.
    pub async fn create_co_value(
        &self,
        header: CoValueHeader,
        initial: Vec<Transaction>,
    ) -> Result<Created> {
        let id = id_for_header(&header, self.crypto.as_ref());

        let mut new = NewCoValue::new(id, header);
        let mut session = None;
        if !initial.is_empty() {
            let session_id = self.new_session();
            let genesis = genesis_hash(self.crypto.as_ref(), &id, &session_id);
            let batch = SessionBatch::sign(
                self.crypto.as_ref(),
                &self.keypair,
                session_id,
                0,
                &genesis,
                initial,
            );
            session = Some(SessionState {
                session_id,
                last_idx: batch.end() - 1,
                last_signature: batch.last_signature,
                last_hash: batch.head(self.crypto.as_ref(), &genesis),
            });
            new.new_content.push(batch);
        }

        let outcome = self.store.add_co_value(&new).await?;
        debug!(id = %id, ?outcome, "created coValue");
        Ok(Created {
            id,
            outcome,
            session,
        })
    }

    /// Append transactions to one of this node's sessions.
    ///
    /// Reads the session's current count, signs the extended chain and
    /// appends with compare-and-swap. Lost races are retried up to
    /// `append_retries` times with linear backoff.
    pub async fn append(
        &self,
        id: &CoId,
        session: &SessionId,
        transactions: Vec<Transaction>,
    ) -> Result<SessionState> {
        if session.signer != self.keypair.public_key() {
            return Err(NodeError::ForeignSession(session.to_string()));
        }
        if transactions.is_empty() {
            return Err(NodeError::InvalidOperation("append with no transactions".into()));
        }

        let mut attempt = 0u32;
        loop {
            let (after, prev_hash) = match self.store.get_session(id, session).await? {
                Some(state) => (state.count(), state.last_hash),
                None => (0, genesis_hash(self.crypto.as_ref(), id, session)),
            };

            let batch = SessionBatch::sign(
                self.crypto.as_ref(),
                &self.keypair,
                *session,
                after,
                &prev_hash,
                transactions.clone(),
            );

            match self.store.append_transactions(id, &batch).await {
                Ok(state) => return Ok(state),
                Err(e) if e.is_transient() && attempt < self.config.append_retries => {
                    attempt += 1;
                    debug!(id = %id, session = %session, attempt, error = %e, "retrying append");
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Delete a coValue with all its sessions. Returns false if it was not stored.
    pub async fn delete_co_value(&self, id: &CoId) -> Result<bool> {
        Ok(self.store.delete_co_value(id).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Query Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a header by id.
    pub async fn get_co_value(&self, id: &CoId) -> Result<Option<CoValueHeader>> {
        Ok(self.store.get_co_value(id).await?)
    }

    /// Get every transaction of a session in index order.
    pub async fn read_session(&self, id: &CoId, session: &SessionId) -> Result<Vec<Transaction>> {
        match self.store.get_session(id, session).await? {
            Some(state) => Ok(self
                .store
                .get_transactions(id, session, 0, state.last_idx)
                .await?),
            None => Ok(Vec::new()),
        }
    }

    /// Get the state of every session of a coValue.
    pub async fn sessions(&self, id: &CoId) -> Result<Vec<SessionState>> {
        Ok(self.store.get_sessions(id).await?)
    }

    /// What this node has of a coValue.
    pub async fn known_state(&self, id: &CoId) -> Result<KnownState> {
        Ok(self.store.known_state(id).await?)
    }

    /// List all stored coValues.
    pub async fn list_co_values(&self) -> Result<Vec<CoId>> {
        Ok(self.store.list_co_values().await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// A sync manager over this node's store pushing into `queue`.
    pub fn sync_manager<Q: OutgoingQueue>(&self, queue: Q) -> SyncManager<S, Q> {
        SyncManager::new(Arc::clone(&self.store), queue, self.config.sync.clone())
            .with_crypto(Arc::clone(&self.crypto))
    }
}
