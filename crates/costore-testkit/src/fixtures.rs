//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;

use costore_core::{
    genesis_hash, id_for_header, Blake3Ed25519, CoId, CoValueHeader, Ed25519PublicKey, Keypair,
    SessionBatch, SessionId, SessionState, Transaction,
};
use costore_store::{AsyncStore, BlockingStore, MemoryStore, NewCoValue, SqliteStore, Store};
use costore_sync::{ChannelQueue, SyncConfig, SyncManager, SyncMessage};

/// A signer that builds headers and signed session content for tests.
pub struct TestWriter {
    pub keypair: Keypair,
    crypto: Blake3Ed25519,
}

impl TestWriter {
    /// Create a new writer with a random keypair.
    pub fn new() -> Self {
        Self {
            keypair: Keypair::generate(),
            crypto: Blake3Ed25519,
        }
    }

    /// Create with a deterministic keypair from seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self {
            keypair: Keypair::from_seed(&seed),
            crypto: Blake3Ed25519,
        }
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    /// A session of this writer with a fixed nonce.
    pub fn session(&self, nonce: u8) -> SessionId {
        SessionId::new(self.keypair.public_key(), [nonce; 8])
    }

    /// A header-only coValue, distinguished by `uniqueness`.
    pub fn co_value(&self, uniqueness: u64) -> NewCoValue {
        let header = CoValueHeader::comap().with_uniqueness(uniqueness);
        let id = id_for_header(&header, &self.crypto);
        NewCoValue::new(id, header)
    }

    /// Signed content for `session` holding transactions `0..count`.
    pub fn session_content(&self, id: &CoId, session: SessionId, count: u64) -> SessionBatch {
        let genesis = genesis_hash(&self.crypto, id, &session);
        SessionBatch::sign(
            &self.crypto,
            &self.keypair,
            session,
            0,
            &genesis,
            (0..count).map(numbered_transaction).collect(),
        )
    }

    /// Append `count` numbered transactions after whatever `session` holds.
    pub async fn append<S: Store + ?Sized>(
        &self,
        store: &S,
        id: &CoId,
        session: SessionId,
        count: u64,
    ) -> costore_store::Result<SessionState> {
        let (after, prev) = match store.get_session(id, &session).await? {
            Some(state) => (state.count(), state.last_hash),
            None => (0, genesis_hash(&self.crypto, id, &session)),
        };
        let transactions = (after..after + count).map(numbered_transaction).collect();
        let batch =
            SessionBatch::sign(&self.crypto, &self.keypair, session, after, &prev, transactions);
        store.append_transactions(id, &batch).await
    }
}

impl Default for TestWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Create writers with distinct deterministic keys for multi-party tests.
pub fn multi_party_writers(count: usize) -> Vec<TestWriter> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            TestWriter::with_seed(seed)
        })
        .collect()
}

/// The transaction a writer stores at index `i`.
pub fn numbered_transaction(i: u64) -> Transaction {
    Transaction::from_json(&json!({ "op": "set", "key": "counter", "value": i }))
}

pub fn memory_store() -> AsyncStore<MemoryStore> {
    MemoryStore::new().into_async()
}

pub fn sqlite_store() -> costore_store::Result<AsyncStore<SqliteStore>> {
    Ok(SqliteStore::open_memory()?.into_async())
}

// ─────────────────────────────────────────────────────────────────────────────
// Sync
// ─────────────────────────────────────────────────────────────────────────────

/// One side of a [`SyncLink`].
pub struct Replica<S: Store> {
    pub store: Arc<S>,
    pub manager: SyncManager<S, ChannelQueue>,
    outgoing: mpsc::Receiver<SyncMessage>,
}

impl<S: Store> Replica<S> {
    fn new(store: S, config: SyncConfig) -> Self {
        let store = Arc::new(store);
        let (queue, outgoing) = ChannelQueue::new(1024);
        let manager = SyncManager::new(Arc::clone(&store), queue, config);
        Self {
            store,
            manager,
            outgoing,
        }
    }

    /// Take everything this replica has queued for its peer.
    pub fn drain(&mut self) -> Vec<SyncMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.outgoing.try_recv() {
            out.push(msg);
        }
        out
    }
}

/// Two replicas wired back to back through in-memory queues.
pub struct SyncLink<A: Store, B: Store> {
    pub a: Replica<A>,
    pub b: Replica<B>,
}

/// Everything that happened while pumping a [`SyncLink`].
#[derive(Debug, Default)]
pub struct PumpStats {
    /// Messages delivered in each direction.
    pub a_to_b: Vec<SyncMessage>,
    pub b_to_a: Vec<SyncMessage>,
    /// Errors returned by `handle_message`, in delivery order.
    pub errors: Vec<costore_sync::SyncError>,
}

impl<A: Store, B: Store> SyncLink<A, B> {
    pub fn new(a: A, b: B) -> Self {
        Self::with_config(a, b, SyncConfig::default())
    }

    pub fn with_config(a: A, b: B, config: SyncConfig) -> Self {
        Self {
            a: Replica::new(a, config.clone()),
            b: Replica::new(b, config),
        }
    }

    /// Deliver queued messages both ways until neither side has anything
    /// left to say, or `max_rounds` passes.
    pub async fn pump(&mut self, max_rounds: usize) -> PumpStats {
        let mut stats = PumpStats::default();
        for _ in 0..max_rounds {
            let to_b = self.a.drain();
            let to_a = self.b.drain();
            if to_b.is_empty() && to_a.is_empty() {
                break;
            }
            for msg in to_b {
                stats.a_to_b.push(msg.clone());
                if let Err(e) = self.b.manager.handle_message(msg).await {
                    stats.errors.push(e);
                }
            }
            for msg in to_a {
                stats.b_to_a.push(msg.clone());
                if let Err(e) = self.a.manager.handle_message(msg).await {
                    stats.errors.push(e);
                }
            }
        }
        stats
    }
}
