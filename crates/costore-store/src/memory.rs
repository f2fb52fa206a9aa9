//! In-memory implementation of the store traits.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use costore_core::{
    genesis_hash, Blake3Ed25519, Blake3Hash, CoId, CoValueHeader, CryptoProvider, Ed25519Signature,
    KnownState, SessionBatch, SessionId, SessionState, Transaction,
};

use crate::error::{Result, StoreError};
use crate::traits::{AddOutcome, BlockingStore, NewCoValue};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
    crypto: Arc<dyn CryptoProvider>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// CoValues by id.
    co_values: BTreeMap<CoId, StoredCoValue>,
    /// Insertion order, for `list_co_values`.
    order: Vec<CoId>,
}

#[derive(Clone)]
struct StoredCoValue {
    header: CoValueHeader,
    sessions: BTreeMap<SessionId, StoredSession>,
}

#[derive(Clone)]
struct StoredSession {
    transactions: Vec<Transaction>,
    last_signature: Ed25519Signature,
    last_hash: Blake3Hash,
}

impl StoredSession {
    fn state(&self, session_id: SessionId) -> SessionState {
        SessionState {
            session_id,
            last_idx: self.transactions.len() as u64 - 1,
            last_signature: self.last_signature,
            last_hash: self.last_hash,
        }
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
            crypto: Arc::new(Blake3Ed25519),
        }
    }

    /// Use a different provider for session chain hashes.
    pub fn with_crypto(mut self, crypto: Arc<dyn CryptoProvider>) -> Self {
        self.crypto = crypto;
        self
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Background(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Background(format!("lock poisoned: {}", e)))
    }

    /// Apply batches to a working copy of one coValue.
    fn apply(
        &self,
        id: &CoId,
        co_value: &mut StoredCoValue,
        batches: &[SessionBatch],
    ) -> Result<Vec<SessionState>> {
        let mut states = Vec::with_capacity(batches.len());
        for batch in batches {
            if batch.is_empty() {
                return Err(StoreError::EmptyBatch(batch.session_id.to_string()));
            }

            let (count, prev_hash) = match co_value.sessions.get(&batch.session_id) {
                Some(s) => (s.transactions.len() as u64, s.last_hash),
                None => (0, genesis_hash(self.crypto.as_ref(), id, &batch.session_id)),
            };
            if batch.after != count {
                return Err(StoreError::IndexConflict {
                    id: id.to_string(),
                    session: batch.session_id.to_string(),
                    expected: count,
                    got: batch.after,
                });
            }

            let last_hash = batch.head(self.crypto.as_ref(), &prev_hash);
            let session = co_value
                .sessions
                .entry(batch.session_id)
                .or_insert_with(|| StoredSession {
                    transactions: Vec::new(),
                    last_signature: batch.last_signature,
                    last_hash,
                });
            session.transactions.extend(batch.transactions.iter().cloned());
            session.last_signature = batch.last_signature;
            session.last_hash = last_hash;
            states.push(session.state(batch.session_id));
        }
        Ok(states)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockingStore for MemoryStore {
    fn add_co_value(&self, new: &NewCoValue) -> Result<AddOutcome> {
        let mut inner = self.write()?;

        let (mut working, outcome) = match inner.co_values.get(&new.id) {
            Some(existing) => {
                if existing.header.to_canonical_string() != new.header.to_canonical_string() {
                    warn!(id = %new.id, "rejecting coValue with conflicting header");
                    return Err(StoreError::HeaderConflict {
                        id: new.id.to_string(),
                    });
                }
                (existing.clone(), AddOutcome::AlreadyExists)
            }
            None => (
                StoredCoValue {
                    header: new.header.clone(),
                    sessions: BTreeMap::new(),
                },
                AddOutcome::Inserted,
            ),
        };

        self.apply(&new.id, &mut working, &new.new_content)?;

        if outcome == AddOutcome::Inserted {
            inner.order.push(new.id);
        }
        inner.co_values.insert(new.id, working);
        debug!(id = %new.id, batches = new.new_content.len(), ?outcome, "added coValue");
        Ok(outcome)
    }

    fn get_co_value(&self, id: &CoId) -> Result<Option<CoValueHeader>> {
        let inner = self.read()?;
        Ok(inner.co_values.get(id).map(|c| c.header.clone()))
    }

    fn delete_co_value(&self, id: &CoId) -> Result<bool> {
        let mut inner = self.write()?;
        let removed = inner.co_values.remove(id).is_some();
        if removed {
            inner.order.retain(|o| o != id);
        }
        Ok(removed)
    }

    fn replace_header_unbound(&self, id: &CoId, header: &CoValueHeader) -> Result<bool> {
        warn!(id = %id, "replacing header in place; id no longer matches header");
        let mut inner = self.write()?;
        match inner.co_values.get_mut(id) {
            Some(c) => {
                c.header = header.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list_co_values(&self) -> Result<Vec<CoId>> {
        Ok(self.read()?.order.clone())
    }

    fn append_batches(&self, id: &CoId, batches: &[SessionBatch]) -> Result<Vec<SessionState>> {
        let mut inner = self.write()?;
        let mut working = inner
            .co_values
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownCoValue(id.to_string()))?;

        let states = self.apply(id, &mut working, batches)?;
        inner.co_values.insert(*id, working);
        Ok(states)
    }

    fn get_session(&self, id: &CoId, session_id: &SessionId) -> Result<Option<SessionState>> {
        let inner = self.read()?;
        Ok(inner
            .co_values
            .get(id)
            .and_then(|c| c.sessions.get(session_id))
            .map(|s| s.state(*session_id)))
    }

    fn get_sessions(&self, id: &CoId) -> Result<Vec<SessionState>> {
        let inner = self.read()?;
        Ok(inner
            .co_values
            .get(id)
            .map(|c| c.sessions.iter().map(|(sid, s)| s.state(*sid)).collect())
            .unwrap_or_default())
    }

    fn get_transactions(
        &self,
        id: &CoId,
        session_id: &SessionId,
        from: u64,
        to_inclusive: u64,
    ) -> Result<Vec<Transaction>> {
        let inner = self.read()?;
        let Some(session) = inner
            .co_values
            .get(id)
            .and_then(|c| c.sessions.get(session_id))
        else {
            return Ok(Vec::new());
        };

        let len = session.transactions.len() as u64;
        if from >= len || to_inclusive < from {
            return Ok(Vec::new());
        }
        let end = to_inclusive.saturating_add(1).min(len);
        Ok(session.transactions[from as usize..end as usize].to_vec())
    }

    fn known_state(&self, id: &CoId) -> Result<KnownState> {
        let inner = self.read()?;
        let mut known = KnownState::empty(*id);
        if let Some(c) = inner.co_values.get(id) {
            known.header = true;
            for (sid, s) in &c.sessions {
                known.set(*sid, s.transactions.len() as u64);
            }
        }
        Ok(known)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Store;
    use costore_core::{id_for_header, Keypair};
    use serde_json::json;

    fn make_batch(
        kp: &Keypair,
        id: &CoId,
        sid: SessionId,
        prev: Option<Blake3Hash>,
        range: std::ops::Range<u64>,
    ) -> SessionBatch {
        let prev = prev.unwrap_or_else(|| genesis_hash(&Blake3Ed25519, id, &sid));
        let txs = range
            .clone()
            .map(|i| Transaction::from_json(&json!({ "i": i })))
            .collect();
        SessionBatch::sign(&Blake3Ed25519, kp, sid, range.start, &prev, txs)
    }

    #[tokio::test]
    async fn test_add_append_known_state() {
        let store = MemoryStore::new().into_async();
        let kp = Keypair::generate();
        let sid = SessionId::random(kp.public_key());
        let header = CoValueHeader::comap().with_uniqueness(1);
        let id = id_for_header(&header, &Blake3Ed25519);

        let outcome = store.add_co_value(&NewCoValue::new(id, header.clone())).await.unwrap();
        assert_eq!(outcome, AddOutcome::Inserted);

        let first = store
            .append_transactions(&id, &make_batch(&kp, &id, sid, None, 0..2))
            .await
            .unwrap();
        store
            .append_transactions(&id, &make_batch(&kp, &id, sid, Some(first.last_hash), 2..4))
            .await
            .unwrap();

        let known = store.known_state(&id).await.unwrap();
        assert_eq!(known.count(&sid), 4);
        let txs = store.get_transactions(&id, &sid, 2, 10).await.unwrap();
        assert_eq!(txs.len(), 2);
    }

    #[tokio::test]
    async fn test_index_conflict() {
        let store = MemoryStore::new().into_async();
        let kp = Keypair::generate();
        let sid = SessionId::random(kp.public_key());
        let header = CoValueHeader::comap();
        let id = id_for_header(&header, &Blake3Ed25519);
        store.add_co_value(&NewCoValue::new(id, header)).await.unwrap();

        let b = make_batch(&kp, &id, sid, None, 0..1);
        store.append_transactions(&id, &b).await.unwrap();
        let err = store.append_transactions(&id, &b).await.unwrap_err();
        assert!(matches!(err, StoreError::IndexConflict { expected: 1, got: 0, .. }));
        assert_eq!(store.known_state(&id).await.unwrap().count(&sid), 1);
    }

    #[test]
    fn test_chain_matches_sqlite() {
        let memory = MemoryStore::new();
        let sqlite = crate::SqliteStore::open_memory().unwrap();
        let kp = Keypair::from_seed(&[4; 32]);
        let sid = SessionId::new(kp.public_key(), [0; 8]);
        let header = CoValueHeader::comap().with_uniqueness("x");
        let id = id_for_header(&header, &Blake3Ed25519);
        let b = make_batch(&kp, &id, sid, None, 0..3);

        for store in [&memory as &dyn BlockingStore, &sqlite as &dyn BlockingStore] {
            store
                .add_co_value(&NewCoValue::new(id, header.clone()).with_content(vec![b.clone()]))
                .unwrap();
        }
        assert_eq!(
            memory.get_session(&id, &sid).unwrap(),
            sqlite.get_session(&id, &sid).unwrap()
        );
    }

    #[test]
    fn test_delete_and_list() {
        let store = MemoryStore::new();
        let a = CoValueHeader::comap().with_uniqueness(1);
        let b = CoValueHeader::comap().with_uniqueness(2);
        let ida = id_for_header(&a, &Blake3Ed25519);
        let idb = id_for_header(&b, &Blake3Ed25519);
        store.add_co_value(&NewCoValue::new(ida, a)).unwrap();
        store.add_co_value(&NewCoValue::new(idb, b)).unwrap();

        assert_eq!(store.list_co_values().unwrap(), vec![ida, idb]);
        assert!(store.delete_co_value(&ida).unwrap());
        assert_eq!(store.list_co_values().unwrap(), vec![idb]);
        assert_eq!(store.known_state(&ida).unwrap(), KnownState::empty(ida));
    }
}
