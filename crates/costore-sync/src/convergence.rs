//! Convergence verification for sync.
//!
//! After syncing, replicas can verify they hold the same content for a
//! coValue by comparing known states and deterministic state hashes.

use costore_core::{Blake3Hash, CoId, KnownState};
use costore_store::Store;

use crate::error::Result;

/// Compute a deterministic state hash for a coValue.
///
/// Algorithm:
/// 1. Hash the domain prefix, the id and the canonical header
/// 2. For each session in id order, hash its id, count and chain head
/// 3. Return the final digest
///
/// The chain head already commits to every transaction in the session, so
/// equal hashes mean equal content. Returns `None` for an unknown coValue.
pub async fn co_value_state_hash<S: Store + ?Sized>(
    store: &S,
    id: &CoId,
) -> Result<Option<Blake3Hash>> {
    let header = match store.get_co_value(id).await? {
        Some(h) => h,
        None => return Ok(None),
    };

    let mut hasher = blake3::Hasher::new();
    hasher.update(b"costore-state-v0:");
    hasher.update(id.as_bytes());
    hasher.update(header.to_canonical_string().as_bytes());

    for session in store.get_sessions(id).await? {
        hasher.update(session.session_id.to_string().as_bytes());
        hasher.update(&session.count().to_le_bytes());
        hasher.update(session.last_hash.as_bytes());
    }

    Ok(Some(Blake3Hash(*hasher.finalize().as_bytes())))
}

/// Verify that the local replica matches a remote one for `id`.
///
/// Compares the remote known state against the local one, then the state
/// hash when the remote supplied it.
pub async fn verify_convergence<S: Store + ?Sized>(
    local_store: &S,
    id: &CoId,
    remote_known: &KnownState,
    remote_state_hash: Option<&Blake3Hash>,
) -> Result<ConvergenceResult> {
    let local_known = local_store.known_state(id).await?;

    if !local_known.header {
        return Ok(ConvergenceResult::NotConverged {
            reason: "coValue not found locally".into(),
        });
    }
    if !remote_known.header {
        return Ok(ConvergenceResult::NotConverged {
            reason: "remote lacks header".into(),
        });
    }

    let sessions = local_known
        .sessions
        .keys()
        .chain(remote_known.sessions.keys());
    for session in sessions {
        let (local, remote) = (local_known.count(session), remote_known.count(session));
        if local != remote {
            return Ok(ConvergenceResult::NotConverged {
                reason: format!(
                    "session {} count mismatch: local={}, remote={}",
                    session, local, remote
                ),
            });
        }
    }

    if let Some(remote_hash) = remote_state_hash {
        match co_value_state_hash(local_store, id).await? {
            Some(local_hash) if &local_hash == remote_hash => {}
            Some(_) => return Ok(ConvergenceResult::Diverged),
            None => {
                return Ok(ConvergenceResult::NotConverged {
                    reason: "could not compute local state hash".into(),
                });
            }
        }
    }

    Ok(ConvergenceResult::Converged)
}

/// Result of convergence verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Both replicas have identical state.
    Converged,
    /// Replicas have not yet converged (may need more sync rounds).
    NotConverged { reason: String },
    /// Same counts everywhere but different content: some session was
    /// written twice with different transactions.
    Diverged,
}

impl ConvergenceResult {
    /// Check if replicas have converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use costore_core::{
        genesis_hash, id_for_header, Blake3Ed25519, CoValueHeader, Keypair, SessionBatch,
        SessionId, Transaction,
    };
    use costore_store::{BlockingStore, MemoryStore, NewCoValue};
    use serde_json::json;

    fn content(kp: &Keypair, id: &CoId, sid: SessionId, values: &[i64]) -> SessionBatch {
        let g = genesis_hash(&Blake3Ed25519, id, &sid);
        let txs = values
            .iter()
            .map(|v| Transaction::from_json(&json!({ "v": v })))
            .collect();
        SessionBatch::sign(&Blake3Ed25519, kp, sid, 0, &g, txs)
    }

    #[tokio::test]
    async fn test_state_hash_and_convergence() {
        let kp = Keypair::from_seed(&[1; 32]);
        let sid = SessionId::new(kp.public_key(), [0; 8]);
        let header = CoValueHeader::comap();
        let id = id_for_header(&header, &Blake3Ed25519);

        let a = MemoryStore::new().into_async();
        let b = MemoryStore::new().into_async();
        let c = MemoryStore::new().into_async();
        let same = content(&kp, &id, sid, &[1, 2]);
        let forked = content(&kp, &id, sid, &[1, 3]);
        a.add_co_value(&NewCoValue::new(id, header.clone()).with_content(vec![same.clone()]))
            .await
            .unwrap();
        b.add_co_value(&NewCoValue::new(id, header.clone()).with_content(vec![same]))
            .await
            .unwrap();
        c.add_co_value(&NewCoValue::new(id, header).with_content(vec![forked]))
            .await
            .unwrap();

        let hash_a = co_value_state_hash(&a, &id).await.unwrap().unwrap();
        let hash_b = co_value_state_hash(&b, &id).await.unwrap().unwrap();
        let hash_c = co_value_state_hash(&c, &id).await.unwrap().unwrap();
        assert_eq!(hash_a, hash_b);
        assert_ne!(hash_a, hash_c);

        let known_b = b.known_state(&id).await.unwrap();
        assert!(verify_convergence(&a, &id, &known_b, Some(&hash_b))
            .await
            .unwrap()
            .is_converged());
        assert_eq!(
            verify_convergence(&a, &id, &known_b, Some(&hash_c)).await.unwrap(),
            ConvergenceResult::Diverged
        );
    }

    #[tokio::test]
    async fn test_not_converged_on_count() {
        let kp = Keypair::from_seed(&[1; 32]);
        let sid = SessionId::new(kp.public_key(), [0; 8]);
        let header = CoValueHeader::comap();
        let id = id_for_header(&header, &Blake3Ed25519);

        let a = MemoryStore::new().into_async();
        a.add_co_value(&NewCoValue::new(id, header).with_content(vec![content(&kp, &id, sid, &[1])]))
            .await
            .unwrap();

        let result = verify_convergence(&a, &id, &KnownState::header_only(id), None)
            .await
            .unwrap();
        assert!(matches!(result, ConvergenceResult::NotConverged { .. }));

        let unknown = CoId::from_bytes([0; 32]);
        assert_eq!(co_value_state_hash(&a, &unknown).await.unwrap(), None);
    }
}
