//! Session hash chains and signed batches.
//!
//! Every session log is covered by a running hash:
//!
//! ```text
//! h_genesis = H(domain || co_id || session_id)
//! h_i       = H(domain || h_{i-1} || len(tx_i) || tx_i)
//! ```
//!
//! The writer signs the chain head after each append. Because the chain is
//! per transaction, a peer holding `h_k` can verify any batch covering
//! `(k, n]` no matter how the writer originally grouped its appends.

use serde::{Deserialize, Serialize};

use crate::crypto::{Blake3Hash, CryptoProvider, Ed25519Signature, Keypair};
use crate::error::ValidationError;
use crate::types::{CoId, SessionId, Transaction};

const GENESIS_DOMAIN: &[u8] = b"costore-session-genesis-v0";
const STEP_DOMAIN: &[u8] = b"costore-session-step-v0";

/// Chain hash of an empty session.
pub fn genesis_hash(crypto: &dyn CryptoProvider, co_id: &CoId, session_id: &SessionId) -> Blake3Hash {
    let session = session_id.to_string();
    let mut buf = Vec::with_capacity(GENESIS_DOMAIN.len() + 32 + session.len());
    buf.extend_from_slice(GENESIS_DOMAIN);
    buf.extend_from_slice(co_id.as_bytes());
    buf.extend_from_slice(session.as_bytes());
    crypto.hash(&buf)
}

/// Extend a chain hash by one transaction.
pub fn chain_step(crypto: &dyn CryptoProvider, prev: &Blake3Hash, tx: &Transaction) -> Blake3Hash {
    let bytes = tx.as_bytes();
    let mut buf = Vec::with_capacity(STEP_DOMAIN.len() + 32 + 8 + bytes.len());
    buf.extend_from_slice(STEP_DOMAIN);
    buf.extend_from_slice(prev.as_bytes());
    buf.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    buf.extend_from_slice(bytes);
    crypto.hash(&buf)
}

/// Extend a chain hash by a run of transactions.
pub fn chain_hash<'a>(
    crypto: &dyn CryptoProvider,
    prev: &Blake3Hash,
    txs: impl IntoIterator<Item = &'a Transaction>,
) -> Blake3Hash {
    txs.into_iter()
        .fold(*prev, |acc, tx| chain_step(crypto, &acc, tx))
}

/// A contiguous run of one session's transactions, starting right after
/// `after` known transactions, signed at its last entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBatch {
    pub session_id: SessionId,
    /// Number of transactions preceding this batch; the first transaction
    /// in `transactions` has index `after`.
    pub after: u64,
    pub transactions: Vec<Transaction>,
    pub last_signature: Ed25519Signature,
}

impl SessionBatch {
    /// Build a batch and sign its chain head.
    ///
    /// `prev_hash` is the chain hash after `after` transactions (the genesis
    /// hash when `after == 0`).
    pub fn sign(
        crypto: &dyn CryptoProvider,
        keypair: &Keypair,
        session_id: SessionId,
        after: u64,
        prev_hash: &Blake3Hash,
        transactions: Vec<Transaction>,
    ) -> Self {
        let head = chain_hash(crypto, prev_hash, &transactions);
        let last_signature = crypto.sign(keypair, head.as_bytes());
        Self {
            session_id,
            after,
            transactions,
            last_signature,
        }
    }

    /// Chain head this batch ends on, given the hash it starts from.
    pub fn head(&self, crypto: &dyn CryptoProvider, prev_hash: &Blake3Hash) -> Blake3Hash {
        chain_hash(crypto, prev_hash, &self.transactions)
    }

    /// Recompute the chain from `prev_hash` and check the signature against
    /// the signer embedded in the session id. Returns the new chain head.
    pub fn verify(
        &self,
        crypto: &dyn CryptoProvider,
        prev_hash: &Blake3Hash,
    ) -> Result<Blake3Hash, ValidationError> {
        if self.transactions.is_empty() {
            return Err(ValidationError::EmptyBatch(self.session_id.to_string()));
        }
        let head = self.head(crypto, prev_hash);
        crypto
            .verify(&self.session_id.signer, head.as_bytes(), &self.last_signature)
            .map_err(|_| ValidationError::SignatureFailed(self.session_id.to_string()))?;
        Ok(head)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Transaction count of the session once this batch is applied.
    pub fn end(&self) -> u64 {
        self.after + self.transactions.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Blake3Ed25519;
    use serde_json::json;

    fn txs(range: std::ops::Range<u32>) -> Vec<Transaction> {
        range.map(|i| Transaction::from_json(&json!({"i": i}))).collect()
    }

    fn setup() -> (Blake3Ed25519, Keypair, CoId, SessionId) {
        let kp = Keypair::from_seed(&[5; 32]);
        let sid = SessionId::new(kp.public_key(), [1; 8]);
        (Blake3Ed25519, kp, CoId::from_bytes([7; 32]), sid)
    }

    #[test]
    fn test_chain_independent_of_batching() {
        let (crypto, _, co, sid) = setup();
        let g = genesis_hash(&crypto, &co, &sid);
        let all = txs(0..5);

        let whole = chain_hash(&crypto, &g, &all);
        let mid = chain_hash(&crypto, &g, &all[..3]);
        let split = chain_hash(&crypto, &mid, &all[3..]);
        assert_eq!(whole, split);
    }

    #[test]
    fn test_genesis_binds_co_and_session() {
        let (crypto, kp, co, sid) = setup();
        let other_sid = SessionId::new(kp.public_key(), [2; 8]);
        assert_ne!(genesis_hash(&crypto, &co, &sid), genesis_hash(&crypto, &co, &other_sid));
        assert_ne!(
            genesis_hash(&crypto, &co, &sid),
            genesis_hash(&crypto, &CoId::from_bytes([8; 32]), &sid)
        );
    }

    #[test]
    fn test_sign_verify_batch() {
        let (crypto, kp, co, sid) = setup();
        let g = genesis_hash(&crypto, &co, &sid);
        let batch = SessionBatch::sign(&crypto, &kp, sid, 0, &g, txs(0..3));

        let head = batch.verify(&crypto, &g).unwrap();
        assert_eq!(head, chain_hash(&crypto, &g, &txs(0..3)));
        assert_eq!(batch.end(), 3);
    }

    #[test]
    fn test_resigned_tail_verifies_from_prefix() {
        let (crypto, kp, co, sid) = setup();
        let g = genesis_hash(&crypto, &co, &sid);
        let all = txs(0..5);
        let full = SessionBatch::sign(&crypto, &kp, sid, 0, &g, all.clone());

        // A peer holding 3 transactions receives the tail with the same signature.
        let h3 = chain_hash(&crypto, &g, &all[..3]);
        let tail = SessionBatch {
            session_id: sid,
            after: 3,
            transactions: all[3..].to_vec(),
            last_signature: full.last_signature,
        };
        tail.verify(&crypto, &h3).unwrap();
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let (crypto, kp, co, sid) = setup();
        let g = genesis_hash(&crypto, &co, &sid);
        let mut batch = SessionBatch::sign(&crypto, &kp, sid, 0, &g, txs(0..2));
        batch.transactions[1] = Transaction::from_json(&json!({"i": 99}));
        assert!(matches!(
            batch.verify(&crypto, &g),
            Err(ValidationError::SignatureFailed(_))
        ));
    }

    #[test]
    fn test_wrong_signer_rejected() {
        let (crypto, _, co, sid) = setup();
        let intruder = Keypair::from_seed(&[6; 32]);
        let g = genesis_hash(&crypto, &co, &sid);
        let batch = SessionBatch::sign(&crypto, &intruder, sid, 0, &g, txs(0..1));
        assert!(batch.verify(&crypto, &g).is_err());
    }

    #[test]
    fn test_empty_batch_rejected() {
        let (crypto, kp, co, sid) = setup();
        let g = genesis_hash(&crypto, &co, &sid);
        let batch = SessionBatch::sign(&crypto, &kp, sid, 0, &g, vec![]);
        assert!(matches!(
            batch.verify(&crypto, &g),
            Err(ValidationError::EmptyBatch(_))
        ));
    }
}
