//! Sync protocol message types.
//!
//! These messages are exchanged between replicas to converge on the content
//! of coValues. They travel as CBOR on the wire; JSON is available for logs
//! and debugging.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use costore_core::{CoId, CoValueHeader, KnownState, SessionBatch};
use costore_store::Priority;

use crate::error::{Result, SyncError};

/// Message size limits.
pub mod limits {
    /// Default cap on transactions packed into one content message. A single
    /// session larger than this still travels whole.
    pub const MAX_TRANSACTIONS_PER_MESSAGE: usize = 100;
}

/// Sync protocol messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum SyncMessage {
    /// "This is what I have; send me what I'm missing and tell me what you have."
    Load(KnownState),

    /// "This is what I have; send me what I'm missing."
    Known(KnownState),

    /// New content for one coValue.
    Content(NewContentMessage),

    /// The sender is finished with this coValue.
    Done { id: CoId },
}

impl SyncMessage {
    /// The coValue this message concerns.
    pub fn id(&self) -> &CoId {
        match self {
            SyncMessage::Load(k) | SyncMessage::Known(k) => &k.id,
            SyncMessage::Content(c) => &c.id,
            SyncMessage::Done { id } => id,
        }
    }

    /// Encode to CBOR.
    pub fn to_cbor(&self) -> Result<Bytes> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| SyncError::InvalidMessage(format!("cbor encode: {}", e)))?;
        Ok(Bytes::from(buf))
    }

    /// Decode from CBOR.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes)
            .map_err(|e| SyncError::InvalidMessage(format!("cbor decode: {}", e)))
    }

    /// Encode to JSON text.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| SyncError::InvalidMessage(format!("json encode: {}", e)))
    }

    /// Decode from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| SyncError::InvalidMessage(format!("json decode: {}", e)))
    }
}

/// Content for one coValue: optionally its header, plus session batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContentMessage {
    pub id: CoId,
    /// Present when the receiver is not known to have the header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<CoValueHeader>,
    #[serde(default)]
    pub priority: Priority,
    /// Batches, at most one per session, each starting at the receiver's
    /// known count.
    #[serde(default)]
    pub new: Vec<SessionBatch>,
}

impl NewContentMessage {
    pub fn new(id: CoId, header: Option<CoValueHeader>) -> Self {
        Self {
            id,
            header,
            priority: Priority::default(),
            new: Vec::new(),
        }
    }

    /// Total transactions carried.
    pub fn transaction_count(&self) -> usize {
        self.new.iter().map(SessionBatch::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use costore_core::{
        genesis_hash, id_for_header, Blake3Ed25519, Keypair, SessionId, Transaction,
    };
    use serde_json::json;

    fn sample_content() -> SyncMessage {
        let crypto = Blake3Ed25519;
        let kp = Keypair::from_seed(&[1; 32]);
        let header = CoValueHeader::comap()
            .with_meta(json!({"createdAt": 1700000000000u64}))
            .with_uniqueness(7);
        let id = id_for_header(&header, &crypto);
        let sid = SessionId::new(kp.public_key(), [2; 8]);
        let genesis = genesis_hash(&crypto, &id, &sid);
        let batch = SessionBatch::sign(
            &crypto,
            &kp,
            sid,
            0,
            &genesis,
            vec![Transaction::from_json(&json!({"op": "set", "key": "a", "value": 1.5}))],
        );

        let mut content = NewContentMessage::new(id, Some(header));
        content.new.push(batch);
        SyncMessage::Content(content)
    }

    #[test]
    fn test_cbor_roundtrip_content() {
        let msg = sample_content();
        let bytes = msg.to_cbor().unwrap();
        assert_eq!(SyncMessage::from_cbor(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_json_shape() {
        let msg = SyncMessage::Done {
            id: CoId::from_bytes([3; 32]),
        };
        let text = msg.to_json().unwrap();
        assert!(text.contains(r#""action":"done""#));
        assert_eq!(SyncMessage::from_json(&text).unwrap(), msg);

        let content = sample_content().to_json().unwrap();
        assert!(content.contains(r#""action":"content""#));
        assert!(content.contains("_session_z"));
    }

    #[test]
    fn test_known_roundtrip() {
        let kp = Keypair::from_seed(&[4; 32]);
        let mut known = KnownState::header_only(CoId::from_bytes([5; 32]));
        known.set(SessionId::new(kp.public_key(), [0; 8]), 4);
        let msg = SyncMessage::Known(known);

        let bytes = msg.to_cbor().unwrap();
        assert_eq!(SyncMessage::from_cbor(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            SyncMessage::from_cbor(&[0xff, 0x00, 0x13]),
            Err(SyncError::InvalidMessage(_))
        ));
    }
}
