//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{Map, Number, Value};

use costore_core::{
    Blake3Hash, CoId, CoValueHeader, CoValueType, Ed25519PublicKey, Keypair, SessionId,
    Transaction,
};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random CoId.
pub fn co_id() -> impl Strategy<Value = CoId> {
    any::<[u8; 32]>().prop_map(CoId::from_bytes)
}

/// Generate a random Blake3Hash.
pub fn blake3_hash() -> impl Strategy<Value = Blake3Hash> {
    any::<[u8; 32]>().prop_map(Blake3Hash)
}

/// Generate a random Ed25519PublicKey.
pub fn public_key() -> impl Strategy<Value = Ed25519PublicKey> {
    keypair().prop_map(|kp| kp.public_key())
}

pub fn session_id() -> impl Strategy<Value = SessionId> {
    (public_key(), any::<[u8; 8]>()).prop_map(|(signer, nonce)| SessionId::new(signer, nonce))
}

pub fn co_value_type() -> impl Strategy<Value = CoValueType> {
    prop_oneof![
        Just(CoValueType::CoMap),
        Just(CoValueType::CoList),
        Just(CoValueType::CoStream),
        Just(CoValueType::CoPlainText),
    ]
}

/// Generate a JSON scalar. Floats are kept finite so they survive JSON.
pub fn json_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        (-1.0e9f64..1.0e9f64).prop_map(|f| Number::from_f64(f).map_or(Value::Null, Value::Number)),
        "[ -~\u{e9}\u{4e2d}]{0,16}".prop_map(Value::String),
    ]
}

/// Generate nested JSON of bounded depth and width.
pub fn json_value() -> impl Strategy<Value = Value> {
    json_leaf().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-zA-Z_]{1,8}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Generate an arbitrary header.
pub fn header() -> impl Strategy<Value = CoValueHeader> {
    (co_value_type(), json_value(), json_value(), json_leaf()).prop_map(
        |(kind, ruleset, meta, uniqueness)| {
            CoValueHeader::new(kind)
                .with_ruleset(ruleset)
                .with_meta(meta)
                .with_uniqueness(uniqueness)
        },
    )
}

pub fn transaction() -> impl Strategy<Value = Transaction> {
    json_value().prop_map(|v| Transaction::from_json(&v))
}

/// Generate a run of transactions of at most `max_len`.
pub fn transactions(max_len: usize) -> impl Strategy<Value = Vec<Transaction>> {
    prop::collection::vec(transaction(), 1..=max_len.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use costore_core::{canonical_json, chain_hash, id_for_header, Blake3Ed25519, SessionBatch};

    proptest! {
        #[test]
        fn test_id_deterministic(h in header()) {
            prop_assert_eq!(id_for_header(&h, &Blake3Ed25519), id_for_header(&h.clone(), &Blake3Ed25519));
        }

        #[test]
        fn test_id_ignores_formatting(h in header()) {
            let pretty = serde_json::to_string_pretty(&h.to_value()).unwrap();
            let reparsed = CoValueHeader::from_json(&pretty).unwrap();
            prop_assert_eq!(id_for_header(&reparsed, &Blake3Ed25519), id_for_header(&h, &Blake3Ed25519));
        }

        #[test]
        fn test_canonical_json_is_fixed_point(v in json_value()) {
            let once = canonical_json(&v);
            let reparsed: Value = serde_json::from_str(&once).unwrap();
            prop_assert_eq!(canonical_json(&reparsed), once);
        }

        #[test]
        fn test_uniqueness_separates_ids(h in header(), a in any::<u32>(), b in any::<u32>()) {
            prop_assume!(a != b);
            let x = h.clone().with_uniqueness(a);
            let y = h.with_uniqueness(b);
            prop_assert_ne!(id_for_header(&x, &Blake3Ed25519), id_for_header(&y, &Blake3Ed25519));
        }

        #[test]
        fn test_last_signature_covers_any_suffix(
            kp in keypair(),
            prev in blake3_hash(),
            txs in transactions(12),
            split in any::<prop::sample::Index>(),
        ) {
            let session = SessionId::new(kp.public_key(), [7; 8]);
            let whole = SessionBatch::sign(&Blake3Ed25519, &kp, session, 0, &prev, txs.clone());
            let head = whole.verify(&Blake3Ed25519, &prev).unwrap();

            let at = split.index(txs.len());
            let suffix = SessionBatch {
                session_id: session,
                after: at as u64,
                transactions: txs[at..].to_vec(),
                last_signature: whole.last_signature,
            };
            let mid = chain_hash(&Blake3Ed25519, &prev, &txs[..at]);
            prop_assert_eq!(suffix.verify(&Blake3Ed25519, &mid).unwrap(), head);
        }

        #[test]
        fn test_session_id_string_roundtrip(sid in session_id()) {
            let parsed: SessionId = sid.to_string().parse().unwrap();
            prop_assert_eq!(parsed, sid);
        }
    }
}
