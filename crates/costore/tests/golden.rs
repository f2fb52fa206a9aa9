//! Golden vectors for content addressing.
//!
//! Every replica must produce the same canonical header text and therefore
//! the same coValue id. The ids are checked against a direct Blake3 of the
//! expected text, so a change in canonicalization shows up as a text diff.

use proptest::prelude::*;
use serde_json::{json, Map, Value};

use costore::core::{canonical_header_bytes, Blake3Ed25519};
use costore::{id_for_header, CoId, CoValueHeader, CoValueType};

/// A header together with its expected canonical encoding.
struct GoldenVector {
    name: &'static str,
    header: CoValueHeader,
    canonical: &'static str,
}

fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "minimal_comap",
            header: CoValueHeader::comap(),
            canonical: r#"{"meta":null,"ruleset":{},"type":"comap","uniqueness":null}"#,
        },
        GoldenVector {
            name: "string_uniqueness",
            header: CoValueHeader::new(CoValueType::CoList).with_uniqueness("abc"),
            canonical: r#"{"meta":null,"ruleset":{},"type":"colist","uniqueness":"abc"}"#,
        },
        GoldenVector {
            name: "ruleset_and_meta",
            header: CoValueHeader::new(CoValueType::CoStream)
                .with_ruleset(json!({"type": "unsafeAllowAll"}))
                .with_meta(json!({"type": "comment"}))
                .with_uniqueness(42),
            canonical: r#"{"meta":{"type":"comment"},"ruleset":{"type":"unsafeAllowAll"},"type":"costream","uniqueness":42}"#,
        },
        GoldenVector {
            name: "nested_key_order",
            header: CoValueHeader::comap()
                .with_meta(json!({"zeta": [3, {"b": true, "a": null}], "Alpha": 1.5})),
            canonical: r#"{"meta":{"Alpha":1.5,"zeta":[3,{"a":null,"b":true}]},"ruleset":{},"type":"comap","uniqueness":null}"#,
        },
        GoldenVector {
            name: "escaped_strings",
            header: CoValueHeader::new(CoValueType::CoPlainText)
                .with_meta(json!({"name": "h\u{e9}llo \"q\"\n"})),
            canonical: "{\"meta\":{\"name\":\"h\u{e9}llo \\\"q\\\"\\n\"},\"ruleset\":{},\"type\":\"coplaintext\",\"uniqueness\":null}",
        },
    ]
}

#[test]
fn test_canonical_text_matches() {
    for v in all_vectors() {
        assert_eq!(
            String::from_utf8(canonical_header_bytes(&v.header)).unwrap(),
            v.canonical,
            "canonical text mismatch for {}",
            v.name
        );
    }
}

#[test]
fn test_id_is_blake3_of_canonical_text() {
    for v in all_vectors() {
        let expected = CoId::from_bytes(*blake3::hash(v.canonical.as_bytes()).as_bytes());
        let id = id_for_header(&v.header, &Blake3Ed25519);
        assert_eq!(id, expected, "id mismatch for {}", v.name);
        assert_eq!(
            id.to_string(),
            format!("co_z{}", blake3::hash(v.canonical.as_bytes()).to_hex()),
            "rendering mismatch for {}",
            v.name
        );
    }
}

#[test]
fn test_parsed_headers_share_ids() {
    // Key order and whitespace in the input must not matter.
    for v in all_vectors() {
        let pretty = serde_json::to_string_pretty(&v.header.to_value()).unwrap();
        let reparsed = CoValueHeader::from_json(&pretty).unwrap();
        assert_eq!(
            id_for_header(&reparsed, &Blake3Ed25519),
            id_for_header(&v.header, &Blake3Ed25519),
            "{}",
            v.name
        );
    }
}

#[test]
fn test_vectors_have_distinct_ids() {
    let ids: std::collections::HashSet<CoId> = all_vectors()
        .iter()
        .map(|v| id_for_header(&v.header, &Blake3Ed25519))
        .collect();
    assert_eq!(ids.len(), all_vectors().len());
}

proptest! {
    #[test]
    fn test_insertion_order_never_changes_id(
        entries in prop::collection::btree_map("[a-zA-Z0-9_]{1,12}", any::<i64>(), 0..12)
    ) {
        let forward: Map<String, Value> =
            entries.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
        let backward: Map<String, Value> =
            entries.iter().rev().map(|(k, v)| (k.clone(), json!(v))).collect();

        let a = CoValueHeader::comap().with_meta(Value::Object(forward));
        let b = CoValueHeader::comap().with_meta(Value::Object(backward));
        prop_assert_eq!(canonical_header_bytes(&a), canonical_header_bytes(&b));
        prop_assert_eq!(id_for_header(&a, &Blake3Ed25519), id_for_header(&b, &Blake3Ed25519));
    }
}
