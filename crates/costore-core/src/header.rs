//! CoValue headers and content addressing.
//!
//! A header is immutable once created. Its id is the Blake3 digest of the
//! canonical JSON encoding of the header, so any replica can check that a
//! header it received belongs to the id it was sent under.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use crate::canonical::canonical_header_bytes;
use crate::crypto::CryptoProvider;
use crate::error::CoreError;
use crate::types::CoId;

/// The kind of collaborative value a header describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoValueType {
    CoMap,
    CoList,
    CoStream,
    CoPlainText,
}

impl CoValueType {
    /// The tag used on the wire and in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            CoValueType::CoMap => "comap",
            CoValueType::CoList => "colist",
            CoValueType::CoStream => "costream",
            CoValueType::CoPlainText => "coplaintext",
        }
    }
}

impl fmt::Display for CoValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoValueType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "comap" => Ok(CoValueType::CoMap),
            "colist" => Ok(CoValueType::CoList),
            "costream" => Ok(CoValueType::CoStream),
            "coplaintext" => Ok(CoValueType::CoPlainText),
            other => Err(CoreError::invalid_id("coValue type", other)),
        }
    }
}

/// Immutable description of a coValue.
///
/// `ruleset` is an opaque permissions description passed through unchanged.
/// `uniqueness` salts the address so that otherwise identical headers get
/// distinct ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoValueHeader {
    #[serde(rename = "type")]
    pub kind: CoValueType,
    #[serde(default = "empty_ruleset")]
    pub ruleset: Value,
    #[serde(default)]
    pub meta: Value,
    #[serde(default)]
    pub uniqueness: Value,
}

fn empty_ruleset() -> Value {
    json!({})
}

impl CoValueHeader {
    /// A header with an empty ruleset and null meta and uniqueness.
    pub fn new(kind: CoValueType) -> Self {
        Self {
            kind,
            ruleset: empty_ruleset(),
            meta: Value::Null,
            uniqueness: Value::Null,
        }
    }

    /// Shorthand for a `comap` header.
    pub fn comap() -> Self {
        Self::new(CoValueType::CoMap)
    }

    pub fn with_ruleset(mut self, ruleset: Value) -> Self {
        self.ruleset = ruleset;
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_uniqueness(mut self, uniqueness: impl Into<Value>) -> Self {
        self.uniqueness = uniqueness.into();
        self
    }

    /// The header as a JSON object.
    pub fn to_value(&self) -> Value {
        json!({
            "type": self.kind.as_str(),
            "ruleset": self.ruleset,
            "meta": self.meta,
            "uniqueness": self.uniqueness,
        })
    }

    /// Canonical JSON text of the header, as persisted by the store.
    pub fn to_canonical_string(&self) -> String {
        crate::canonical::canonical_json(&self.to_value())
    }

    /// Parse a header from JSON text.
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        serde_json::from_str(text).map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}

/// Compute the content address of a header.
///
/// Pure and deterministic: headers with identical canonical forms always map
/// to the same id.
pub fn id_for_header(header: &CoValueHeader, crypto: &dyn CryptoProvider) -> CoId {
    let digest = crypto.hash(&canonical_header_bytes(header));
    CoId::from_bytes(*digest.as_bytes())
}

/// Check that `header` hashes to `id`.
pub fn verify_header_id(
    id: &CoId,
    header: &CoValueHeader,
    crypto: &dyn CryptoProvider,
) -> Result<(), CoreError> {
    let computed = id_for_header(header, crypto);
    if computed != *id {
        return Err(CoreError::HeaderIdMismatch {
            claimed: *id,
            computed,
        });
    }
    Ok(())
}
