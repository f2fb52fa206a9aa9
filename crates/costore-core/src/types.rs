//! Strong type definitions for costore.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::crypto::{
    decode_prefixed, string_serde, Blake3Hash, Ed25519Signature, SignerId, SIGNER_PREFIX,
};
use crate::error::CoreError;

/// Prefix of a coValue id.
pub const CO_ID_PREFIX: &str = "co_z";

/// Separator between the signer and the nonce in a session id.
pub const SESSION_INFIX: &str = "_session_z";

/// A 32-byte coValue identifier, computed as Blake3(canonical header bytes).
///
/// This is the content-address of a coValue. Rendered as `co_z<hex>`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoId(pub [u8; 32]);

impl CoId {
    /// Create a new CoId from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for CoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CoId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for CoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", CO_ID_PREFIX, self.to_hex())
    }
}

impl FromStr for CoId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_prefixed(s, CO_ID_PREFIX, "coValue id").map(Self)
    }
}

impl AsRef<[u8]> for CoId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for CoId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

string_serde!(CoId);

/// One writer's append-only log within a coValue.
///
/// The signer embedded here is the only key allowed to sign this session's
/// transactions. Rendered as `signer_z<hex>_session_z<16 hex>`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId {
    pub signer: SignerId,
    pub nonce: [u8; 8],
}

impl SessionId {
    pub const fn new(signer: SignerId, nonce: [u8; 8]) -> Self {
        Self { signer, nonce }
    }

    /// A fresh session for `signer` with a random nonce.
    pub fn random(signer: SignerId) -> Self {
        let mut nonce = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self { signer, nonce }
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SessionId({}/{})",
            &self.signer.to_hex()[..16],
            hex::encode(self.nonce)
        )
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.signer, SESSION_INFIX, hex::encode(self.nonce))
    }
}

impl FromStr for SessionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (signer, nonce) = s
            .split_once(SESSION_INFIX)
            .ok_or_else(|| CoreError::invalid_id("session id", s))?;
        if !signer.starts_with(SIGNER_PREFIX) {
            return Err(CoreError::invalid_id("session id", s));
        }
        let signer: SignerId = signer
            .parse()
            .map_err(|_| CoreError::invalid_id("session id", s))?;
        let nonce = hex::decode(nonce).map_err(|_| CoreError::invalid_id("session id", s))?;
        let nonce: [u8; 8] = nonce
            .try_into()
            .map_err(|_| CoreError::invalid_id("session id", s))?;
        Ok(Self { signer, nonce })
    }
}

string_serde!(SessionId);

/// An opaque transaction payload, held as JSON text.
///
/// The text is preserved byte-for-byte through storage and sync.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transaction(String);

impl Transaction {
    /// Build from a JSON value, using the canonical encoding.
    pub fn from_json(value: &Value) -> Self {
        Self(crate::canonical::canonical_json(value))
    }

    /// Accept existing JSON text as-is after checking that it parses.
    pub fn parse(text: impl Into<String>) -> Result<Self, CoreError> {
        let text = text.into();
        serde_json::from_str::<serde::de::IgnoredAny>(&text)
            .map_err(|e| CoreError::DecodingError(e.to_string()))?;
        Ok(Self(text))
    }

    /// Wrap text read back from trusted storage without re-parsing it.
    pub fn from_stored(text: String) -> Self {
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Parse the payload into a JSON value.
    pub fn to_value(&self) -> Result<Value, CoreError> {
        serde_json::from_str(&self.0).map_err(|e| CoreError::DecodingError(e.to_string()))
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.chars().count() > 48 {
            let head: String = self.0.chars().take(48).collect();
            write!(f, "Transaction({}...)", head)
        } else {
            write!(f, "Transaction({})", self.0)
        }
    }
}

/// Persisted state of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub session_id: SessionId,
    /// Index of the last transaction in the log.
    pub last_idx: u64,
    /// Writer's signature over `last_hash`.
    pub last_signature: Ed25519Signature,
    /// Chain hash after transaction `last_idx`.
    pub last_hash: Blake3Hash,
}

impl SessionState {
    /// Number of transactions in the session.
    pub fn count(&self) -> u64 {
        self.last_idx + 1
    }
}

/// What a replica has of one coValue.
///
/// Each session maps to the number of transactions known, which is also the
/// next index expected. A session the replica has never seen counts as 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownState {
    pub id: CoId,
    pub header: bool,
    #[serde(default)]
    pub sessions: BTreeMap<SessionId, u64>,
}

impl KnownState {
    /// Nothing known about `id`.
    pub fn empty(id: CoId) -> Self {
        Self {
            id,
            header: false,
            sessions: BTreeMap::new(),
        }
    }

    /// Header known, no sessions.
    pub fn header_only(id: CoId) -> Self {
        Self {
            header: true,
            ..Self::empty(id)
        }
    }

    /// Transactions known for `session`.
    pub fn count(&self, session: &SessionId) -> u64 {
        self.sessions.get(session).copied().unwrap_or(0)
    }

    /// Record that transactions `0..count` of `session` are known.
    pub fn set(&mut self, session: SessionId, count: u64) {
        self.sessions.insert(session, count);
    }

    /// Sessions claimed without the header cannot happen on a real replica.
    pub fn is_malformed(&self) -> bool {
        !self.header && self.sessions.values().any(|&n| n > 0)
    }
}
