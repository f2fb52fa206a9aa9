//! # costore Core
//!
//! Pure primitives for costore: coValue headers, content addressing, and
//! signed session logs.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`CoValueHeader`] - Immutable description of a coValue
//! - [`CoId`] - Content-addressed identifier (Blake3 of the canonical header)
//! - [`SessionId`] - One writer's append-only log within a coValue
//! - [`SessionBatch`] - A signed, contiguous run of session transactions
//! - [`KnownState`] - What a replica has of a coValue
//! - [`CryptoProvider`] - Hashing, signing and sealing behind one interface
//!
//! ## Canonicalization
//!
//! Headers are hashed over canonical JSON. See [`canonical`] module.

pub mod canonical;
pub mod chain;
pub mod crypto;
pub mod error;
pub mod header;
pub mod types;

pub use canonical::{canonical_header_bytes, canonical_json, to_canonical_json};
pub use chain::{chain_hash, chain_step, genesis_hash, SessionBatch};
pub use crypto::{
    Blake3Ed25519, Blake3Hash, CryptoProvider, Ed25519PublicKey, Ed25519Signature, Keypair,
    SealerId, SealerSecret, SignerId,
};
pub use error::{CoreError, ErrorClass, ValidationError};
pub use header::{id_for_header, verify_header_id, CoValueHeader, CoValueType};
pub use types::{CoId, KnownState, SessionId, SessionState, Transaction};
