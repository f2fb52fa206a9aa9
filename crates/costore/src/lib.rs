//! # costore
//!
//! A local-first, content-addressed store of collaborative values
//! ("coValues") with known-state sync.
//!
//! ## Overview
//!
//! costore provides a portable, offline-first library for:
//!
//! - **Headers**: Immutable descriptions of coValues, addressed by their hash
//! - **Sessions**: Append-only, signed transaction logs, one per writer session
//! - **Storage**: SQLite or in-memory persistence with ordering invariants
//! - **Sync**: Sending each peer exactly what its known state lacks
//!
//! ## Key Concepts
//!
//! - **CoId**: `co_z` + Blake3 of the canonical header. Same header, same id.
//! - **Session**: Owned by a single signer. Indices are contiguous from 0.
//! - **KnownState**: Per session, how many transactions a replica holds.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use costore::{Node, NodeConfig};
//! use costore::core::{CoValueHeader, Keypair, Transaction};
//! use costore::store::{BlockingStore, SqliteStore};
//!
//! async fn example() {
//!     // Create a keypair for this node
//!     let keypair = Keypair::generate();
//!
//!     // Open storage
//!     let store = SqliteStore::open("costore.db").unwrap().into_async();
//!
//!     // Create the node
//!     let node = Node::new(keypair, store, NodeConfig::default());
//!
//!     // Create a coValue
//!     let created = node
//!         .create_co_value(CoValueHeader::comap().with_uniqueness(0), vec![])
//!         .await
//!         .unwrap();
//!
//!     // Append to a session
//!     let session = node.new_session();
//!     let tx = Transaction::parse(r#"{"op":"set","key":"title","value":"hi"}"#).unwrap();
//!     node.append(&created.id, &session, vec![tx]).await.unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `costore::core` - Headers, ids, sessions, crypto
//! - `costore::store` - Storage engines
//! - `costore::sync` - Sync manager and messages

pub mod error;
pub mod node;

// Re-export component crates
pub use costore_core as core;
pub use costore_store as store;
pub use costore_sync as sync;

// Re-export main types for convenience
pub use error::{NodeError, Result};
pub use node::{Created, Node, NodeConfig};

// Re-export commonly used core types
pub use costore_core::{
    id_for_header, CoId, CoValueHeader, CoValueType, ErrorClass, Keypair, KnownState, SessionId,
    SessionState, Transaction,
};
