//! # costore Store
//!
//! Storage engines for costore. Persists coValue headers, sessions and
//! per-session append-only transaction logs.
//!
//! ## Overview
//!
//! Two capability interfaces are offered: [`BlockingStore`] and the async
//! [`Store`]. The primary engine is [`SqliteStore`], with [`MemoryStore`]
//! for testing. Both are blocking; wrap either in [`AsyncStore`] for async
//! callers.
//!
//! ## Key Types
//!
//! - [`Store`] / [`BlockingStore`] - The storage interfaces
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`AsyncStore`] - Runs a blocking engine on tokio's blocking pool
//! - [`NewCoValue`] - A header plus the content arriving with it
//!
//! ## Usage
//!
//! ```rust,no_run
//! use costore_store::{BlockingStore, NewCoValue, SqliteStore, Store};
//! use costore_core::{id_for_header, Blake3Ed25519, CoValueHeader};
//!
//! async fn example() {
//!     // Open a SQLite database and move it behind the async interface
//!     let store = SqliteStore::open("costore.db").unwrap().into_async();
//!
//!     let header = CoValueHeader::comap().with_uniqueness(0);
//!     let id = id_for_header(&header, &Blake3Ed25519);
//!     store.add_co_value(&NewCoValue::new(id, header)).await.unwrap();
//!
//!     let known = store.known_state(&id).await.unwrap();
//!     assert!(known.header);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent inserts**: Adding the same header twice returns `AlreadyExists`
//! - **Conflict detection**: A different header under an existing id is `HeaderConflict`
//! - **Compare-and-swap appends**: A batch must start at the session's current count
//! - **Cascading deletes**: Deleting a coValue removes its sessions and transactions

pub mod adapter;
pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use adapter::AsyncStore;
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::{JournalMode, QueryResult, SqlValue, SqliteStore, StoreConfig};
pub use traits::{AddOutcome, BlockingStore, ContentAction, NewCoValue, Priority, Store};
