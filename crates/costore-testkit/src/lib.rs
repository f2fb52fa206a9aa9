//! # costore Testkit
//!
//! Testing utilities for costore.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Generators**: Proptest strategies for headers, JSON and sessions
//! - **Fixtures**: Signed content builders and store constructors
//! - **Sync links**: Two replicas wired together through in-memory queues
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use costore_core::{id_for_header, Blake3Ed25519};
//! use costore_testkit::generators::header;
//!
//! proptest! {
//!     #[test]
//!     fn id_is_deterministic(h in header()) {
//!         prop_assert_eq!(id_for_header(&h, &Blake3Ed25519), id_for_header(&h, &Blake3Ed25519));
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! Quickly set up sync scenarios:
//!
//! ```rust,no_run
//! use costore_store::Store;
//! use costore_testkit::fixtures::{memory_store, SyncLink, TestWriter};
//!
//! async fn example() {
//!     let writer = TestWriter::new();
//!     let new = writer.co_value(0);
//!
//!     let mut link = SyncLink::new(memory_store(), memory_store());
//!     link.a.store.add_co_value(&new).await.unwrap();
//!     link.b.manager.load(&new.id).await.unwrap();
//!     let stats = link.pump(8).await;
//!     assert!(stats.errors.is_empty());
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    memory_store, multi_party_writers, numbered_transaction, sqlite_store, PumpStats, Replica,
    SyncLink, TestWriter,
};
