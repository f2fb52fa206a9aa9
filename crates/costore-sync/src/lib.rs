//! # costore Sync
//!
//! Known-state sync for coValues.
//!
//! ## Overview
//!
//! Replicas describe what they have of a coValue with a [`KnownState`]:
//! whether they hold the header and how many transactions of each session.
//! The [`SyncManager`] turns a peer's known state into the content that peer
//! is missing and applies content it receives, rejecting anything out of
//! order or badly signed before touching storage.
//!
//! ## Key Properties
//!
//! - **Minimal**: Only the suffix of each session the peer lacks is sent
//! - **Complete**: A peer with nothing receives the header and every session
//! - **All or nothing**: Incoming content lands entirely or not at all
//! - **Transport-agnostic**: Messages go to an [`OutgoingQueue`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use costore_sync::{ChannelQueue, SyncConfig, SyncManager, SyncMessage};
//! use costore_store::{BlockingStore, SqliteStore};
//! use costore_core::KnownState;
//!
//! async fn example(peer_known: KnownState) {
//!     let store = Arc::new(SqliteStore::open("costore.db").unwrap().into_async());
//!     let (queue, mut outgoing) = ChannelQueue::new(128);
//!     let manager = SyncManager::new(store, queue, SyncConfig::default());
//!
//!     // Answer a peer's known state with what it is missing
//!     manager.handle_message(SyncMessage::Known(peer_known)).await.unwrap();
//!     while let Ok(msg) = outgoing.try_recv() {
//!         let _wire = msg.to_cbor().unwrap();
//!     }
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Replica A                           Replica B
//!   |-------- Load(known_A) ---------->|
//!   |<------- Known(known_B) ----------|
//!   |<------- Content(...) ------------|   what A lacks
//!   |-------- Content(...) ----------->|   what B lacks
//! ```
//!
//! [`KnownState`]: costore_core::KnownState

pub mod convergence;
pub mod error;
pub mod manager;
pub mod messages;
pub mod outgoing;

pub use convergence::{co_value_state_hash, verify_convergence, ConvergenceResult};
pub use error::{Result, SyncError};
pub use manager::{ApplyReport, SyncConfig, SyncManager};
pub use messages::{limits, NewContentMessage, SyncMessage};
pub use outgoing::{ChannelQueue, NullQueue, OutgoingQueue};
