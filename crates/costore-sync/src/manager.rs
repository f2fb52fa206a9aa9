//! The sync manager.
//!
//! Computes "new content since a known state" for a peer and applies content
//! a peer sent, with the same ordering and integrity rules the store
//! enforces locally. Each call runs to completion on its own; the manager
//! keeps no per-peer state between calls.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, warn};

use costore_core::{
    genesis_hash, verify_header_id, Blake3Ed25519, Blake3Hash, CoId, CryptoProvider, ErrorClass,
    KnownState, SessionBatch, SessionId,
};
use costore_store::{AddOutcome, ContentAction, NewCoValue, Store, StoreError};

use crate::error::{Result, SyncError};
use crate::messages::{limits, NewContentMessage, SyncMessage};
use crate::outgoing::OutgoingQueue;

/// Configuration for sync behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Transactions packed into one content message before starting the next.
    /// Sessions are never split, so one oversized session still travels whole.
    pub max_transactions_per_message: usize,
    /// Check session signatures before writing incoming content.
    pub verify_signatures: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_transactions_per_message: limits::MAX_TRANSACTIONS_PER_MESSAGE,
            verify_signatures: true,
        }
    }
}

/// Result of applying one content message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// The header was new to this replica.
    pub header_inserted: bool,
    /// Distinct sessions that received transactions.
    pub sessions_updated: usize,
    /// Transactions written.
    pub transactions_applied: usize,
}

/// Sync manager over a store and an outgoing queue.
pub struct SyncManager<S: Store, Q: OutgoingQueue> {
    store: Arc<S>,
    queue: Q,
    crypto: Arc<dyn CryptoProvider>,
    config: SyncConfig,
}

impl<S: Store, Q: OutgoingQueue> SyncManager<S, Q> {
    /// Create a manager using the default crypto provider.
    pub fn new(store: Arc<S>, queue: Q, config: SyncConfig) -> Self {
        Self {
            store,
            queue,
            crypto: Arc::new(Blake3Ed25519),
            config,
        }
    }

    /// Use a different crypto provider for header and signature checks.
    pub fn with_crypto(mut self, crypto: Arc<dyn CryptoProvider>) -> Self {
        self.crypto = crypto;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Outgoing
    // ─────────────────────────────────────────────────────────────────────────

    /// Compute the content a peer with `known` is missing, without sending it.
    pub async fn compute_new_content(&self, known: &KnownState) -> Result<Vec<NewContentMessage>> {
        if known.is_malformed() {
            warn!(id = %known.id, "rejecting known state with sessions but no header");
            return Err(SyncError::MalformedKnownState(known.id.to_string()));
        }

        let id = known.id;
        let Some(header) = self.store.get_co_value(&id).await? else {
            debug!(id = %id, "nothing to send for unknown coValue");
            return Ok(Vec::new());
        };

        let include_header = !known.header;
        let max = self.config.max_transactions_per_message.max(1);

        let mut messages = Vec::new();
        let mut current = NewContentMessage::new(id, include_header.then_some(header));
        let mut packed = 0usize;

        for session in self.store.get_sessions(&id).await? {
            let peer_count = if include_header {
                0
            } else {
                known.count(&session.session_id)
            };
            if session.count() <= peer_count {
                continue;
            }

            let transactions = self
                .store
                .get_transactions(&id, &session.session_id, peer_count, session.last_idx)
                .await?;
            let expected = session.count() - peer_count;
            if transactions.len() as u64 != expected {
                return self
                    .short_read(&id, &session.session_id, expected, transactions.len() as u64)
                    .await;
            }

            let batch = SessionBatch {
                session_id: session.session_id,
                after: peer_count,
                transactions,
                last_signature: session.last_signature,
            };

            if !current.new.is_empty() && packed + batch.len() > max {
                messages.push(std::mem::replace(
                    &mut current,
                    NewContentMessage::new(id, None),
                ));
                packed = 0;
            }
            packed += batch.len();
            current.new.push(batch);
        }

        if !current.new.is_empty() || current.header.is_some() {
            messages.push(current);
        }

        debug!(
            id = %id,
            messages = messages.len(),
            transactions = messages.iter().map(NewContentMessage::transaction_count).sum::<usize>(),
            "computed new content"
        );
        Ok(messages)
    }

    /// A range came back shorter than the session state read just before it,
    /// so the coValue changed between the two reads.
    async fn short_read(
        &self,
        id: &CoId,
        session: &SessionId,
        expected: u64,
        got: u64,
    ) -> Result<Vec<NewContentMessage>> {
        if self.store.get_co_value(id).await?.is_none() {
            debug!(id = %id, "coValue deleted while computing new content");
            return Ok(Vec::new());
        }
        Err(SyncError::ConcurrentChange {
            id: id.to_string(),
            session: session.to_string(),
            expected,
            got,
        })
    }

    /// Push the content a peer with `known` is missing. Returns the number of
    /// messages queued.
    pub async fn send_new_content(&self, known: &KnownState) -> Result<usize> {
        let messages = self.compute_new_content(known).await?;
        let count = messages.len();
        for message in messages {
            self.queue.push(SyncMessage::Content(message)).await?;
        }
        Ok(count)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Incoming
    // ─────────────────────────────────────────────────────────────────────────

    /// Validate and store one content message. Nothing is written unless
    /// every part of the message is acceptable.
    pub async fn handle_new_content(&self, msg: &NewContentMessage) -> Result<ApplyReport> {
        let id = msg.id;

        if let Some(header) = &msg.header {
            if let Err(e) = verify_header_id(&id, header, self.crypto.as_ref()) {
                warn!(id = %id, error = %e, "rejecting content with mismatched header");
                return Err(e.into());
            }
        }

        let local_header = self.store.get_co_value(&id).await?;
        if local_header.is_none() && msg.header.is_none() {
            warn!(id = %id, "rejecting content for unknown coValue without header");
            return Err(SyncError::MissingHeader(id.to_string()));
        }

        // Running count and chain head per session, starting from local state.
        let mut tips: BTreeMap<SessionId, (u64, Option<Blake3Hash>)> = BTreeMap::new();
        for session in self.store.get_sessions(&id).await? {
            tips.insert(session.session_id, (session.count(), Some(session.last_hash)));
        }

        // Batches overlapping what is already held are cut down to their
        // unseen suffix; the signature still covers the whole chain.
        let mut accepted: Vec<SessionBatch> = Vec::with_capacity(msg.new.len());
        for batch in &msg.new {
            let (count, head) = tips.get(&batch.session_id).copied().unwrap_or((0, None));
            if batch.after > count {
                warn!(
                    id = %id,
                    session = %batch.session_id,
                    expected = count,
                    got = batch.after,
                    "rejecting out-of-order batch"
                );
                return Err(SyncError::OutOfOrder {
                    id: id.to_string(),
                    session: batch.session_id.to_string(),
                    expected: count,
                    got: batch.after,
                });
            }
            if batch.is_empty() && !self.config.verify_signatures {
                return Err(SyncError::Store(StoreError::EmptyBatch(
                    batch.session_id.to_string(),
                )));
            }
            if !batch.is_empty() && batch.end() <= count {
                debug!(id = %id, session = %batch.session_id, "skipping already-held batch");
                continue;
            }

            let skip = (count - batch.after) as usize;
            let fresh = SessionBatch {
                session_id: batch.session_id,
                after: count,
                transactions: batch.transactions[skip.min(batch.len())..].to_vec(),
                last_signature: batch.last_signature,
            };

            let next_head = if self.config.verify_signatures {
                let prev = head.unwrap_or_else(|| self.genesis(&id, &batch.session_id));
                match fresh.verify(self.crypto.as_ref(), &prev) {
                    Ok(h) => Some(h),
                    Err(e) => {
                        warn!(id = %id, session = %batch.session_id, error = %e, "rejecting batch");
                        return Err(e.into());
                    }
                }
            } else {
                None
            };

            tips.insert(batch.session_id, (fresh.end(), next_head));
            accepted.push(fresh);
        }

        let mut report = ApplyReport {
            header_inserted: false,
            sessions_updated: accepted
                .iter()
                .map(|b| b.session_id)
                .collect::<BTreeSet<_>>()
                .len(),
            transactions_applied: accepted.iter().map(SessionBatch::len).sum(),
        };

        match &msg.header {
            Some(header) => {
                let outcome = self
                    .store
                    .add_co_value(&NewCoValue {
                        id,
                        header: header.clone(),
                        action: ContentAction::Content,
                        priority: msg.priority,
                        new_content: accepted,
                    })
                    .await?;
                report.header_inserted = outcome == AddOutcome::Inserted;
            }
            None if !accepted.is_empty() => {
                self.store.append_batches(&id, &accepted).await?;
            }
            None => {}
        }

        debug!(
            id = %id,
            header_inserted = report.header_inserted,
            sessions = report.sessions_updated,
            transactions = report.transactions_applied,
            "applied new content"
        );
        Ok(report)
    }

    /// Dispatch one incoming message.
    ///
    /// `Load` is answered with this replica's known state followed by
    /// whatever the peer is missing; `Known` with the missing content only.
    /// Content rejected for a protocol reason is answered with a corrective
    /// `Known` so the peer can resend from the right offset; the error is
    /// still returned.
    pub async fn handle_message(&self, msg: SyncMessage) -> Result<Option<ApplyReport>> {
        match msg {
            SyncMessage::Load(known) => {
                let local = self.store.known_state(&known.id).await?;
                self.queue.push(SyncMessage::Known(local)).await?;
                self.send_new_content(&known).await?;
                Ok(None)
            }
            SyncMessage::Known(known) => {
                self.send_new_content(&known).await?;
                Ok(None)
            }
            SyncMessage::Content(content) => match self.handle_new_content(&content).await {
                Ok(report) => Ok(Some(report)),
                Err(e) if e.class() == ErrorClass::Protocol => {
                    let local = self.store.known_state(&content.id).await?;
                    self.queue.push(SyncMessage::Known(local)).await?;
                    Err(e)
                }
                Err(e) => Err(e),
            },
            SyncMessage::Done { id } => {
                debug!(id = %id, "peer done");
                Ok(None)
            }
        }
    }

    /// Ask a peer for a coValue: pushes `Load` with this replica's state.
    pub async fn load(&self, id: &CoId) -> Result<()> {
        let local = self.store.known_state(id).await?;
        self.queue.push(SyncMessage::Load(local)).await
    }

    fn genesis(&self, id: &CoId, session: &SessionId) -> Blake3Hash {
        genesis_hash(self.crypto.as_ref(), id, session)
    }
}
