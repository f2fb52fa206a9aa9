//! Async adapter over blocking engines.
//!
//! Each call is moved onto tokio's blocking thread pool with
//! `spawn_blocking`, so the runtime never waits on SQLite.

use std::sync::Arc;

use async_trait::async_trait;

use costore_core::{
    CoId, CoValueHeader, KnownState, SessionBatch, SessionId, SessionState, Transaction,
};

use crate::error::{Result, StoreError};
use crate::traits::{AddOutcome, BlockingStore, NewCoValue, Store};

/// Runs a [`BlockingStore`] behind the async [`Store`] interface.
pub struct AsyncStore<S> {
    inner: Arc<S>,
}

impl<S> Clone for AsyncStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: BlockingStore> AsyncStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Borrow the blocking engine.
    pub fn blocking(&self) -> &S {
        &self.inner
    }

    /// Run a closure against the engine on the blocking pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&S) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| StoreError::Background(format!("spawn_blocking failed: {}", e)))?
    }
}

#[async_trait]
impl<S: BlockingStore> Store for AsyncStore<S> {
    async fn add_co_value(&self, new: &NewCoValue) -> Result<AddOutcome> {
        let new = new.clone();
        self.run(move |s| s.add_co_value(&new)).await
    }

    async fn get_co_value(&self, id: &CoId) -> Result<Option<CoValueHeader>> {
        let id = *id;
        self.run(move |s| s.get_co_value(&id)).await
    }

    async fn delete_co_value(&self, id: &CoId) -> Result<bool> {
        let id = *id;
        self.run(move |s| s.delete_co_value(&id)).await
    }

    async fn replace_header_unbound(&self, id: &CoId, header: &CoValueHeader) -> Result<bool> {
        let id = *id;
        let header = header.clone();
        self.run(move |s| s.replace_header_unbound(&id, &header))
            .await
    }

    async fn list_co_values(&self) -> Result<Vec<CoId>> {
        self.run(|s| s.list_co_values()).await
    }

    async fn append_batches(
        &self,
        id: &CoId,
        batches: &[SessionBatch],
    ) -> Result<Vec<SessionState>> {
        let id = *id;
        let batches = batches.to_vec();
        self.run(move |s| s.append_batches(&id, &batches)).await
    }

    async fn get_session(
        &self,
        id: &CoId,
        session_id: &SessionId,
    ) -> Result<Option<SessionState>> {
        let id = *id;
        let session_id = *session_id;
        self.run(move |s| s.get_session(&id, &session_id)).await
    }

    async fn get_sessions(&self, id: &CoId) -> Result<Vec<SessionState>> {
        let id = *id;
        self.run(move |s| s.get_sessions(&id)).await
    }

    async fn get_transactions(
        &self,
        id: &CoId,
        session_id: &SessionId,
        from: u64,
        to_inclusive: u64,
    ) -> Result<Vec<Transaction>> {
        let id = *id;
        let session_id = *session_id;
        self.run(move |s| s.get_transactions(&id, &session_id, from, to_inclusive))
            .await
    }

    async fn known_state(&self, id: &CoId) -> Result<KnownState> {
        let id = *id;
        self.run(move |s| s.known_state(&id)).await
    }
}
