//! Outgoing message sinks.
//!
//! The sync manager never talks to a network; it pushes messages into an
//! [`OutgoingQueue`] and whoever owns the queue delivers them.

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};

use crate::error::{Result, SyncError};
use crate::messages::SyncMessage;

/// Sink for messages produced by the sync manager.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OutgoingQueue: Send + Sync {
    /// Queue a message for delivery.
    async fn push(&self, message: SyncMessage) -> Result<()>;

    /// Stop accepting messages. Further pushes fail with `QueueClosed`.
    async fn close(&self);
}

/// A queue backed by a bounded tokio channel.
pub struct ChannelQueue {
    sender: RwLock<Option<mpsc::Sender<SyncMessage>>>,
}

impl ChannelQueue {
    /// Create a queue and the receiver that drains it.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SyncMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                sender: RwLock::new(Some(tx)),
            },
            rx,
        )
    }
}

#[async_trait]
impl OutgoingQueue for ChannelQueue {
    async fn push(&self, message: SyncMessage) -> Result<()> {
        let sender = match self.sender.read().await.as_ref() {
            Some(sender) => sender.clone(),
            None => return Err(SyncError::QueueClosed),
        };
        sender
            .send(message)
            .await
            .map_err(|_| SyncError::QueueClosed)
    }

    async fn close(&self) {
        self.sender.write().await.take();
    }
}

/// A queue that drops everything. Useful when only the apply side is needed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullQueue;

#[async_trait]
impl OutgoingQueue for NullQueue {
    async fn push(&self, _message: SyncMessage) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {}
}
