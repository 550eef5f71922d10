//! Work queue between event sources and the engine worker thread
//!
//! Startup, the status-file watcher and the discovery timer all post
//! [`EngineMessage`]s; only the worker thread consumes them. The queue is
//! strictly FIFO, so work runs in the order it was posted and two handlers
//! never overlap.

use async_channel::{Receiver, Sender, bounded};
use tracing::debug;

/// Capacity of the engine queue
pub const ENGINE_QUEUE_CAPACITY: usize = 256;

/// Work items for the engine worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineMessage {
    /// Query the keyboard for its connect state over the command endpoints
    CheckConnectionState,

    /// Drain the interrupt report endpoint (status file changed)
    GetReportData,

    /// No keyboard was found in time; reset the host side of the link
    DiscoveryTimeout,

    /// Finish queued work, then stop the worker
    Shutdown,
}

/// Posting side of the queue (cloneable, usable from any thread)
#[derive(Clone, Debug)]
pub struct EnginePoster {
    tx: Sender<EngineMessage>,
}

impl EnginePoster {
    /// Post a message, blocking while the queue is full
    pub fn post(&self, msg: EngineMessage) -> crate::Result<()> {
        self.tx
            .send_blocking(msg)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Post a message from async context
    pub async fn post_async(&self, msg: EngineMessage) -> crate::Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Post without blocking; fails if the queue is full or closed
    pub fn try_post(&self, msg: EngineMessage) -> crate::Result<()> {
        self.tx
            .try_send(msg)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Number of messages waiting to be handled
    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

/// Consuming side of the queue, owned by the worker thread
#[derive(Clone, Debug)]
pub struct EngineInbox {
    rx: Receiver<EngineMessage>,
}

impl EngineInbox {
    /// Receive the next message (blocking)
    pub fn recv(&self) -> crate::Result<EngineMessage> {
        self.rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Try to receive a message without blocking
    pub fn try_recv(&self) -> Option<EngineMessage> {
        self.rx.try_recv().ok()
    }

    /// Drop every queued message, returning how many were discarded
    pub fn clear(&self) -> usize {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Discarded {} queued engine message(s)", dropped);
        }
        dropped
    }
}

/// Create the engine queue
///
/// Returns (EnginePoster for event sources, EngineInbox for the worker)
pub fn create_engine_queue() -> (EnginePoster, EngineInbox) {
    let (tx, rx) = bounded(ENGINE_QUEUE_CAPACITY);
    (EnginePoster { tx }, EngineInbox { rx })
}
