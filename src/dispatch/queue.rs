//! In-memory FIFO work queue
//!
//! A single unbounded channel carries dispatch commands to the worker in
//! admission order. The stop token travels in-stream, so every item enqueued
//! before shutdown is drained before the worker exits.

use crate::error::{Error, Result};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Command delivered to the dispatch worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueCommand {
    /// Process one dispatch item
    Dispatch(Uuid),
    /// Stop token: the worker exits when it reads this
    Shutdown,
}

/// Sending half of the work queue
///
/// Cheap to clone; handlers enqueue, the worker consumes.
#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::UnboundedSender<QueueCommand>,
}

/// Create the work queue and the receiver the worker consumes
pub fn work_queue() -> (WorkQueue, mpsc::UnboundedReceiver<QueueCommand>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (WorkQueue { tx }, rx)
}

impl WorkQueue {
    /// Enqueue one item for dispatch
    pub fn enqueue(&self, item_id: Uuid) -> Result<()> {
        self.tx
            .send(QueueCommand::Dispatch(item_id))
            .map_err(|_| Error::Queue("Work queue is closed".to_string()))
    }

    /// Enqueue the stop token
    pub fn shutdown(&self) -> Result<()> {
        self.tx
            .send(QueueCommand::Shutdown)
            .map_err(|_| Error::Queue("Work queue is closed".to_string()))
    }
}
