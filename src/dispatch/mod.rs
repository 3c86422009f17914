//! Dispatch pipeline
//!
//! The dispatcher owns the work queue and the single background worker
//! task. Admission enqueues item ids; the worker drains them in FIFO order;
//! stop is an in-stream token, so shutdown waits for everything enqueued
//! before it.

pub mod queue;
pub mod worker;

pub use queue::{work_queue, QueueCommand, WorkQueue};
pub use worker::{dispatch_item, DispatchOutcome, WorkerContext};

use crate::error::Result;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Owns the work queue and the dispatch worker task
pub struct Dispatcher {
    queue: WorkQueue,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Create the dispatcher and start its worker task
    pub fn start(ctx: WorkerContext) -> Self {
        info!("Starting dispatcher");

        let (queue, rx) = work_queue();
        let handle = tokio::spawn(worker::run(ctx, rx));

        Self {
            queue,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Enqueue one item for dispatch
    pub fn enqueue(&self, item_id: Uuid) -> Result<()> {
        self.queue.enqueue(item_id)
    }

    /// Stop the worker after it drains everything enqueued before this call
    ///
    /// Idempotent: later calls find no worker and return immediately.
    pub async fn stop(&self) -> Result<()> {
        let handle = match self.worker.lock().await.take() {
            Some(handle) => handle,
            None => return Ok(()),
        };

        info!("Stopping dispatcher");

        // A worker that already exited has dropped the receiver; the join
        // below still reaps the task
        if let Err(e) = self.queue.shutdown() {
            warn!("Stop token not delivered: {}", e);
        }

        if let Err(e) = handle.await {
            warn!("Dispatch worker task failed: {}", e);
        }

        info!("Dispatcher stopped");
        Ok(())
    }
}
