//! In-process task queue.
//!
//! Durable queueing belongs to an external broker; everything here and in
//! the worker only touches the `TaskQueue` seam, so a broker client slots
//! in without changes elsewhere. The bundled implementation is a bounded
//! in-process channel carrying the same JSON wire format a broker would:
//! tasks cross the boundary as self-contained serialized data, never as
//! shared references.

use async_trait::async_trait;
use sofia_core::{error::SofiaError, message::Task, traits::TaskQueue};
use tokio::sync::mpsc;
use tracing::debug;

/// Bounded in-process queue between receiver and worker.
pub struct InMemoryQueue {
    tx: mpsc::Sender<String>,
}

impl InMemoryQueue {
    /// Create the queue and its consumer end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl TaskQueue for InMemoryQueue {
    async fn enqueue(&self, task: &Task) -> Result<(), SofiaError> {
        let wire = serde_json::to_string(task)?;
        // try_send, not send: the receiver must answer the webhook within
        // its deadline, so a full queue is an immediate error.
        self.tx
            .try_send(wire)
            .map_err(|e| SofiaError::Queue(format!("enqueue failed: {e}")))?;
        debug!("task {} enqueued for {}", task.id, task.platform);
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Decode one wire message back into a task. Bad messages are the
/// caller's cue to log and skip, not to crash the worker.
pub fn decode_task(wire: &str) -> Result<Task, SofiaError> {
    Ok(serde_json::from_str(wire)?)
}
