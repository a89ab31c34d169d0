use crate::{error::SofiaError, message::Platform, message::Task};
use async_trait::async_trait;

/// AI Provider trait — the brain.
///
/// The generative backend behind SofIA. Providers do not retry; retry
/// policy belongs to the task worker.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Generate a reply for a fully-built prompt.
    async fn generate(&self, prompt: &str) -> Result<String, SofiaError>;

    /// Check if the provider is reachable and ready.
    async fn is_available(&self) -> bool;
}

/// Outbound delivery trait — the mouth.
///
/// Sends a finished reply back to the user on the originating platform.
/// Implementations own transport-level retry; an HTTP error status is
/// terminal for the call.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name.
    fn name(&self) -> &str;

    /// Deliver `text` to `recipient_id` on `platform`.
    async fn send(
        &self,
        platform: Platform,
        recipient_id: &str,
        text: &str,
    ) -> Result<(), SofiaError>;
}

/// Task queue trait — the seam between receiver and worker.
///
/// Durable queueing is delegated to an external broker; the receiver only
/// ever sees this producer interface. Enqueue must not block past the
/// webhook deadline.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Hand a task to the queue. Returns immediately; a full queue is an
    /// error, not a wait.
    async fn enqueue(&self, task: &Task) -> Result<(), SofiaError>;

    /// Whether the queue still has a consumer attached.
    fn is_open(&self) -> bool;
}
