//! The task worker: consumes queued tasks and owns the retry/fallback
//! state machine across generation and delivery.
//!
//! `Received → Generating → Delivering → Succeeded`, with bounded retry
//! loops on both network-facing states and a canned-fallback exit when
//! retries are exhausted. One attempt counter spans the whole task, so a
//! task never exceeds `max_attempts` retries in total.

use crate::fallback;
use crate::queue::decode_task;
use sofia_core::{
    config::WorkerConfig,
    message::Task,
    traits::{Channel, Provider},
};
use sofia_knowledge::KnowledgeStore;
use sofia_providers::{cache::ResponseCache, prompt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

/// Terminal task states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    ExhaustedFallbackSent,
}

enum State {
    Generating,
    Delivering { text: String, exhausted: bool },
}

/// Asynchronous worker executing tasks from the queue.
pub struct TaskWorker {
    provider: Arc<dyn Provider>,
    channel: Arc<dyn Channel>,
    cache: Arc<ResponseCache>,
    knowledge: Arc<KnowledgeStore>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl TaskWorker {
    pub fn new(
        provider: Arc<dyn Provider>,
        channel: Arc<dyn Channel>,
        cache: Arc<ResponseCache>,
        knowledge: Arc<KnowledgeStore>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            provider,
            channel,
            cache,
            knowledge,
            max_attempts: config.max_attempts,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        }
    }

    /// Run `concurrency` worker slots over the shared queue receiver.
    ///
    /// Each slot takes one task at a time (prefetch 1); returns when the
    /// queue closes and every slot has drained.
    pub async fn run(self: Arc<Self>, rx: mpsc::Receiver<String>, concurrency: usize) {
        let rx = Arc::new(Mutex::new(rx));
        let mut slots = Vec::new();

        for slot in 0..concurrency.max(1) {
            let worker = self.clone();
            let rx = rx.clone();
            slots.push(tokio::spawn(async move {
                loop {
                    let wire = { rx.lock().await.recv().await };
                    let Some(wire) = wire else {
                        info!("worker slot {slot}: queue closed, stopping");
                        break;
                    };
                    match decode_task(&wire) {
                        Ok(task) => {
                            worker.process(task).await;
                        }
                        Err(e) => {
                            // A malformed broker message is dropped, not
                            // allowed to wedge the slot.
                            error!("worker slot {slot}: undecodable task, skipping: {e}");
                        }
                    }
                }
            }));
        }

        for slot in slots {
            let _ = slot.await;
        }
    }

    /// Drive one task to a terminal state.
    ///
    /// Executions are at-least-once from the queue's point of view; the
    /// worst case of a crash mid-task is a duplicate reply, which is an
    /// accepted trade-off.
    pub async fn process(&self, mut task: Task) -> TaskOutcome {
        let started = Instant::now();
        info!(
            platform = %task.platform,
            sender = %task.sender_id,
            task_id = %task.id,
            "task received"
        );

        let mut state = State::Generating;
        loop {
            state = match state {
                State::Generating => {
                    info!(
                        platform = %task.platform,
                        sender = %task.sender_id,
                        attempt = task.attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "generating"
                    );
                    let prompt = prompt::build(&task.text, &self.knowledge.formatted());
                    let hash = prompt::hash(&prompt);
                    match self
                        .cache
                        .get_or_generate(&hash, || self.provider.generate(&prompt))
                        .await
                    {
                        Ok(reply) => State::Delivering {
                            text: reply,
                            exhausted: false,
                        },
                        Err(e) if task.attempt + 1 < self.max_attempts => {
                            warn!(
                                platform = %task.platform,
                                sender = %task.sender_id,
                                attempt = task.attempt,
                                "generation failed, retrying: {e}"
                            );
                            task.attempt += 1;
                            tokio::time::sleep(self.retry_delay).await;
                            State::Generating
                        }
                        Err(e) => {
                            // Retries exhausted: answer with the canned
                            // reply matching the question instead.
                            error!(
                                platform = %task.platform,
                                sender = %task.sender_id,
                                attempt = task.attempt,
                                "generation exhausted, sending fallback: {e}"
                            );
                            State::Delivering {
                                text: fallback::reply_for(&task.text).to_string(),
                                exhausted: true,
                            }
                        }
                    }
                }
                State::Delivering { text, exhausted } => {
                    info!(
                        platform = %task.platform,
                        sender = %task.sender_id,
                        attempt = task.attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "delivering"
                    );
                    match self
                        .channel
                        .send(task.platform, &task.sender_id, &text)
                        .await
                    {
                        Ok(()) => {
                            let outcome = if exhausted {
                                TaskOutcome::ExhaustedFallbackSent
                            } else {
                                TaskOutcome::Succeeded
                            };
                            info!(
                                platform = %task.platform,
                                sender = %task.sender_id,
                                attempt = task.attempt,
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "task done: {outcome:?}"
                            );
                            return outcome;
                        }
                        Err(e) if task.attempt + 1 < self.max_attempts => {
                            // Re-deliver only: the reply is already in
                            // hand, a retry must not call the model again.
                            warn!(
                                platform = %task.platform,
                                sender = %task.sender_id,
                                attempt = task.attempt,
                                "delivery failed, retrying: {e}"
                            );
                            task.attempt += 1;
                            tokio::time::sleep(self.retry_delay).await;
                            State::Delivering { text, exhausted }
                        }
                        Err(e) => {
                            error!(
                                platform = %task.platform,
                                sender = %task.sender_id,
                                attempt = task.attempt,
                                "delivery exhausted: {e}"
                            );
                            // One best-effort apology; its own failure is
                            // logged and not retried.
                            if let Err(e2) = self
                                .channel
                                .send(
                                    task.platform,
                                    &task.sender_id,
                                    fallback::TECHNICAL_DIFFICULTIES,
                                )
                                .await
                            {
                                warn!(
                                    platform = %task.platform,
                                    sender = %task.sender_id,
                                    "best-effort fallback delivery also failed: {e2}"
                                );
                            }
                            info!(
                                platform = %task.platform,
                                sender = %task.sender_id,
                                attempt = task.attempt,
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "task done: ExhaustedFallbackSent"
                            );
                            return TaskOutcome::ExhaustedFallbackSent;
                        }
                    }
                }
            };
        }
    }
}
