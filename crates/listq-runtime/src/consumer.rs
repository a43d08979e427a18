//! # Consumer Loop Module
//!
//! Runs consume -> handle -> ack|nack against a [`Queue`] until told to stop.
//!
//! Every iteration is an isolation boundary. The handler runs in its own task
//! under a timeout, so a panic, a hang or an error inside business logic turns
//! into a requeue or a dead-letter and the worker keeps polling. Only store
//! errors reach the loop itself: transient ones are backed off, fatal ones
//! (cross-shard keys, bad configuration) stop the worker.
//!
//! Once the handler has returned, the ack, requeue or dead-letter decided for
//! the message is retried through store outages. A settlement that still
//! cannot be applied is kept and completed before the worker consumes again,
//! so a live worker never leaves a message behind in the processing list.

use crate::error::QueueError;
use crate::message::ReceivedMessage;
use crate::queue::Queue;
use crate::retry::{retry_transient, RetryPolicy, RetryState};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

// ============================================================================
// Handler Contract
// ============================================================================

/// What the loop should do with a message after the handler returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Processing succeeded; remove from the processing list
    Ack,
    /// Try again later; dead-lettered instead on the final delivery
    Requeue { reason: String },
    /// Never retry this message
    DeadLetter { reason: String },
    /// The handler already acked, nacked or dead-lettered the message
    Settled,
}

/// Failure raised by business logic
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Retryable handler failure: {message}")]
    Retryable { message: String },

    #[error("Permanent handler failure: {message}")]
    Permanent { message: String },

    #[error("Queue operation failed inside handler: {0}")]
    Queue(#[from] QueueError),
}

impl HandlerError {
    /// Build a retryable failure
    pub fn retryable(message: impl ToString) -> Self {
        Self::Retryable {
            message: message.to_string(),
        }
    }

    /// Build a permanent failure
    pub fn permanent(message: impl ToString) -> Self {
        Self::Permanent {
            message: message.to_string(),
        }
    }

    /// Check whether the message deserves another delivery
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Retryable { .. } => true,
            Self::Permanent { .. } => false,
            Self::Queue(e) => e.is_transient(),
        }
    }
}

/// Business logic invoked for each consumed message
///
/// The queue is passed in so handlers can settle the message themselves, for
/// example through a [`crate::gate::DependencyGate`]; they then return
/// [`Disposition::Settled`].
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(
        &self,
        queue: &Queue,
        message: &ReceivedMessage,
    ) -> Result<Disposition, HandlerError>;
}

// ============================================================================
// Configuration and Results
// ============================================================================

/// Consumer loop timing and retry bounds
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerConfig {
    /// Delay after the first empty poll
    pub poll_interval: Duration,
    /// Upper bound for the idle delay
    pub max_idle_delay: Duration,
    /// Time a single handler invocation may take
    pub handler_timeout: Duration,
    /// Deliveries allowed before a retryable failure is dead-lettered
    pub max_deliveries: u32,
    /// Backoff between polls while the store is failing
    pub store_backoff: RetryPolicy,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_idle_delay: Duration::from_secs(2),
            handler_timeout: Duration::from_secs(30),
            max_deliveries: 5,
            store_backoff: RetryPolicy::default(),
        }
    }
}

/// Result of one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// The ready list was empty
    Idle,
    Acked,
    Requeued,
    DeadLettered,
    /// The handler settled the message itself
    Settled,
}

/// Counters kept by a worker over its lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub worker_id: usize,
    pub acked: u64,
    pub requeued: u64,
    pub dead_lettered: u64,
    pub settled: u64,
    pub idle_polls: u64,
    pub store_errors: u64,
}

impl WorkerStats {
    fn record(&mut self, outcome: IterationOutcome) {
        match outcome {
            IterationOutcome::Idle => self.idle_polls += 1,
            IterationOutcome::Acked => self.acked += 1,
            IterationOutcome::Requeued => self.requeued += 1,
            IterationOutcome::DeadLettered => self.dead_lettered += 1,
            IterationOutcome::Settled => self.settled += 1,
        }
    }

    /// Messages this worker finished with, whatever the outcome
    pub fn processed(&self) -> u64 {
        self.acked + self.requeued + self.dead_lettered + self.settled
    }
}

// ============================================================================
// Consumer Loop
// ============================================================================

/// Store update decided for a consumed message
#[derive(Debug, Clone, PartialEq, Eq)]
enum Settlement {
    Ack,
    Requeue,
    DeadLetter { reason: String },
}

impl Settlement {
    fn operation(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Requeue => "nack",
            Self::DeadLetter { .. } => "dead_letter",
        }
    }
}

/// A settlement that has not reached the store yet
#[derive(Debug, Clone)]
struct PendingSettlement {
    message: ReceivedMessage,
    settlement: Settlement,
}

/// A single worker polling one queue
pub struct ConsumerLoop {
    queue: Arc<Queue>,
    handler: Arc<dyn MessageHandler>,
    config: ConsumerConfig,
    worker_id: usize,
    pending: Mutex<Option<PendingSettlement>>,
}

impl ConsumerLoop {
    pub fn new(
        queue: Arc<Queue>,
        handler: Arc<dyn MessageHandler>,
        config: ConsumerConfig,
        worker_id: usize,
    ) -> Self {
        Self {
            queue,
            handler,
            config,
            worker_id,
            pending: Mutex::new(None),
        }
    }

    /// Consume at most one message and settle it.
    ///
    /// Handler behavior never produces an `Err` here; only the store calls
    /// made by the loop itself do. If the previous iteration could not settle
    /// its message, this iteration finishes that settlement instead of
    /// consuming.
    pub async fn run_iteration(&self) -> Result<IterationOutcome, QueueError> {
        let pending = self.pending.lock().await.take();
        if let Some(pending) = pending {
            debug!(
                worker = self.worker_id,
                message_id = %pending.message.message_id,
                operation = pending.settlement.operation(),
                "Resuming deferred settlement"
            );
            return self.apply(pending).await;
        }

        let Some(message) = self.queue.consume().await? else {
            return Ok(IterationOutcome::Idle);
        };

        let result = self.invoke_handler(&message).await;
        match self.decide(&message, result) {
            Some(settlement) => self.apply(PendingSettlement { message, settlement }).await,
            None => Ok(IterationOutcome::Settled),
        }
    }

    /// Poll until `shutdown` flips to `true`.
    ///
    /// Returns early with the error when the store reports a fatal condition.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<WorkerStats, QueueError> {
        let mut stats = WorkerStats {
            worker_id: self.worker_id,
            ..Default::default()
        };
        let mut retry_state = RetryState::new();
        let mut idle_delay = self.config.poll_interval;

        info!(worker = self.worker_id, queue = %self.queue.name(), "Consumer started");

        loop {
            let stopping = *shutdown.borrow();
            if stopping {
                break;
            }

            let delay = match self.run_iteration().await {
                Ok(IterationOutcome::Idle) => {
                    stats.record(IterationOutcome::Idle);
                    retry_state.reset();
                    let delay = idle_delay;
                    idle_delay = (idle_delay * 2).min(self.config.max_idle_delay);
                    trace!(
                        worker = self.worker_id,
                        delay_ms = delay.as_millis() as u64,
                        "Queue empty"
                    );
                    delay
                }
                Ok(outcome) => {
                    stats.record(outcome);
                    retry_state.reset();
                    idle_delay = self.config.poll_interval;
                    Duration::ZERO
                }
                Err(e) if e.is_fatal() => {
                    error!(
                        worker = self.worker_id,
                        queue = %self.queue.name(),
                        error = %e,
                        "Consumer stopping on unrecoverable store error"
                    );
                    return Err(e);
                }
                Err(e) => {
                    stats.store_errors += 1;
                    let delay = retry_state.get_delay(&self.config.store_backoff);
                    retry_state.next_attempt();
                    warn!(
                        worker = self.worker_id,
                        queue = %self.queue.name(),
                        consecutive_failures = retry_state.attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Store error in consumer, backing off"
                    );
                    delay
                }
            };

            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    changed = shutdown.changed() => {
                        // Sender gone means nobody can stop us later either
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        if let Some(pending) = self.pending.lock().await.take() {
            warn!(
                worker = self.worker_id,
                queue = %self.queue.name(),
                message_id = %pending.message.message_id,
                operation = pending.settlement.operation(),
                "Consumer stopped before settling message; it stays in the processing list"
            );
        }

        info!(
            worker = self.worker_id,
            queue = %self.queue.name(),
            processed = stats.processed(),
            "Consumer stopped"
        );
        Ok(stats)
    }

    /// Run the handler in its own task so panics and hangs stay contained
    async fn invoke_handler(&self, message: &ReceivedMessage) -> Result<Disposition, HandlerError> {
        let handler = Arc::clone(&self.handler);
        let queue = Arc::clone(&self.queue);
        let owned = message.clone();
        let mut task = tokio::spawn(async move { handler.handle(&queue, &owned).await });

        match tokio::time::timeout(self.config.handler_timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) if join_error.is_panic() => {
                Err(HandlerError::retryable("handler panicked"))
            }
            Ok(Err(join_error)) => Err(HandlerError::retryable(join_error)),
            Err(_) => {
                task.abort();
                Err(HandlerError::retryable(format!(
                    "handler timed out after {:?}",
                    self.config.handler_timeout
                )))
            }
        }
    }

    /// Map the handler result to a store update; `None` when the handler
    /// settled the message itself
    fn decide(
        &self,
        message: &ReceivedMessage,
        result: Result<Disposition, HandlerError>,
    ) -> Option<Settlement> {
        match result {
            Ok(Disposition::Ack) => Some(Settlement::Ack),
            Ok(Disposition::Settled) => {
                debug!(worker = self.worker_id, message_id = %message.message_id, "Handler settled message");
                None
            }
            Ok(Disposition::Requeue { reason }) => Some(self.retry_or_dead_letter(message, &reason)),
            Ok(Disposition::DeadLetter { reason }) => Some(Settlement::DeadLetter { reason }),
            Err(e) => {
                error!(
                    worker = self.worker_id,
                    queue = %self.queue.name(),
                    message_id = %message.message_id,
                    delivery_count = message.delivery_count,
                    retryable = e.is_retryable(),
                    error = %e,
                    "Handler failed"
                );
                if e.is_retryable() {
                    Some(self.retry_or_dead_letter(message, &e.to_string()))
                } else {
                    Some(Settlement::DeadLetter {
                        reason: e.to_string(),
                    })
                }
            }
        }
    }

    fn retry_or_dead_letter(&self, message: &ReceivedMessage, reason: &str) -> Settlement {
        if message.is_final_attempt(self.config.max_deliveries) {
            Settlement::DeadLetter {
                reason: format!(
                    "delivery limit {} reached: {}",
                    self.config.max_deliveries, reason
                ),
            }
        } else {
            Settlement::Requeue
        }
    }

    /// Apply a settlement, retrying transient store failures.
    ///
    /// When the retries run out the settlement is parked for the next
    /// iteration and the error is returned so the loop backs off.
    async fn apply(&self, pending: PendingSettlement) -> Result<IterationOutcome, QueueError> {
        let target = &pending;
        let result = retry_transient(
            &self.config.store_backoff,
            pending.settlement.operation(),
            move || self.apply_once(target),
        )
        .await;

        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if e.is_transient() {
                    warn!(
                        worker = self.worker_id,
                        queue = %self.queue.name(),
                        message_id = %pending.message.message_id,
                        operation = pending.settlement.operation(),
                        error = %e,
                        "Settlement deferred until the store recovers"
                    );
                    *self.pending.lock().await = Some(pending);
                }
                Err(e)
            }
        }
    }

    /// One attempt; a repeat after the message left processing removes nothing
    async fn apply_once(&self, pending: &PendingSettlement) -> Result<IterationOutcome, QueueError> {
        let message = &pending.message;
        match &pending.settlement {
            Settlement::Ack => {
                self.queue.ack(message).await?;
                Ok(IterationOutcome::Acked)
            }
            Settlement::Requeue => {
                self.queue.nack(message).await?;
                Ok(IterationOutcome::Requeued)
            }
            Settlement::DeadLetter { reason } => {
                self.queue.dead_letter(message, reason).await?;
                Ok(IterationOutcome::DeadLettered)
            }
        }
    }
}

// ============================================================================
// Worker Pool
// ============================================================================

/// A set of independent consumer loops sharing one queue
pub struct ConsumerPool {
    shutdown: watch::Sender<bool>,
    finished: watch::Receiver<usize>,
    workers: Vec<JoinHandle<Result<WorkerStats, QueueError>>>,
}

impl ConsumerPool {
    /// Start `workers` consumer loops
    pub fn spawn(
        queue: Arc<Queue>,
        handler: Arc<dyn MessageHandler>,
        config: ConsumerConfig,
        workers: usize,
    ) -> Self {
        let (shutdown, receiver) = watch::channel(false);
        let (finished_tx, finished) = watch::channel(0usize);
        let finished_tx = Arc::new(finished_tx);

        let workers = (0..workers)
            .map(|worker_id| {
                let consumer = ConsumerLoop::new(
                    Arc::clone(&queue),
                    Arc::clone(&handler),
                    config.clone(),
                    worker_id,
                );
                let receiver = receiver.clone();
                let finished_tx = Arc::clone(&finished_tx);
                tokio::spawn(async move {
                    let result = consumer.run(receiver).await;
                    finished_tx.send_modify(|count| *count += 1);
                    result
                })
            })
            .collect();

        Self {
            shutdown,
            finished,
            workers,
        }
    }

    /// Number of workers started
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Resolve once every worker has stopped without being told to, which
    /// only happens on fatal store errors
    pub async fn stopped(&self) {
        let total = self.workers.len();
        let mut finished = self.finished.clone();
        // A closed channel means every worker task is gone as well
        let _ = finished.wait_for(|count| *count >= total).await;
    }

    /// Signal every worker to stop and wait for them.
    ///
    /// A worker that stopped on its own with a fatal error reports that
    /// error in its slot.
    pub async fn shutdown(self) -> Vec<Result<WorkerStats, QueueError>> {
        // Receivers may all be gone already if every worker failed
        let _ = self.shutdown.send(true);

        let mut results = Vec::with_capacity(self.workers.len());
        for worker in self.workers {
            let result = match worker.await {
                Ok(result) => result,
                Err(join_error) => Err(QueueError::store_unavailable(
                    "worker join",
                    join_error,
                )),
            };
            results.push(result);
        }
        results
    }
}

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;
