//! At-least-once FIFO queue over a list store.
//!
//! Each logical queue owns three lists:
//!
//! ```text
//!   produce ──LPUSH──▶ [ready] ──RPOPLPUSH──▶ [processing] ──LREM──▶ (gone)   ack
//!                         ▲                        │
//!                         └────────replace─────────┤                          nack
//!                                                  └──replace──▶ [dead]       dead_letter
//! ```
//!
//! Moving a message between lists is always a single store call, so a
//! message is never observable in two lists at once. A consumer that dies
//! between `consume` and `ack` leaves its message in the processing list;
//! nothing here expires it. [`Queue::recover_stranded`] is the administrative
//! way back.

use crate::error::QueueError;
use crate::keys::{key_slot, QueueKeys, ShardKeyPlanner};
use crate::message::{Message, MessageId, QueueName, ReceivedMessage};
use crate::store::{ListStore, Partitioning};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Behavioral options for a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueOptions {
    /// Timeout applied to every store call
    pub operation_timeout: Duration,
    /// Keep exhausted messages in the dead-letter list; when off they are
    /// removed and logged
    pub dead_letter: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(5),
            dead_letter: true,
        }
    }
}

/// Number of elements in each list of a queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueDepths {
    pub ready: u64,
    pub processing: u64,
    pub dead_letter: u64,
}

/// A logical queue bound to its physical keys
///
/// # Example
///
/// ```rust
/// use listq_runtime::{InMemoryListStore, Queue, QueueName};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let name = QueueName::new("orders".to_string()).unwrap();
/// let queue = Queue::with_defaults(name, Arc::new(InMemoryListStore::new())).unwrap();
///
/// queue.produce("hello").await.unwrap();
/// let message = queue.consume().await.unwrap().unwrap();
/// assert_eq!(message.body_str().unwrap(), "hello");
/// queue.ack(&message).await.unwrap();
/// # });
/// ```
pub struct Queue {
    name: QueueName,
    keys: QueueKeys,
    store: Arc<dyn ListStore>,
    options: QueueOptions,
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("keys", &self.keys)
            .field("options", &self.options)
            .finish()
    }
}

impl Queue {
    /// Bind a queue to a store.
    ///
    /// Fails with [`QueueError::CrossShardOperation`] when the store is
    /// partitioned and the derived keys do not share a hash slot; a queue in
    /// that state could never move a message atomically.
    pub fn new(
        name: QueueName,
        planner: ShardKeyPlanner,
        store: Arc<dyn ListStore>,
        options: QueueOptions,
    ) -> Result<Self, QueueError> {
        let keys = planner.derive_keys(&name);

        if store.partitioning() == Partitioning::HashSlots {
            for other in [&keys.processing, &keys.dead_letter] {
                if key_slot(&keys.ready) != key_slot(other) {
                    error!(
                        queue = %name,
                        ready_key = %keys.ready,
                        other_key = %other,
                        hash_tags = planner.uses_hash_tags(),
                        "Queue keys resolve to different hash slots"
                    );
                    return Err(QueueError::CrossShardOperation {
                        source_key: keys.ready.clone(),
                        destination_key: other.clone(),
                    });
                }
            }
        }

        debug!(queue = %name, ready_key = %keys.ready, "Queue bound to store");
        Ok(Self {
            name,
            keys,
            store,
            options,
        })
    }

    /// Bind a queue with hash-tagged keys and default options
    pub fn with_defaults(name: QueueName, store: Arc<dyn ListStore>) -> Result<Self, QueueError> {
        Self::new(name, ShardKeyPlanner::default(), store, QueueOptions::default())
    }

    /// Logical name
    pub fn name(&self) -> &QueueName {
        &self.name
    }

    /// Physical keys
    pub fn keys(&self) -> &QueueKeys {
        &self.keys
    }

    /// Queue options
    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    /// Push a message onto the ready list.
    ///
    /// Durable once the store acknowledges the write. Store failures are
    /// returned to the caller, who decides whether to retry.
    pub async fn produce(&self, message: impl Into<Message>) -> Result<MessageId, QueueError> {
        let (message_id, stored) = message.into().encode()?;
        self.call("LPUSH", self.store.push_left(&self.keys.ready, &stored))
            .await?;

        debug!(queue = %self.name, message_id = %message_id, "Message produced");
        Ok(message_id)
    }

    /// Move the oldest ready message onto the processing list and return it.
    ///
    /// Returns `None` without blocking when the ready list is empty.
    pub async fn consume(&self) -> Result<Option<ReceivedMessage>, QueueError> {
        let stored = self
            .call(
                "RPOPLPUSH",
                self.store.pop_push(&self.keys.ready, &self.keys.processing),
            )
            .await
            .inspect_err(|e| {
                if matches!(e, QueueError::CrossShardOperation { .. }) {
                    error!(queue = %self.name, error = %e, "Atomic move refused by store");
                }
            })?;

        let Some(stored) = stored else {
            return Ok(None);
        };

        let message = ReceivedMessage::from_stored(stored);
        debug!(
            queue = %self.name,
            message_id = %message.message_id,
            delivery_count = message.delivery_count,
            "Message consumed"
        );
        Ok(Some(message))
    }

    /// Pop the oldest ready message without tracking it.
    ///
    /// At-most-once: the message is lost if the caller crashes before
    /// finishing with it.
    pub async fn consume_and_forget(&self) -> Result<Option<ReceivedMessage>, QueueError> {
        let stored = self
            .call("RPOP", self.store.pop_right(&self.keys.ready))
            .await?;
        Ok(stored.map(ReceivedMessage::from_stored))
    }

    /// Remove a message from the processing list.
    ///
    /// Returns the number of removed elements; zero (already acknowledged or
    /// never consumed) is not an error.
    pub async fn ack(&self, message: &ReceivedMessage) -> Result<u64, QueueError> {
        let removed = self
            .call(
                "LREM",
                self.store
                    .remove(&self.keys.processing, message.stored_value(), 0),
            )
            .await?;

        if removed == 0 {
            debug!(
                queue = %self.name,
                message_id = %message.message_id,
                "Ack for message not in processing list ignored"
            );
        } else {
            debug!(queue = %self.name, message_id = %message.message_id, "Message acknowledged");
        }
        Ok(removed)
    }

    /// Return a message to the ready list for another delivery.
    ///
    /// Removal from processing and the push onto ready happen in one store
    /// call. The requeued copy carries an incremented delivery count and goes
    /// to the back of the queue. Returns `false` when the message was no
    /// longer in the processing list, in which case nothing is pushed.
    pub async fn nack(&self, message: &ReceivedMessage) -> Result<bool, QueueError> {
        let requeued = message.requeued_value()?;
        let removed = self
            .call(
                "EVAL replace",
                self.store.replace(
                    &self.keys.processing,
                    &self.keys.ready,
                    message.stored_value(),
                    &requeued,
                ),
            )
            .await?;

        if removed == 0 {
            warn!(
                queue = %self.name,
                message_id = %message.message_id,
                "Requeue skipped, message not in processing list"
            );
            return Ok(false);
        }

        info!(
            queue = %self.name,
            message_id = %message.message_id,
            delivery_count = message.delivery_count + 1,
            "Message requeued"
        );
        Ok(true)
    }

    /// Move a message from processing to the dead-letter list.
    ///
    /// When dead-lettering is disabled the message is acknowledged instead
    /// and the drop is logged.
    pub async fn dead_letter(
        &self,
        message: &ReceivedMessage,
        reason: &str,
    ) -> Result<bool, QueueError> {
        if !self.options.dead_letter {
            let removed = self.ack(message).await?;
            warn!(
                queue = %self.name,
                message_id = %message.message_id,
                reason = %reason,
                "Message dropped after exhausting deliveries"
            );
            return Ok(removed > 0);
        }

        let dead = message.dead_lettered_value(reason)?;
        let removed = self
            .call(
                "EVAL replace",
                self.store.replace(
                    &self.keys.processing,
                    &self.keys.dead_letter,
                    message.stored_value(),
                    &dead,
                ),
            )
            .await?;

        if removed > 0 {
            warn!(
                queue = %self.name,
                message_id = %message.message_id,
                delivery_count = message.delivery_count,
                reason = %reason,
                "Message dead-lettered"
            );
        }
        Ok(removed > 0)
    }

    /// Move everything currently in the processing list back to ready.
    ///
    /// Only safe while no consumer is working on this queue: a message that
    /// is merely slow, not stranded, will be delivered twice.
    pub async fn recover_stranded(&self) -> Result<u64, QueueError> {
        let stranded = self
            .call("LLEN", self.store.len(&self.keys.processing))
            .await?;

        let mut recovered = 0;
        while recovered < stranded {
            let moved = self
                .call(
                    "RPOPLPUSH",
                    self.store.pop_push(&self.keys.processing, &self.keys.ready),
                )
                .await?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }

        if recovered > 0 {
            info!(queue = %self.name, recovered, "Stranded messages returned to ready list");
        }
        Ok(recovered)
    }

    /// Current list lengths
    pub async fn depths(&self) -> Result<QueueDepths, QueueError> {
        Ok(QueueDepths {
            ready: self.call("LLEN", self.store.len(&self.keys.ready)).await?,
            processing: self
                .call("LLEN", self.store.len(&self.keys.processing))
                .await?,
            dead_letter: self
                .call("LLEN", self.store.len(&self.keys.dead_letter))
                .await?,
        })
    }

    /// Apply the operation timeout to a store call
    async fn call<T, F>(&self, operation: &str, future: F) -> Result<T, QueueError>
    where
        F: Future<Output = Result<T, QueueError>>,
    {
        match tokio::time::timeout(self.options.operation_timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(QueueError::Timeout {
                operation: operation.to_string(),
                duration: self.options.operation_timeout,
            }),
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
