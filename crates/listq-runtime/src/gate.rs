//! Consumer-side tolerance for records that are not visible yet.
//!
//! A producer may publish a message before the records it refers to are
//! committed or replicated to the replica the consumer reads from. When the
//! handler cannot find such a record the message is requeued instead of
//! failed, and the gap closes on a later delivery. The delivery count bounds
//! how long a permanently missing record can keep a message cycling.

use crate::consumer::HandlerError;
use crate::message::ReceivedMessage;
use crate::queue::Queue;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Read access to the records a message depends on
#[async_trait]
pub trait DependencyLookup: Send + Sync {
    type Record: Send;

    /// Fetch a record; `Ok(None)` means it is not visible (yet)
    async fn fetch(&self, key: &str) -> Result<Option<Self::Record>, HandlerError>;
}

/// Result of a gate check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome<R> {
    /// The dependency is present; continue processing
    Available(R),
    /// The message went back to the ready list
    Requeued { delivery_count: u32 },
    /// The dependency stayed missing for every allowed delivery
    DeadLettered,
    /// The message had already left the processing list (acked elsewhere or
    /// recovered); nothing was pushed
    NotInFlight,
}

impl<R> GateOutcome<R> {
    /// Check whether the handler still owns the message
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

/// Requeues messages whose dependency is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyGate {
    max_deliveries: u32,
}

impl DependencyGate {
    pub fn new(max_deliveries: u32) -> Self {
        Self { max_deliveries }
    }

    /// Look up `key` and settle the message if it is missing.
    ///
    /// On every outcome other than `Available` the message is no longer in
    /// the processing list and the handler should return
    /// [`crate::consumer::Disposition::Settled`].
    /// Lookup errors are returned untouched for the consumer loop to classify.
    pub async fn check<L>(
        &self,
        queue: &Queue,
        message: &ReceivedMessage,
        lookup: &L,
        key: &str,
    ) -> Result<GateOutcome<L::Record>, HandlerError>
    where
        L: DependencyLookup + ?Sized,
    {
        if let Some(record) = lookup.fetch(key).await? {
            debug!(message_id = %message.message_id, dependency = %key, "Dependency available");
            return Ok(GateOutcome::Available(record));
        }

        if message.is_final_attempt(self.max_deliveries) {
            let reason = format!(
                "dependency '{}' still missing after {} deliveries",
                key,
                message.attempt()
            );
            if !queue.dead_letter(message, &reason).await? {
                return Ok(GateOutcome::NotInFlight);
            }
            warn!(
                queue = %queue.name(),
                message_id = %message.message_id,
                dependency = %key,
                delivery_count = message.delivery_count,
                "Dependency never became visible"
            );
            return Ok(GateOutcome::DeadLettered);
        }

        if !queue.nack(message).await? {
            return Ok(GateOutcome::NotInFlight);
        }
        info!(
            queue = %queue.name(),
            message_id = %message.message_id,
            dependency = %key,
            attempt = message.attempt(),
            "Dependency missing, message requeued"
        );
        Ok(GateOutcome::Requeued {
            delivery_count: message.delivery_count + 1,
        })
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
