//! # Listq Runtime
//!
//! At-least-once FIFO queue built on the list primitives of a Redis-style
//! key-value store, with support for sharded (cluster) deployments.
//!
//! This library provides:
//! - Shard-safe key derivation using hash tags
//! - Produce / consume / ack / nack over a ready list and a processing list
//! - Dead-letter list and delivery counting to bound retries
//! - A dependency gate that requeues messages whose referenced records are
//!   not visible yet
//! - Consumer loops that contain handler failures per iteration
//! - Redis, Redis cluster and in-memory list stores
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Message structures and the stored envelope
//! - [`keys`] - Physical key derivation and hash-slot computation
//! - [`store`] - List store interface
//! - [`providers`] - List store implementations
//! - [`queue`] - Queue operations
//! - [`gate`] - Dependency gating
//! - [`consumer`] - Consumer loop and worker pool
//! - [`retry`] - Backoff policy
//! - [`settings`] - Configuration loading

// Module declarations
pub mod consumer;
pub mod error;
pub mod gate;
pub mod keys;
pub mod message;
pub mod providers;
pub mod queue;
pub mod retry;
pub mod settings;
pub mod store;

// Re-export commonly used types at crate root for convenience
pub use consumer::{
    ConsumerConfig, ConsumerLoop, ConsumerPool, Disposition, HandlerError, IterationOutcome,
    MessageHandler, WorkerStats,
};
pub use error::{ConfigurationError, QueueError, SerializationError, ValidationError};
pub use gate::{DependencyGate, DependencyLookup, GateOutcome};
pub use keys::{key_slot, QueueKeys, ShardKeyPlanner};
pub use message::{Message, MessageId, QueueName, ReceivedMessage, Timestamp};
pub use providers::{InMemoryListStore, RedisListStore};
pub use queue::{Queue, QueueDepths, QueueOptions};
pub use retry::{RetryPolicy, RetryState};
pub use settings::{ListqSettings, StoreKind};
pub use store::{ListStore, Partitioning};
