//! List store client interface.
//!
//! The queue only needs a handful of list primitives from the backing store.
//! Values are opaque bytes; nothing below the queue assumes they are UTF-8.
//! Implementations must make each call indivisible from the point of view of
//! other callers, and must reject [`ListStore::pop_push`] with
//! [`QueueError::CrossShardOperation`] when the two keys live on different
//! partitions.

use crate::error::QueueError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How the store distributes keys across nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Partitioning {
    /// Every key lives on one node
    Single,
    /// Keys are spread across Redis-cluster style hash slots
    HashSlots,
}

/// Interface implemented by list store backends (Redis, in-memory)
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Push a value onto the head (left) of a list
    async fn push_left(&self, key: &str, value: &[u8]) -> Result<(), QueueError>;

    /// Pop a value from the tail (right) of a list
    async fn pop_right(&self, key: &str) -> Result<Option<Vec<u8>>, QueueError>;

    /// Atomically pop the tail of `source` and push it onto the head of
    /// `destination`
    async fn pop_push(
        &self,
        source: &str,
        destination: &str,
    ) -> Result<Option<Vec<u8>>, QueueError>;

    /// Remove occurrences of `value`; `count == 0` removes all of them
    async fn remove(&self, key: &str, value: &[u8], count: i64) -> Result<u64, QueueError>;

    /// Atomically remove every occurrence of `old` from `source` and, if any
    /// were removed, push `new` onto the head of `destination`.
    ///
    /// Returns the number of removed occurrences; nothing is pushed when it
    /// is zero. Subject to the same co-location rule as [`ListStore::pop_push`].
    async fn replace(
        &self,
        source: &str,
        destination: &str,
        old: &[u8],
        new: &[u8],
    ) -> Result<u64, QueueError>;

    /// Number of elements in a list
    async fn len(&self, key: &str) -> Result<u64, QueueError>;

    /// Partitioning scheme of the store
    fn partitioning(&self) -> Partitioning;
}
