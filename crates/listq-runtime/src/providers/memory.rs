//! In-memory list store implementation for testing and development.
//!
//! This module provides a fully functional in-memory list store that:
//! - Implements the push/pop/move/remove primitives with list semantics
//! - Optionally simulates hash-slot partitioning, refusing cross-slot moves
//! - Can be switched unavailable to exercise store failure paths
//! - Provides thread-safe concurrent access

use crate::error::QueueError;
use crate::keys::key_slot;
use crate::store::{ListStore, Partitioning};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Lists keyed by name; head of each list is the front of the deque
type Lists = HashMap<String, VecDeque<Vec<u8>>>;

/// In-memory list store
#[derive(Clone)]
pub struct InMemoryListStore {
    lists: Arc<RwLock<Lists>>,
    partitioning: Partitioning,
    available: Arc<AtomicBool>,
}

impl InMemoryListStore {
    /// Create a store where every key lives on one node
    pub fn new() -> Self {
        Self::with_partitioning(Partitioning::Single)
    }

    /// Create a store that simulates Redis cluster hash slots
    pub fn sharded() -> Self {
        Self::with_partitioning(Partitioning::HashSlots)
    }

    /// Create a store with an explicit partitioning scheme
    pub fn with_partitioning(partitioning: Partitioning) -> Self {
        Self {
            lists: Arc::new(RwLock::new(HashMap::new())),
            partitioning,
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate the store going down or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Snapshot a list from head to tail, decoding values as UTF-8 (lossy)
    pub fn snapshot(&self, key: &str) -> Vec<String> {
        self.snapshot_raw(key)
            .into_iter()
            .map(|value| String::from_utf8_lossy(&value).into_owned())
            .collect()
    }

    /// Snapshot a list from head to tail with the exact stored bytes
    pub fn snapshot_raw(&self, key: &str) -> Vec<Vec<u8>> {
        match self.lists.read() {
            Ok(lists) => lists
                .get(key)
                .map(|list| list.iter().cloned().collect())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    fn check_available(&self, operation: &str) -> Result<(), QueueError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(QueueError::store_unavailable(
                operation,
                "in-memory store marked unavailable",
            ))
        }
    }

    fn check_co_located(&self, source: &str, destination: &str) -> Result<(), QueueError> {
        if self.partitioning == Partitioning::HashSlots && key_slot(source) != key_slot(destination)
        {
            return Err(QueueError::CrossShardOperation {
                source_key: source.to_string(),
                destination_key: destination.to_string(),
            });
        }
        Ok(())
    }

    fn read(&self, operation: &str) -> Result<RwLockReadGuard<'_, Lists>, QueueError> {
        self.check_available(operation)?;
        self.lists
            .read()
            .map_err(|_| QueueError::store_unavailable(operation, "storage lock poisoned"))
    }

    fn write(&self, operation: &str) -> Result<RwLockWriteGuard<'_, Lists>, QueueError> {
        self.check_available(operation)?;
        self.lists
            .write()
            .map_err(|_| QueueError::store_unavailable(operation, "storage lock poisoned"))
    }
}

impl Default for InMemoryListStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ListStore for InMemoryListStore {
    async fn push_left(&self, key: &str, value: &[u8]) -> Result<(), QueueError> {
        let mut lists = self.write("LPUSH")?;
        lists
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_vec());
        Ok(())
    }

    async fn pop_right(&self, key: &str) -> Result<Option<Vec<u8>>, QueueError> {
        let mut lists = self.write("RPOP")?;
        let value = lists.get_mut(key).and_then(VecDeque::pop_back);
        if lists.get(key).is_some_and(VecDeque::is_empty) {
            lists.remove(key);
        }
        Ok(value)
    }

    async fn pop_push(
        &self,
        source: &str,
        destination: &str,
    ) -> Result<Option<Vec<u8>>, QueueError> {
        self.check_co_located(source, destination)?;

        let mut lists = self.write("RPOPLPUSH")?;
        let value = match lists.get_mut(source).and_then(VecDeque::pop_back) {
            Some(value) => value,
            None => return Ok(None),
        };
        if lists.get(source).is_some_and(VecDeque::is_empty) {
            lists.remove(source);
        }
        lists
            .entry(destination.to_string())
            .or_default()
            .push_front(value.clone());
        Ok(Some(value))
    }

    async fn remove(&self, key: &str, value: &[u8], count: i64) -> Result<u64, QueueError> {
        let mut lists = self.write("LREM")?;
        let Some(list) = lists.get_mut(key) else {
            return Ok(0);
        };

        let limit = if count == 0 {
            usize::MAX
        } else {
            count.unsigned_abs() as usize
        };
        let mut removed = 0usize;

        if count >= 0 {
            // Head to tail
            let mut index = 0;
            while index < list.len() && removed < limit {
                if list[index] == value {
                    list.remove(index);
                    removed += 1;
                } else {
                    index += 1;
                }
            }
        } else {
            // Tail to head
            let mut index = list.len();
            while index > 0 && removed < limit {
                index -= 1;
                if list[index] == value {
                    list.remove(index);
                    removed += 1;
                }
            }
        }

        if list.is_empty() {
            lists.remove(key);
        }
        Ok(removed as u64)
    }

    async fn replace(
        &self,
        source: &str,
        destination: &str,
        old: &[u8],
        new: &[u8],
    ) -> Result<u64, QueueError> {
        self.check_co_located(source, destination)?;

        let mut lists = self.write("EVAL replace")?;
        let removed = match lists.get_mut(source) {
            Some(list) => {
                let before = list.len();
                list.retain(|value| value.as_slice() != old);
                (before - list.len()) as u64
            }
            None => 0,
        };
        if lists.get(source).is_some_and(VecDeque::is_empty) {
            lists.remove(source);
        }
        if removed > 0 {
            lists
                .entry(destination.to_string())
                .or_default()
                .push_front(new.to_vec());
        }
        Ok(removed)
    }

    async fn len(&self, key: &str) -> Result<u64, QueueError> {
        let lists = self.read("LLEN")?;
        Ok(lists.get(key).map_or(0, |list| list.len() as u64))
    }

    fn partitioning(&self) -> Partitioning {
        self.partitioning
    }
}
