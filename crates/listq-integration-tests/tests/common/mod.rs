//! Common test utilities for listq integration tests
//!
//! This module provides:
//! - Queue and consumer fixtures over the in-memory store
//! - List invariant checks
//! - Polling helpers for worker pools

use listq_runtime::{
    ConsumerConfig, InMemoryListStore, Queue, QueueDepths, QueueKeys, QueueName,
    ReceivedMessage, RetryPolicy,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Queue named "orders" with hash-tagged keys
#[allow(dead_code)]
pub fn orders_queue(store: &InMemoryListStore) -> Arc<Queue> {
    let name = QueueName::new("orders".to_string()).unwrap();
    Arc::new(Queue::with_defaults(name, Arc::new(store.clone())).unwrap())
}

/// Consumer config with short delays and no jitter
#[allow(dead_code)]
pub fn fast_config(max_deliveries: u32) -> ConsumerConfig {
    ConsumerConfig {
        poll_interval: Duration::from_millis(5),
        max_idle_delay: Duration::from_millis(20),
        handler_timeout: Duration::from_secs(1),
        max_deliveries,
        store_backoff: RetryPolicy::new(
            3,
            Duration::from_millis(5),
            Duration::from_millis(20),
            2.0,
        )
        .without_jitter(),
    }
}

/// Message IDs currently held in a list
#[allow(dead_code)]
pub fn ids_in(store: &InMemoryListStore, key: &str) -> Vec<String> {
    store
        .snapshot_raw(key)
        .into_iter()
        .map(|stored| ReceivedMessage::from_stored(stored).message_id.to_string())
        .collect()
}

/// Fail if any message is present in more than one list of the queue
#[allow(dead_code)]
pub fn check_disjoint(store: &InMemoryListStore, keys: &QueueKeys) -> anyhow::Result<()> {
    let mut seen = HashSet::new();
    for key in [&keys.ready, &keys.processing, &keys.dead_letter] {
        for id in ids_in(store, key) {
            if !seen.insert(id.clone()) {
                anyhow::bail!("message {} present in more than one list (found again in {})", id, key);
            }
        }
    }
    Ok(())
}

/// Poll until ready and processing are both empty
#[allow(dead_code)]
pub async fn wait_until_drained(queue: &Queue) -> anyhow::Result<QueueDepths> {
    for _ in 0..1_000 {
        let depths = queue.depths().await?;
        if depths.ready == 0 && depths.processing == 0 {
            return Ok(depths);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    anyhow::bail!("queue {} did not drain", queue.name())
}
