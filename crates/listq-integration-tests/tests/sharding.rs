//! Integration tests for shard-safe key derivation
//!
//! These tests verify:
//! - Queue keys share one hash slot when hash tags are used
//! - A partitioned store refuses queues whose keys span slots
//! - Cross-slot moves surface as errors instead of corrupting lists

use listq_runtime::settings::StoreSettings;
use listq_runtime::{
    key_slot, providers, InMemoryListStore, ListStore, Queue, QueueError, QueueName,
    QueueOptions, ShardKeyPlanner,
};
use std::sync::Arc;

fn orders() -> QueueName {
    QueueName::new("orders".to_string()).unwrap()
}

#[test]
fn test_orders_keys_differ_only_outside_hash_tag() {
    let keys = ShardKeyPlanner::default().derive_keys(&orders());

    assert_eq!(keys.ready, "{orders}");
    assert_eq!(keys.processing, "{orders}:PROCESSING");
    assert!(keys.processing.starts_with(&keys.ready));
    assert_eq!(key_slot(&keys.ready), key_slot(&keys.processing));
    assert!(keys.is_co_located());
}

#[tokio::test]
async fn test_sharded_store_accepts_tagged_queue() -> anyhow::Result<()> {
    let store = InMemoryListStore::sharded();
    let queue = Queue::new(
        orders(),
        ShardKeyPlanner::default(),
        Arc::new(store.clone()),
        QueueOptions::default(),
    )?;

    queue.produce("M1").await?;
    let message = queue.consume().await?.expect("M1 should be delivered");
    assert!(queue.nack(&message).await?);
    let message = queue.consume().await?.expect("M1 should be delivered again");
    assert_eq!(queue.ack(&message).await?, 1);
    Ok(())
}

#[test]
fn test_sharded_store_rejects_untagged_queue() {
    let result = Queue::new(
        orders(),
        ShardKeyPlanner::new(false),
        Arc::new(InMemoryListStore::sharded()),
        QueueOptions::default(),
    );

    assert!(matches!(
        result,
        Err(QueueError::CrossShardOperation { .. })
    ));
}

#[tokio::test]
async fn test_cross_slot_move_fails_and_leaves_source_intact() -> anyhow::Result<()> {
    let store = InMemoryListStore::sharded();
    assert_ne!(key_slot("orders"), key_slot("orders:PROCESSING"));

    store.push_left("orders", b"M1").await?;
    let result = store.pop_push("orders", "orders:PROCESSING").await;

    assert!(matches!(
        result,
        Err(QueueError::CrossShardOperation { .. })
    ));
    assert_eq!(store.snapshot("orders"), vec!["M1".to_string()]);
    assert!(store.snapshot("orders:PROCESSING").is_empty());
    Ok(())
}

#[tokio::test]
async fn test_store_from_settings_honors_sharding() -> anyhow::Result<()> {
    let settings = StoreSettings {
        sharded: true,
        ..Default::default()
    };
    let store = providers::connect(&settings).await?;

    let untagged = Queue::new(
        orders(),
        ShardKeyPlanner::new(false),
        Arc::clone(&store),
        QueueOptions::default(),
    );
    let tagged = Queue::new(
        orders(),
        ShardKeyPlanner::new(true),
        store,
        QueueOptions::default(),
    );

    assert!(untagged.is_err());
    assert!(tagged.is_ok());
    Ok(())
}
