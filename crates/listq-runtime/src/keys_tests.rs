//! Tests for key derivation and slot computation.

use super::*;

fn orders() -> QueueName {
    QueueName::new("orders".to_string()).unwrap()
}

#[test]
fn test_known_redis_slots() {
    assert_eq!(key_slot("foo"), 12182);
    assert_eq!(key_slot("{orders}"), 105);
    assert_eq!(key_slot("orders"), 105);
    assert_eq!(key_slot("{user1000}.following"), key_slot("{user1000}.followers"));
}

#[test]
fn test_hash_tag_rules() {
    assert_eq!(key_slot("{orders}:PROCESSING"), key_slot("orders"));
    // Empty tag hashes the whole key
    assert_ne!(key_slot("{}orders"), key_slot("orders"));
    // Only the first tag counts
    assert_eq!(key_slot("foo{bar}{zap}"), key_slot("bar"));
    assert_eq!(key_slot("foo{{bar}}"), key_slot("{bar"));
    assert_eq!(key_slot("foo{bar"), key_slot("foo{bar"));
}

#[test]
fn test_derive_keys_with_hash_tags() {
    let keys = ShardKeyPlanner::default().derive_keys(&orders());

    assert_eq!(keys.ready, "{orders}");
    assert_eq!(keys.processing, "{orders}:PROCESSING");
    assert_eq!(keys.dead_letter, "{orders}:DEAD");
}

#[test]
fn test_tagged_keys_differ_only_outside_tag() {
    let keys = ShardKeyPlanner::new(true).derive_keys(&orders());

    assert!(keys.processing.starts_with(&keys.ready));
    assert_eq!(key_slot(&keys.ready), key_slot(&keys.processing));
    assert!(keys.is_co_located());
}

#[test]
fn test_untagged_keys_are_not_co_located() {
    let keys = ShardKeyPlanner::new(false).derive_keys(&orders());

    assert_eq!(keys.ready, "orders");
    assert_eq!(keys.processing, "orders:PROCESSING");
    assert_ne!(key_slot(&keys.ready), key_slot(&keys.processing));
    assert!(!keys.is_co_located());
}

#[test]
fn test_co_location_holds_across_names() {
    let planner = ShardKeyPlanner::default();
    for name in ["a", "payments", "billing.invoices:v2", "x-y_z"] {
        let keys = planner.derive_keys(&QueueName::new(name.to_string()).unwrap());
        assert!(keys.is_co_located(), "keys for {} should co-locate", name);
    }
}

#[test]
fn test_slots_listing() {
    let keys = ShardKeyPlanner::default().derive_keys(&orders());
    let slots = keys.slots();

    assert_eq!(slots[0].0, "{orders}");
    assert!(slots.iter().all(|(_, slot)| *slot == slots[0].1));
    assert!(slots[0].1 < HASH_SLOTS);
}
