//! Tests for error types.

use super::*;

#[test]
fn test_error_transience() {
    assert!(QueueError::store_unavailable("LPUSH", "connection refused").is_transient());

    assert!(QueueError::Timeout {
        operation: "RPOPLPUSH".to_string(),
        duration: Duration::from_secs(5),
    }
    .is_transient());

    assert!(!QueueError::CrossShardOperation {
        source_key: "orders".to_string(),
        destination_key: "orders:PROCESSING".to_string(),
    }
    .is_transient());

    assert!(!QueueError::Validation(ValidationError::Required {
        field: "queue_name".to_string(),
    })
    .is_transient());
}

#[test]
fn test_cross_shard_is_fatal() {
    let error = QueueError::CrossShardOperation {
        source_key: "orders".to_string(),
        destination_key: "orders:PROCESSING".to_string(),
    };

    assert!(error.is_fatal());
    assert!(!QueueError::store_unavailable("RPOP", "reset by peer").is_fatal());
}

#[test]
fn test_cross_shard_message_names_both_keys() {
    let error = QueueError::CrossShardOperation {
        source_key: "orders".to_string(),
        destination_key: "orders:PROCESSING".to_string(),
    };

    let text = error.to_string();
    assert!(text.contains("'orders'"));
    assert!(text.contains("'orders:PROCESSING'"));
}
