//! Tests for settings loading and validation

use super::*;
use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

const ENV_KEYS: &[&str] = &[
    "LISTQ__QUEUE__NAME",
    "LISTQ__QUEUE__MAX_DELIVERIES",
    "LISTQ__CONSUMER__WORKERS",
    "LISTQ__STORE__KIND",
    "LISTQ__STORE__URLS",
];

fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}

fn settings_file(extension: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(extension)
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn assert_invalid(settings: &ListqSettings) {
    match settings.validate() {
        Err(QueueError::Configuration(ConfigurationError::Invalid { .. })) => {}
        other => panic!("Expected invalid configuration, got {:?}", other),
    }
}

// ============================================================================
// Validation Tests
// ============================================================================

mod validation {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = ListqSettings::default();

        assert!(settings.validate().is_ok());
        assert_eq!(settings.queue.name, "default");
        assert!(settings.queue.hash_tags);
        assert_eq!(settings.store.kind, StoreKind::Memory);
    }

    #[test]
    fn test_invalid_queue_name_rejected() {
        let mut settings = ListqSettings::default();
        settings.queue.name = "{orders}".to_string();

        assert!(matches!(
            settings.validate(),
            Err(QueueError::Validation(_))
        ));
    }

    #[test]
    fn test_numeric_bounds_rejected() {
        let mut settings = ListqSettings::default();
        settings.queue.max_deliveries = 0;
        assert_invalid(&settings);

        let mut settings = ListqSettings::default();
        settings.consumer.workers = 0;
        assert_invalid(&settings);

        let mut settings = ListqSettings::default();
        settings.consumer.max_idle_delay_ms = 10;
        settings.consumer.poll_interval_ms = 100;
        assert_invalid(&settings);

        let mut settings = ListqSettings::default();
        settings.retry.backoff_multiplier = 0.5;
        assert_invalid(&settings);
    }

    #[test]
    fn test_zero_delays_rejected() {
        let mut settings = ListqSettings::default();
        settings.consumer.poll_interval_ms = 0;
        assert_invalid(&settings);

        let mut settings = ListqSettings::default();
        settings.consumer.poll_interval_ms = 0;
        settings.consumer.max_idle_delay_ms = 0;
        assert_invalid(&settings);

        let mut settings = ListqSettings::default();
        settings.consumer.handler_timeout_ms = 0;
        assert_invalid(&settings);

        let mut settings = ListqSettings::default();
        settings.retry.initial_delay_ms = 0;
        assert_invalid(&settings);
    }

    #[test]
    fn test_redis_requires_urls() {
        let mut settings = ListqSettings::default();
        settings.store.kind = StoreKind::Redis;

        match settings.validate() {
            Err(QueueError::Configuration(ConfigurationError::Missing { key })) => {
                assert_eq!(key, "store.urls");
            }
            other => panic!("Expected missing store.urls, got {:?}", other),
        }
    }

    #[test]
    fn test_cluster_requires_hash_tags() {
        let mut settings = ListqSettings::default();
        settings.store.kind = StoreKind::RedisCluster;
        settings.store.urls = vec!["redis://node-1:7000".to_string()];
        settings.queue.hash_tags = false;

        assert_invalid(&settings);
    }
}

// ============================================================================
// Conversion Tests
// ============================================================================

mod conversion {
    use super::*;

    #[test]
    fn test_runtime_views_follow_settings() {
        let mut settings = ListqSettings::default();
        settings.queue.name = "orders".to_string();
        settings.queue.hash_tags = false;
        settings.queue.operation_timeout_ms = 750;
        settings.queue.dead_letter = false;
        settings.queue.max_deliveries = 9;
        settings.consumer.handler_timeout_ms = 1_500;
        settings.retry.use_jitter = false;

        assert_eq!(settings.queue_name().unwrap().as_str(), "orders");
        assert!(!settings.key_planner().uses_hash_tags());
        assert_eq!(
            settings.queue_options(),
            QueueOptions {
                operation_timeout: Duration::from_millis(750),
                dead_letter: false,
            }
        );

        let consumer = settings.consumer_config();
        assert_eq!(consumer.poll_interval, Duration::from_millis(100));
        assert_eq!(consumer.max_idle_delay, Duration::from_secs(2));
        assert_eq!(consumer.handler_timeout, Duration::from_millis(1_500));
        assert_eq!(consumer.max_deliveries, 9);
        assert!(!consumer.store_backoff.use_jitter);
        assert_eq!(consumer.store_backoff.initial_delay, Duration::from_millis(100));
    }
}

// ============================================================================
// Loading Tests
// ============================================================================

mod loading {
    use super::*;

    #[test]
    #[serial]
    fn test_load_without_sources_gives_defaults() {
        clear_env();

        let settings = ListqSettings::load(None).unwrap();

        assert_eq!(settings, ListqSettings::default());
    }

    #[test]
    #[serial]
    fn test_load_toml_file() {
        clear_env();
        let file = settings_file(
            ".toml",
            r#"
[queue]
name = "orders"
max_deliveries = 7

[store]
kind = "redis_cluster"
urls = ["redis://node-1:7000", "redis://node-2:7001"]

[consumer]
workers = 2
"#,
        );

        let settings = ListqSettings::load(Some(file.path())).unwrap();

        assert_eq!(settings.queue.name, "orders");
        assert_eq!(settings.queue.max_deliveries, 7);
        assert!(settings.queue.hash_tags);
        assert_eq!(settings.store.kind, StoreKind::RedisCluster);
        assert_eq!(settings.store.urls.len(), 2);
        assert_eq!(settings.consumer.workers, 2);
        assert_eq!(settings.consumer.poll_interval_ms, 100);
    }

    #[test]
    #[serial]
    fn test_load_yaml_file() {
        clear_env();
        let file = settings_file(
            ".yaml",
            "queue:\n  name: invoices\n  dead_letter: false\n",
        );

        let settings = ListqSettings::load(Some(file.path())).unwrap();

        assert_eq!(settings.queue.name, "invoices");
        assert!(!settings.queue.dead_letter);
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        clear_env();
        let file = settings_file(".toml", "[queue]\nname = \"orders\"\n");
        std::env::set_var("LISTQ__QUEUE__NAME", "payments");
        std::env::set_var("LISTQ__CONSUMER__WORKERS", "8");
        std::env::set_var("LISTQ__STORE__KIND", "redis");
        std::env::set_var("LISTQ__STORE__URLS", "redis://a:6379,redis://b:6379");

        let result = ListqSettings::load(Some(file.path()));
        clear_env();

        let settings = result.unwrap();
        assert_eq!(settings.queue.name, "payments");
        assert_eq!(settings.consumer.workers, 8);
        assert_eq!(settings.store.kind, StoreKind::Redis);
        assert_eq!(
            settings.store.urls,
            vec!["redis://a:6379".to_string(), "redis://b:6379".to_string()]
        );
    }

    #[test]
    #[serial]
    fn test_missing_file_is_an_error() {
        clear_env();

        let result = ListqSettings::load(Some(Path::new("/nonexistent/listq.toml")));

        assert!(matches!(
            result,
            Err(QueueError::Configuration(ConfigurationError::Missing { .. }))
        ));
    }

    #[test]
    #[serial]
    fn test_malformed_file_is_an_error() {
        clear_env();
        let file = settings_file(".toml", "[queue\nname = ");

        let result = ListqSettings::load(Some(file.path()));

        assert!(matches!(
            result,
            Err(QueueError::Configuration(ConfigurationError::Parsing { .. }))
        ));
    }

    #[test]
    #[serial]
    fn test_loaded_settings_are_validated() {
        clear_env();
        std::env::set_var("LISTQ__QUEUE__MAX_DELIVERIES", "0");

        let result = ListqSettings::load(None);
        clear_env();

        assert!(matches!(
            result,
            Err(QueueError::Configuration(ConfigurationError::Invalid { .. }))
        ));
    }
}
