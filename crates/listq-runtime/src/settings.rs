//! Runtime settings and their loading.
//!
//! Sources (applied in order, later sources override earlier ones):
//!  1. An optional settings file (TOML, YAML or JSON, chosen by extension)
//!  2. Environment variables prefixed `LISTQ` with `__` as the nesting
//!     separator, e.g. `LISTQ__QUEUE__NAME=orders`
//!
//! Every field carries a serde default, so an empty environment yields a
//! usable in-memory configuration. A malformed file or an environment value
//! that cannot be coerced IS a hard error.

use crate::consumer::ConsumerConfig;
use crate::error::{ConfigurationError, QueueError};
use crate::keys::ShardKeyPlanner;
use crate::message::QueueName;
use crate::queue::QueueOptions;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for settings overrides
pub const ENV_PREFIX: &str = "LISTQ";

/// Top-level runtime settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListqSettings {
    pub queue: QueueSettings,
    pub store: StoreSettings,
    pub consumer: ConsumerSettings,
    pub retry: RetrySettings,
}

/// Logical queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Logical queue name
    pub name: String,
    /// Wrap keys in hash tags; required on any sharded store
    pub hash_tags: bool,
    /// Deliveries allowed before a message is dead-lettered
    pub max_deliveries: u32,
    /// Timeout applied to each store call
    pub operation_timeout_ms: u64,
    /// Keep exhausted messages in the dead-letter list instead of dropping them
    pub dead_letter: bool,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            hash_tags: true,
            max_deliveries: 5,
            operation_timeout_ms: 5_000,
            dead_letter: true,
        }
    }
}

/// Backing store selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Memory,
    Redis,
    RedisCluster,
}

/// List store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub kind: StoreKind,
    /// Server URL (standalone) or seed node URLs (cluster)
    pub urls: Vec<String>,
    /// In-memory only: simulate hash-slot partitioning
    pub sharded: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            urls: Vec::new(),
            sharded: false,
        }
    }
}

/// Consumer loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerSettings {
    pub workers: usize,
    pub poll_interval_ms: u64,
    pub max_idle_delay_ms: u64,
    pub handler_timeout_ms: u64,
    /// Requeue everything left in the processing list before starting
    pub recover_on_start: bool,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval_ms: 100,
            max_idle_delay_ms: 2_000,
            handler_timeout_ms: 30_000,
            recover_on_start: false,
        }
    }
}

/// Store error backoff settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub use_jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            use_jitter: policy.use_jitter,
        }
    }
}

impl ListqSettings {
    /// Load settings from an optional file plus `LISTQ__*` environment
    /// variables
    pub fn load(path: Option<&Path>) -> Result<Self, QueueError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigurationError::Missing {
                    key: path.display().to_string(),
                }
                .into());
            }
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("store.urls")
                .try_parsing(true),
        );

        let settings: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), QueueError> {
        QueueName::new(self.queue.name.clone())?;

        if self.queue.max_deliveries == 0 {
            return Err(invalid("queue.max_deliveries must be at least 1"));
        }
        if self.queue.operation_timeout_ms == 0 {
            return Err(invalid("queue.operation_timeout_ms must be positive"));
        }
        if self.consumer.workers == 0 {
            return Err(invalid("consumer.workers must be at least 1"));
        }
        if self.consumer.poll_interval_ms == 0 {
            return Err(invalid("consumer.poll_interval_ms must be positive"));
        }
        if self.consumer.handler_timeout_ms == 0 {
            return Err(invalid("consumer.handler_timeout_ms must be positive"));
        }
        if self.consumer.max_idle_delay_ms < self.consumer.poll_interval_ms {
            return Err(invalid(
                "consumer.max_idle_delay_ms must not be below consumer.poll_interval_ms",
            ));
        }
        if self.retry.initial_delay_ms == 0 {
            return Err(invalid("retry.initial_delay_ms must be positive"));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(invalid("retry.backoff_multiplier must be at least 1.0"));
        }
        if self.store.kind != StoreKind::Memory && self.store.urls.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "store.urls".to_string(),
            }
            .into());
        }
        if self.store.kind == StoreKind::RedisCluster && !self.queue.hash_tags {
            return Err(invalid(
                "queue.hash_tags must be enabled for a redis_cluster store",
            ));
        }

        Ok(())
    }

    /// Validated queue name
    pub fn queue_name(&self) -> Result<QueueName, QueueError> {
        Ok(QueueName::new(self.queue.name.clone())?)
    }

    /// Key planner matching the hash-tag setting
    pub fn key_planner(&self) -> ShardKeyPlanner {
        ShardKeyPlanner::new(self.queue.hash_tags)
    }

    /// Queue construction options
    pub fn queue_options(&self) -> QueueOptions {
        QueueOptions {
            operation_timeout: Duration::from_millis(self.queue.operation_timeout_ms),
            dead_letter: self.queue.dead_letter,
        }
    }

    /// Backoff policy for store failures
    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.initial_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
            self.retry.backoff_multiplier,
        );
        if self.retry.use_jitter {
            policy
        } else {
            policy.without_jitter()
        }
    }

    /// Consumer loop configuration
    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            poll_interval: Duration::from_millis(self.consumer.poll_interval_ms),
            max_idle_delay: Duration::from_millis(self.consumer.max_idle_delay_ms),
            handler_timeout: Duration::from_millis(self.consumer.handler_timeout_ms),
            max_deliveries: self.queue.max_deliveries,
            store_backoff: self.retry_policy(),
        }
    }
}

fn invalid(message: &str) -> QueueError {
    ConfigurationError::Invalid {
        message: message.to_string(),
    }
    .into()
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
