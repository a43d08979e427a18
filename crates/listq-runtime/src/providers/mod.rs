//! List store implementations.
//!
//! This module contains concrete implementations of the `ListStore` trait for
//! different backends, plus the factory that builds one from settings.

pub mod memory;
pub mod redis_store;

pub use memory::InMemoryListStore;
pub use redis_store::RedisListStore;

use crate::error::{ConfigurationError, QueueError};
use crate::settings::{StoreKind, StoreSettings};
use crate::store::ListStore;
use std::sync::Arc;

/// Build the list store described by the settings
pub async fn connect(settings: &StoreSettings) -> Result<Arc<dyn ListStore>, QueueError> {
    match settings.kind {
        StoreKind::Memory => {
            let store = if settings.sharded {
                InMemoryListStore::sharded()
            } else {
                InMemoryListStore::new()
            };
            Ok(Arc::new(store))
        }
        StoreKind::Redis => {
            let url = settings.urls.first().ok_or_else(|| {
                QueueError::Configuration(ConfigurationError::Missing {
                    key: "store.urls".to_string(),
                })
            })?;
            Ok(Arc::new(RedisListStore::connect(url).await?))
        }
        StoreKind::RedisCluster => {
            if settings.urls.is_empty() {
                return Err(QueueError::Configuration(ConfigurationError::Missing {
                    key: "store.urls".to_string(),
                }));
            }
            Ok(Arc::new(RedisListStore::connect_cluster(&settings.urls).await?))
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
