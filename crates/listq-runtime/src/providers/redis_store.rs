//! Redis list store implementation.
//!
//! Standalone servers are reached through a [`ConnectionManager`], cluster
//! deployments through a [`ClusterConnection`]. Both are multiplexed handles
//! that are cheap to clone, so every store call takes its own clone and the
//! shared connection is never held across calls.
//!
//! Values travel as raw bulk strings in both directions, so producers that
//! write arbitrary bytes are handled like any other.
//!
//! Commands used: `LPUSH`, `RPOP`, `RPOPLPUSH`, `LREM`, `LLEN`, plus one Lua
//! script for the atomic remove-then-push. A cluster answers multi-key
//! commands across slots with `CROSSSLOT`, which is surfaced as
//! [`QueueError::CrossShardOperation`].

use crate::error::QueueError;
use crate::store::{ListStore, Partitioning};
use async_trait::async_trait;
use redis::aio::{ConnectionLike, ConnectionManager};
use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use redis::{RedisError, Script};
use tracing::{debug, info};

/// KEYS[1] source, KEYS[2] destination, ARGV[1] old value, ARGV[2] new value
const REPLACE_SCRIPT: &str = r#"
local removed = redis.call('LREM', KEYS[1], 0, ARGV[1])
if removed > 0 then
  redis.call('LPUSH', KEYS[2], ARGV[2])
end
return removed
"#;

/// Redis-backed list store
#[derive(Clone)]
pub struct RedisListStore<C> {
    connection: C,
    partitioning: Partitioning,
    replace_script: Script,
}

impl<C> RedisListStore<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    /// Wrap an existing connection
    pub fn from_connection(connection: C, partitioning: Partitioning) -> Self {
        Self {
            connection,
            partitioning,
            replace_script: Script::new(REPLACE_SCRIPT),
        }
    }
}

impl RedisListStore<ConnectionManager> {
    /// Connect to a standalone Redis server
    pub async fn connect(url: &str) -> Result<Self, QueueError> {
        let client =
            redis::Client::open(url).map_err(|e| map_redis_error("CONNECT", e, None))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| map_redis_error("CONNECT", e, None))?;

        info!(url = %url, "Connected to Redis list store");
        Ok(Self::from_connection(connection, Partitioning::Single))
    }
}

impl RedisListStore<ClusterConnection> {
    /// Connect to a Redis cluster through one or more seed nodes
    pub async fn connect_cluster(urls: &[String]) -> Result<Self, QueueError> {
        let client = ClusterClient::new(urls.to_vec())
            .map_err(|e| map_redis_error("CONNECT", e, None))?;
        let connection = client
            .get_async_connection()
            .await
            .map_err(|e| map_redis_error("CONNECT", e, None))?;

        info!(nodes = urls.len(), "Connected to Redis cluster list store");
        Ok(Self::from_connection(connection, Partitioning::HashSlots))
    }
}

/// Map a Redis error to the queue error taxonomy
fn map_redis_error(operation: &str, error: RedisError, keys: Option<(&str, &str)>) -> QueueError {
    if error.code() == Some("CROSSSLOT") {
        let (source, destination) = keys.unwrap_or(("", ""));
        return QueueError::CrossShardOperation {
            source_key: source.to_string(),
            destination_key: destination.to_string(),
        };
    }

    QueueError::store_unavailable(operation, error)
}

#[async_trait]
impl<C> ListStore for RedisListStore<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    async fn push_left(&self, key: &str, value: &[u8]) -> Result<(), QueueError> {
        let mut connection = self.connection.clone();
        let _length: i64 = redis::cmd("LPUSH")
            .arg(key)
            .arg(value)
            .query_async(&mut connection)
            .await
            .map_err(|e| map_redis_error("LPUSH", e, None))?;
        Ok(())
    }

    async fn pop_right(&self, key: &str) -> Result<Option<Vec<u8>>, QueueError> {
        let mut connection = self.connection.clone();
        let value: Option<Vec<u8>> = redis::cmd("RPOP")
            .arg(key)
            .query_async(&mut connection)
            .await
            .map_err(|e| map_redis_error("RPOP", e, None))?;
        Ok(value)
    }

    async fn pop_push(
        &self,
        source: &str,
        destination: &str,
    ) -> Result<Option<Vec<u8>>, QueueError> {
        let mut connection = self.connection.clone();
        let value: Option<Vec<u8>> = redis::cmd("RPOPLPUSH")
            .arg(source)
            .arg(destination)
            .query_async(&mut connection)
            .await
            .map_err(|e| map_redis_error("RPOPLPUSH", e, Some((source, destination))))?;

        debug!(
            source = %source,
            destination = %destination,
            moved = value.is_some(),
            "RPOPLPUSH completed"
        );
        Ok(value)
    }

    async fn remove(&self, key: &str, value: &[u8], count: i64) -> Result<u64, QueueError> {
        let mut connection = self.connection.clone();
        let removed: u64 = redis::cmd("LREM")
            .arg(key)
            .arg(count)
            .arg(value)
            .query_async(&mut connection)
            .await
            .map_err(|e| map_redis_error("LREM", e, None))?;
        Ok(removed)
    }

    async fn replace(
        &self,
        source: &str,
        destination: &str,
        old: &[u8],
        new: &[u8],
    ) -> Result<u64, QueueError> {
        let mut connection = self.connection.clone();
        let removed: u64 = self
            .replace_script
            .key(source)
            .key(destination)
            .arg(old)
            .arg(new)
            .invoke_async(&mut connection)
            .await
            .map_err(|e| map_redis_error("EVALSHA", e, Some((source, destination))))?;
        Ok(removed)
    }

    async fn len(&self, key: &str) -> Result<u64, QueueError> {
        let mut connection = self.connection.clone();
        let length: u64 = redis::cmd("LLEN")
            .arg(key)
            .query_async(&mut connection)
            .await
            .map_err(|e| map_redis_error("LLEN", e, None))?;
        Ok(length)
    }

    fn partitioning(&self) -> Partitioning {
        self.partitioning
    }
}
