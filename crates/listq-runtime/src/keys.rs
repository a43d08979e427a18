//! Physical key derivation for a logical queue.
//!
//! A queue touches up to three lists (ready, processing, dead-letter) and
//! moves elements between the first two with a single store command. On a
//! sharded store that command only works if every key lands in the same
//! partition, so the logical name is wrapped in a hash tag (`{name}`) and the
//! per-list suffixes are appended outside of it.

use crate::message::QueueName;
use redis::cluster_routing::get_slot;
use serde::{Deserialize, Serialize};

/// Number of hash slots in a Redis cluster keyspace
pub const HASH_SLOTS: u16 = 16384;

/// Suffix appended to the processing list key
pub const PROCESSING_SUFFIX: &str = ":PROCESSING";

/// Suffix appended to the dead-letter list key
pub const DEAD_LETTER_SUFFIX: &str = ":DEAD";

/// The set of physical keys backing one logical queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueKeys {
    pub ready: String,
    pub processing: String,
    pub dead_letter: String,
}

impl QueueKeys {
    /// Check whether ready and processing hash to the same slot
    pub fn is_co_located(&self) -> bool {
        key_slot(&self.ready) == key_slot(&self.processing)
            && key_slot(&self.ready) == key_slot(&self.dead_letter)
    }

    /// Iterate over all keys with their hash slots
    pub fn slots(&self) -> [(&str, u16); 3] {
        [
            (self.ready.as_str(), key_slot(&self.ready)),
            (self.processing.as_str(), key_slot(&self.processing)),
            (self.dead_letter.as_str(), key_slot(&self.dead_letter)),
        ]
    }
}

/// Derives queue keys from logical names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardKeyPlanner {
    hash_tags: bool,
}

impl Default for ShardKeyPlanner {
    fn default() -> Self {
        Self { hash_tags: true }
    }
}

impl ShardKeyPlanner {
    /// Create a planner; `hash_tags` must be on for any sharded deployment
    pub fn new(hash_tags: bool) -> Self {
        Self { hash_tags }
    }

    /// Whether derived keys are wrapped in hash tags
    pub fn uses_hash_tags(&self) -> bool {
        self.hash_tags
    }

    /// Derive ready, processing and dead-letter keys for a queue
    pub fn derive_keys(&self, name: &QueueName) -> QueueKeys {
        let base = if self.hash_tags {
            format!("{{{}}}", name.as_str())
        } else {
            name.as_str().to_string()
        };

        QueueKeys {
            processing: format!("{}{}", base, PROCESSING_SUFFIX),
            dead_letter: format!("{}{}", base, DEAD_LETTER_SUFFIX),
            ready: base,
        }
    }
}

/// Redis cluster hash slot for a key.
///
/// Only the first non-empty `{...}` section is hashed when one is present,
/// which is what lets the tagged queue keys share a slot.
pub fn key_slot(key: &str) -> u16 {
    get_slot(key.as_bytes())
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
