//! Message types for queue operations including core domain identifiers.
//!
//! Messages are stored in the list store as JSON envelopes. The exact stored
//! bytes are kept on every [`ReceivedMessage`] because acknowledgement removes
//! the element from the processing list by value.

use crate::error::{SerializationError, ValidationError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated logical queue name
///
/// Braces are never allowed because the name is wrapped in a hash tag when
/// physical keys are derived.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        if name.is_empty() || name.len() > 200 {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: "must be 1-200 characters".to_string(),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric, '-', '_', '.' and ':' allowed".to_string(),
            });
        }

        if name.starts_with(':') || name.ends_with(':') {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "no leading or trailing ':'".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Unique identifier for messages within the queue system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

/// Attribute recording why a message was dead-lettered
pub const DEAD_LETTER_REASON_ATTRIBUTE: &str = "dead_letter_reason";

// ============================================================================
// Wire Envelope
// ============================================================================

/// Stored representation of a message inside a list
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    id: MessageId,
    #[serde(with = "bytes_serde")]
    body: Bytes,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    attributes: HashMap<String, String>,
    enqueued_at: Timestamp,
    #[serde(default)]
    delivery_count: u32,
}

impl Envelope {
    fn encode(&self) -> Result<Vec<u8>, SerializationError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Custom serialization for Bytes
mod bytes_serde {
    use base64::{engine::general_purpose, Engine as _};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = general_purpose::STANDARD.encode(bytes);
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let decoded = general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)?;
        Ok(Bytes::from(decoded))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message to be produced onto a queue
#[derive(Debug, Clone)]
pub struct Message {
    pub body: Bytes,
    pub attributes: HashMap<String, String>,
}

impl Message {
    /// Create new message with body
    pub fn new(body: Bytes) -> Self {
        Self {
            body,
            attributes: HashMap::new(),
        }
    }

    /// Add message attribute
    pub fn with_attribute(mut self, key: String, value: String) -> Self {
        self.attributes.insert(key, value);
        self
    }

    /// Encode as a fresh envelope, returning the assigned ID and stored bytes
    pub(crate) fn encode(&self) -> Result<(MessageId, Vec<u8>), SerializationError> {
        let envelope = Envelope {
            id: MessageId::new(),
            body: self.body.clone(),
            attributes: self.attributes.clone(),
            enqueued_at: Timestamp::now(),
            delivery_count: 0,
        };
        let stored = envelope.encode()?;
        Ok((envelope.id, stored))
    }
}

impl From<&str> for Message {
    fn from(body: &str) -> Self {
        Self::new(Bytes::copy_from_slice(body.as_bytes()))
    }
}

impl From<String> for Message {
    fn from(body: String) -> Self {
        Self::new(Bytes::from(body))
    }
}

/// A message taken off the ready list
///
/// Identity for acknowledgement is the stored value, so two deliveries
/// compare equal only if they were read from the same list element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub body: Bytes,
    pub attributes: HashMap<String, String>,
    pub enqueued_at: Timestamp,
    /// Number of earlier deliveries that ended in a requeue
    pub delivery_count: u32,
    stored: Vec<u8>,
}

impl ReceivedMessage {
    /// Rebuild a message from the exact value held in the store.
    ///
    /// Values written by producers that do not use the envelope format,
    /// including ones that are not valid UTF-8, are accepted as bare payloads.
    pub fn from_stored(stored: impl Into<Vec<u8>>) -> Self {
        let stored = stored.into();
        match serde_json::from_slice::<Envelope>(&stored) {
            Ok(envelope) => Self {
                message_id: envelope.id,
                body: envelope.body,
                attributes: envelope.attributes,
                enqueued_at: envelope.enqueued_at,
                delivery_count: envelope.delivery_count,
                stored,
            },
            Err(_) => Self {
                message_id: MessageId::new(),
                body: Bytes::copy_from_slice(&stored),
                attributes: HashMap::new(),
                enqueued_at: Timestamp::now(),
                delivery_count: 0,
                stored,
            },
        }
    }

    /// Exact stored value used for removal by value
    pub fn stored_value(&self) -> &[u8] {
        &self.stored
    }

    /// Body interpreted as UTF-8
    pub fn body_str(&self) -> Result<&str, SerializationError> {
        std::str::from_utf8(&self.body).map_err(|_| SerializationError::InvalidUtf8)
    }

    /// Look up a message attribute
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// One-based number of the delivery currently being processed
    pub fn attempt(&self) -> u32 {
        self.delivery_count.saturating_add(1)
    }

    /// Check whether this delivery is the last one allowed
    pub fn is_final_attempt(&self, max_deliveries: u32) -> bool {
        self.attempt() >= max_deliveries
    }

    /// Encode the value to push back onto the ready list on requeue
    pub(crate) fn requeued_value(&self) -> Result<Vec<u8>, SerializationError> {
        Envelope {
            id: self.message_id.clone(),
            body: self.body.clone(),
            attributes: self.attributes.clone(),
            enqueued_at: self.enqueued_at.clone(),
            delivery_count: self.delivery_count.saturating_add(1),
        }
        .encode()
    }

    /// Encode the value to push onto the dead-letter list
    pub(crate) fn dead_lettered_value(&self, reason: &str) -> Result<Vec<u8>, SerializationError> {
        let mut attributes = self.attributes.clone();
        attributes.insert(DEAD_LETTER_REASON_ATTRIBUTE.to_string(), reason.to_string());
        Envelope {
            id: self.message_id.clone(),
            body: self.body.clone(),
            attributes,
            enqueued_at: self.enqueued_at.clone(),
            delivery_count: self.delivery_count,
        }
        .encode()
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
