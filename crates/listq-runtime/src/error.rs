//! Error types for queue operations.

use std::time::Duration;
use thiserror::Error;

/// Comprehensive error type for all queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("List store unavailable during {operation}: {message}")]
    StoreUnavailable { operation: String, message: String },

    #[error("Store operation {operation} timed out after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error(
        "Keys '{source_key}' and '{destination_key}' resolve to different shards; \
         atomic move refused"
    )]
    CrossShardOperation {
        source_key: String,
        destination_key: String,
    },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl QueueError {
    /// Build a `StoreUnavailable` error for the named store operation
    pub fn store_unavailable(operation: &str, message: impl ToString) -> Self {
        Self::StoreUnavailable {
            operation: operation.to_string(),
            message: message.to_string(),
        }
    }

    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::StoreUnavailable { .. } => true,
            Self::Timeout { .. } => true,
            Self::CrossShardOperation { .. } => false,
            Self::Serialization(_) => false,
            Self::Configuration(_) => false,
            Self::Validation(_) => false,
        }
    }

    /// Check if error indicates a deployment mistake that no amount of
    /// retrying will fix
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CrossShardOperation { .. } | Self::Configuration(_)
        )
    }
}

/// Errors during message serialization/deserialization
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Message body is not valid UTF-8")]
    InvalidUtf8,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
