//! Error types for dashbeam-events

use thiserror::Error;

/// Errors that can occur in the event delivery subsystem
#[derive(Debug, Error)]
pub enum EventError {
    /// Broker connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Broker command failure (publish, get, set, pipeline, ...)
    #[error("Transport error during {op}: {reason}")]
    Transport {
        op: String,
        reason: String,
    },

    /// Serialization failure
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Wire bytes that could not be turned back into an event
    #[error("Decode error: {0}")]
    Decode(String),

    /// Event tag with no registered payload variant
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// Payload or producer attributes failed validation
    #[error("Validation failed for event type '{event_type}': {reason}")]
    Validation {
        event_type: String,
        reason: String,
    },

    /// Missing history or dead-letter key
    #[error("Not found: {0}")]
    NotFound(String),

    /// Handler retries exhausted for an event
    #[error("Delivery of event {event_id} exhausted after {attempts} attempts: {reason}")]
    DeliveryExhausted {
        event_id: String,
        attempts: u32,
        reason: String,
    },

    /// Empty or otherwise unusable topic name
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl EventError {
    /// Shorthand for a transport failure of operation `op`
    pub fn transport(op: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transport {
            op: op.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error originated in the broker rather than in the data
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Connection(_) | Self::Timeout(_)
        )
    }
}

/// Result type alias for event operations
pub type Result<T> = std::result::Result<T, EventError>;
