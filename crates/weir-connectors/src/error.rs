//! Error types shared by all connectors.

use std::time::Duration;

/// Errors produced by connector operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// A required configuration key is absent.
    #[error("missing required configuration key: '{0}'")]
    MissingConfig(String),

    /// A configuration value is present but invalid.
    #[error("invalid configuration: {0}")]
    ConfigurationError(String),

    /// Establishing a connection to the external system failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Reading from the external system failed.
    #[error("read error: {0}")]
    ReadError(String),

    /// Writing to the external system failed.
    #[error("write error: {0}")]
    WriteError(String),

    /// A send did not complete within the per-send deadline.
    #[error("send timed out after {elapsed:?}")]
    SendTimeout {
        /// The deadline that was exceeded.
        elapsed: Duration,
    },

    /// An operation was invoked in the wrong lifecycle state.
    #[error("invalid state: expected {expected}, actual {actual}")]
    InvalidState {
        /// The state the operation requires.
        expected: String,
        /// The state the connector was in.
        actual: String,
    },

    /// JSON serialization/deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Broker client error passthrough.
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// The internal channel to a reader task closed unexpectedly.
    #[error("internal channel closed: {0}")]
    ChannelClosed(String),
}
