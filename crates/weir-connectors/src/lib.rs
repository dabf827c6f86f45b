//! # Weir Connectors
//!
//! Transport edges for the weir event bridge: a resilient HTTP
//! event-stream source and Kafka producer/consumer wrappers with explicit
//! per-record acknowledgment.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

#[macro_use]
mod macros;

/// Reconnect and retry backoff schedules
pub mod backoff;

/// Connector configuration property bags and lifecycle states
pub mod config;

/// Connector trait seams (event source, record sink, record stream)
pub mod connector;

/// Connector error types
pub mod error;

/// Kafka producer and consumer connectors
pub mod kafka;

/// Record types flowing through the bridge
pub mod record;

/// HTTP event-stream (SSE-style) source connector
pub mod sse;

/// In-memory connector implementations for tests
pub mod testing;

pub use backoff::{Backoff, BackoffPolicy};
pub use config::{ConnectorConfig, ConnectorState};
pub use connector::{EventStreamSource, RecordSink, RecordStreamSource, SendHandle};
pub use error::ConnectorError;
pub use kafka::{KafkaSink, KafkaSinkConfig, KafkaSourceConfig, KafkaStreamSource};
pub use record::{AckHandle, InboundRecord, OutboundRecord, RawEvent, SendResult};
pub use sse::{SseSource, SseSourceConfig, StreamFrameDecoder};
