//! Kafka producer and consumer connectors.
//!
//! The sink wraps a `FutureProducer` with an application-level in-flight
//! bound and a per-send deadline; the source wraps a `StreamConsumer`
//! with auto-commit disabled so offsets advance only through explicit
//! per-record acknowledgment.

pub mod sink;
pub mod sink_config;
pub mod source;
pub mod source_config;

pub use sink::KafkaSink;
pub use sink_config::{Acks, CompressionType, KafkaSinkConfig};
pub use source::KafkaStreamSource;
pub use source_config::{AutoOffsetReset, KafkaSourceConfig};
