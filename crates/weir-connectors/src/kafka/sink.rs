//! Kafka sink connector.
//!
//! [`KafkaSink`] wraps an rdkafka `FutureProducer` behind the
//! [`RecordSink`] trait. Dispatch order fixes the order records enter
//! the client's per-partition queues; delivery outcomes resolve
//! concurrently under a semaphore-bounded in-flight budget. A send that
//! outlives the per-send deadline is reported as a failed
//! [`SendResult`](crate::record::SendResult) — whether to retry or drop
//! is the caller's decision.

use std::sync::Arc;

use async_trait::async_trait;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::connector::{RecordSink, SendHandle};
use crate::error::ConnectorError;
use crate::record::{OutboundRecord, SendResult};

use super::sink_config::KafkaSinkConfig;

/// Kafka producer wrapper with bounded in-flight sends.
pub struct KafkaSink {
    /// The shared producer session.
    producer: FutureProducer,
    /// Parsed configuration.
    config: KafkaSinkConfig,
    /// In-flight budget; one permit per dispatched, unresolved send.
    in_flight: Arc<Semaphore>,
}

impl KafkaSink {
    /// Creates a sink and its producer session.
    ///
    /// The session is process-wide: create one sink and share it via
    /// `Arc` rather than constructing a producer per pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid configuration or producer creation
    /// failure.
    pub fn new(config: KafkaSinkConfig) -> Result<Self, ConnectorError> {
        config.validate()?;

        let producer: FutureProducer = config.to_rdkafka_config().create().map_err(|e| {
            ConnectorError::ConnectionFailed(format!("failed to create producer: {e}"))
        })?;

        info!(
            brokers = %config.bootstrap_servers,
            topic = %config.topic,
            max_in_flight = config.max_in_flight_sends,
            "created Kafka sink"
        );

        Ok(Self {
            in_flight: Arc::new(Semaphore::new(config.max_in_flight_sends)),
            producer,
            config,
        })
    }

    /// Returns the configured destination topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.config.topic
    }

    /// Returns the number of currently available in-flight permits.
    #[must_use]
    pub fn available_capacity(&self) -> usize {
        self.in_flight.available_permits()
    }
}

#[async_trait]
impl RecordSink for KafkaSink {
    async fn dispatch(&self, record: OutboundRecord) -> Result<SendHandle, ConnectorError> {
        // Blocks here when the in-flight budget is exhausted; the permit
        // rides inside the handle and is released when the outcome
        // resolves.
        let permit = Arc::clone(&self.in_flight)
            .acquire_owned()
            .await
            .map_err(|_| ConnectorError::ChannelClosed("in-flight semaphore closed".into()))?;

        let token = record.correlation_token.clone();
        let send_timeout = self.config.send_timeout;

        let future_record = FutureRecord::to(&record.topic)
            .key(&record.key)
            .payload(&record.value)
            .timestamp(record.timestamp_millis);

        // The enqueue into the client's per-partition queue happens here,
        // before `dispatch` returns; the handle carries only the delivery
        // notification. A full client queue is a per-record failure, the
        // in-flight budget keeps it from being reachable in practice.
        let delivery = match self.producer.send_result(future_record) {
            Ok(delivery) => delivery,
            Err((e, _record)) => {
                warn!(token = %token, error = %e, "record rejected at enqueue");
                return Ok(SendHandle::ready(SendResult::failure(
                    token,
                    ConnectorError::Kafka(e),
                )));
            }
        };

        Ok(SendHandle::new(async move {
            let _permit = permit;
            match tokio::time::timeout(send_timeout, delivery).await {
                Ok(Ok(Ok((partition, offset)))) => {
                    debug!(token = %token, partition, offset, "record delivered");
                    SendResult::success(token, partition, offset)
                }
                Ok(Ok(Err((e, _msg)))) => SendResult::failure(token, ConnectorError::Kafka(e)),
                Ok(Err(_)) => {
                    // Producer dropped before delivering its verdict.
                    SendResult::failure(token, ConnectorError::Kafka(KafkaError::Canceled))
                }
                Err(_) => SendResult::failure(
                    token,
                    ConnectorError::SendTimeout {
                        elapsed: send_timeout,
                    },
                ),
            }
        }))
    }

    async fn flush(&self, deadline: std::time::Duration) -> Result<(), ConnectorError> {
        debug!(deadline_ms = deadline.as_millis() as u64, "flushing producer queue");
        self.producer
            .flush(Timeout::After(deadline))
            .map_err(ConnectorError::Kafka)
    }
}

impl std::fmt::Debug for KafkaSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaSink")
            .field("topic", &self.config.topic)
            .field("available_capacity", &self.available_capacity())
            .finish_non_exhaustive()
    }
}
