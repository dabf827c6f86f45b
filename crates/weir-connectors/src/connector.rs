//! Trait seams between pipelines and transports.
//!
//! Pipelines are written against these traits so tests can substitute
//! in-memory implementations for the network-backed connectors.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use crate::error::ConnectorError;
use crate::record::{AckHandle, InboundRecord, OutboundRecord, RawEvent, SendResult};

/// An infinite, restartable sequence of event payloads.
///
/// Implementations recover transient transport failures internally;
/// `recv` returns `None` only once the source has been closed (or its
/// reader has terminally died), never on a reconnectable failure.
#[async_trait]
pub trait EventStreamSource: Send {
    /// Opens the source and starts delivering payloads.
    ///
    /// # Errors
    ///
    /// Returns an error for permanent failures only (bad URL, double
    /// open); transient connect failures are retried internally.
    async fn open(&mut self) -> Result<(), ConnectorError>;

    /// Awaits the next payload. `None` means the sequence has ended.
    async fn recv(&mut self) -> Option<RawEvent>;

    /// Stops delivery and releases the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader cannot be released cleanly.
    async fn close(&mut self) -> Result<(), ConnectorError>;
}

/// Pending outcome of one dispatched send.
///
/// Dispatch order fixes the order records enter the broker; the outcome
/// is observed separately so a slow acknowledgment never blocks the
/// next dispatch. The handle owns whatever in-flight budget the sink
/// reserved for the record and releases it when the outcome resolves.
pub struct SendHandle {
    outcome: Pin<Box<dyn Future<Output = SendResult> + Send>>,
}

impl SendHandle {
    /// Wraps a pending outcome future.
    #[must_use]
    pub fn new(outcome: impl Future<Output = SendResult> + Send + 'static) -> Self {
        Self {
            outcome: Box::pin(outcome),
        }
    }

    /// A handle whose outcome is already known (used by in-memory sinks).
    #[must_use]
    pub fn ready(result: SendResult) -> Self {
        Self::new(std::future::ready(result))
    }

    /// Awaits the delivery outcome.
    pub async fn outcome(self) -> SendResult {
        self.outcome.await
    }
}

impl std::fmt::Debug for SendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendHandle").finish_non_exhaustive()
    }
}

/// A broker producer accepting keyed records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Enqueues a record for transmission, blocking while the in-flight
    /// budget is exhausted (backpressure), and returns a handle to the
    /// eventual per-record outcome.
    ///
    /// Records enter the broker in dispatch order for any given key's
    /// partition.
    ///
    /// # Errors
    ///
    /// Returns an error only when the sink itself is unusable; a failed
    /// or timed-out send is reported through the handle's [`SendResult`].
    async fn dispatch(&self, record: OutboundRecord) -> Result<SendHandle, ConnectorError>;

    /// Drains any queued records, bounded by `deadline`.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue could not be drained in time.
    async fn flush(&self, deadline: std::time::Duration) -> Result<(), ConnectorError>;
}

/// A broker consumer delivering records with explicit acknowledgment.
#[async_trait]
pub trait RecordStreamSource: Send + Sync {
    /// Subscribes to the configured topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be established.
    async fn subscribe(&self) -> Result<(), ConnectorError>;

    /// Awaits the next record. The returned [`AckHandle`] commits the
    /// record's offset when (and only when) the caller invokes it.
    ///
    /// Cancel-safe: dropping the future mid-await loses no records.
    ///
    /// # Errors
    ///
    /// Returns transient receive errors; callers may retry.
    async fn recv(&self) -> Result<(InboundRecord, AckHandle), ConnectorError>;

    /// Releases the subscription.
    fn unsubscribe(&self);
}
