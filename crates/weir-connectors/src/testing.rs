//! In-memory connector implementations for tests.
//!
//! These satisfy the same trait contracts as the network-backed
//! connectors, so pipeline behavior can be tested without a broker or an
//! HTTP endpoint.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::connector::{EventStreamSource, RecordSink, RecordStreamSource, SendHandle};
use crate::error::ConnectorError;
use crate::record::{AckHandle, CommitFn, InboundRecord, OutboundRecord, RawEvent, SendResult};

/// Scripted event source backed by an in-memory channel.
///
/// With [`with_events`](Self::with_events) the sequence stays open after
/// the scripted payloads drain (callers can push more via
/// [`handle`](Self::handle), and `recv` pends meanwhile); with
/// [`finite`](Self::finite) it ends, which an
/// [`EventStreamSource`] consumer sees as permanent closure.
pub struct MockEventSource {
    rx: mpsc::UnboundedReceiver<RawEvent>,
    tx: Option<mpsc::UnboundedSender<RawEvent>>,
    opens: Arc<AtomicU32>,
    closes: Arc<AtomicU32>,
}

impl MockEventSource {
    /// Creates a source that emits `events` and then stays open.
    #[must_use]
    pub fn with_events<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        for event in events {
            let _ = tx.send(event.into());
        }
        Self {
            rx,
            tx: Some(tx),
            opens: Arc::new(AtomicU32::new(0)),
            closes: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Creates a source that emits `events` and then ends the sequence.
    #[must_use]
    pub fn finite<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut source = Self::with_events(events);
        source.tx = None;
        source
    }

    /// Returns a sender for pushing further events while the source is
    /// open. Panics if the source was created with [`finite`](Self::finite).
    #[must_use]
    pub fn handle(&self) -> mpsc::UnboundedSender<RawEvent> {
        self.tx.clone().expect("finite source has no live handle")
    }

    /// Shared counter of `open` calls.
    #[must_use]
    pub fn opens(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.opens)
    }

    /// Shared counter of `close` calls.
    #[must_use]
    pub fn closes(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.closes)
    }
}

#[async_trait]
impl EventStreamSource for MockEventSource {
    async fn open(&mut self) -> Result<(), ConnectorError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn recv(&mut self) -> Option<RawEvent> {
        self.rx.recv().await
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.rx.close();
        Ok(())
    }
}

/// Recording sink with optional scripted failures.
///
/// Outcomes resolve immediately; an optional `fail_every` makes every
/// Nth dispatch report a failed [`SendResult`] without recording the
/// record as sent.
pub struct MockRecordSink {
    sent: Mutex<Vec<OutboundRecord>>,
    dispatched: AtomicU64,
    flushes: AtomicU32,
    fail_every: Option<u64>,
    forward_tx: Mutex<Option<mpsc::UnboundedSender<OutboundRecord>>>,
}

impl MockRecordSink {
    /// Creates a sink where every send succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            dispatched: AtomicU64::new(0),
            flushes: AtomicU32::new(0),
            fail_every: None,
            forward_tx: Mutex::new(None),
        }
    }

    /// Creates a sink where every `n`th dispatch fails.
    #[must_use]
    pub fn failing_every(n: u64) -> Self {
        Self {
            fail_every: Some(n),
            ..Self::new()
        }
    }

    /// Forwards successfully "delivered" records into `tx`, so a
    /// [`MockRecordStream`] can replay them as a simulated topic.
    pub fn forward_to(&self, tx: mpsc::UnboundedSender<OutboundRecord>) {
        *self.forward_tx.lock().unwrap() = Some(tx);
    }

    /// Returns the successfully sent records in dispatch order.
    #[must_use]
    pub fn sent(&self) -> Vec<OutboundRecord> {
        self.sent.lock().unwrap().clone()
    }

    /// Returns the total number of dispatch calls.
    #[must_use]
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::SeqCst)
    }

    /// Returns the number of flush calls.
    #[must_use]
    pub fn flushes(&self) -> u32 {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl Default for MockRecordSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordSink for MockRecordSink {
    async fn dispatch(&self, record: OutboundRecord) -> Result<SendHandle, ConnectorError> {
        let n = self.dispatched.fetch_add(1, Ordering::SeqCst) + 1;
        let token = record.correlation_token.clone();

        if self.fail_every.is_some_and(|every| n % every == 0) {
            return Ok(SendHandle::ready(SendResult::failure(
                token,
                ConnectorError::WriteError("injected send failure".into()),
            )));
        }

        #[allow(clippy::cast_possible_wrap)]
        let offset = (n - 1) as i64;
        if let Some(tx) = self.forward_tx.lock().unwrap().as_ref() {
            let _ = tx.send(record.clone());
        }
        self.sent.lock().unwrap().push(record);
        Ok(SendHandle::ready(SendResult::success(token, 0, offset)))
    }

    async fn flush(&self, _deadline: std::time::Duration) -> Result<(), ConnectorError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Scripted record stream with an acknowledgment log.
///
/// Records are pushed through the sender returned by [`channel`](Self::channel);
/// every delivered record's [`AckHandle`] appends `(partition, offset)`
/// to the shared ack log on first acknowledge.
pub struct MockRecordStream {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<InboundRecord>>,
    acks: Arc<Mutex<Vec<(i32, i64)>>>,
    subscribes: AtomicU32,
    unsubscribes: AtomicU32,
}

impl MockRecordStream {
    /// Creates a stream and the sender that feeds it.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedSender<InboundRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx: tokio::sync::Mutex::new(rx),
                acks: Arc::new(Mutex::new(Vec::new())),
                subscribes: AtomicU32::new(0),
                unsubscribes: AtomicU32::new(0),
            },
            tx,
        )
    }

    /// Returns the acknowledged `(partition, offset)` pairs in commit order.
    #[must_use]
    pub fn acks(&self) -> Vec<(i32, i64)> {
        self.acks.lock().unwrap().clone()
    }

    /// Returns the number of subscribe calls.
    #[must_use]
    pub fn subscribes(&self) -> u32 {
        self.subscribes.load(Ordering::SeqCst)
    }

    /// Returns the number of unsubscribe calls.
    #[must_use]
    pub fn unsubscribes(&self) -> u32 {
        self.unsubscribes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStreamSource for MockRecordStream {
    async fn subscribe(&self) -> Result<(), ConnectorError> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn recv(&self) -> Result<(InboundRecord, AckHandle), ConnectorError> {
        let record = self
            .rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| ConnectorError::ChannelClosed("mock stream drained".into()))?;

        let acks = Arc::clone(&self.acks);
        let (partition, offset) = (record.partition, record.offset);
        let commit: CommitFn = Box::new(move || {
            acks.lock().unwrap().push((partition, offset));
            Ok(())
        });

        Ok((record, AckHandle::new(partition, offset, commit)))
    }

    fn unsubscribe(&self) {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Builds an [`InboundRecord`] on partition 0 at `offset`.
#[must_use]
pub fn inbound(offset: i64, value: impl Into<String>) -> InboundRecord {
    InboundRecord {
        partition: 0,
        offset,
        key: None,
        value: value.into(),
    }
}
