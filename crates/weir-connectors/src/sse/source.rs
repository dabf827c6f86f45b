//! HTTP event-stream source connector.
//!
//! [`SseSource`] opens a long-lived streaming `GET` and produces payload
//! lines via the [`EventStreamSource`] trait.
//!
//! All network I/O runs in a spawned Tokio task. Payloads cross to
//! `recv()` through a bounded channel; a full channel blocks the reader,
//! which in turn lets TCP flow control throttle the upstream.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::config::ConnectorState;
use crate::connector::EventStreamSource;
use crate::error::ConnectorError;
use crate::record::RawEvent;

use super::config::SseSourceConfig;
use super::parser::StreamFrameDecoder;

/// How long `close` waits for the reader task to finish.
const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP event-stream source.
///
/// Reconnects transparently on stall, disconnect, or non-success
/// responses, with jittered exponential backoff. The payload sequence
/// ends only on [`close`](EventStreamSource::close) — or if the reader
/// task dies, which `recv` surfaces as end-of-sequence.
pub struct SseSource {
    /// Parsed configuration.
    config: SseSourceConfig,
    /// Connector lifecycle state.
    state: ConnectorState,
    /// Bounded channel receiver fed by the reader task.
    rx: Option<mpsc::Receiver<RawEvent>>,
    /// Shutdown signal sender.
    shutdown_tx: Option<watch::Sender<bool>>,
    /// Handle to the spawned reader task.
    reader_handle: Option<tokio::task::JoinHandle<()>>,
}

impl SseSource {
    /// Creates a source for the configured stream endpoint.
    #[must_use]
    pub fn new(config: SseSourceConfig) -> Self {
        Self {
            config,
            state: ConnectorState::Created,
            rx: None,
            shutdown_tx: None,
            reader_handle: None,
        }
    }

    /// Returns the current connector state.
    #[must_use]
    pub fn state(&self) -> ConnectorState {
        self.state
    }

    /// Returns the configured stream URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.config.url
    }
}

#[async_trait]
impl EventStreamSource for SseSource {
    async fn open(&mut self) -> Result<(), ConnectorError> {
        if matches!(
            self.state,
            ConnectorState::Running | ConnectorState::Initializing
        ) {
            return Err(ConnectorError::InvalidState {
                expected: "Created or Closed".into(),
                actual: self.state.to_string(),
            });
        }
        self.state = ConnectorState::Initializing;

        self.config.validate()?;

        // A URL that cannot parse is permanent — no amount of retrying
        // fixes it, so it surfaces here instead of entering the
        // reconnect loop.
        let url = reqwest::Url::parse(&self.config.url).map_err(|e| {
            ConnectorError::ConfigurationError(format!(
                "unparseable stream.url '{}': {e}",
                self.config.url
            ))
        })?;

        let client = reqwest::Client::builder()
            .connect_timeout(self.config.connect_timeout)
            .build()
            .map_err(|e| ConnectorError::ConnectionFailed(format!("http client init: {e}")))?;

        info!(url = %url, "opening event-stream source");

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_reader(
            client,
            url,
            self.config.idle_timeout,
            self.config.max_event_bytes,
            self.config.reconnect_policy(),
            tx,
            shutdown_rx,
        ));

        self.rx = Some(rx);
        self.shutdown_tx = Some(shutdown_tx);
        self.reader_handle = Some(handle);
        self.state = ConnectorState::Running;

        Ok(())
    }

    async fn recv(&mut self) -> Option<RawEvent> {
        self.rx.as_mut()?.recv().await
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        info!("closing event-stream source");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }

        if let Some(handle) = self.reader_handle.take() {
            if tokio::time::timeout(READER_JOIN_TIMEOUT, handle)
                .await
                .is_err()
            {
                warn!("reader task did not stop within the join timeout");
            }
        }

        self.rx = None;
        self.state = ConnectorState::Closed;
        info!("event-stream source closed");
        Ok(())
    }
}

impl std::fmt::Debug for SseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseSource")
            .field("url", &self.config.url)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Reader task: connect, stream, frame, reconnect — forever, until the
/// shutdown signal fires or the channel closes.
#[allow(clippy::too_many_lines)]
async fn run_reader(
    client: reqwest::Client,
    url: reqwest::Url,
    idle_timeout: Duration,
    max_event_bytes: usize,
    policy: BackoffPolicy,
    tx: mpsc::Sender<RawEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut backoff = policy.start();
    let mut decoder = StreamFrameDecoder::new(max_event_bytes);
    let mut oversize_seen = 0u64;

    'outer: loop {
        if *shutdown_rx.borrow() {
            break;
        }

        info!(url = %url, attempt = backoff.attempt(), "connecting to event stream");

        let response = tokio::select! {
            res = client.get(url.clone()).send() => res,
            _ = shutdown_rx.changed() => break,
        };

        let mut stream = match response {
            Ok(resp) if resp.status().is_success() => {
                backoff.reset();
                decoder.reset();
                info!(url = %url, status = %resp.status(), "event stream connected");
                resp.bytes_stream()
            }
            Ok(resp) => {
                warn!(url = %url, status = %resp.status(), "stream endpoint refused, will reconnect");
                if let Some(delay) = backoff.next_delay() {
                    tokio::select! {
                        () = tokio::time::sleep(delay) => continue 'outer,
                        _ = shutdown_rx.changed() => break 'outer,
                    }
                }
                break 'outer;
            }
            Err(e) => {
                warn!(url = %url, error = %e, "stream connection failed, will reconnect");
                if let Some(delay) = backoff.next_delay() {
                    tokio::select! {
                        () = tokio::time::sleep(delay) => continue 'outer,
                        _ = shutdown_rx.changed() => break 'outer,
                    }
                }
                break 'outer;
            }
        };

        // Read loop. Each chunk read is bounded by the idle timeout so a
        // silent, half-dead connection gets torn down and reopened.
        loop {
            tokio::select! {
                chunk = tokio::time::timeout(idle_timeout, stream.next()) => {
                    match chunk {
                        Ok(Some(Ok(bytes))) => {
                            for payload in decoder.push(&bytes) {
                                if tx.send(payload).await.is_err() {
                                    debug!("payload channel closed, stopping reader");
                                    break 'outer;
                                }
                            }
                            let dropped = decoder.dropped_oversize();
                            if dropped > oversize_seen {
                                warn!(
                                    dropped = dropped - oversize_seen,
                                    max_bytes = max_event_bytes,
                                    "dropped oversized payload(s)"
                                );
                                oversize_seen = dropped;
                            }
                        }
                        Ok(Some(Err(e))) => {
                            warn!(url = %url, error = %e, "stream read error");
                            break;
                        }
                        Ok(None) => {
                            info!(url = %url, "stream ended by server");
                            break;
                        }
                        Err(_) => {
                            warn!(
                                url = %url,
                                idle_ms = idle_timeout.as_millis() as u64,
                                "no bytes within idle timeout, treating connection as stalled"
                            );
                            break;
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    debug!("shutdown signal received in reader");
                    break 'outer;
                }
            }
        }

        // Disconnected — schedule the next attempt.
        if let Some(delay) = backoff.next_delay() {
            tokio::select! {
                () = tokio::time::sleep(delay) => {},
                _ = shutdown_rx.changed() => break,
            }
        } else {
            break;
        }
    }
}
