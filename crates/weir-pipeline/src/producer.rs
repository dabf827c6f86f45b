//! Producer pipeline: event stream in, keyed broker records out.
//!
//! The run task pulls payloads from an [`EventStreamSource`], assigns
//! each a fresh monotonic key, and dispatches it to a [`RecordSink`].
//! Delivery outcomes are observed on background tasks so a slow broker
//! acknowledgment never stalls the next dispatch; a failed send is
//! logged and dropped rather than halting the stream. The observers are
//! reaped as they finish and drained at shutdown, so the final metrics
//! account for every dispatched record.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use weir_connectors::{EventStreamSource, OutboundRecord, RecordSink};

use crate::config::PipelineConfig;
use crate::epoch_millis;
use crate::error::PipelineError;
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::state::{PipelineState, StateCell};

/// Process-wide key sequence; combined with a millisecond timestamp it
/// makes every record key unique across concurrent pipelines.
static KEY_SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn next_key() -> String {
    let seq = KEY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{}-{seq}", epoch_millis())
}

/// Moves payloads from an event stream into the broker.
///
/// `start` spawns the run task and returns; the pipeline then runs until
/// `stop`, a permanent source closure, or an upstream silence timeout.
/// Terminal failures park the pipeline in `Failed` and are returned by
/// the next `stop` call.
pub struct ProducerPipeline<S: EventStreamSource + 'static> {
    topic: String,
    config: PipelineConfig,
    state: Arc<StateCell>,
    metrics: Arc<PipelineMetrics>,
    sink: Arc<dyn RecordSink>,
    source: Option<S>,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<(S, Result<(), PipelineError>)>>,
}

impl<S: EventStreamSource + 'static> ProducerPipeline<S> {
    /// Creates a stopped pipeline over `source` and `sink`.
    pub fn new(
        source: S,
        sink: Arc<dyn RecordSink>,
        topic: impl Into<String>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            topic: topic.into(),
            config,
            state: Arc::new(StateCell::new()),
            metrics: Arc::new(PipelineMetrics::default()),
            sink,
            source: Some(source),
            shutdown_tx: None,
            task: None,
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    /// Returns a snapshot of the pipeline counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Opens the source and spawns the run task.
    ///
    /// Calling `start` while the pipeline is already active is a logged
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the source
    /// cannot be opened; the pipeline is left `Stopped` in both cases.
    pub async fn start(&mut self) -> Result<(), PipelineError> {
        if !self
            .state
            .compare_and_set(PipelineState::Stopped, PipelineState::Starting)
        {
            warn!(state = %self.state.get(), "producer pipeline already active, start ignored");
            return Ok(());
        }

        if let Err(reason) = self.config.validate() {
            self.state.set(PipelineState::Stopped);
            return Err(PipelineError::Configuration(reason));
        }

        let Some(mut source) = self.source.take() else {
            self.state.set(PipelineState::Stopped);
            return Err(PipelineError::Configuration(
                "event source is still held by an unfinished run task".into(),
            ));
        };

        if let Err(error) = source.open().await {
            self.source = Some(source);
            self.state.set(PipelineState::Stopped);
            return Err(error.into());
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Running must be set before the task spawns so a fast terminal
        // failure lands on Running → Failed instead of being overwritten.
        self.state.set(PipelineState::Running);

        let task = tokio::spawn(run(
            source,
            Arc::clone(&self.sink),
            self.topic.clone(),
            self.config.clone(),
            Arc::clone(&self.state),
            Arc::clone(&self.metrics),
            shutdown_rx,
        ));

        self.shutdown_tx = Some(shutdown_tx);
        self.task = Some(task);
        info!(topic = %self.topic, "producer pipeline started");
        Ok(())
    }

    /// Signals the run task, joins it, and flushes the sink.
    ///
    /// Returns the run task's terminal error if it failed before or
    /// during shutdown.
    ///
    /// # Errors
    ///
    /// Returns the pipeline's terminal failure, or `TaskFailed` if the
    /// run task panicked or outlived the shutdown timeout.
    pub async fn stop(&mut self) -> Result<(), PipelineError> {
        self.state
            .compare_and_set(PipelineState::Running, PipelineState::Stopping);

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }

        let result = match self.task.take() {
            None => Ok(()),
            Some(task) => match tokio::time::timeout(self.config.shutdown_timeout, task).await {
                Ok(Ok((source, result))) => {
                    self.source = Some(source);
                    result
                }
                Ok(Err(join_error)) => Err(PipelineError::TaskFailed(join_error.to_string())),
                Err(_) => Err(PipelineError::TaskFailed(format!(
                    "run task did not stop within {:?}",
                    self.config.shutdown_timeout
                ))),
            },
        };

        if let Err(error) = self.sink.flush(self.config.shutdown_timeout).await {
            warn!(%error, "sink flush on shutdown failed");
        }

        self.state.set(PipelineState::Stopped);
        let snapshot = self.metrics.snapshot();
        info!(
            received = snapshot.received,
            sent = snapshot.sent,
            dropped = snapshot.dropped,
            "producer pipeline stopped"
        );
        result
    }
}

async fn run<S: EventStreamSource>(
    mut source: S,
    sink: Arc<dyn RecordSink>,
    topic: String,
    config: PipelineConfig,
    state: Arc<StateCell>,
    metrics: Arc<PipelineMetrics>,
    shutdown_rx: watch::Receiver<bool>,
) -> (S, Result<(), PipelineError>) {
    let mut observers = JoinSet::new();
    let result = pump(
        &mut source,
        &sink,
        &topic,
        &config,
        &metrics,
        &mut observers,
        shutdown_rx,
    )
    .await;

    if let Err(error) = source.close().await {
        warn!(%error, "event source close failed");
    }

    // Already-dispatched outcomes still count toward the final metrics.
    let drain = async {
        while observers.join_next().await.is_some() {}
    };
    if tokio::time::timeout(config.shutdown_timeout, drain)
        .await
        .is_err()
    {
        warn!("pending delivery outcomes not resolved within the shutdown timeout");
        observers.abort_all();
    }

    if let Err(error) = &result {
        error!(%error, "producer pipeline failed");
        metrics.record_failure();
        state.compare_and_set(PipelineState::Running, PipelineState::Failed);
    }

    (source, result)
}

async fn pump<S: EventStreamSource>(
    source: &mut S,
    sink: &Arc<dyn RecordSink>,
    topic: &str,
    config: &PipelineConfig,
    metrics: &Arc<PipelineMetrics>,
    observers: &mut JoinSet<()>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), PipelineError> {
    loop {
        // Reap observers that have already resolved so the set stays
        // proportional to the in-flight sends, not the total sent.
        while observers.try_join_next().is_some() {}

        let payload = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => return Ok(()),
            received = tokio::time::timeout(config.upstream_timeout, source.recv()) => {
                match received {
                    Ok(Some(payload)) => payload,
                    Ok(None) => return Err(PipelineError::SourceClosed),
                    Err(_) => {
                        return Err(PipelineError::UpstreamTimeout {
                            elapsed: config.upstream_timeout,
                        })
                    }
                }
            }
        };

        metrics.record_received();
        let record = OutboundRecord::new(topic, next_key(), payload, epoch_millis());

        match sink.dispatch(record).await {
            Ok(handle) => {
                let metrics = Arc::clone(metrics);
                observers.spawn(async move {
                    let result = handle.outcome().await;
                    if result.is_success() {
                        metrics.record_sent();
                        debug!(
                            token = %result.correlation_token,
                            partition = result.partition.unwrap_or(-1),
                            offset = result.offset.unwrap_or(-1),
                            "record delivered"
                        );
                    } else {
                        metrics.record_send_failure();
                        metrics.record_dropped();
                        warn!(
                            token = %result.correlation_token,
                            error = %result.error.map_or_else(String::new, |e| e.to_string()),
                            "record delivery failed, dropping"
                        );
                    }
                });
            }
            Err(error) => {
                metrics.record_send_failure();
                metrics.record_dropped();
                warn!(%error, "dispatch failed, dropping event");
            }
        }
    }
}
