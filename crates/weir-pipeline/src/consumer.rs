//! Consumer pipeline: receive, process, acknowledge.
//!
//! Each record is processed with a bounded retry schedule; only a
//! successful (or explicitly escalated) record has its offset
//! acknowledged, so anything in flight at a crash is redelivered after
//! restart. Exhausted retries consult the [`EscalationStrategy`]: halt
//! by default, or skip / dead-letter when loss has been opted into.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use weir_connectors::{
    AckHandle, Backoff, BackoffPolicy, InboundRecord, OutboundRecord, RecordSink,
    RecordStreamSource,
};

use crate::config::PipelineConfig;
use crate::epoch_millis;
use crate::error::PipelineError;
use crate::escalation::EscalationStrategy;
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::processor::RecordProcessor;
use crate::state::{PipelineState, StateCell};

/// Pause after a transient receive error before polling again.
const RECEIVE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Outcome of the bounded retry loop on one record.
enum ProcessOutcome {
    /// A processing attempt succeeded.
    Processed,
    /// Every attempt failed; escalation applies.
    Exhausted { attempts: u32 },
    /// Shutdown arrived during a retry delay; the record stays
    /// unacknowledged for redelivery.
    Interrupted,
}

/// Processes broker records with explicit acknowledgment.
pub struct ConsumerPipeline {
    config: PipelineConfig,
    escalation: EscalationStrategy,
    state: Arc<StateCell>,
    metrics: Arc<PipelineMetrics>,
    stream: Arc<dyn RecordStreamSource>,
    processor: Arc<dyn RecordProcessor>,
    dead_letter_sink: Option<Arc<dyn RecordSink>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<Result<(), PipelineError>>>,
}

impl ConsumerPipeline {
    /// Creates a stopped pipeline over `stream` and `processor`.
    pub fn new(
        stream: Arc<dyn RecordStreamSource>,
        processor: Arc<dyn RecordProcessor>,
        config: PipelineConfig,
        escalation: EscalationStrategy,
    ) -> Self {
        Self {
            config,
            escalation,
            state: Arc::new(StateCell::new()),
            metrics: Arc::new(PipelineMetrics::default()),
            stream,
            processor,
            dead_letter_sink: None,
            shutdown_tx: None,
            task: None,
        }
    }

    /// Attaches the sink used by the dead-letter escalation strategy.
    #[must_use]
    pub fn with_dead_letter_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.dead_letter_sink = Some(sink);
        self
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

    /// Subscribes and spawns the consume task.
    ///
    /// Calling `start` while the pipeline is already active is a logged
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the dead-letter
    /// strategy lacks a sink, or the subscription fails; the pipeline is
    /// left `Stopped` in all three cases.
    pub async fn start(&mut self) -> Result<(), PipelineError> {
        if !self
            .state
            .compare_and_set(PipelineState::Stopped, PipelineState::Starting)
        {
            warn!(state = %self.state.get(), "consumer pipeline already active, start ignored");
            return Ok(());
        }

        if let Err(reason) = self.config.validate() {
            self.state.set(PipelineState::Stopped);
            return Err(PipelineError::Configuration(reason));
        }
        if matches!(self.escalation, EscalationStrategy::DeadLetter { .. })
            && self.dead_letter_sink.is_none()
        {
            self.state.set(PipelineState::Stopped);
            return Err(PipelineError::Configuration(
                "dead-letter escalation requires a dead-letter sink".into(),
            ));
        }

        if let Err(error) = self.stream.subscribe().await {
            self.state.set(PipelineState::Stopped);
            return Err(error.into());
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.state.set(PipelineState::Running);

        let task = tokio::spawn(run(
            Arc::clone(&self.stream),
            Arc::clone(&self.processor),
            self.config.clone(),
            self.escalation.clone(),
            self.dead_letter_sink.clone(),
            Arc::clone(&self.state),
            Arc::clone(&self.metrics),
            shutdown_rx,
        ));

        self.shutdown_tx = Some(shutdown_tx);
        self.task = Some(task);
        info!(escalation = %self.escalation, "consumer pipeline started");
        Ok(())
    }

    /// Signals the consume task and joins it.
    ///
    /// # Errors
    ///
    /// Returns the pipeline's terminal failure, or `TaskFailed` if the
    /// consume task panicked or outlived the shutdown timeout.
    pub async fn stop(&mut self) -> Result<(), PipelineError> {
        self.state
            .compare_and_set(PipelineState::Running, PipelineState::Stopping);

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }

        let result = match self.task.take() {
            None => Ok(()),
            Some(task) => match tokio::time::timeout(self.config.shutdown_timeout, task).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_error)) => Err(PipelineError::TaskFailed(join_error.to_string())),
                Err(_) => Err(PipelineError::TaskFailed(format!(
                    "consume task did not stop within {:?}",
                    self.config.shutdown_timeout
                ))),
            },
        };

        self.state.set(PipelineState::Stopped);
        let snapshot = self.metrics.snapshot();
        info!(
            processed = snapshot.processed,
            acknowledged = snapshot.acknowledged,
            retries = snapshot.retries,
            dropped = snapshot.dropped,
            "consumer pipeline stopped"
        );
        result
    }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    stream: Arc<dyn RecordStreamSource>,
    processor: Arc<dyn RecordProcessor>,
    config: PipelineConfig,
    escalation: EscalationStrategy,
    dead_letter_sink: Option<Arc<dyn RecordSink>>,
    state: Arc<StateCell>,
    metrics: Arc<PipelineMetrics>,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<(), PipelineError> {
    let result = consume(
        &stream,
        &processor,
        &config,
        &escalation,
        dead_letter_sink.as_ref(),
        &metrics,
        shutdown_rx,
    )
    .await;

    stream.unsubscribe();

    if let Err(error) = &result {
        error!(%error, "consumer pipeline failed");
        metrics.record_failure();
        state.compare_and_set(PipelineState::Running, PipelineState::Failed);
    }

    result
}

async fn consume(
    stream: &Arc<dyn RecordStreamSource>,
    processor: &Arc<dyn RecordProcessor>,
    config: &PipelineConfig,
    escalation: &EscalationStrategy,
    dead_letter_sink: Option<&Arc<dyn RecordSink>>,
    metrics: &Arc<PipelineMetrics>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), PipelineError> {
    loop {
        let (record, ack) = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => return Ok(()),
            received = stream.recv() => match received {
                Ok(pair) => pair,
                Err(error) => {
                    warn!(%error, "receive failed, retrying");
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.changed() => return Ok(()),
                        () = tokio::time::sleep(RECEIVE_RETRY_DELAY) => {}
                    }
                    continue;
                }
            },
        };

        match process_record(&record, processor, config, metrics, &mut shutdown_rx).await {
            ProcessOutcome::Processed => ack_record(&ack, metrics),
            ProcessOutcome::Interrupted => return Ok(()),
            ProcessOutcome::Exhausted { attempts } => match escalation {
                EscalationStrategy::Halt => {
                    return Err(PipelineError::RetriesExhausted {
                        attempts,
                        partition: record.partition,
                        offset: record.offset,
                    });
                }
                EscalationStrategy::Skip => {
                    warn!(
                        partition = record.partition,
                        offset = record.offset,
                        "retries exhausted, skipping record"
                    );
                    metrics.record_dropped();
                    ack_record(&ack, metrics);
                }
                EscalationStrategy::DeadLetter { topic } => {
                    let Some(sink) = dead_letter_sink else {
                        return Err(PipelineError::Configuration(
                            "dead-letter escalation without a sink".into(),
                        ));
                    };
                    dead_letter(sink, topic, &record).await?;
                    warn!(
                        partition = record.partition,
                        offset = record.offset,
                        topic = %topic,
                        "retries exhausted, record dead-lettered"
                    );
                    metrics.record_dropped();
                    ack_record(&ack, metrics);
                }
            },
        }
    }
}

/// Runs the bounded retry schedule on one record.
async fn process_record(
    record: &InboundRecord,
    processor: &Arc<dyn RecordProcessor>,
    config: &PipelineConfig,
    metrics: &Arc<PipelineMetrics>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> ProcessOutcome {
    let mut backoff = Backoff::new(BackoffPolicy {
        initial_delay: config.retry.initial_delay,
        max_delay: Duration::MAX,
        multiplier: config.retry.multiplier,
        max_attempts: None,
        jitter: false,
    });

    for attempt in 1..=config.retry.max_attempts {
        match processor.process(record).await {
            Ok(()) => {
                metrics.record_processed();
                if attempt > 1 {
                    debug!(
                        partition = record.partition,
                        offset = record.offset,
                        attempt,
                        "record processed after retry"
                    );
                }
                return ProcessOutcome::Processed;
            }
            Err(error) => {
                warn!(
                    partition = record.partition,
                    offset = record.offset,
                    attempt,
                    max_attempts = config.retry.max_attempts,
                    %error,
                    "processing attempt failed"
                );
                if attempt == config.retry.max_attempts {
                    return ProcessOutcome::Exhausted { attempts: attempt };
                }

                metrics.record_retry();
                let delay = backoff.next_delay().unwrap_or(config.retry.initial_delay);
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => return ProcessOutcome::Interrupted,
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    // Unreachable with a validated policy (max_attempts >= 1).
    ProcessOutcome::Exhausted {
        attempts: config.retry.max_attempts,
    }
}

/// Publishes a poisoned record to the dead-letter topic and awaits the
/// delivery outcome; any failure degrades to halt semantics.
async fn dead_letter(
    sink: &Arc<dyn RecordSink>,
    topic: &str,
    record: &InboundRecord,
) -> Result<(), PipelineError> {
    let failed = |reason: String| PipelineError::DeadLetterFailed {
        partition: record.partition,
        offset: record.offset,
        reason,
    };

    let key = record
        .key
        .clone()
        .unwrap_or_else(|| format!("{}-{}", record.partition, record.offset));
    let outbound = OutboundRecord::new(topic, key, record.value.clone(), epoch_millis());

    let handle = sink
        .dispatch(outbound)
        .await
        .map_err(|e| failed(e.to_string()))?;
    match handle.outcome().await.error {
        None => Ok(()),
        Some(error) => Err(failed(error.to_string())),
    }
}

/// Acknowledges a record; a failed offset commit is logged, not fatal,
/// since it only widens the redelivery window after a restart.
fn ack_record(ack: &AckHandle, metrics: &Arc<PipelineMetrics>) {
    match ack.acknowledge() {
        Ok(true) => metrics.record_acknowledged(),
        Ok(false) => {}
        Err(error) => {
            warn!(
                partition = ack.partition(),
                offset = ack.offset(),
                %error,
                "offset commit failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use weir_connectors::testing::{inbound, MockRecordSink, MockRecordStream};

    use crate::config::RetryPolicy;
    use crate::processor::ProcessError;

    /// Fails its first `failures` calls, then succeeds; records every
    /// payload it sees.
    struct FlakyProcessor {
        failures: AtomicU32,
        calls: AtomicU32,
        seen: Mutex<Vec<String>>,
    }

    impl FlakyProcessor {
        fn failing_first(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn always_ok() -> Arc<Self> {
            Self::failing_first(0)
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RecordProcessor for FlakyProcessor {
        async fn process(&self, record: &InboundRecord) -> Result<(), ProcessError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err("transient processing failure".into());
            }
            self.seen.lock().unwrap().push(record.value.clone());
            Ok(())
        }
    }

    /// Fails every attempt on payloads equal to `"poison"`.
    struct SelectiveProcessor {
        seen: Mutex<Vec<String>>,
    }

    impl SelectiveProcessor {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RecordProcessor for SelectiveProcessor {
        async fn process(&self, record: &InboundRecord) -> Result<(), ProcessError> {
            if record.value == "poison" {
                return Err("poisoned payload".into());
            }
            self.seen.lock().unwrap().push(record.value.clone());
            Ok(())
        }
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            upstream_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(1),
            retry: RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(5),
                multiplier: 2.0,
            },
        }
    }

    async fn wait_for(mut predicate: impl FnMut() -> bool) {
        for _ in 0..200 {
            if predicate() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached within 1s");
    }

    #[tokio::test]
    async fn test_processes_and_acks_in_order() {
        let (stream, tx) = MockRecordStream::channel();
        let stream = Arc::new(stream);
        let processor = FlakyProcessor::always_ok();
        let mut pipeline = ConsumerPipeline::new(
            Arc::clone(&stream) as _,
            Arc::clone(&processor) as _,
            test_config(),
            EscalationStrategy::Halt,
        );

        tx.send(inbound(0, "a")).unwrap();
        tx.send(inbound(1, "b")).unwrap();
        tx.send(inbound(2, "c")).unwrap();

        pipeline.start().await.unwrap();
        wait_for(|| stream.acks().len() == 3).await;

        assert_eq!(stream.acks(), vec![(0, 0), (0, 1), (0, 2)]);
        assert_eq!(processor.seen(), ["a", "b", "c"]);

        pipeline.stop().await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert_eq!(pipeline.metrics().processed, 3);
        assert_eq!(pipeline.metrics().acknowledged, 3);
        assert_eq!(stream.unsubscribes(), 1);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds_and_acks_once() {
        let (stream, tx) = MockRecordStream::channel();
        let stream = Arc::new(stream);
        let processor = FlakyProcessor::failing_first(2);
        let mut pipeline = ConsumerPipeline::new(
            Arc::clone(&stream) as _,
            Arc::clone(&processor) as _,
            test_config(),
            EscalationStrategy::Halt,
        );

        tx.send(inbound(5, "x")).unwrap();

        pipeline.start().await.unwrap();
        wait_for(|| !stream.acks().is_empty()).await;

        assert_eq!(stream.acks(), vec![(0, 5)]);
        assert_eq!(processor.calls(), 3);
        assert_eq!(pipeline.metrics().retries, 2);
        assert_eq!(pipeline.metrics().processed, 1);

        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_halt_on_exhaustion_leaves_offset_uncommitted() {
        let (stream, tx) = MockRecordStream::channel();
        let stream = Arc::new(stream);
        let processor = FlakyProcessor::failing_first(u32::MAX);
        let mut pipeline = ConsumerPipeline::new(
            Arc::clone(&stream) as _,
            Arc::clone(&processor) as _,
            test_config(),
            EscalationStrategy::Halt,
        );

        tx.send(inbound(0, "bad")).unwrap();
        tx.send(inbound(1, "never reached")).unwrap();

        pipeline.start().await.unwrap();
        wait_for(|| pipeline.state() == PipelineState::Failed).await;

        // Three attempts on the first record, the second never delivered.
        assert_eq!(processor.calls(), 3);
        assert!(stream.acks().is_empty());
        assert_eq!(pipeline.metrics().failures, 1);

        let result = pipeline.stop().await;
        assert!(matches!(
            result,
            Err(PipelineError::RetriesExhausted {
                attempts: 3,
                partition: 0,
                offset: 0,
            })
        ));
        assert_eq!(stream.unsubscribes(), 1);
    }

    #[tokio::test]
    async fn test_skip_acks_poisoned_record_and_continues() {
        let (stream, tx) = MockRecordStream::channel();
        let stream = Arc::new(stream);
        let processor = SelectiveProcessor::new();
        let mut pipeline = ConsumerPipeline::new(
            Arc::clone(&stream) as _,
            Arc::clone(&processor) as _,
            test_config(),
            EscalationStrategy::Skip,
        );

        tx.send(inbound(0, "poison")).unwrap();
        tx.send(inbound(1, "fine")).unwrap();

        pipeline.start().await.unwrap();
        wait_for(|| stream.acks().len() == 2).await;

        assert_eq!(stream.acks(), vec![(0, 0), (0, 1)]);
        assert_eq!(processor.seen(), ["fine"]);
        assert_eq!(pipeline.metrics().dropped, 1);
        assert_eq!(pipeline.metrics().processed, 1);

        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_dead_letter_routes_then_acks() {
        let (stream, tx) = MockRecordStream::channel();
        let stream = Arc::new(stream);
        let processor = SelectiveProcessor::new();
        let dlq = Arc::new(MockRecordSink::new());
        let mut pipeline = ConsumerPipeline::new(
            Arc::clone(&stream) as _,
            Arc::clone(&processor) as _,
            test_config(),
            EscalationStrategy::DeadLetter {
                topic: "changes-dlq".into(),
            },
        )
        .with_dead_letter_sink(Arc::clone(&dlq) as _);

        tx.send(inbound(4, "poison")).unwrap();

        pipeline.start().await.unwrap();
        wait_for(|| !stream.acks().is_empty()).await;

        assert_eq!(stream.acks(), vec![(0, 4)]);
        let routed = dlq.sent();
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].topic, "changes-dlq");
        assert_eq!(routed[0].value, "poison");
        assert_eq!(pipeline.metrics().dropped, 1);

        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_dead_letter_failure_halts() {
        let (stream, tx) = MockRecordStream::channel();
        let stream = Arc::new(stream);
        let processor = SelectiveProcessor::new();
        let dlq = Arc::new(MockRecordSink::failing_every(1));
        let mut pipeline = ConsumerPipeline::new(
            Arc::clone(&stream) as _,
            Arc::clone(&processor) as _,
            test_config(),
            EscalationStrategy::DeadLetter {
                topic: "changes-dlq".into(),
            },
        )
        .with_dead_letter_sink(Arc::clone(&dlq) as _);

        tx.send(inbound(9, "poison")).unwrap();

        pipeline.start().await.unwrap();
        wait_for(|| pipeline.state() == PipelineState::Failed).await;

        assert!(stream.acks().is_empty());
        let result = pipeline.stop().await;
        assert!(matches!(
            result,
            Err(PipelineError::DeadLetterFailed {
                partition: 0,
                offset: 9,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_dead_letter_strategy_requires_sink() {
        let (stream, _tx) = MockRecordStream::channel();
        let stream = Arc::new(stream);
        let mut pipeline = ConsumerPipeline::new(
            Arc::clone(&stream) as _,
            FlakyProcessor::always_ok() as _,
            test_config(),
            EscalationStrategy::DeadLetter {
                topic: "dlq".into(),
            },
        );

        let result = pipeline.start().await;
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert_eq!(stream.subscribes(), 0);
    }

    #[tokio::test]
    async fn test_double_start_is_a_no_op() {
        let (stream, _tx) = MockRecordStream::channel();
        let stream = Arc::new(stream);
        let mut pipeline = ConsumerPipeline::new(
            Arc::clone(&stream) as _,
            FlakyProcessor::always_ok() as _,
            test_config(),
            EscalationStrategy::Halt,
        );

        pipeline.start().await.unwrap();
        pipeline.start().await.unwrap();
        assert_eq!(stream.subscribes(), 1);

        pipeline.stop().await.unwrap();
        assert_eq!(stream.unsubscribes(), 1);
    }
}
