//! End-to-end bridge flow over in-memory connectors: event stream →
//! producer pipeline → simulated topic → consumer pipeline.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use weir_connectors::testing::{MockEventSource, MockRecordSink, MockRecordStream};
use weir_connectors::InboundRecord;
use weir_pipeline::{
    ConsumerPipeline, EscalationStrategy, PipelineConfig, PipelineState, ProcessError,
    ProducerPipeline, RecordProcessor, RetryPolicy,
};

/// Collects every processed payload in arrival order.
struct Recorder {
    seen: Mutex<Vec<String>>,
}

impl Recorder {
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
impl RecordProcessor for Recorder {
    async fn process(&self, record: &InboundRecord) -> Result<(), ProcessError> {
        self.seen.lock().unwrap().push(record.value.clone());
        Ok(())
    }
}

fn bridge_config() -> PipelineConfig {
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
    for _ in 0..400 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within 2s");
}

/// Replays records "delivered" by the sink into the consumer's stream,
/// assigning sequential offsets on partition 0 like a single-partition
/// topic would.
fn simulate_topic(
    mut delivered: mpsc::UnboundedReceiver<weir_connectors::OutboundRecord>,
    into_stream: mpsc::UnboundedSender<InboundRecord>,
) {
    tokio::spawn(async move {
        let mut offset = 0;
        while let Some(record) = delivered.recv().await {
            let inbound = InboundRecord {
                partition: 0,
                offset,
                key: Some(record.key),
                value: record.value,
            };
            if into_stream.send(inbound).is_err() {
                break;
            }
            offset += 1;
        }
    });
}

#[tokio::test]
async fn test_events_flow_end_to_end_in_order() {
    let source = MockEventSource::with_events(["a", "b", "c"]);
    let sink = Arc::new(MockRecordSink::new());
    let (topic_tx, topic_rx) = mpsc::unbounded_channel();
    sink.forward_to(topic_tx);

    let (stream, stream_tx) = MockRecordStream::channel();
    let stream = Arc::new(stream);
    simulate_topic(topic_rx, stream_tx);

    let recorder = Recorder::new();
    let mut producer = ProducerPipeline::new(
        source,
        Arc::clone(&sink) as _,
        "changes",
        bridge_config(),
    );
    let mut consumer = ConsumerPipeline::new(
        Arc::clone(&stream) as _,
        Arc::clone(&recorder) as _,
        bridge_config(),
        EscalationStrategy::Halt,
    );

    producer.start().await.unwrap();
    consumer.start().await.unwrap();

    wait_for(|| stream.acks().len() == 3).await;

    assert_eq!(recorder.seen(), ["a", "b", "c"]);
    assert_eq!(stream.acks(), vec![(0, 0), (0, 1), (0, 2)]);
    assert_eq!(producer.metrics().sent, 3);
    assert_eq!(consumer.metrics().processed, 3);
    assert_eq!(consumer.metrics().acknowledged, 3);

    consumer.stop().await.unwrap();
    producer.stop().await.unwrap();
    assert_eq!(producer.state(), PipelineState::Stopped);
    assert_eq!(consumer.state(), PipelineState::Stopped);
}

#[tokio::test]
async fn test_failed_sends_never_reach_the_consumer() {
    let source = MockEventSource::with_events(["v0", "v1", "v2", "v3"]);
    let sink = Arc::new(MockRecordSink::failing_every(2));
    let (topic_tx, topic_rx) = mpsc::unbounded_channel();
    sink.forward_to(topic_tx);

    let (stream, stream_tx) = MockRecordStream::channel();
    let stream = Arc::new(stream);
    simulate_topic(topic_rx, stream_tx);

    let recorder = Recorder::new();
    let mut producer = ProducerPipeline::new(
        source,
        Arc::clone(&sink) as _,
        "changes",
        bridge_config(),
    );
    let mut consumer = ConsumerPipeline::new(
        Arc::clone(&stream) as _,
        Arc::clone(&recorder) as _,
        bridge_config(),
        EscalationStrategy::Halt,
    );

    producer.start().await.unwrap();
    consumer.start().await.unwrap();

    wait_for(|| stream.acks().len() == 2).await;

    // Every second dispatch failed upstream; the survivors arrive in
    // their original relative order with contiguous simulated offsets.
    assert_eq!(recorder.seen(), ["v0", "v2"]);
    assert_eq!(stream.acks(), vec![(0, 0), (0, 1)]);
    assert_eq!(producer.metrics().dropped, 2);

    consumer.stop().await.unwrap();
    producer.stop().await.unwrap();
}
