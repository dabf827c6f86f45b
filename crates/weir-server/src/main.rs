//! Bridge server: pulls an HTTP event stream into a Kafka topic and
//! consumes it back out with at-least-once processing.
//!
//! Configuration comes from CLI flags or environment variables (a `.env`
//! file is loaded first). `--mode` selects which side of the bridge
//! runs; the default runs both against the same topic.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{error, info};

use weir_connectors::{
    KafkaSink, KafkaSinkConfig, KafkaSourceConfig, KafkaStreamSource, SseSource, SseSourceConfig,
};
use weir_pipeline::{
    ConsumerPipeline, EscalationStrategy, LogProcessor, PipelineConfig, ProducerPipeline,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Stream events into the topic only.
    Produce,
    /// Consume and process the topic only.
    Consume,
    /// Run both sides against the same topic.
    Bridge,
}

#[derive(Debug, Parser)]
#[command(name = "weir-server", version, about = "HTTP event stream to Kafka bridge")]
struct Args {
    /// HTTP event-stream URL to bridge from.
    #[arg(
        long,
        env = "WEIR_STREAM_URL",
        default_value = "https://stream.wikimedia.org/v2/stream/recentchange"
    )]
    stream_url: String,

    /// Kafka bootstrap servers (comma-separated host:port pairs).
    #[arg(long, env = "WEIR_BROKERS", default_value = "localhost:9092")]
    brokers: String,

    /// Topic the bridge produces to and consumes from.
    #[arg(long, env = "WEIR_TOPIC", default_value = "wikimedia.recentchange")]
    topic: String,

    /// Consumer group id.
    #[arg(long, env = "WEIR_GROUP_ID", default_value = "weir-bridge")]
    group_id: String,

    /// Which side(s) of the bridge to run.
    #[arg(long, env = "WEIR_MODE", value_enum, default_value = "bridge")]
    mode: Mode,

    /// What to do when consumer retries are exhausted:
    /// `halt`, `skip`, or `dead-letter:<topic>`.
    #[arg(long, env = "WEIR_ESCALATION", default_value = "halt")]
    escalation: String,

    /// Seconds of upstream silence before the producer pipeline fails.
    #[arg(long, env = "WEIR_UPSTREAM_TIMEOUT_SECS", default_value_t = 30)]
    upstream_timeout_secs: u64,

    /// Tokio worker threads (defaults to the number of cores).
    #[arg(long, env = "WEIR_WORKER_THREADS")]
    worker_threads: Option<usize>,

    /// Directory the log file is written to.
    #[arg(long, env = "WEIR_LOG_DIR", default_value = ".")]
    log_dir: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let file_appender = tracing_appender::rolling::never(&args.log_dir, "weir-server.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(threads) = args.worker_threads {
        builder.worker_threads(threads);
    }
    let runtime = builder.build()?;
    runtime.block_on(serve(args))
}

async fn serve(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let escalation = EscalationStrategy::from_str(&args.escalation)?;
    let mut pipeline_config = PipelineConfig::default();
    pipeline_config.upstream_timeout = Duration::from_secs(args.upstream_timeout_secs);

    info!(
        mode = ?args.mode,
        topic = %args.topic,
        brokers = %args.brokers,
        escalation = %escalation,
        "starting weir server"
    );

    let mut producer = if matches!(args.mode, Mode::Produce | Mode::Bridge) {
        let source = SseSource::new(SseSourceConfig::new(&args.stream_url));
        let sink = Arc::new(KafkaSink::new(KafkaSinkConfig::new(
            &args.brokers,
            &args.topic,
        ))?);
        let mut pipeline = ProducerPipeline::new(
            source,
            sink as _,
            args.topic.clone(),
            pipeline_config.clone(),
        );
        pipeline.start().await?;
        Some(pipeline)
    } else {
        None
    };

    let mut consumer = if matches!(args.mode, Mode::Consume | Mode::Bridge) {
        let stream = Arc::new(KafkaStreamSource::new(KafkaSourceConfig::new(
            &args.brokers,
            &args.group_id,
            &args.topic,
        ))?);
        let mut pipeline = ConsumerPipeline::new(
            stream as _,
            Arc::new(LogProcessor) as _,
            pipeline_config,
            escalation.clone(),
        );
        if let EscalationStrategy::DeadLetter { topic } = &escalation {
            let dlq = Arc::new(KafkaSink::new(KafkaSinkConfig::new(&args.brokers, topic))?);
            pipeline = pipeline.with_dead_letter_sink(dlq as _);
        }
        pipeline.start().await?;
        Some(pipeline)
    } else {
        None
    };

    wait_for_shutdown().await;
    info!("shutdown signal received, stopping pipelines");

    if let Some(pipeline) = consumer.as_mut() {
        if let Err(err) = pipeline.stop().await {
            error!(error = %err, "consumer pipeline ended with error");
        }
        let snap = pipeline.metrics();
        info!(
            processed = snap.processed,
            acknowledged = snap.acknowledged,
            retries = snap.retries,
            dropped = snap.dropped,
            "final consumer metrics"
        );
    }

    if let Some(pipeline) = producer.as_mut() {
        if let Err(err) = pipeline.stop().await {
            error!(error = %err, "producer pipeline ended with error");
        }
        let snap = pipeline.metrics();
        info!(
            received = snap.received,
            sent = snap.sent,
            send_failures = snap.send_failures,
            dropped = snap.dropped,
            "final producer metrics"
        );
    }

    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(error) => {
                error!(%error, "SIGTERM handler unavailable, waiting on ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
