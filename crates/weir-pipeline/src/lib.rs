//! # Weir Pipeline
//!
//! Orchestration for the weir event bridge: a producer pipeline moving
//! stream payloads into the broker with per-record failure isolation,
//! and a consumer pipeline processing broker records with explicit
//! acknowledgment and a bounded-retry-then-escalate policy.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

/// Pipeline configuration and retry policy
pub mod config;

/// Consumer pipeline: receive, process, acknowledge
pub mod consumer;

/// Pipeline error types
pub mod error;

/// Escalation strategies for exhausted consumer retries
pub mod escalation;

/// Typed adapter for the recent-change event feed
pub mod event;

/// Lock-free pipeline counters
pub mod metrics;

/// Record processing seam and the default logging processor
pub mod processor;

/// Producer pipeline: map, key, send
pub mod producer;

/// Pipeline lifecycle state machine
pub mod state;

pub use config::{PipelineConfig, RetryPolicy};
pub use consumer::ConsumerPipeline;
pub use error::PipelineError;
pub use escalation::EscalationStrategy;
pub use event::{RecentChange, RecentChangeMeta};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use processor::{LogProcessor, ProcessError, RecordProcessor};
pub use producer::ProducerPipeline;
pub use state::{PipelineState, StateCell};

/// Milliseconds since the Unix epoch, saturating at zero on clock skew.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn epoch_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}
