//! Pipeline error types.

use std::time::Duration;

use weir_connectors::ConnectorError;

/// Terminal and configuration errors surfaced by the pipelines.
///
/// Per-record failures (send timeouts, transient broker errors) are
/// handled inside the pipelines and never appear here; these variants
/// describe conditions that stop a pipeline or prevent it starting.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The pipeline is misconfigured or missing a collaborator.
    #[error("pipeline configuration error: {0}")]
    Configuration(String),

    /// No upstream event arrived within the absence timeout.
    #[error("no upstream event within {elapsed:?}")]
    UpstreamTimeout {
        /// The silence window that was exceeded.
        elapsed: Duration,
    },

    /// The event source ended its sequence permanently.
    #[error("event source closed permanently")]
    SourceClosed,

    /// Consumer-side retries exhausted under the halt strategy.
    #[error(
        "processing retries exhausted after {attempts} attempts \
         (partition {partition}, offset {offset})"
    )]
    RetriesExhausted {
        /// Total processing attempts made.
        attempts: u32,
        /// Partition of the poisoned record.
        partition: i32,
        /// Offset of the poisoned record.
        offset: i64,
    },

    /// Dead-letter publication failed; halt semantics apply.
    #[error("dead-letter publish failed for partition {partition} offset {offset}: {reason}")]
    DeadLetterFailed {
        /// Partition of the record that could not be dead-lettered.
        partition: i32,
        /// Offset of the record that could not be dead-lettered.
        offset: i64,
        /// Underlying publish failure.
        reason: String,
    },

    /// Connector-level failure passthrough.
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// The run task panicked or could not be joined.
    #[error("pipeline task failed: {0}")]
    TaskFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_upstream_timeout() {
        let e = PipelineError::UpstreamTimeout {
            elapsed: Duration::from_secs(30),
        };
        assert!(e.to_string().contains("30s"));
    }

    #[test]
    fn test_display_retries_exhausted() {
        let e = PipelineError::RetriesExhausted {
            attempts: 3,
            partition: 1,
            offset: 42,
        };
        let s = e.to_string();
        assert!(s.contains("3 attempts"));
        assert!(s.contains("partition 1"));
        assert!(s.contains("offset 42"));
    }

    #[test]
    fn test_connector_error_converts() {
        let e: PipelineError = ConnectorError::ReadError("boom".into()).into();
        assert!(matches!(e, PipelineError::Connector(_)));
    }
}
