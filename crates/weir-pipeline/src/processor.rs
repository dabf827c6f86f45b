//! Record processing seam and the default logging processor.

use async_trait::async_trait;
use tracing::info;

use weir_connectors::InboundRecord;

use crate::event::RecentChange;

/// Failure returned by a processing attempt.
pub type ProcessError = Box<dyn std::error::Error + Send + Sync>;

/// The per-record side effect run by the consumer pipeline.
///
/// Implementations must be idempotent enough for at-least-once
/// delivery: the same record may be processed again after a restart.
#[async_trait]
pub trait RecordProcessor: Send + Sync {
    /// Processes one record. An `Err` triggers the pipeline's bounded
    /// retry on the same record.
    async fn process(&self, record: &InboundRecord) -> Result<(), ProcessError>;
}

/// Default processor: logs each record, with typed fields when the
/// payload parses as a recent-change event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProcessor;

#[async_trait]
impl RecordProcessor for LogProcessor {
    async fn process(&self, record: &InboundRecord) -> Result<(), ProcessError> {
        match RecentChange::from_json(&record.value) {
            Ok(event) => info!(
                partition = record.partition,
                offset = record.offset,
                title = event.title.as_deref().unwrap_or("<none>"),
                user = event.user.as_deref().unwrap_or("<none>"),
                domain = event.domain().unwrap_or("<none>"),
                kind = event.kind.as_deref().unwrap_or("<none>"),
                "processed change event"
            ),
            Err(_) => info!(
                partition = record.partition,
                offset = record.offset,
                bytes = record.value.len(),
                "processed opaque event payload"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: &str) -> InboundRecord {
        InboundRecord {
            partition: 0,
            offset: 1,
            key: None,
            value: value.into(),
        }
    }

    #[tokio::test]
    async fn test_log_processor_accepts_typed_payload() {
        let result = LogProcessor
            .process(&record(r#"{"title": "T", "user": "U"}"#))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_log_processor_accepts_opaque_payload() {
        let result = LogProcessor.process(&record("not json at all")).await;
        assert!(result.is_ok());
    }
}
