//! Record types flowing through the bridge.
//!
//! All payloads are opaque UTF-8 text end to end; nothing in this crate
//! interprets them.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::ConnectorError;

/// A single event payload emitted by an event-stream source.
///
/// Created per network chunk, consumed once by the producer pipeline,
/// then discarded.
pub type RawEvent = String;

/// A keyed record bound for the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    /// Destination topic.
    pub topic: String,
    /// Partitioning/dedup key, derived fresh per record.
    pub key: String,
    /// Opaque payload.
    pub value: String,
    /// Producer-assigned timestamp (epoch millis).
    pub timestamp_millis: i64,
    /// Token echoed back in the [`SendResult`] so async outcomes can be
    /// matched to their originating record without blocking.
    pub correlation_token: String,
}

impl OutboundRecord {
    /// Creates a record whose correlation token is its key.
    #[must_use]
    pub fn new(
        topic: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
        timestamp_millis: i64,
    ) -> Self {
        let key = key.into();
        Self {
            topic: topic.into(),
            correlation_token: key.clone(),
            key,
            value: value.into(),
            timestamp_millis,
        }
    }
}

/// Per-record outcome of a broker send.
#[derive(Debug)]
pub struct SendResult {
    /// Token of the originating [`OutboundRecord`].
    pub correlation_token: String,
    /// Partition the record landed in, on success.
    pub partition: Option<i32>,
    /// Offset the record landed at, on success.
    pub offset: Option<i64>,
    /// The failure, if the send did not complete.
    pub error: Option<ConnectorError>,
}

impl SendResult {
    /// A successful delivery outcome.
    #[must_use]
    pub fn success(correlation_token: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self {
            correlation_token: correlation_token.into(),
            partition: Some(partition),
            offset: Some(offset),
            error: None,
        }
    }

    /// A failed delivery outcome.
    #[must_use]
    pub fn failure(correlation_token: impl Into<String>, error: ConnectorError) -> Self {
        Self {
            correlation_token: correlation_token.into(),
            partition: None,
            offset: None,
            error: Some(error),
        }
    }

    /// Returns whether the record was delivered.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A record received from the broker, with its position metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRecord {
    /// Partition the record was read from.
    pub partition: i32,
    /// Partition-local offset of the record.
    pub offset: i64,
    /// Record key, if any.
    pub key: Option<String>,
    /// Opaque payload.
    pub value: String,
}

/// Commit closure invoked by [`AckHandle::acknowledge`].
pub type CommitFn = Box<dyn Fn() -> Result<(), ConnectorError> + Send + Sync>;

/// Capability to commit one record's offset, at most once.
///
/// Invoking [`acknowledge`](Self::acknowledge) more than once is a no-op;
/// never invoking it leaves the offset uncommitted, so the record is
/// redelivered after a restart (at-least-once).
pub struct AckHandle {
    partition: i32,
    offset: i64,
    acked: AtomicBool,
    commit: CommitFn,
}

impl AckHandle {
    /// Creates a handle that commits via `commit` on first acknowledge.
    #[must_use]
    pub fn new(partition: i32, offset: i64, commit: CommitFn) -> Self {
        Self {
            partition,
            offset,
            acked: AtomicBool::new(false),
            commit,
        }
    }

    /// Partition this handle commits for.
    #[must_use]
    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Offset this handle commits.
    #[must_use]
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Commits the offset on first call; later calls are no-ops.
    ///
    /// Returns `Ok(true)` if this call performed the commit, `Ok(false)`
    /// if the handle was already acknowledged.
    ///
    /// # Errors
    ///
    /// Propagates the commit failure; the handle stays acknowledged
    /// regardless, since retrying a failed commit would reorder commits
    /// behind later acknowledgments.
    pub fn acknowledge(&self) -> Result<bool, ConnectorError> {
        if self.acked.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        (self.commit)()?;
        Ok(true)
    }

    /// Returns whether `acknowledge` has been invoked.
    #[must_use]
    pub fn is_acknowledged(&self) -> bool {
        self.acked.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for AckHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckHandle")
            .field("partition", &self.partition)
            .field("offset", &self.offset)
            .field("acked", &self.is_acknowledged())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[test]
    fn test_outbound_token_is_key() {
        let record = OutboundRecord::new("t", "1700000000000-1", "payload", 1_700_000_000_000);
        assert_eq!(record.correlation_token, record.key);
        assert_eq!(record.topic, "t");
    }

    #[test]
    fn test_send_result_success() {
        let result = SendResult::success("tok", 2, 41);
        assert!(result.is_success());
        assert_eq!(result.partition, Some(2));
        assert_eq!(result.offset, Some(41));
    }

    #[test]
    fn test_send_result_failure() {
        let result = SendResult::failure("tok", ConnectorError::WriteError("boom".into()));
        assert!(!result.is_success());
        assert!(result.partition.is_none());
    }

    #[test]
    fn test_ack_commits_once() {
        let commits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&commits);
        let handle = AckHandle::new(
            0,
            7,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        assert!(!handle.is_acknowledged());
        assert!(handle.acknowledge().unwrap());
        assert!(!handle.acknowledge().unwrap());
        assert!(!handle.acknowledge().unwrap());
        assert_eq!(commits.load(Ordering::SeqCst), 1);
        assert!(handle.is_acknowledged());
    }

    #[test]
    fn test_ack_commit_failure_propagates() {
        let handle = AckHandle::new(
            1,
            3,
            Box::new(|| Err(ConnectorError::WriteError("commit refused".into()))),
        );

        assert!(handle.acknowledge().is_err());
        // Still considered acknowledged; no re-commit on later calls.
        assert!(handle.is_acknowledged());
        assert!(!handle.acknowledge().unwrap());
    }

    #[test]
    fn test_ack_metadata() {
        let handle = AckHandle::new(3, 99, Box::new(|| Ok(())));
        assert_eq!(handle.partition(), 3);
        assert_eq!(handle.offset(), 99);
    }
}
