//! Lock-free pipeline counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-pipeline counters using atomics (no locks on the data path).
///
/// The producer side uses `received`/`sent`/`send_failures`/`dropped`;
/// the consumer side uses `processed`/`retries`/`acknowledged`/
/// `dropped`. `failures` counts pipeline-level terminations on both.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Events received from the upstream source.
    pub received: AtomicU64,
    /// Records confirmed delivered to the broker.
    pub sent: AtomicU64,
    /// Per-record send failures (timeouts included).
    pub send_failures: AtomicU64,
    /// Records dropped or skipped after a failure.
    pub dropped: AtomicU64,
    /// Records successfully processed.
    pub processed: AtomicU64,
    /// Processing retry attempts.
    pub retries: AtomicU64,
    /// Offsets acknowledged.
    pub acknowledged: AtomicU64,
    /// Pipeline-level failures (terminal).
    pub failures: AtomicU64,
}

impl PipelineMetrics {
    /// Records an upstream event arrival.
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a confirmed delivery.
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a per-record send failure.
    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a dropped or skipped record.
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful processing attempt.
    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a processing retry.
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an acknowledged offset.
    pub fn record_acknowledged(&self) {
        self.acknowledged.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a terminal pipeline failure.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of the current counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Events received from the upstream source.
    pub received: u64,
    /// Records confirmed delivered to the broker.
    pub sent: u64,
    /// Per-record send failures.
    pub send_failures: u64,
    /// Records dropped or skipped after a failure.
    pub dropped: u64,
    /// Records successfully processed.
    pub processed: u64,
    /// Processing retry attempts.
    pub retries: u64,
    /// Offsets acknowledged.
    pub acknowledged: u64,
    /// Pipeline-level failures.
    pub failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = PipelineMetrics::default();
        metrics.record_received();
        metrics.record_received();
        metrics.record_sent();
        metrics.record_send_failure();
        metrics.record_dropped();

        let snap = metrics.snapshot();
        assert_eq!(snap.received, 2);
        assert_eq!(snap.sent, 1);
        assert_eq!(snap.send_failures, 1);
        assert_eq!(snap.dropped, 1);
        assert_eq!(snap.failures, 0);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let metrics = PipelineMetrics::default();
        let before = metrics.snapshot();
        metrics.record_acknowledged();
        let after = metrics.snapshot();
        assert_eq!(before.acknowledged, 0);
        assert_eq!(after.acknowledged, 1);
    }
}
