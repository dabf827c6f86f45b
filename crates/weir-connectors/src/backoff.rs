//! Retry backoff schedules: exponential delay with jitter and caps.
//!
//! One policy type drives every retry loop in the bridge — stream
//! reconnection, and consumer-side processing retries — so tests can
//! shrink the delays without touching the loops.

use std::time::Duration;

use tracing::debug;

/// Parameters of an exponential backoff schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub multiplier: f64,
    /// Maximum number of attempts, or `None` for unbounded retry.
    pub max_attempts: Option<u32>,
    /// Whether to apply deterministic ±25% jitter to each delay.
    pub jitter: bool,
}

impl BackoffPolicy {
    /// Schedule used for stream reconnection: 1s doubling to a 30s cap,
    /// unbounded attempts, jittered.
    #[must_use]
    pub fn reconnect() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: None,
            jitter: true,
        }
    }

    /// Builds the mutable schedule state for this policy.
    #[must_use]
    pub fn start(&self) -> Backoff {
        Backoff::new(self.clone())
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::reconnect()
    }
}

/// Mutable state of an in-progress backoff schedule.
///
/// `next_delay` advances the schedule; `reset` rewinds it after a
/// success so the next failure starts from the initial delay again.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
    current_delay: Duration,
}

impl Backoff {
    /// Creates schedule state at the initial delay.
    #[must_use]
    pub fn new(policy: BackoffPolicy) -> Self {
        let current_delay = policy.initial_delay;
        Self {
            policy,
            attempt: 0,
            current_delay,
        }
    }

    /// Returns the number of delays handed out since the last reset.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns whether the attempt limit has been reached.
    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.policy
            .max_attempts
            .is_some_and(|max| self.attempt >= max)
    }

    /// Rewinds the schedule after a success.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current_delay = self.policy.initial_delay;
        debug!("backoff schedule reset");
    }

    /// Computes the next delay and advances the schedule.
    ///
    /// Returns `None` once the attempt limit is exhausted.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.exhausted() {
            return None;
        }

        self.attempt += 1;

        let delay = self.current_delay;

        // Deterministic jitter: ±25% of the delay, derived from the attempt
        // number so schedules stay reproducible in tests.
        let delay = if self.policy.jitter {
            let jitter_range = delay.as_millis() as f64 * 0.25;
            let jitter_offset =
                (f64::from(self.attempt) * 7.0 % jitter_range) - (jitter_range / 2.0);
            let jittered_ms = (delay.as_millis() as f64 + jitter_offset).max(1.0);
            Duration::from_millis(jittered_ms as u64)
        } else {
            delay
        };

        let next_ms = (self.current_delay.as_millis() as f64 * self.policy.multiplier) as u64;
        self.current_delay = Duration::from_millis(next_ms).min(self.policy.max_delay);

        Some(delay)
    }
}
