//! Pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Serde helper that encodes a [`Duration`] as a `u64` millisecond count.
mod duration_millis {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Default guard against a silently dead upstream: 30 seconds without an
/// event fails the producer pipeline.
const fn default_upstream_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Default bound on joining a pipeline task during `stop`.
const fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Configuration shared by both pipelines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum silence from the upstream source before the producer
    /// pipeline fails.
    ///
    /// This defends the pipeline independently of the source's own
    /// stall handling; it does not reconnect, it surfaces.
    #[serde(with = "duration_millis", default = "default_upstream_timeout")]
    pub upstream_timeout: Duration,

    /// How long `stop` waits for the run task to finish (and, on the
    /// producer side, for the flush to drain).
    #[serde(with = "duration_millis", default = "default_shutdown_timeout")]
    pub shutdown_timeout: Duration,

    /// Consumer-side retry policy for failed record processing.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            upstream_timeout: default_upstream_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.upstream_timeout.is_zero() {
            return Err("upstream_timeout must be > 0".into());
        }
        if self.shutdown_timeout.is_zero() {
            return Err("shutdown_timeout must be > 0".into());
        }
        self.retry.validate()
    }
}

/// Bounded retry schedule for consumer-side processing failures.
///
/// `max_attempts` counts total invocations of the processor on one
/// record, so the defaults (3 attempts, base 5s, multiplier 2) wait 5s
/// and then 10s between attempts before escalating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total processing attempts per record (first try included).
    pub max_attempts: u32,

    /// Delay before the first retry.
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,

    /// Multiplier applied to the delay after each retry.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Validates the policy.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be > 0".into());
        }
        if self.multiplier < 1.0 {
            return Err("retry.multiplier must be >= 1.0".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.upstream_timeout, Duration::from_secs(30));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_delay, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        let mut config = PipelineConfig::default();
        config.upstream_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.shutdown_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_invalid_retry_policy() {
        let mut policy = RetryPolicy::default();
        policy.max_attempts = 0;
        assert!(policy.validate().is_err());

        let mut policy = RetryPolicy::default();
        policy.multiplier = 0.5;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_serde_round_trip_with_defaults() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.upstream_timeout, Duration::from_secs(30));

        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.retry.max_attempts, 3);
    }
}
