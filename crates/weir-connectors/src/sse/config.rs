//! HTTP event-stream source configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffPolicy;
use crate::config::ConnectorConfig;
use crate::error::ConnectorError;

// ---------------------------------------------------------------------------
// Serde helper: Duration as milliseconds
// ---------------------------------------------------------------------------

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

// ---------------------------------------------------------------------------
// Default helpers
// ---------------------------------------------------------------------------

/// Default per-read idle timeout: 60 seconds without bytes means the
/// connection is treated as stalled.
const fn default_idle_timeout() -> Duration {
    Duration::from_secs(60)
}

/// Default connect timeout: 10 seconds.
const fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Default reconnect initial delay: 1 second.
const fn default_reconnect_initial_delay() -> Duration {
    Duration::from_secs(1)
}

/// Default reconnect maximum delay: 30 seconds.
const fn default_reconnect_max_delay() -> Duration {
    Duration::from_secs(30)
}

/// Default exponential backoff multiplier.
const fn default_backoff_multiplier() -> f64 {
    2.0
}

/// Default channel capacity between the reader task and `recv`: 10,000.
const fn default_channel_capacity() -> usize {
    10_000
}

/// Default maximum accepted payload size: 1 MiB.
const fn default_max_event_bytes() -> usize {
    1024 * 1024
}

/// Returns `true` (used for `#[serde(default)]` on boolean fields).
const fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Configuration for the HTTP event-stream source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseSourceConfig {
    /// URL of the stream endpoint (`http://` or `https://`).
    pub url: String,

    /// Per-read idle timeout; no bytes for this long means the connection
    /// is stalled and gets reopened.
    #[serde(with = "duration_millis", default = "default_idle_timeout")]
    pub idle_timeout: Duration,

    /// TCP/TLS connect timeout for each connection attempt.
    #[serde(with = "duration_millis", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Delay before the first reconnect attempt.
    #[serde(
        with = "duration_millis",
        default = "default_reconnect_initial_delay"
    )]
    pub reconnect_initial_delay: Duration,

    /// Upper bound on any single reconnect delay.
    #[serde(with = "duration_millis", default = "default_reconnect_max_delay")]
    pub reconnect_max_delay: Duration,

    /// Multiplier applied to the reconnect delay after each attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Whether reconnect delays are jittered.
    #[serde(default = "default_true")]
    pub jitter: bool,

    /// Capacity of the bounded channel between the reader task and
    /// `recv`. A full channel blocks the reader (backpressure).
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Maximum accepted payload size in bytes; longer lines are dropped
    /// whole with a warning.
    #[serde(default = "default_max_event_bytes")]
    pub max_event_bytes: usize,
}

impl Default for SseSourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            idle_timeout: default_idle_timeout(),
            connect_timeout: default_connect_timeout(),
            reconnect_initial_delay: default_reconnect_initial_delay(),
            reconnect_max_delay: default_reconnect_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_true(),
            channel_capacity: default_channel_capacity(),
            max_event_bytes: default_max_event_bytes(),
        }
    }
}

impl SseSourceConfig {
    /// Creates a config for `url` with default tuning.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Parses a source config from a [`ConnectorConfig`] property bag.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::MissingConfig` if required keys are
    /// absent, or `ConnectorError::ConfigurationError` on invalid values.
    #[allow(clippy::field_reassign_with_default)]
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, ConnectorError> {
        let mut cfg = Self::default();

        cfg.url = config
            .get("stream.url")
            .ok_or_else(|| ConnectorError::MissingConfig("stream.url".into()))?
            .to_string();

        if let Some(v) = config.get("idle.timeout.ms") {
            cfg.idle_timeout = Duration::from_millis(parse_ms(v, "idle.timeout.ms")?);
        }

        if let Some(v) = config.get("connect.timeout.ms") {
            cfg.connect_timeout = Duration::from_millis(parse_ms(v, "connect.timeout.ms")?);
        }

        if let Some(v) = config.get("reconnect.initial.delay.ms") {
            cfg.reconnect_initial_delay =
                Duration::from_millis(parse_ms(v, "reconnect.initial.delay.ms")?);
        }

        if let Some(v) = config.get("reconnect.max.delay.ms") {
            cfg.reconnect_max_delay =
                Duration::from_millis(parse_ms(v, "reconnect.max.delay.ms")?);
        }

        if let Some(v) = config.get("reconnect.jitter") {
            cfg.jitter = v.parse().map_err(|_| {
                ConnectorError::ConfigurationError(format!("invalid reconnect.jitter: '{v}'"))
            })?;
        }

        if let Some(v) = config.get("channel.capacity") {
            cfg.channel_capacity = v.parse().map_err(|_| {
                ConnectorError::ConfigurationError(format!("invalid channel.capacity: '{v}'"))
            })?;
        }

        if let Some(v) = config.get("max.event.bytes") {
            cfg.max_event_bytes = v.parse().map_err(|_| {
                ConnectorError::ConfigurationError(format!("invalid max.event.bytes: '{v}'"))
            })?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` on missing or out-of-range values.
    pub fn validate(&self) -> Result<(), ConnectorError> {
        if self.url.is_empty() {
            return Err(ConnectorError::MissingConfig("stream.url".into()));
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(ConnectorError::ConfigurationError(format!(
                "stream.url must be http:// or https://, got '{}'",
                self.url
            )));
        }
        if self.channel_capacity == 0 {
            return Err(ConnectorError::ConfigurationError(
                "channel.capacity must be > 0".into(),
            ));
        }
        if self.max_event_bytes == 0 {
            return Err(ConnectorError::ConfigurationError(
                "max.event.bytes must be > 0".into(),
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(ConnectorError::ConfigurationError(
                "idle.timeout.ms must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Builds the reconnect backoff policy for this source.
    #[must_use]
    pub fn reconnect_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial_delay: self.reconnect_initial_delay,
            max_delay: self.reconnect_max_delay,
            multiplier: self.backoff_multiplier,
            max_attempts: None,
            jitter: self.jitter,
        }
    }
}

fn parse_ms(value: &str, key: &str) -> Result<u64, ConnectorError> {
    value
        .parse()
        .map_err(|_| ConnectorError::ConfigurationError(format!("invalid {key}: '{value}'")))
}
