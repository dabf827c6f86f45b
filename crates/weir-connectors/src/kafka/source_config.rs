//! Kafka source connector configuration.

use std::collections::HashMap;

use rdkafka::ClientConfig;

use crate::config::ConnectorConfig;
use crate::error::ConnectorError;

/// Configuration for the Kafka source connector.
#[derive(Debug, Clone)]
pub struct KafkaSourceConfig {
    /// Kafka broker addresses (comma-separated).
    pub bootstrap_servers: String,
    /// Consumer group identity.
    pub group_id: String,
    /// Topic to subscribe to.
    pub topic: String,
    /// Where to start when the group has no committed offset.
    pub auto_offset_reset: AutoOffsetReset,
    /// Additional rdkafka client properties (pass-through).
    pub kafka_properties: HashMap<String, String>,
}

impl Default for KafkaSourceConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: String::new(),
            group_id: String::new(),
            topic: String::new(),
            auto_offset_reset: AutoOffsetReset::Latest,
            kafka_properties: HashMap::new(),
        }
    }
}

impl KafkaSourceConfig {
    /// Creates a config for `bootstrap_servers`/`group_id`/`topic` with
    /// default tuning.
    #[must_use]
    pub fn new(
        bootstrap_servers: impl Into<String>,
        group_id: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            group_id: group_id.into(),
            topic: topic.into(),
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

        cfg.bootstrap_servers = config
            .get("bootstrap.servers")
            .ok_or_else(|| ConnectorError::MissingConfig("bootstrap.servers".into()))?
            .to_string();

        cfg.group_id = config
            .get("group.id")
            .ok_or_else(|| ConnectorError::MissingConfig("group.id".into()))?
            .to_string();

        cfg.topic = config
            .get("topic")
            .ok_or_else(|| ConnectorError::MissingConfig("topic".into()))?
            .to_string();

        if let Some(r) = config.get("auto.offset.reset") {
            cfg.auto_offset_reset = r.parse()?;
        }

        for (key, value) in config.properties_with_prefix("kafka.") {
            cfg.kafka_properties.insert(key, value);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::MissingConfig` on empty required fields.
    pub fn validate(&self) -> Result<(), ConnectorError> {
        if self.bootstrap_servers.is_empty() {
            return Err(ConnectorError::MissingConfig("bootstrap.servers".into()));
        }
        if self.group_id.is_empty() {
            return Err(ConnectorError::MissingConfig("group.id".into()));
        }
        if self.topic.is_empty() {
            return Err(ConnectorError::MissingConfig("topic".into()));
        }
        Ok(())
    }

    /// Builds an rdkafka [`ClientConfig`] from this configuration.
    ///
    /// Auto-commit is always disabled: offsets advance only through
    /// explicit per-record acknowledgment, which is what makes the
    /// at-least-once contract hold across restarts.
    #[must_use]
    pub fn to_rdkafka_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();

        config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .set("auto.offset.reset", self.auto_offset_reset.as_rdkafka_str());

        for (key, value) in &self.kafka_properties {
            config.set(key, value);
        }

        config
    }
}

/// Consumer start position when no committed offset exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoOffsetReset {
    /// Start from the earliest retained record.
    Earliest,
    /// Start from new records only.
    Latest,
}

impl AutoOffsetReset {
    /// Returns the rdkafka configuration string.
    #[must_use]
    pub fn as_rdkafka_str(&self) -> &'static str {
        match self {
            Self::Earliest => "earliest",
            Self::Latest => "latest",
        }
    }
}

str_enum!(fromstr AutoOffsetReset, lowercase_nodash, "unknown auto.offset.reset value",
    Earliest => "earliest", "beginning";
    Latest => "latest", "end"
);

impl std::fmt::Display for AutoOffsetReset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_rdkafka_str())
    }
}
