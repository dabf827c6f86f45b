//! Kafka sink connector configuration.
//!
//! [`KafkaSinkConfig`] maps the bridge's producer surface onto rdkafka
//! client properties: all-replica acknowledgment, idempotence, bounded
//! in-flight requests, time/size batching, and compression.

use std::collections::HashMap;
use std::time::Duration;

use rdkafka::ClientConfig;

use crate::config::ConnectorConfig;
use crate::error::ConnectorError;

/// Configuration for the Kafka sink connector.
#[derive(Debug, Clone)]
pub struct KafkaSinkConfig {
    /// Kafka broker addresses (comma-separated).
    pub bootstrap_servers: String,
    /// Target Kafka topic name.
    pub topic: String,
    /// Client identifier reported to the brokers.
    pub client_id: Option<String>,
    /// Acknowledgment level.
    pub acks: Acks,
    /// Maximum in-flight requests per broker connection.
    ///
    /// Idempotent producers require this to stay at 5 or below so the
    /// broker can deduplicate and preserve per-partition order across
    /// network retries.
    pub max_in_flight_per_connection: usize,
    /// Maximum time to wait before transmitting a batch.
    pub linger: Duration,
    /// Maximum batch size in bytes.
    pub batch_size: usize,
    /// Compression algorithm for produced batches.
    pub compression: CompressionType,
    /// Producer buffer memory in bytes.
    pub buffer_memory_bytes: usize,
    /// Client-level retry count for broker-transient errors.
    pub retries: u32,
    /// Delay between client-level retries.
    pub retry_backoff: Duration,
    /// Total time a record may spend in the client before delivery is
    /// abandoned (enqueue + batching + retries).
    pub delivery_timeout: Duration,
    /// Per-request broker response timeout.
    pub request_timeout: Duration,
    /// Application-level deadline for one send; a send exceeding it is
    /// reported as a failed [`SendResult`](crate::record::SendResult).
    pub send_timeout: Duration,
    /// Application-level cap on concurrently awaited sends.
    pub max_in_flight_sends: usize,
    /// Additional rdkafka client properties (pass-through).
    pub kafka_properties: HashMap<String, String>,
}

impl Default for KafkaSinkConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: String::new(),
            topic: String::new(),
            client_id: None,
            acks: Acks::All,
            max_in_flight_per_connection: 5,
            linger: Duration::from_millis(20),
            batch_size: 16_384,
            compression: CompressionType::Lz4,
            buffer_memory_bytes: 33_554_432,
            retries: 3,
            retry_backoff: Duration::from_millis(100),
            delivery_timeout: Duration::from_secs(120),
            request_timeout: Duration::from_secs(30),
            send_timeout: Duration::from_secs(5),
            max_in_flight_sends: 1_000,
            kafka_properties: HashMap::new(),
        }
    }
}

impl KafkaSinkConfig {
    /// Creates a config for `bootstrap_servers`/`topic` with default tuning.
    #[must_use]
    pub fn new(bootstrap_servers: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            topic: topic.into(),
            ..Self::default()
        }
    }

    /// Parses a sink config from a [`ConnectorConfig`] property bag.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::MissingConfig` if required keys are absent,
    /// or `ConnectorError::ConfigurationError` on invalid values.
    #[allow(clippy::too_many_lines, clippy::field_reassign_with_default)]
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, ConnectorError> {
        let mut cfg = Self::default();

        cfg.bootstrap_servers = config
            .get("bootstrap.servers")
            .ok_or_else(|| ConnectorError::MissingConfig("bootstrap.servers".into()))?
            .to_string();

        cfg.topic = config
            .get("topic")
            .ok_or_else(|| ConnectorError::MissingConfig("topic".into()))?
            .to_string();

        cfg.client_id = config.get("client.id").map(String::from);

        if let Some(a) = config.get("acks") {
            cfg.acks = a.parse()?;
        }

        if let Some(v) = config.get("max.in.flight.requests.per.connection") {
            cfg.max_in_flight_per_connection = v.parse().map_err(|_| {
                ConnectorError::ConfigurationError(format!(
                    "invalid max.in.flight.requests.per.connection: '{v}'"
                ))
            })?;
        }

        if let Some(v) = config.get("linger.ms") {
            cfg.linger = Duration::from_millis(parse_num(v, "linger.ms")?);
        }

        if let Some(v) = config.get("batch.size") {
            cfg.batch_size = v.parse().map_err(|_| {
                ConnectorError::ConfigurationError(format!("invalid batch.size: '{v}'"))
            })?;
        }

        if let Some(c) = config.get("compression.type") {
            cfg.compression = c.parse()?;
        }

        if let Some(v) = config.get("buffer.memory") {
            cfg.buffer_memory_bytes = v.parse().map_err(|_| {
                ConnectorError::ConfigurationError(format!("invalid buffer.memory: '{v}'"))
            })?;
        }

        if let Some(v) = config.get("retries") {
            cfg.retries = v.parse().map_err(|_| {
                ConnectorError::ConfigurationError(format!("invalid retries: '{v}'"))
            })?;
        }

        if let Some(v) = config.get("retry.backoff.ms") {
            cfg.retry_backoff = Duration::from_millis(parse_num(v, "retry.backoff.ms")?);
        }

        if let Some(v) = config.get("delivery.timeout.ms") {
            cfg.delivery_timeout = Duration::from_millis(parse_num(v, "delivery.timeout.ms")?);
        }

        if let Some(v) = config.get("request.timeout.ms") {
            cfg.request_timeout = Duration::from_millis(parse_num(v, "request.timeout.ms")?);
        }

        if let Some(v) = config.get("send.timeout.ms") {
            cfg.send_timeout = Duration::from_millis(parse_num(v, "send.timeout.ms")?);
        }

        if let Some(v) = config.get("max.in.flight.sends") {
            cfg.max_in_flight_sends = v.parse().map_err(|_| {
                ConnectorError::ConfigurationError(format!("invalid max.in.flight.sends: '{v}'"))
            })?;
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
    /// Returns `ConnectorError` on missing keys or invalid combinations.
    pub fn validate(&self) -> Result<(), ConnectorError> {
        if self.bootstrap_servers.is_empty() {
            return Err(ConnectorError::MissingConfig("bootstrap.servers".into()));
        }
        if self.topic.is_empty() {
            return Err(ConnectorError::MissingConfig("topic".into()));
        }
        if self.max_in_flight_per_connection == 0 {
            return Err(ConnectorError::ConfigurationError(
                "max.in.flight.requests.per.connection must be > 0".into(),
            ));
        }
        if self.max_in_flight_per_connection > 5 {
            return Err(ConnectorError::ConfigurationError(
                "idempotent producer requires max.in.flight.requests.per.connection <= 5".into(),
            ));
        }
        if self.max_in_flight_sends == 0 {
            return Err(ConnectorError::ConfigurationError(
                "max.in.flight.sends must be > 0".into(),
            ));
        }
        if self.send_timeout.is_zero() {
            return Err(ConnectorError::ConfigurationError(
                "send.timeout.ms must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Builds an rdkafka [`ClientConfig`] from this configuration.
    ///
    /// Always sets `enable.idempotence=true`: network-level retries of
    /// the same logical send must not create duplicate records.
    #[must_use]
    pub fn to_rdkafka_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();

        config.set("bootstrap.servers", &self.bootstrap_servers);

        if let Some(ref client_id) = self.client_id {
            config.set("client.id", client_id);
        }

        config
            .set("enable.idempotence", "true")
            .set("acks", self.acks.as_rdkafka_str())
            .set(
                "max.in.flight.requests.per.connection",
                self.max_in_flight_per_connection.to_string(),
            )
            .set("linger.ms", self.linger.as_millis().to_string())
            .set("batch.size", self.batch_size.to_string())
            .set("compression.type", self.compression.as_rdkafka_str())
            // librdkafka sizes its buffer in kilobytes.
            .set(
                "queue.buffering.max.kbytes",
                (self.buffer_memory_bytes / 1024).to_string(),
            )
            .set("retries", self.retries.to_string())
            .set(
                "retry.backoff.ms",
                self.retry_backoff.as_millis().to_string(),
            )
            .set(
                "message.timeout.ms",
                self.delivery_timeout.as_millis().to_string(),
            )
            .set(
                "request.timeout.ms",
                self.request_timeout.as_millis().to_string(),
            );

        // Pass-through properties can override any of the above.
        for (key, value) in &self.kafka_properties {
            config.set(key, value);
        }

        config
    }
}

fn parse_num(value: &str, key: &str) -> Result<u64, ConnectorError> {
    value
        .parse()
        .map_err(|_| ConnectorError::ConfigurationError(format!("invalid {key}: '{value}'")))
}

/// Acknowledgment level for the Kafka producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acks {
    /// No acknowledgment (fire-and-forget).
    None,
    /// Leader acknowledgment only.
    Leader,
    /// All in-sync replica acknowledgment.
    All,
}

impl Acks {
    /// Returns the rdkafka configuration string.
    #[must_use]
    pub fn as_rdkafka_str(&self) -> &'static str {
        match self {
            Self::None => "0",
            Self::Leader => "1",
            Self::All => "all",
        }
    }
}

str_enum!(fromstr Acks, lowercase_nodash, "unknown acks value",
    None => "0", "none";
    Leader => "1", "leader";
    All => "-1", "all"
);

impl std::fmt::Display for Acks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_rdkafka_str())
    }
}

/// Compression type for produced Kafka messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    /// No compression.
    None,
    /// Gzip compression.
    Gzip,
    /// Snappy compression.
    Snappy,
    /// LZ4 compression.
    Lz4,
    /// Zstandard compression.
    Zstd,
}

impl CompressionType {
    /// Returns the rdkafka configuration string.
    #[must_use]
    pub fn as_rdkafka_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Snappy => "snappy",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }
}

str_enum!(fromstr CompressionType, lowercase_nodash, "unknown compression type",
    None => "none";
    Gzip => "gzip";
    Snappy => "snappy";
    Lz4 => "lz4";
    Zstd => "zstd", "zstandard"
);

impl std::fmt::Display for CompressionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_rdkafka_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(pairs: &[(&str, &str)]) -> ConnectorConfig {
        let mut config = ConnectorConfig::new("kafka-sink");
        for (k, v) in pairs {
            config.set(*k, *v);
        }
        config
    }

    fn required_pairs() -> Vec<(&'static str, &'static str)> {
        vec![
            ("bootstrap.servers", "localhost:9092"),
            ("topic", "recent-changes"),
        ]
    }

    #[test]
    fn test_defaults() {
        let cfg = KafkaSinkConfig::new("localhost:9092", "t");
        assert_eq!(cfg.acks, Acks::All);
        assert_eq!(cfg.max_in_flight_per_connection, 5);
        assert_eq!(cfg.linger, Duration::from_millis(20));
        assert_eq!(cfg.batch_size, 16_384);
        assert_eq!(cfg.compression, CompressionType::Lz4);
        assert_eq!(cfg.buffer_memory_bytes, 33_554_432);
        assert_eq!(cfg.retries, 3);
        assert_eq!(cfg.retry_backoff, Duration::from_millis(100));
        assert_eq!(cfg.delivery_timeout, Duration::from_secs(120));
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.send_timeout, Duration::from_secs(5));
        assert_eq!(cfg.max_in_flight_sends, 1_000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_parse_required_fields() {
        let config = make_config(&required_pairs());
        let cfg = KafkaSinkConfig::from_config(&config).unwrap();
        assert_eq!(cfg.bootstrap_servers, "localhost:9092");
        assert_eq!(cfg.topic, "recent-changes");
    }

    #[test]
    fn test_missing_bootstrap_servers() {
        let config = make_config(&[("topic", "t")]);
        assert!(matches!(
            KafkaSinkConfig::from_config(&config),
            Err(ConnectorError::MissingConfig(_))
        ));
    }

    #[test]
    fn test_missing_topic() {
        let config = make_config(&[("bootstrap.servers", "b:9092")]);
        assert!(matches!(
            KafkaSinkConfig::from_config(&config),
            Err(ConnectorError::MissingConfig(_))
        ));
    }

    #[test]
    fn test_parse_all_optional_fields() {
        let mut pairs = required_pairs();
        pairs.extend_from_slice(&[
            ("client.id", "weir-producer"),
            ("acks", "1"),
            ("max.in.flight.requests.per.connection", "3"),
            ("linger.ms", "50"),
            ("batch.size", "32768"),
            ("compression.type", "zstd"),
            ("buffer.memory", "16777216"),
            ("retries", "5"),
            ("retry.backoff.ms", "250"),
            ("delivery.timeout.ms", "60000"),
            ("request.timeout.ms", "15000"),
            ("send.timeout.ms", "2500"),
            ("max.in.flight.sends", "256"),
        ]);
        let config = make_config(&pairs);
        let cfg = KafkaSinkConfig::from_config(&config).unwrap();

        assert_eq!(cfg.client_id.as_deref(), Some("weir-producer"));
        assert_eq!(cfg.acks, Acks::Leader);
        assert_eq!(cfg.max_in_flight_per_connection, 3);
        assert_eq!(cfg.linger, Duration::from_millis(50));
        assert_eq!(cfg.batch_size, 32_768);
        assert_eq!(cfg.compression, CompressionType::Zstd);
        assert_eq!(cfg.buffer_memory_bytes, 16_777_216);
        assert_eq!(cfg.retries, 5);
        assert_eq!(cfg.retry_backoff, Duration::from_millis(250));
        assert_eq!(cfg.delivery_timeout, Duration::from_millis(60_000));
        assert_eq!(cfg.request_timeout, Duration::from_millis(15_000));
        assert_eq!(cfg.send_timeout, Duration::from_millis(2_500));
        assert_eq!(cfg.max_in_flight_sends, 256);
    }

    #[test]
    fn test_validate_in_flight_bound_for_idempotence() {
        let mut cfg = KafkaSinkConfig::new("b:9092", "t");
        cfg.max_in_flight_per_connection = 10;
        assert!(cfg.validate().is_err());

        cfg.max_in_flight_per_connection = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_zero_send_timeout() {
        let mut cfg = KafkaSinkConfig::new("b:9092", "t");
        cfg.send_timeout = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rdkafka_config_mapping() {
        let cfg = KafkaSinkConfig::new("b:9092", "t");
        let rdk = cfg.to_rdkafka_config();

        assert_eq!(rdk.get("enable.idempotence"), Some("true"));
        assert_eq!(rdk.get("acks"), Some("all"));
        assert_eq!(rdk.get("max.in.flight.requests.per.connection"), Some("5"));
        assert_eq!(rdk.get("linger.ms"), Some("20"));
        assert_eq!(rdk.get("batch.size"), Some("16384"));
        assert_eq!(rdk.get("compression.type"), Some("lz4"));
        assert_eq!(rdk.get("queue.buffering.max.kbytes"), Some("32768"));
        assert_eq!(rdk.get("retries"), Some("3"));
        assert_eq!(rdk.get("retry.backoff.ms"), Some("100"));
        assert_eq!(rdk.get("message.timeout.ms"), Some("120000"));
        assert_eq!(rdk.get("request.timeout.ms"), Some("30000"));
    }

    #[test]
    fn test_kafka_passthrough_properties() {
        let mut pairs = required_pairs();
        pairs.push(("kafka.socket.timeout.ms", "5000"));
        pairs.push(("kafka.compression.type", "gzip"));
        let config = make_config(&pairs);
        let cfg = KafkaSinkConfig::from_config(&config).unwrap();

        let rdk = cfg.to_rdkafka_config();
        assert_eq!(rdk.get("socket.timeout.ms"), Some("5000"));
        // Pass-through overrides the mapped default.
        assert_eq!(rdk.get("compression.type"), Some("gzip"));
    }

    #[test]
    fn test_enum_parse_and_display() {
        assert_eq!("all".parse::<Acks>().unwrap(), Acks::All);
        assert_eq!("-1".parse::<Acks>().unwrap(), Acks::All);
        assert_eq!("1".parse::<Acks>().unwrap(), Acks::Leader);
        assert_eq!("0".parse::<Acks>().unwrap(), Acks::None);
        assert!("2".parse::<Acks>().is_err());
        assert_eq!(Acks::All.to_string(), "all");

        assert_eq!("lz4".parse::<CompressionType>().unwrap(), CompressionType::Lz4);
        assert_eq!(
            "zstandard".parse::<CompressionType>().unwrap(),
            CompressionType::Zstd
        );
        assert!("brotli".parse::<CompressionType>().is_err());
        assert_eq!(CompressionType::Lz4.to_string(), "lz4");
    }
}
