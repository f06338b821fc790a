//! Configuration management for broker clients.

use crate::{ClientError, ClientResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

/// Default broker address used when `bootstrap_servers` is left empty.
pub const DEFAULT_BOOTSTRAP_SERVERS: &str = "localhost:9092";

/// Main configuration for broker clients
///
/// # Structure
/// - **Mandatory field**: `topic` (validation fails if empty)
/// - **Optional fields** (from config file or defaults): `bootstrap_servers`,
///   `mode`, `partition`, `group_id`, `operation`, `retry`, `consumer`, `producer`
///
/// Unrecognized keys placed in `extra` are handed verbatim to the connection
/// factory and never interpreted by this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Topic to bind to (mandatory, validation fails if empty)
    pub topic: String,

    /// Broker addresses, comma separated. Empty means "use the default with
    /// a logged warning" - a deliberate convenience over failing fast.
    #[serde(default)]
    pub bootstrap_servers: String,

    /// Whether this configuration is for a consumer or a producer
    #[serde(default)]
    pub mode: ClientMode,

    /// Explicit partition bind. When set, the client binds to exactly this
    /// partition instead of the broker's automatic assignment.
    #[serde(default)]
    pub partition: Option<i32>,

    /// Consumer group id. Required for manual offset commits.
    #[serde(default)]
    pub group_id: Option<String>,

    /// Layer a local read-through cache in front of metadata lookups.
    /// When set, a cache handle must be supplied at connect time.
    #[serde(default)]
    pub use_local_cache: bool,

    /// Cross-cutting operation settings (timing, timeout guard, logging)
    #[serde(default)]
    pub operation: OperationSettings,

    /// Reconnect retry settings
    #[serde(default)]
    pub retry: RetrySettings,

    /// Consumer-specific settings
    #[serde(default)]
    pub consumer: ConsumerSettings,

    /// Producer-specific settings
    #[serde(default)]
    pub producer: ProducerSettings,

    /// Passthrough options for the underlying connection, not interpreted here
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl ClientConfig {
    /// Create a configuration for the given topic with all defaults
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            bootstrap_servers: String::new(),
            mode: ClientMode::default(),
            partition: None,
            group_id: None,
            use_local_cache: false,
            operation: OperationSettings::default(),
            retry: RetrySettings::default(),
            consumer: ConsumerSettings::default(),
            producer: ProducerSettings::default(),
            extra: HashMap::new(),
        }
    }

    /// Load mandatory configuration from environment variables
    ///
    /// - `KAFKA_TOPIC`: topic to bind to (required)
    /// - `KAFKA_BOOTSTRAP_SERVERS`: broker addresses (optional)
    /// - `KAFKA_GROUP_ID`: consumer group (optional)
    ///
    /// All other settings use defaults. To customize these, load from a
    /// config file or set them explicitly.
    pub fn from_env() -> ClientResult<Self> {
        let topic =
            env::var("KAFKA_TOPIC").map_err(|_| ClientError::config("KAFKA_TOPIC is required"))?;

        let mut config = Self::new(topic);
        if let Ok(val) = env::var("KAFKA_BOOTSTRAP_SERVERS") {
            config.bootstrap_servers = val;
        }
        if let Ok(val) = env::var("KAFKA_GROUP_ID") {
            config.group_id = Some(val);
        }
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::config(format!("Failed to read config file {}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            ClientError::config(format!("Failed to parse config file {}: {}", path, e))
        })
    }

    /// Apply environment variable overrides to connection fields
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("KAFKA_BOOTSTRAP_SERVERS") {
            self.bootstrap_servers = val;
        }
        if let Ok(val) = env::var("KAFKA_TOPIC") {
            self.topic = val;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ClientResult<()> {
        if self.topic.is_empty() {
            return Err(ClientError::config("topic cannot be empty"));
        }

        if self.retry.retry_times == 0 {
            return Err(ClientError::config("retry_times must be > 0"));
        }

        if self.mode == ClientMode::Producer && self.group_id.is_some() {
            return Err(ClientError::config(
                "group_id is only meaningful in consumer mode",
            ));
        }

        if self.consumer.max_partition_fetch_bytes == 0 {
            return Err(ClientError::config("max_partition_fetch_bytes must be > 0"));
        }

        Ok(())
    }

    /// Resolved broker addresses, falling back to the default when empty.
    ///
    /// The fallback is logged as a warning at connect time by the clients,
    /// not here, so the warning appears once per connection attempt chain.
    pub fn effective_bootstrap_servers(&self) -> &str {
        if self.bootstrap_servers.is_empty() {
            DEFAULT_BOOTSTRAP_SERVERS
        } else {
            &self.bootstrap_servers
        }
    }
}

/// Client mode: determines which operations the configuration is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClientMode {
    #[default]
    Consumer,
    Producer,
}

/// Cross-cutting operation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSettings {
    /// Wrap each operation in a timeout guard
    #[serde(default = "default_use_timeout_guard")]
    pub use_timeout_guard: bool,

    /// Per-operation timeout in seconds
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,

    /// Threshold above which a slow operation logs a warning, in seconds
    #[serde(default = "default_action_warning_secs")]
    pub action_warning_secs: u64,

    /// Log level for `init_tracing`
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_use_timeout_guard() -> bool {
    true
}
fn default_action_timeout_secs() -> u64 {
    240
}
fn default_action_warning_secs() -> u64 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for OperationSettings {
    fn default() -> Self {
        Self {
            use_timeout_guard: true,
            action_timeout_secs: 240,
            action_warning_secs: 10,
            log_level: "info".to_string(),
        }
    }
}

/// Reconnect retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum number of connect attempts before giving up
    #[serde(default = "default_retry_times")]
    pub retry_times: u32,

    /// Delay between reconnect attempts in milliseconds
    #[serde(default = "default_retry_sleep_ms")]
    pub retry_sleep_ms: u64,

    /// Backoff shape between attempts
    #[serde(default)]
    pub backoff: BackoffKind,

    /// Maximum backoff in milliseconds (exponential backoff only)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_retry_times() -> u32 {
    10
}
fn default_retry_sleep_ms() -> u64 {
    1000
}
fn default_max_backoff_ms() -> u64 {
    30000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            retry_times: 10,
            retry_sleep_ms: 1000,
            backoff: BackoffKind::Fixed,
            max_backoff_ms: 30000,
        }
    }
}

/// Backoff shape for the reconnect loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Fixed sleep of `retry_sleep_ms` between attempts
    #[default]
    Fixed,
    /// Exponential backoff with jitter, capped at `max_backoff_ms`
    Exponential,
}

/// Consumer-specific settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerSettings {
    /// Commit offsets automatically. Manual `commit()` calls are rejected
    /// while this is enabled.
    #[serde(default = "default_auto_commit")]
    pub auto_commit: bool,

    /// Maximum bytes fetched per partition per poll
    #[serde(default = "default_max_partition_fetch_bytes")]
    pub max_partition_fetch_bytes: u64,
}

fn default_auto_commit() -> bool {
    true
}
fn default_max_partition_fetch_bytes() -> u64 {
    6_291_456
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            auto_commit: true,
            max_partition_fetch_bytes: 6_291_456,
        }
    }
}

/// Producer-specific settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerSettings {
    /// Maximum time `send` blocks when the buffer is full, in milliseconds
    #[serde(default = "default_max_block_ms")]
    pub max_block_ms: u64,

    /// Batch size in bytes
    #[serde(default = "default_batch_size_bytes")]
    pub batch_size_bytes: u64,

    /// Total buffer memory in bytes
    #[serde(default = "default_buffer_memory_bytes")]
    pub buffer_memory_bytes: u64,

    /// Compression codec
    #[serde(default = "default_compression")]
    pub compression: CompressionType,

    /// Linger time in milliseconds
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u64,

    /// Flush synchronously after every `send` unless overridden per call
    #[serde(default = "default_auto_flush")]
    pub auto_flush: bool,

    /// Log and drop payloads that fail to encode instead of returning
    /// `UnsupportedPayload`. Off by default: silent drops are opt-in.
    #[serde(default)]
    pub drop_unencodable: bool,

    /// Bound on how long buffered sends are given to flush during close,
    /// in seconds
    #[serde(default = "default_close_timeout_secs")]
    pub close_timeout_secs: u64,
}

fn default_max_block_ms() -> u64 {
    2000
}
fn default_batch_size_bytes() -> u64 {
    64_384
}
fn default_buffer_memory_bytes() -> u64 {
    640_554_432
}
fn default_compression() -> CompressionType {
    CompressionType::Gzip
}
fn default_linger_ms() -> u64 {
    2000
}
fn default_auto_flush() -> bool {
    true
}
fn default_close_timeout_secs() -> u64 {
    10
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            max_block_ms: 2000,
            batch_size_bytes: 64_384,
            buffer_memory_bytes: 640_554_432,
            compression: CompressionType::Gzip,
            linger_ms: 2000,
            auto_flush: true,
            drop_unencodable: false,
            close_timeout_secs: 10,
        }
    }
}

/// Compression codecs for produced batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl CompressionType {
    /// Wire name understood by broker client libraries
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionType::None => "none",
            CompressionType::Gzip => "gzip",
            CompressionType::Snappy => "snappy",
            CompressionType::Lz4 => "lz4",
            CompressionType::Zstd => "zstd",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::new("events");
        assert_eq!(config.topic, "events");
        assert_eq!(config.mode, ClientMode::Consumer);
        assert_eq!(config.effective_bootstrap_servers(), "localhost:9092");
        assert_eq!(config.retry.retry_times, 10);
        assert_eq!(config.retry.retry_sleep_ms, 1000);
        assert_eq!(config.operation.action_timeout_secs, 240);
        assert!(config.consumer.auto_commit);
        assert_eq!(config.consumer.max_partition_fetch_bytes, 6_291_456);
        assert_eq!(config.producer.compression, CompressionType::Gzip);
        assert_eq!(config.producer.linger_ms, 2000);
        assert!(!config.producer.drop_unencodable);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ClientConfig::new("events");
        assert!(config.validate().is_ok());

        config.topic = "".to_string();
        assert!(config.validate().is_err());

        config.topic = "events".to_string();
        config.retry.retry_times = 0;
        assert!(config.validate().is_err());

        // Any positive attempt count is valid, there is no upper cap
        config.retry.retry_times = 1000;
        assert!(config.validate().is_ok());

        config.retry.retry_times = 10;
        config.mode = ClientMode::Producer;
        config.group_id = Some("g1".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_effective_bootstrap_servers() {
        let mut config = ClientConfig::new("events");
        assert_eq!(config.effective_bootstrap_servers(), "localhost:9092");

        config.bootstrap_servers = "broker1:9092,broker2:9092".to_string();
        assert_eq!(
            config.effective_bootstrap_servers(),
            "broker1:9092,broker2:9092"
        );
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            topic = "telemetry"
            bootstrap_servers = "kafka:9092"
            mode = "producer"

            [retry]
            retry_times = 5
            retry_sleep_ms = 250

            [producer]
            compression = "zstd"
            auto_flush = false

            [extra]
            "client.rack" = "eu-west-1a"
        "#;

        let config: ClientConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.topic, "telemetry");
        assert_eq!(config.mode, ClientMode::Producer);
        assert_eq!(config.retry.retry_times, 5);
        assert_eq!(config.retry.retry_sleep_ms, 250);
        assert_eq!(config.producer.compression, CompressionType::Zstd);
        assert!(!config.producer.auto_flush);
        // Untouched sections keep their defaults
        assert!(config.consumer.auto_commit);
        assert_eq!(
            config.extra.get("client.rack"),
            Some(&"eu-west-1a".to_string())
        );
    }

    #[test]
    fn test_config_missing_topic_fails_parse() {
        let result: Result<ClientConfig, _> = toml::from_str("bootstrap_servers = \"k:9092\"");
        assert!(result.is_err());
    }
}
