//! Kafka client wrapper with managed connection lifecycle.
//!
//! Wraps a broker client library behind two typed clients that own their
//! connection lifecycle: bounded connect-with-retry, reconnect-on-failure
//! for retryable errors, per-operation timing with a timeout guard, and
//! structured logging and metrics throughout.
//!
//! # Architecture
//!
//! - [`ConsumerClient`] / [`ProducerClient`]: the public clients. Distinct
//!   types rather than a mode flag, so each exposes only the operations
//!   valid for it.
//! - [`ConnectionFactory`] and the connection traits: the seam to the
//!   underlying broker library. The `rdkafka` cargo feature provides
//!   `kafka::KafkaConnectionFactory` backed by librdkafka; tests use the
//!   scriptable factory in [`testing`].
//! - [`ClientConfig`]: programmatic, TOML file or environment based
//!   configuration with validation.
//!
//! # Consuming
//!
//! ```rust,ignore
//! use kafka_broker_client::{ClientConfig, ConnectionLifecycle, ConsumerClient};
//! use kafka_broker_client::kafka::KafkaConnectionFactory;
//!
//! # async fn run() -> kafka_broker_client::ClientResult<()> {
//! let mut config = ClientConfig::new("telemetry");
//! config.bootstrap_servers = "kafka:9092".to_string();
//! config.group_id = Some("telemetry-readers".to_string());
//!
//! let mut consumer = ConsumerClient::connect(config, KafkaConnectionFactory::new()).await?;
//! let messages = consumer.poll().await?;
//! for message in messages {
//!     println!("p{} @{}: {}", message.partition, message.offset, message.value_utf8_lossy());
//! }
//! consumer.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Producing
//!
//! ```rust,ignore
//! use kafka_broker_client::{ClientConfig, ClientMode, ConnectionLifecycle, ProducerClient};
//! use kafka_broker_client::kafka::KafkaConnectionFactory;
//! use serde_json::json;
//!
//! # async fn run() -> kafka_broker_client::ClientResult<()> {
//! let mut config = ClientConfig::new("telemetry");
//! config.mode = ClientMode::Producer;
//!
//! let mut producer = ProducerClient::connect(config, KafkaConnectionFactory::new()).await?;
//! producer.send(json!({"sensor": "s1", "value": 42}).into()).await?;
//! producer.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! The doc examples above require the `rdkafka` feature.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod metrics;
pub mod testing;
pub mod utils;

mod retry;

#[cfg(feature = "rdkafka")]
pub mod kafka;

pub use client::{
    init_tracing, ConnectionLifecycle, ConsumerClient, ProducerClient, SendBatch, SendOptions,
};
pub use config::{
    BackoffKind, ClientConfig, ClientMode, CompressionType, ConsumerSettings, OperationSettings,
    ProducerSettings, RetrySettings,
};
pub use connection::{
    CommitEntry, ConnectionFactory, ConsumerBinding, ConsumerConnection, Delivery, OutgoingRecord,
    PartitionBatch, ProducerBinding, ProducerConnection, RawRecord, RecordMetadata,
};
pub use error::{ClientError, ClientResult};
pub use message::{ConsumedMessage, Payload};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
