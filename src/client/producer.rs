//! Producer client: send, send_many, flush.

use crate::client::core::{init_tracing, ClientCore, ConnectionLifecycle, OpFuture};
use crate::config::{ClientConfig, ClientMode, DEFAULT_BOOTSTRAP_SERVERS};
use crate::connection::{
    ConnectionFactory, Delivery, OutgoingRecord, ProducerBinding, ProducerConnection,
};
use crate::message::Payload;
use crate::metrics::ClientMetrics;
use crate::{ClientError, ClientResult};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{error, info, warn};

/// Per-call send options
///
/// `topic` and `partition` default to the client's bound values. The
/// effective flush behavior is `auto_flush OR` the configured producer
/// default, so either one being true forces a synchronous flush.
#[derive(Debug, Clone)]
pub struct SendOptions {
    pub key: Option<String>,
    pub partition: Option<i32>,
    pub topic: Option<String>,
    pub auto_flush: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            key: None,
            partition: None,
            topic: None,
            auto_flush: true,
        }
    }
}

impl SendOptions {
    /// Options that suppress the per-call flush request
    pub fn no_flush() -> Self {
        Self {
            auto_flush: false,
            ..Self::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }
}

/// Input to [`ProducerClient::send_many`]
#[derive(Debug, Clone)]
pub enum SendBatch {
    /// Values sent without keys
    Values(Vec<Payload>),
    /// Key/value pairs
    Keyed(Vec<(String, Payload)>),
}

impl SendBatch {
    fn into_pairs(self) -> Vec<(Option<String>, Payload)> {
        match self {
            SendBatch::Values(values) => values.into_iter().map(|v| (None, v)).collect(),
            SendBatch::Keyed(pairs) => pairs.into_iter().map(|(k, v)| (Some(k), v)).collect(),
        }
    }
}

/// A producer bound to one topic, optionally to one default partition
///
/// Constructed connected, like [`crate::ConsumerClient`]. `send` resolves
/// once the record is submitted; delivery confirmation travels through the
/// returned [`Delivery`] handle.
pub struct ProducerClient<F: ConnectionFactory> {
    factory: F,
    conn: Option<F::Producer>,
    binding: ProducerBinding,
    core: ClientCore,
}

impl<F: ConnectionFactory> ProducerClient<F> {
    /// Connect a producer for the given configuration
    pub async fn connect(config: ClientConfig, factory: F) -> ClientResult<Self> {
        config.validate()?;
        if config.mode != ClientMode::Producer {
            return Err(ClientError::config(
                "configuration is for consumer mode, use ConsumerClient",
            ));
        }

        init_tracing(&config.operation.log_level);

        if config.bootstrap_servers.is_empty() {
            warn!(
                default = DEFAULT_BOOTSTRAP_SERVERS,
                "bootstrap_servers not configured, falling back to default"
            );
        }

        let binding = ProducerBinding {
            bootstrap_servers: config.effective_bootstrap_servers().to_string(),
            topic: config.topic.clone(),
            partition: config.partition,
            settings: config.producer.clone(),
            extra: config.extra.clone(),
        };

        let metrics = ClientMetrics::new("producer", config.topic.as_str());
        let core = ClientCore::new(config.operation.clone(), &config.retry, metrics);

        let mut client = Self {
            factory,
            conn: None,
            binding,
            core,
        };
        client.reconnect().await?;
        Ok(client)
    }

    /// Topic the client is currently bound to
    pub fn topic(&self) -> &str {
        &self.binding.topic
    }

    /// Default partition for sends, if any
    pub fn partition(&self) -> Option<i32> {
        self.binding.partition
    }

    /// Raw underlying connection, bypassing all middleware
    pub fn origin(&self) -> Option<&F::Producer> {
        self.conn.as_ref()
    }

    /// Mutable raw underlying connection, bypassing all middleware
    pub fn origin_mut(&mut self) -> Option<&mut F::Producer> {
        self.conn.as_mut()
    }

    /// Send a payload with default options
    pub async fn send(&mut self, payload: Payload) -> ClientResult<Option<Delivery>> {
        self.send_with(payload, SendOptions::default()).await
    }

    /// Send a payload
    ///
    /// Returns the pending [`Delivery`] on submission, or `Ok(None)` when
    /// the payload failed to encode and `drop_unencodable` is set (the drop
    /// is logged and counted, nothing is submitted). With `drop_unencodable`
    /// off, encoding failures surface as `UnsupportedPayload`.
    pub async fn send_with(
        &mut self,
        payload: Payload,
        options: SendOptions,
    ) -> ClientResult<Option<Delivery>> {
        let auto_flush = options.auto_flush || self.binding.settings.auto_flush;

        let Some(delivery) = self.submit(payload, options).await? else {
            return Ok(None);
        };

        if auto_flush {
            self.flush(None).await?;
        }
        Ok(Some(delivery))
    }

    /// Serialize any JSON-representable value and send it
    pub async fn send_value<T: Serialize>(
        &mut self,
        value: &T,
        options: SendOptions,
    ) -> ClientResult<Option<Delivery>> {
        match Payload::serialize(value) {
            Ok(payload) => self.send_with(payload, options).await,
            Err(e) => self.handle_unencodable(e),
        }
    }

    /// Send a batch of values or key/value pairs
    ///
    /// Every record is submitted first; the flush, when requested, happens
    /// once at the end of the batch rather than once per record. Delivery
    /// failures are logged through detached watchers.
    ///
    /// Returns the number of records submitted.
    pub async fn send_many(
        &mut self,
        batch: SendBatch,
        options: SendOptions,
    ) -> ClientResult<usize> {
        let auto_flush = options.auto_flush || self.binding.settings.auto_flush;
        let mut submitted = 0;

        for (key, payload) in batch.into_pairs() {
            let record_options = SendOptions {
                key,
                partition: options.partition,
                topic: options.topic.clone(),
                auto_flush: false,
            };
            if let Some(delivery) = self.submit(payload, record_options).await? {
                delivery.log_on_error("send_many");
                submitted += 1;
            }
        }

        if auto_flush && submitted > 0 {
            self.flush(None).await?;
        }
        Ok(submitted)
    }

    /// Block until buffered sends complete or the timeout elapses
    pub async fn flush(&mut self, timeout: Option<Duration>) -> ClientResult<()> {
        self.with_reconnect_retry("flush", |conn| conn.flush(timeout))
            .await
    }

    /// Encode and submit one record without flushing
    async fn submit(
        &mut self,
        payload: Payload,
        options: SendOptions,
    ) -> ClientResult<Option<Delivery>> {
        let bytes = match payload.encode() {
            Ok(bytes) => bytes,
            Err(e) => return self.handle_unencodable(e),
        };

        let record = OutgoingRecord {
            topic: options.topic.unwrap_or_else(|| self.binding.topic.clone()),
            partition: options.partition.or(self.binding.partition),
            key: options.key,
            payload: bytes,
        };

        let delivery = self
            .with_reconnect_retry("send", |conn| conn.send(record.clone()))
            .await?;
        self.core.metrics.record_sent(1);
        Ok(Some(delivery))
    }

    /// Apply the configured policy for payloads that failed to encode
    fn handle_unencodable(&self, e: ClientError) -> ClientResult<Option<Delivery>> {
        self.core.metrics.record_send_failure("unsupported_payload");
        if self.binding.settings.drop_unencodable {
            error!(error = %e, "payload could not be encoded, dropping without send");
            Ok(None)
        } else {
            Err(e)
        }
    }

    /// Run one connection operation through the middleware, rebuilding the
    /// connection and retrying once when the failure is retryable
    async fn with_reconnect_retry<T>(
        &mut self,
        operation: &'static str,
        mut op: impl for<'c> FnMut(&'c mut F::Producer) -> OpFuture<'c, T>,
    ) -> ClientResult<T> {
        {
            let Self { conn, core, .. } = self;
            let conn = conn
                .as_mut()
                .ok_or_else(|| ClientError::broker("producer is not connected"))?;
            match core.invoke(operation, op(conn)).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    warn!(operation, error = %e, "operation failed, rebuilding connection");
                }
                Err(e) => return Err(e),
            }
        }

        self.reconnect().await?;
        let Self { conn, core, .. } = self;
        let conn = conn
            .as_mut()
            .ok_or_else(|| ClientError::broker("producer is not connected"))?;
        core.invoke(operation, op(conn)).await
    }
}

// Manual impl: the underlying connection type is not required to be Debug
impl<F: ConnectionFactory> fmt::Debug for ProducerClient<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerClient")
            .field("topic", &self.binding.topic)
            .field("partition", &self.binding.partition)
            .field("connected", &self.conn.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F: ConnectionFactory> ConnectionLifecycle for ProducerClient<F> {
    async fn reconnect(&mut self) -> ClientResult<()> {
        // At most one live connection at any time
        self.close().await;

        let Self {
            factory,
            binding,
            core,
            ..
        } = self;
        let conn = core
            .connect_with_retry("producer", || factory.open_producer(binding))
            .await?;
        self.conn = Some(conn);

        info!(
            topic = %self.binding.topic,
            partition = ?self.binding.partition,
            "producer connected"
        );
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            let timeout = Duration::from_secs(self.binding.settings.close_timeout_secs);
            if let Err(e) = conn.close(timeout).await {
                warn!(error = %e, "error while closing producer connection");
            }
            self.core.metrics.set_connected(false);
        }
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }
}
