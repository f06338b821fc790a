//! Consumer client: poll, commit, assign, position, partition metadata.

use crate::client::core::{init_tracing, ClientCore, ConnectionLifecycle, OpFuture};
use crate::config::{ClientConfig, ClientMode, DEFAULT_BOOTSTRAP_SERVERS};
use crate::connection::{
    CommitEntry, ConnectionFactory, ConsumerBinding, ConsumerConnection, PartitionBatch,
};
use crate::message::ConsumedMessage;
use crate::metrics::ClientMetrics;
use crate::utils::LocalCache;
use crate::{ClientError, ClientResult};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default poll timeout
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(5000);
/// Default maximum records per poll
pub const DEFAULT_MAX_RECORDS: usize = 1000;

/// A consumer bound to one topic, optionally to one explicit partition
///
/// Constructed connected: `connect` either returns a ready client or fails
/// with `ConnectionExhausted` after the configured number of attempts. It
/// never returns a disconnected client.
///
/// Operations take `&mut self`; one instance is owned by one task. The
/// underlying connection is never shared.
pub struct ConsumerClient<F: ConnectionFactory> {
    factory: F,
    conn: Option<F::Consumer>,
    binding: ConsumerBinding,
    core: ClientCore,
    cache: Option<Arc<LocalCache<Vec<i32>>>>,
}

impl<F: ConnectionFactory> ConsumerClient<F> {
    /// Connect a consumer for the given configuration
    pub async fn connect(config: ClientConfig, factory: F) -> ClientResult<Self> {
        Self::connect_inner(config, factory, None).await
    }

    /// Connect with a caller-supplied metadata cache
    ///
    /// Required when `use_local_cache` is set in the configuration.
    pub async fn connect_with_cache(
        config: ClientConfig,
        factory: F,
        cache: Arc<LocalCache<Vec<i32>>>,
    ) -> ClientResult<Self> {
        Self::connect_inner(config, factory, Some(cache)).await
    }

    async fn connect_inner(
        config: ClientConfig,
        factory: F,
        cache: Option<Arc<LocalCache<Vec<i32>>>>,
    ) -> ClientResult<Self> {
        config.validate()?;
        if config.mode != ClientMode::Consumer {
            return Err(ClientError::config(
                "configuration is for producer mode, use ProducerClient",
            ));
        }
        if config.use_local_cache && cache.is_none() {
            return Err(ClientError::MissingDependency(
                "use_local_cache is set but no cache handle was supplied".to_string(),
            ));
        }

        init_tracing(&config.operation.log_level);

        if config.bootstrap_servers.is_empty() {
            warn!(
                default = DEFAULT_BOOTSTRAP_SERVERS,
                "bootstrap_servers not configured, falling back to default"
            );
        }

        let binding = ConsumerBinding {
            bootstrap_servers: config.effective_bootstrap_servers().to_string(),
            topic: config.topic.clone(),
            partition: config.partition,
            group_id: config.group_id.clone(),
            settings: config.consumer.clone(),
            extra: config.extra.clone(),
        };

        let metrics = ClientMetrics::new("consumer", config.topic.as_str());
        let core = ClientCore::new(config.operation.clone(), &config.retry, metrics);

        let mut client = Self {
            factory,
            conn: None,
            binding,
            core,
            cache: if config.use_local_cache { cache } else { None },
        };
        client.reconnect().await?;
        Ok(client)
    }

    /// Topic the client is currently bound to
    pub fn topic(&self) -> &str {
        &self.binding.topic
    }

    /// Explicitly bound partition, if any
    pub fn partition(&self) -> Option<i32> {
        self.binding.partition
    }

    /// Configured consumer group, if any
    pub fn group_id(&self) -> Option<&str> {
        self.binding.group_id.as_deref()
    }

    /// Raw underlying connection, bypassing timing, timeout and
    /// reconnect-on-failure middleware entirely
    pub fn origin(&self) -> Option<&F::Consumer> {
        self.conn.as_ref()
    }

    /// Mutable raw underlying connection, bypassing all middleware
    pub fn origin_mut(&mut self) -> Option<&mut F::Consumer> {
        self.conn.as_mut()
    }

    /// Bind to an explicit partition and rebuild the connection
    ///
    /// Uncommitted consumption state on the previous assignment is lost.
    pub async fn assign(&mut self, partition: i32) -> ClientResult<()> {
        info!(partition, topic = %self.binding.topic, "rebinding to explicit partition");
        self.binding.partition = Some(partition);
        self.reconnect().await
    }

    /// Alias for [`ConsumerClient::assign`]
    pub async fn set_partition(&mut self, partition: i32) -> ClientResult<()> {
        self.assign(partition).await
    }

    /// Current read offset for the given partition, defaulting to the bound
    /// one. `Ok(None)` when no partition is known.
    pub async fn position(&mut self, partition: Option<i32>) -> ClientResult<Option<i64>> {
        let Some(target) = partition.or(self.binding.partition) else {
            return Ok(None);
        };
        self.with_reconnect_retry("position", |conn| conn.position(target))
            .await
    }

    /// Partition ids for the given topic, defaulting to the bound one
    ///
    /// Supplying a topic different from the bound one switches the binding
    /// and reconnects exactly once before the lookup.
    pub async fn partitions(&mut self, topic: Option<&str>) -> ClientResult<Vec<i32>> {
        if let Some(requested) = topic {
            if requested != self.binding.topic {
                info!(from = %self.binding.topic, to = requested, "switching topic");
                self.binding.topic = requested.to_string();
                self.reconnect().await?;
            }
        }

        let topic = self.binding.topic.clone();
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&topic) {
                debug!(topic = %topic, "partition list served from cache");
                return Ok(hit);
            }
        }

        let partitions = self
            .with_reconnect_retry("partitions", |conn| conn.partitions_for(topic.clone()))
            .await?;

        if let Some(cache) = &self.cache {
            cache.insert(topic, partitions.clone());
        }
        Ok(partitions)
    }

    /// Alias for [`ConsumerClient::partitions`]
    pub async fn partitions_list(&mut self, topic: Option<&str>) -> ClientResult<Vec<i32>> {
        self.partitions(topic).await
    }

    /// Poll with default timeout and record limit
    pub async fn poll(&mut self) -> ClientResult<Vec<ConsumedMessage>> {
        self.poll_with(DEFAULT_POLL_TIMEOUT, DEFAULT_MAX_RECORDS).await
    }

    /// Poll for up to `max_records` records within `timeout`
    ///
    /// Per-partition batches are flattened into one ordered sequence. An
    /// empty result on timeout is normal, not an error.
    pub async fn poll_with(
        &mut self,
        timeout: Duration,
        max_records: usize,
    ) -> ClientResult<Vec<ConsumedMessage>> {
        let batches = self
            .with_reconnect_retry("poll", |conn| conn.poll(timeout, max_records))
            .await?;

        let messages = flatten_batches(batches);
        self.core.metrics.record_received(messages.len() as u64);
        Ok(messages)
    }

    /// Commit an explicit offset for the bound partition, or the currently
    /// consumed positions when `offset` is `None`
    ///
    /// # Errors
    ///
    /// `InvalidOperation` when auto-commit is enabled, when no consumer
    /// group is configured, or when an explicit offset is given without a
    /// bound partition. These are caller bugs and are never retried.
    pub async fn commit(&mut self, offset: Option<i64>) -> ClientResult<()> {
        if self.binding.settings.auto_commit {
            return Err(ClientError::invalid_operation(
                "manual commit is mutually exclusive with auto-commit",
            ));
        }
        if self.binding.group_id.is_none() {
            return Err(ClientError::invalid_operation(
                "offset commits require a consumer group",
            ));
        }

        let entry = match offset {
            Some(offset) => {
                let partition = self.binding.partition.ok_or_else(|| {
                    ClientError::invalid_operation(
                        "explicit offset commit requires a bound partition",
                    )
                })?;
                Some(CommitEntry {
                    topic: self.binding.topic.clone(),
                    partition,
                    offset,
                })
            }
            None => None,
        };

        self.with_reconnect_retry("commit", |conn| conn.commit(entry.clone()))
            .await?;
        self.core.metrics.record_commit();
        Ok(())
    }

    /// Run one connection operation through the middleware, rebuilding the
    /// connection and retrying once when the failure is retryable
    async fn with_reconnect_retry<T>(
        &mut self,
        operation: &'static str,
        mut op: impl for<'c> FnMut(&'c mut F::Consumer) -> OpFuture<'c, T>,
    ) -> ClientResult<T> {
        // First attempt against the current connection
        {
            let Self { conn, core, .. } = self;
            let conn = conn
                .as_mut()
                .ok_or_else(|| ClientError::broker("consumer is not connected"))?;
            match core.invoke(operation, op(conn)).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    warn!(operation, error = %e, "operation failed, rebuilding connection");
                }
                Err(e) => return Err(e),
            }
        }

        // One retry against a fresh connection
        self.reconnect().await?;
        let Self { conn, core, .. } = self;
        let conn = conn
            .as_mut()
            .ok_or_else(|| ClientError::broker("consumer is not connected"))?;
        core.invoke(operation, op(conn)).await
    }
}

// Manual impl: the underlying connection type is not required to be Debug
impl<F: ConnectionFactory> fmt::Debug for ConsumerClient<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerClient")
            .field("topic", &self.binding.topic)
            .field("partition", &self.binding.partition)
            .field("group_id", &self.binding.group_id)
            .field("connected", &self.conn.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F: ConnectionFactory> ConnectionLifecycle for ConsumerClient<F> {
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
            .connect_with_retry("consumer", || factory.open_consumer(binding))
            .await?;
        self.conn = Some(conn);

        info!(
            topic = %self.binding.topic,
            partition = ?self.binding.partition,
            group = ?self.binding.group_id,
            "consumer connected"
        );
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                warn!(error = %e, "error while closing consumer connection");
            }
            self.core.metrics.set_connected(false);
        }
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }
}

fn flatten_batches(batches: Vec<PartitionBatch>) -> Vec<ConsumedMessage> {
    batches
        .into_iter()
        .flat_map(|batch| {
            let partition = batch.partition;
            batch
                .records
                .into_iter()
                .map(move |record| ConsumedMessage::new(partition, record.offset, record.payload))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::RawRecord;

    #[test]
    fn test_flatten_preserves_batch_order() {
        let batches = vec![
            PartitionBatch {
                partition: 1,
                records: vec![
                    RawRecord {
                        offset: 10,
                        payload: b"a".to_vec(),
                    },
                    RawRecord {
                        offset: 11,
                        payload: b"b".to_vec(),
                    },
                ],
            },
            PartitionBatch {
                partition: 0,
                records: vec![RawRecord {
                    offset: 3,
                    payload: b"c".to_vec(),
                }],
            },
        ];

        let messages = flatten_batches(batches);
        assert_eq!(
            messages,
            vec![
                ConsumedMessage::new(1, 10, b"a".to_vec()),
                ConsumedMessage::new(1, 11, b"b".to_vec()),
                ConsumedMessage::new(0, 3, b"c".to_vec()),
            ]
        );
    }

    #[test]
    fn test_flatten_empty() {
        assert!(flatten_batches(vec![]).is_empty());
    }
}
