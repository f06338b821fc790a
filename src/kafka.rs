//! Kafka backend built on librdkafka.
//!
//! Maps the connection traits onto `rdkafka`'s `StreamConsumer` and
//! `FutureProducer`. Only compiled with the `rdkafka` feature, so default
//! builds and the test suite need no native librdkafka.

use crate::config::CompressionType;
use crate::connection::{
    CommitEntry, ConnectionFactory, ConsumerBinding, ConsumerConnection, Delivery, OutgoingRecord,
    PartitionBatch, ProducerBinding, ProducerConnection, RawRecord, RecordMetadata,
};
use crate::{ClientError, ClientResult};
use async_trait::async_trait;
use rdkafka::config::ClientConfig as RdClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::{Offset, TopicPartitionList};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Group id used when none is configured; librdkafka refuses to build a
/// consumer without one
const STANDALONE_GROUP_ID: &str = "kafka-broker-client-standalone";

const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to keep draining once the first record of a poll has arrived
const POLL_DRAIN_WAIT: Duration = Duration::from_millis(50);

/// Backoff between enqueue attempts while the producer queue is full
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(100);

/// [`ConnectionFactory`] backed by librdkafka
#[derive(Debug, Clone, Copy, Default)]
pub struct KafkaConnectionFactory;

impl KafkaConnectionFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConnectionFactory for KafkaConnectionFactory {
    type Consumer = KafkaConsumerConnection;
    type Producer = KafkaProducerConnection;

    async fn open_consumer(&self, binding: &ConsumerBinding) -> ClientResult<Self::Consumer> {
        let mut config = RdClientConfig::new();
        config
            .set("bootstrap.servers", &binding.bootstrap_servers)
            .set(
                "group.id",
                binding.group_id.as_deref().unwrap_or(STANDALONE_GROUP_ID),
            )
            .set(
                "enable.auto.commit",
                binding.settings.auto_commit.to_string(),
            )
            .set(
                "max.partition.fetch.bytes",
                binding.settings.max_partition_fetch_bytes.to_string(),
            );
        for (key, value) in &binding.extra {
            config.set(key, value);
        }

        let consumer: StreamConsumer = config
            .create()
            .map_err(|e| map_err("consumer creation failed", e))?;

        match binding.partition {
            Some(partition) => {
                let mut assignment = TopicPartitionList::new();
                assignment
                    .add_partition_offset(&binding.topic, partition, Offset::Stored)
                    .map_err(|e| map_err("invalid partition assignment", e))?;
                consumer
                    .assign(&assignment)
                    .map_err(|e| map_err("partition assignment failed", e))?;
                debug!(topic = %binding.topic, partition, "assigned explicit partition");
            }
            None => {
                consumer
                    .subscribe(&[&binding.topic])
                    .map_err(|e| map_err("subscribe failed", e))?;
                debug!(topic = %binding.topic, "subscribed for automatic assignment");
            }
        }

        Ok(KafkaConsumerConnection {
            consumer,
            topic: binding.topic.clone(),
        })
    }

    async fn open_producer(&self, binding: &ProducerBinding) -> ClientResult<Self::Producer> {
        let settings = &binding.settings;
        let mut config = RdClientConfig::new();
        config
            .set("bootstrap.servers", &binding.bootstrap_servers)
            .set("batch.size", settings.batch_size_bytes.to_string())
            .set("linger.ms", settings.linger_ms.to_string())
            .set(
                "queue.buffering.max.kbytes",
                (settings.buffer_memory_bytes / 1024).max(1).to_string(),
            )
            .set("compression.type", compression_str(settings.compression));
        for (key, value) in &binding.extra {
            config.set(key, value);
        }

        let producer: FutureProducer = config
            .create()
            .map_err(|e| map_err("producer creation failed", e))?;

        Ok(KafkaProducerConnection {
            producer,
            max_block: Duration::from_millis(settings.max_block_ms),
        })
    }
}

pub struct KafkaConsumerConnection {
    consumer: StreamConsumer,
    topic: String,
}

#[async_trait]
impl ConsumerConnection for KafkaConsumerConnection {
    async fn poll(
        &mut self,
        timeout: Duration,
        max_records: usize,
    ) -> ClientResult<Vec<PartitionBatch>> {
        let deadline = Instant::now() + timeout;
        let mut by_partition: BTreeMap<i32, Vec<RawRecord>> = BTreeMap::new();
        let mut total = 0;

        while total < max_records {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            // Wait the full timeout for the first record, then only drain
            // what is already close behind it
            let wait = if total == 0 {
                remaining
            } else {
                remaining.min(POLL_DRAIN_WAIT)
            };

            match tokio::time::timeout(wait, self.consumer.recv()).await {
                Err(_) => break,
                Ok(Ok(message)) => {
                    let payload = message.payload().map(<[u8]>::to_vec).unwrap_or_default();
                    by_partition
                        .entry(message.partition())
                        .or_default()
                        .push(RawRecord {
                            offset: message.offset(),
                            payload,
                        });
                    total += 1;
                }
                Ok(Err(e)) => return Err(map_err("poll failed", e)),
            }
        }

        Ok(by_partition
            .into_iter()
            .map(|(partition, records)| PartitionBatch { partition, records })
            .collect())
    }

    async fn commit(&mut self, entry: Option<CommitEntry>) -> ClientResult<()> {
        match entry {
            Some(entry) => {
                let mut offsets = TopicPartitionList::new();
                offsets
                    .add_partition_offset(&entry.topic, entry.partition, Offset::Offset(entry.offset))
                    .map_err(|e| map_err("invalid commit entry", e))?;
                self.consumer
                    .commit(&offsets, CommitMode::Sync)
                    .map_err(|e| map_err("commit failed", e))
            }
            None => self
                .consumer
                .commit_consumer_state(CommitMode::Sync)
                .map_err(|e| map_err("commit failed", e)),
        }
    }

    async fn position(&mut self, partition: i32) -> ClientResult<Option<i64>> {
        let positions = self
            .consumer
            .position()
            .map_err(|e| map_err("position lookup failed", e))?;

        Ok(positions.elements().iter().find_map(|elem| {
            if elem.topic() == self.topic && elem.partition() == partition {
                match elem.offset() {
                    Offset::Offset(offset) => Some(offset),
                    _ => None,
                }
            } else {
                None
            }
        }))
    }

    async fn partitions_for(&mut self, topic: String) -> ClientResult<Vec<i32>> {
        let metadata = self
            .consumer
            .fetch_metadata(Some(&topic), METADATA_TIMEOUT)
            .map_err(|e| map_err("metadata fetch failed", e))?;

        let topic_metadata = metadata
            .topics()
            .iter()
            .find(|t| t.name() == topic)
            .ok_or_else(|| ClientError::broker(format!("no metadata for topic '{topic}'")))?;

        Ok(topic_metadata.partitions().iter().map(|p| p.id()).collect())
    }

    async fn close(&mut self) -> ClientResult<()> {
        self.consumer.unsubscribe();
        Ok(())
    }
}

pub struct KafkaProducerConnection {
    producer: FutureProducer,
    max_block: Duration,
}

#[async_trait]
impl ProducerConnection for KafkaProducerConnection {
    async fn send(&mut self, record: OutgoingRecord) -> ClientResult<Delivery> {
        let mut pending: FutureRecord<'_, String, Vec<u8>> =
            FutureRecord::to(&record.topic).payload(&record.payload);
        if let Some(key) = &record.key {
            pending = pending.key(key);
        }
        if let Some(partition) = record.partition {
            pending = pending.partition(partition);
        }

        // Enqueue, waiting out a full local queue up to max_block
        let deadline = Instant::now() + self.max_block;
        let fut = loop {
            match self.producer.send_result(pending) {
                Ok(fut) => break fut,
                Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), returned))
                    if Instant::now() < deadline =>
                {
                    pending = returned;
                    tokio::time::sleep(QUEUE_FULL_BACKOFF).await;
                }
                Err((e, _)) => return Err(map_err("send enqueue failed", e)),
            }
        };

        let topic = record.topic;
        let (tx, delivery) = Delivery::channel();
        tokio::spawn(async move {
            let result = match fut.await {
                Ok(Ok((partition, offset))) => Ok(RecordMetadata {
                    topic,
                    partition,
                    offset,
                }),
                Ok(Err((e, _message))) => Err(map_err("delivery failed", e)),
                Err(_) => Err(ClientError::broker(
                    "producer dropped before delivery confirmation",
                )),
            };
            let _ = tx.send(result);
        });
        Ok(delivery)
    }

    async fn flush(&mut self, timeout: Option<Duration>) -> ClientResult<()> {
        self.producer
            .flush(timeout)
            .map_err(|e| map_err("flush failed", e))
    }

    async fn close(&mut self, timeout: Duration) -> ClientResult<()> {
        self.producer
            .flush(timeout)
            .map_err(|e| map_err("close flush failed", e))
    }
}

fn compression_str(compression: CompressionType) -> &'static str {
    compression.as_str()
}

fn map_err(message: &str, e: KafkaError) -> ClientError {
    ClientError::broker_with_source(message, e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_maps_to_librdkafka_values() {
        assert_eq!(compression_str(CompressionType::Gzip), "gzip");
        assert_eq!(compression_str(CompressionType::None), "none");
    }
}
