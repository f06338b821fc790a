//! Connection traits - the boundary to the underlying broker client.
//!
//! The clients in this crate never talk to a broker directly. They drive a
//! [`ConnectionFactory`] which opens [`ConsumerConnection`]s and
//! [`ProducerConnection`]s; the feature-gated `rdkafka` module maps these
//! traits onto librdkafka, and `testing` provides a scriptable in-memory
//! factory.

use crate::config::{ConsumerSettings, ProducerSettings};
use crate::{ClientError, ClientResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::error;

/// Everything a factory needs to open a consumer connection
#[derive(Debug, Clone)]
pub struct ConsumerBinding {
    /// Broker addresses, comma separated
    pub bootstrap_servers: String,
    /// Topic to subscribe to or bind against
    pub topic: String,
    /// When set, bind exactly this partition instead of the broker's
    /// automatic assignment
    pub partition: Option<i32>,
    /// Consumer group id
    pub group_id: Option<String>,
    /// Consumer tuning options
    pub settings: ConsumerSettings,
    /// Passthrough options for the vendor client
    pub extra: HashMap<String, String>,
}

/// Everything a factory needs to open a producer connection
#[derive(Debug, Clone)]
pub struct ProducerBinding {
    /// Broker addresses, comma separated
    pub bootstrap_servers: String,
    /// Default topic for sends
    pub topic: String,
    /// Default partition for sends
    pub partition: Option<i32>,
    /// Producer tuning options
    pub settings: ProducerSettings,
    /// Passthrough options for the vendor client
    pub extra: HashMap<String, String>,
}

/// A record on its way to the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRecord {
    pub topic: String,
    pub partition: Option<i32>,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

/// Broker confirmation for a delivered record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMetadata {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// One partition's slice of a poll result, in broker order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionBatch {
    pub partition: i32,
    pub records: Vec<RawRecord>,
}

/// A record as returned by the underlying client, before flattening
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub offset: i64,
    pub payload: Vec<u8>,
}

/// An explicit offset to commit for one `(topic, partition)` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEntry {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Pending broker confirmation for a submitted send
///
/// `send` resolves once the record is *submitted*; await the delivery to
/// learn whether the broker confirmed it. Dropping the handle without
/// awaiting loses the confirmation but not the send.
#[derive(Debug)]
pub struct Delivery {
    rx: oneshot::Receiver<Result<RecordMetadata, ClientError>>,
}

impl Delivery {
    /// Create an unresolved delivery and the sender side that completes it
    pub fn channel() -> (oneshot::Sender<Result<RecordMetadata, ClientError>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// Create an already-resolved delivery (used by synchronous backends)
    pub fn resolved(result: Result<RecordMetadata, ClientError>) -> Self {
        let (tx, rx) = oneshot::channel();
        // Receiver is held right here, the send cannot fail
        let _ = tx.send(result);
        Self { rx }
    }

    /// Block until the broker confirms or rejects the record
    pub async fn wait(self) -> ClientResult<RecordMetadata> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::broker(
                "delivery confirmation channel closed before resolution",
            )),
        }
    }

    /// Detach the delivery: log a delivery failure if one occurs, without
    /// surfacing it to any caller
    pub fn log_on_error(self, operation: &'static str) {
        tokio::spawn(async move {
            if let Err(e) = self.wait().await {
                error!(operation, error = %e, "async send failed after submission");
            }
        });
    }
}

/// Consumer-side surface of the underlying broker client
#[async_trait]
pub trait ConsumerConnection: Send {
    /// Poll for up to `max_records` records within `timeout`, grouped by
    /// partition as the broker returns them. An empty result on timeout is
    /// normal, not an error.
    async fn poll(
        &mut self,
        timeout: Duration,
        max_records: usize,
    ) -> ClientResult<Vec<PartitionBatch>>;

    /// Commit an explicit offset, or the currently consumed positions when
    /// `entry` is `None`
    async fn commit(&mut self, entry: Option<CommitEntry>) -> ClientResult<()>;

    /// Current read offset for the given partition, if the broker knows one
    async fn position(&mut self, partition: i32) -> ClientResult<Option<i64>>;

    /// Partition ids of the given topic
    async fn partitions_for(&mut self, topic: String) -> ClientResult<Vec<i32>>;

    /// Tear the connection down
    async fn close(&mut self) -> ClientResult<()>;
}

/// Producer-side surface of the underlying broker client
#[async_trait]
pub trait ProducerConnection: Send {
    /// Submit a record. Resolves once submitted, not once delivered; the
    /// returned [`Delivery`] carries the confirmation.
    async fn send(&mut self, record: OutgoingRecord) -> ClientResult<Delivery>;

    /// Block until buffered sends complete or the timeout elapses
    async fn flush(&mut self, timeout: Option<Duration>) -> ClientResult<()>;

    /// Tear the connection down, giving buffered sends up to `timeout` to
    /// drain
    async fn close(&mut self, timeout: Duration) -> ClientResult<()>;
}

/// Opens connections against a concrete broker client library
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    type Consumer: ConsumerConnection;
    type Producer: ProducerConnection;

    async fn open_consumer(&self, binding: &ConsumerBinding) -> ClientResult<Self::Consumer>;
    async fn open_producer(&self, binding: &ProducerBinding) -> ClientResult<Self::Producer>;
}
