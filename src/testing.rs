//! Scriptable in-memory connection factory for tests.
//!
//! `MockConnectionFactory` implements [`ConnectionFactory`] without any
//! broker: connect failures, poll batches, partition metadata and positions
//! are scripted up front, and every call the clients make is recorded in a
//! log the test can assert against.

use crate::connection::{
    CommitEntry, ConnectionFactory, ConsumerBinding, ConsumerConnection, Delivery, OutgoingRecord,
    PartitionBatch, ProducerBinding, ProducerConnection, RecordMetadata,
};
use crate::{ClientError, ClientResult};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One recorded call against a mock connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    OpenConsumer,
    OpenProducer,
    Poll,
    Commit(Option<CommitEntry>),
    Position(i32),
    PartitionsFor(String),
    Send,
    Flush,
    CloseConsumer,
    CloseProducer,
}

#[derive(Default)]
struct MockState {
    fail_connects: AtomicUsize,
    connect_attempts: AtomicUsize,
    fail_polls: AtomicUsize,
    calls: Mutex<Vec<MockCall>>,
    poll_batches: Mutex<VecDeque<Vec<PartitionBatch>>>,
    partitions: Mutex<HashMap<String, Vec<i32>>>,
    positions: Mutex<HashMap<i32, i64>>,
    sent: Mutex<Vec<OutgoingRecord>>,
    next_offset: AtomicUsize,
}

impl MockState {
    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Scriptable factory producing mock consumer and producer connections
///
/// Cloning shares the underlying state, so a test can keep a handle for
/// assertions after handing the factory to a client.
#[derive(Clone, Default)]
pub struct MockConnectionFactory {
    state: Arc<MockState>,
}

impl MockConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` open calls fail with a retryable broker error
    pub fn fail_connects(&self, n: usize) {
        self.state.fail_connects.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` polls fail with a retryable broker error
    pub fn fail_polls(&self, n: usize) {
        self.state.fail_polls.store(n, Ordering::SeqCst);
    }

    /// Queue the batches one future poll will return
    pub fn queue_poll(&self, batches: Vec<PartitionBatch>) {
        self.state.poll_batches.lock().unwrap().push_back(batches);
    }

    /// Script the partition list for a topic
    pub fn set_partitions(&self, topic: impl Into<String>, partitions: Vec<i32>) {
        self.state
            .partitions
            .lock()
            .unwrap()
            .insert(topic.into(), partitions);
    }

    /// Script the consumed position for a partition
    pub fn set_position(&self, partition: i32, offset: i64) {
        self.state.positions.lock().unwrap().insert(partition, offset);
    }

    /// Every call recorded so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.calls.lock().unwrap().clone()
    }

    /// Every record submitted through a mock producer, in order
    pub fn sent_records(&self) -> Vec<OutgoingRecord> {
        self.state.sent.lock().unwrap().clone()
    }

    /// How many open calls were made, failed ones included
    pub fn connect_attempts(&self) -> usize {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    fn try_connect(&self, call: MockCall) -> ClientResult<()> {
        self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.state.fail_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state
                .fail_connects
                .store(remaining - 1, Ordering::SeqCst);
            return Err(ClientError::broker("scripted connect failure"));
        }
        self.state.record(call);
        Ok(())
    }
}

#[async_trait]
impl ConnectionFactory for MockConnectionFactory {
    type Consumer = MockConsumerConnection;
    type Producer = MockProducerConnection;

    async fn open_consumer(&self, _binding: &ConsumerBinding) -> ClientResult<Self::Consumer> {
        self.try_connect(MockCall::OpenConsumer)?;
        Ok(MockConsumerConnection {
            state: Arc::clone(&self.state),
        })
    }

    async fn open_producer(&self, _binding: &ProducerBinding) -> ClientResult<Self::Producer> {
        self.try_connect(MockCall::OpenProducer)?;
        Ok(MockProducerConnection {
            state: Arc::clone(&self.state),
        })
    }
}

pub struct MockConsumerConnection {
    state: Arc<MockState>,
}

#[async_trait]
impl ConsumerConnection for MockConsumerConnection {
    async fn poll(
        &mut self,
        _timeout: Duration,
        _max_records: usize,
    ) -> ClientResult<Vec<PartitionBatch>> {
        self.state.record(MockCall::Poll);

        let remaining = self.state.fail_polls.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state.fail_polls.store(remaining - 1, Ordering::SeqCst);
            return Err(ClientError::broker("scripted poll failure"));
        }

        Ok(self
            .state
            .poll_batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    async fn commit(&mut self, entry: Option<CommitEntry>) -> ClientResult<()> {
        self.state.record(MockCall::Commit(entry));
        Ok(())
    }

    async fn position(&mut self, partition: i32) -> ClientResult<Option<i64>> {
        self.state.record(MockCall::Position(partition));
        Ok(self.state.positions.lock().unwrap().get(&partition).copied())
    }

    async fn partitions_for(&mut self, topic: String) -> ClientResult<Vec<i32>> {
        let partitions = self
            .state
            .partitions
            .lock()
            .unwrap()
            .get(&topic)
            .cloned()
            .unwrap_or_default();
        self.state.record(MockCall::PartitionsFor(topic));
        Ok(partitions)
    }

    async fn close(&mut self) -> ClientResult<()> {
        self.state.record(MockCall::CloseConsumer);
        Ok(())
    }
}

pub struct MockProducerConnection {
    state: Arc<MockState>,
}

#[async_trait]
impl ProducerConnection for MockProducerConnection {
    async fn send(&mut self, record: OutgoingRecord) -> ClientResult<Delivery> {
        self.state.record(MockCall::Send);

        let offset = self.state.next_offset.fetch_add(1, Ordering::SeqCst) as i64;
        let metadata = RecordMetadata {
            topic: record.topic.clone(),
            partition: record.partition.unwrap_or(0),
            offset,
        };
        self.state.sent.lock().unwrap().push(record);
        Ok(Delivery::resolved(Ok(metadata)))
    }

    async fn flush(&mut self, _timeout: Option<Duration>) -> ClientResult<()> {
        self.state.record(MockCall::Flush);
        Ok(())
    }

    async fn close(&mut self, _timeout: Duration) -> ClientResult<()> {
        self.state.record(MockCall::CloseProducer);
        Ok(())
    }
}
