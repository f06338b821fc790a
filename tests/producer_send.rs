//! Producer operations: send, send_many, flush, encode failure policy.

use kafka_broker_client::testing::{MockCall, MockConnectionFactory};
use kafka_broker_client::{
    ClientConfig, ClientError, ClientMode, Payload, ProducerClient, SendBatch, SendOptions,
};
use serde::{Serialize, Serializer};
use serde_json::json;

fn config(topic: &str) -> ClientConfig {
    let mut config = ClientConfig::new(topic);
    config.mode = ClientMode::Producer;
    config.retry.retry_sleep_ms = 1;
    config
}

/// A value serde_json can never represent
struct Opaque;

impl Serialize for Opaque {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom("opaque handle"))
    }
}

#[tokio::test]
async fn test_send_json_with_auto_flush() {
    let factory = MockConnectionFactory::new();
    let mut client = ProducerClient::connect(config("t1"), factory.clone())
        .await
        .unwrap();

    let delivery = client.send(json!({"a": 1}).into()).await.unwrap();
    assert!(delivery.is_some());

    let sent = factory.sent_records();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].topic, "t1");
    assert_eq!(sent[0].payload, br#"{"a":1}"#.to_vec());

    let flushes = factory
        .calls()
        .into_iter()
        .filter(|c| *c == MockCall::Flush)
        .count();
    assert_eq!(flushes, 1);
}

#[tokio::test]
async fn test_send_json_keeps_key_order() {
    let factory = MockConnectionFactory::new();
    let mut client = ProducerClient::connect(config("t1"), factory.clone())
        .await
        .unwrap();

    client.send(json!({"b": 1, "a": 2}).into()).await.unwrap();

    let sent = factory.sent_records();
    assert_eq!(sent[0].payload, br#"{"b":1,"a":2}"#.to_vec());
}

#[tokio::test]
async fn test_send_without_flush() {
    let factory = MockConnectionFactory::new();
    let mut cfg = config("t1");
    cfg.producer.auto_flush = false;

    let mut client = ProducerClient::connect(cfg, factory.clone()).await.unwrap();
    client
        .send_with(Payload::from("v"), SendOptions::no_flush())
        .await
        .unwrap();

    assert!(!factory.calls().contains(&MockCall::Flush));
    assert_eq!(factory.sent_records().len(), 1);
}

#[tokio::test]
async fn test_send_options_override_routing() {
    let factory = MockConnectionFactory::new();
    let mut client = ProducerClient::connect(config("t1"), factory.clone())
        .await
        .unwrap();

    client
        .send_with(
            Payload::from("v"),
            SendOptions::default()
                .with_key("user-1")
                .with_partition(3)
                .with_topic("other"),
        )
        .await
        .unwrap();

    let sent = factory.sent_records();
    assert_eq!(sent[0].topic, "other");
    assert_eq!(sent[0].partition, Some(3));
    assert_eq!(sent[0].key.as_deref(), Some("user-1"));
}

#[tokio::test]
async fn test_delivery_confirms_metadata() {
    let factory = MockConnectionFactory::new();
    let mut cfg = config("t1");
    cfg.partition = Some(4);

    let mut client = ProducerClient::connect(cfg, factory).await.unwrap();
    let delivery = client.send(Payload::from("v")).await.unwrap().unwrap();

    let metadata = delivery.wait().await.unwrap();
    assert_eq!(metadata.topic, "t1");
    assert_eq!(metadata.partition, 4);
    assert_eq!(metadata.offset, 0);
}

#[tokio::test]
async fn test_unencodable_payload_is_an_error_by_default() {
    let factory = MockConnectionFactory::new();
    let mut client = ProducerClient::connect(config("t1"), factory.clone())
        .await
        .unwrap();

    let err = client
        .send_value(&Opaque, SendOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::UnsupportedPayload(_)));
    // Nothing was submitted
    assert!(!factory.calls().contains(&MockCall::Send));
}

#[tokio::test]
async fn test_unencodable_payload_dropped_when_opted_in() {
    let factory = MockConnectionFactory::new();
    let mut cfg = config("t1");
    cfg.producer.drop_unencodable = true;

    let mut client = ProducerClient::connect(cfg, factory.clone()).await.unwrap();
    let delivery = client
        .send_value(&Opaque, SendOptions::default())
        .await
        .unwrap();

    assert!(delivery.is_none());
    assert!(!factory.calls().contains(&MockCall::Send));
    assert!(factory.sent_records().is_empty());
}

#[tokio::test]
async fn test_send_many_flushes_once_at_the_end() {
    let factory = MockConnectionFactory::new();
    let mut client = ProducerClient::connect(config("t1"), factory.clone())
        .await
        .unwrap();

    let submitted = client
        .send_many(
            SendBatch::Values(vec![
                Payload::from("a"),
                Payload::from("b"),
                Payload::from("c"),
            ]),
            SendOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(submitted, 3);
    let calls = factory.calls();
    let sends = calls.iter().filter(|c| **c == MockCall::Send).count();
    let flushes = calls.iter().filter(|c| **c == MockCall::Flush).count();
    assert_eq!(sends, 3);
    assert_eq!(flushes, 1);
    // The flush comes after every send
    assert_eq!(calls.last(), Some(&MockCall::Flush));
}

#[tokio::test]
async fn test_send_many_keyed_preserves_keys() {
    let factory = MockConnectionFactory::new();
    let mut client = ProducerClient::connect(config("t1"), factory.clone())
        .await
        .unwrap();

    client
        .send_many(
            SendBatch::Keyed(vec![
                ("k1".to_string(), Payload::from("a")),
                ("k2".to_string(), Payload::from("b")),
            ]),
            SendOptions::default(),
        )
        .await
        .unwrap();

    let sent = factory.sent_records();
    assert_eq!(sent[0].key.as_deref(), Some("k1"));
    assert_eq!(sent[1].key.as_deref(), Some("k2"));
}

#[tokio::test]
async fn test_explicit_flush() {
    let factory = MockConnectionFactory::new();
    let mut cfg = config("t1");
    cfg.producer.auto_flush = false;

    let mut client = ProducerClient::connect(cfg, factory.clone()).await.unwrap();
    client.flush(None).await.unwrap();

    assert!(factory.calls().contains(&MockCall::Flush));
}
