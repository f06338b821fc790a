//! Configuration loading from files and the environment.

use kafka_broker_client::{ClientConfig, ClientMode, CompressionType};
use std::fs;

fn write_temp_config(name: &str, content: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_full_config_file() {
    let path = write_temp_config(
        "kafka_broker_client_full.toml",
        r#"
            topic = "orders"
            bootstrap_servers = "kafka1:9092,kafka2:9092"
            mode = "consumer"
            group_id = "order-processors"
            partition = 3
            use_local_cache = true

            [operation]
            use_timeout_guard = false
            log_level = "debug"

            [retry]
            retry_times = 5
            retry_sleep_ms = 200
            backoff = "exponential"
            max_backoff_ms = 5000

            [consumer]
            auto_commit = false
            max_partition_fetch_bytes = 1048576

            [extra]
            "security.protocol" = "SASL_SSL"
        "#,
    );

    let config = ClientConfig::from_file(path.to_str().unwrap()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.topic, "orders");
    assert_eq!(config.bootstrap_servers, "kafka1:9092,kafka2:9092");
    assert_eq!(config.mode, ClientMode::Consumer);
    assert_eq!(config.group_id.as_deref(), Some("order-processors"));
    assert_eq!(config.partition, Some(3));
    assert!(config.use_local_cache);
    assert!(!config.operation.use_timeout_guard);
    assert_eq!(config.operation.log_level, "debug");
    assert_eq!(config.retry.retry_times, 5);
    assert!(!config.consumer.auto_commit);
    assert_eq!(config.consumer.max_partition_fetch_bytes, 1_048_576);
    assert_eq!(
        config.extra.get("security.protocol"),
        Some(&"SASL_SSL".to_string())
    );
    // Untouched sections keep defaults
    assert_eq!(config.producer.compression, CompressionType::Gzip);
    assert_eq!(config.operation.action_timeout_secs, 240);
}

#[test]
fn test_minimal_config_file_gets_defaults() {
    let path = write_temp_config("kafka_broker_client_minimal.toml", "topic = \"events\"\n");

    let config = ClientConfig::from_file(path.to_str().unwrap()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.topic, "events");
    assert_eq!(config.effective_bootstrap_servers(), "localhost:9092");
    assert_eq!(config.retry.retry_times, 10);
    assert!(config.consumer.auto_commit);
    assert!(config.producer.auto_flush);
}

#[test]
fn test_missing_config_file() {
    let err = ClientConfig::from_file("/nonexistent/kafka.toml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_invalid_toml_is_a_configuration_error() {
    let path = write_temp_config("kafka_broker_client_invalid.toml", "topic = [broken");
    let err = ClientConfig::from_file(path.to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn test_env_loading_and_overrides() {
    std::env::set_var("KAFKA_TOPIC", "env-topic");
    std::env::set_var("KAFKA_BOOTSTRAP_SERVERS", "env-broker:9092");
    std::env::set_var("KAFKA_GROUP_ID", "env-group");

    let config = ClientConfig::from_env().unwrap();
    assert_eq!(config.topic, "env-topic");
    assert_eq!(config.bootstrap_servers, "env-broker:9092");
    assert_eq!(config.group_id.as_deref(), Some("env-group"));

    let mut file_config = ClientConfig::new("file-topic");
    file_config.apply_env_overrides();
    assert_eq!(file_config.topic, "env-topic");
    assert_eq!(file_config.bootstrap_servers, "env-broker:9092");

    std::env::remove_var("KAFKA_TOPIC");
    std::env::remove_var("KAFKA_BOOTSTRAP_SERVERS");
    std::env::remove_var("KAFKA_GROUP_ID");
}
