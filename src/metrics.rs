//! Metrics and observability for broker clients.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metrics collector for a single client instance
#[derive(Debug, Clone)]
pub struct ClientMetrics {
    /// Client kind for labeling ("consumer" or "producer")
    client_kind: &'static str,
    /// Topic name for labeling
    topic: String,
}

impl ClientMetrics {
    /// Create a new metrics collector
    pub fn new(client_kind: &'static str, topic: impl Into<String>) -> Self {
        Self::register_metrics();

        Self {
            client_kind,
            topic: topic.into(),
        }
    }

    /// Register metric descriptions
    fn register_metrics() {
        // Counters
        describe_counter!(
            "kafka_client_reconnects_total",
            "Total number of successful (re)connects"
        );
        describe_counter!(
            "kafka_client_messages_sent_total",
            "Total number of records submitted to the broker"
        );
        describe_counter!(
            "kafka_client_messages_received_total",
            "Total number of records returned from poll"
        );
        describe_counter!(
            "kafka_client_send_failures_total",
            "Total number of records that failed before or after submission"
        );
        describe_counter!(
            "kafka_client_commits_total",
            "Total number of successful offset commits"
        );

        // Histograms
        describe_histogram!(
            "kafka_client_operation_duration_seconds",
            "Time spent in each client operation"
        );

        // Gauges
        describe_gauge!(
            "kafka_client_connected",
            "Connection state (1 = connected, 0 = disconnected)"
        );
    }

    /// Record a successful connect or reconnect
    pub fn record_reconnect(&self) {
        counter!(
            "kafka_client_reconnects_total",
            "client" => self.client_kind,
            "topic" => self.topic.clone(),
        )
        .increment(1);
    }

    /// Record submitted records
    pub fn record_sent(&self, count: u64) {
        counter!(
            "kafka_client_messages_sent_total",
            "client" => self.client_kind,
            "topic" => self.topic.clone(),
        )
        .increment(count);
    }

    /// Record received records
    pub fn record_received(&self, count: u64) {
        counter!(
            "kafka_client_messages_received_total",
            "client" => self.client_kind,
            "topic" => self.topic.clone(),
        )
        .increment(count);
    }

    /// Record a failed or dropped send
    pub fn record_send_failure(&self, reason: &str) {
        counter!(
            "kafka_client_send_failures_total",
            "client" => self.client_kind,
            "topic" => self.topic.clone(),
            "reason" => reason.to_string(),
        )
        .increment(1);
    }

    /// Record a successful offset commit
    pub fn record_commit(&self) {
        counter!(
            "kafka_client_commits_total",
            "client" => self.client_kind,
            "topic" => self.topic.clone(),
        )
        .increment(1);
    }

    /// Record how long an operation took
    pub fn record_operation_time(&self, operation: &'static str, duration: Duration) {
        histogram!(
            "kafka_client_operation_duration_seconds",
            "client" => self.client_kind,
            "topic" => self.topic.clone(),
            "operation" => operation,
        )
        .record(duration.as_secs_f64());
    }

    /// Set the connection state gauge
    pub fn set_connected(&self, connected: bool) {
        gauge!(
            "kafka_client_connected",
            "client" => self.client_kind,
            "topic" => self.topic.clone(),
        )
        .set(if connected { 1.0 } else { 0.0 });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = ClientMetrics::new("consumer", "events");
        assert_eq!(metrics.client_kind, "consumer");
        assert_eq!(metrics.topic, "events");
    }

    #[test]
    fn test_metrics_recording_does_not_panic() {
        let metrics = ClientMetrics::new("producer", "events");
        metrics.record_reconnect();
        metrics.record_sent(3);
        metrics.record_received(5);
        metrics.record_send_failure("unsupported_payload");
        metrics.record_commit();
        metrics.record_operation_time("send", Duration::from_millis(5));
        metrics.set_connected(true);
        metrics.set_connected(false);
    }
}
