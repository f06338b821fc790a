//! Error types for client operations.

use thiserror::Error;

/// Result type for client operations
///
/// **Mandatory public API** - all client methods return this.
pub type ClientResult<T> = Result<T, ClientError>;

/// Error types for client operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// Broker or transport failure - transient, may succeed on a fresh connection
    ///
    /// Examples: network timeouts, broker unreachable, partition leader moved
    #[error("Broker error: {message}")]
    Broker {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connect/reconnect gave up after the configured number of attempts
    #[error("Connection exhausted after {attempts} attempts: {last_error}")]
    ConnectionExhausted { attempts: u32, last_error: String },

    /// Configuration error - detected at startup, never retried
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A dependency the configuration promised was not supplied by the caller
    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    /// Caller invoked an operation that is illegal for the client's setup
    ///
    /// Examples: manual commit with auto-commit enabled, explicit offset
    /// commit without a bound partition
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Payload could not be encoded into wire bytes
    #[error("Unsupported payload: {0}")]
    UnsupportedPayload(String),

    /// An operation exceeded the configured action timeout
    #[error("Operation '{operation}' timed out after {timeout_secs}s")]
    Timeout {
        operation: &'static str,
        timeout_secs: u64,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Check if this error may succeed after a reconnect
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Broker { .. } | ClientError::Io(_))
    }

    /// Check if this error indicates caller misuse
    pub fn is_misuse(&self) -> bool {
        matches!(self, ClientError::InvalidOperation(_))
    }

    /// Create a broker error from a message
    pub fn broker(message: impl Into<String>) -> Self {
        ClientError::Broker {
            message: message.into(),
            source: None,
        }
    }

    /// Create a broker error with source
    pub fn broker_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ClientError::Broker {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        ClientError::Configuration(message.into())
    }

    /// Create an invalid operation error
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        ClientError::InvalidOperation(message.into())
    }

    /// Create an unsupported payload error
    pub fn unsupported_payload(message: impl Into<String>) -> Self {
        ClientError::UnsupportedPayload(message.into())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let broker = ClientError::broker("leader not available");
        assert!(broker.is_retryable());
        assert!(!broker.is_misuse());

        let misuse = ClientError::invalid_operation("commit with auto-commit");
        assert!(!misuse.is_retryable());
        assert!(misuse.is_misuse());

        let config = ClientError::config("topic missing");
        assert!(!config.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = ClientError::broker("connection refused");
        assert_eq!(err.to_string(), "Broker error: connection refused");

        let exhausted = ClientError::ConnectionExhausted {
            attempts: 10,
            last_error: "connection refused".to_string(),
        };
        assert!(exhausted.to_string().contains("10 attempts"));
    }
}
