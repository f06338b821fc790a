//! Shared client internals: operation middleware and the connect-retry loop.

use crate::config::{OperationSettings, RetrySettings};
use crate::metrics::ClientMetrics;
use crate::retry::RetryStrategy;
use crate::{ClientError, ClientResult};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::warn;

/// Boxed operation future borrowing the underlying connection.
///
/// Matches the shape `async_trait` methods return, so client operation
/// closures can hand trait-method futures straight to the middleware.
pub(crate) type OpFuture<'c, T> = Pin<Box<dyn Future<Output = ClientResult<T>> + Send + 'c>>;

/// Connection lifecycle shared by consumer and producer clients
///
/// `reconnect` guarantees that on `Ok(())` the client is fully connected and
/// ready to serve operations; `close` is idempotent and never fails outward.
#[async_trait]
pub trait ConnectionLifecycle {
    /// Tear down any live connection and establish a fresh one, retrying
    /// per the configured retry settings
    async fn reconnect(&mut self) -> ClientResult<()>;

    /// Tear down the connection if one exists. No-op when already closed;
    /// teardown failures are logged and swallowed.
    async fn close(&mut self);

    /// Whether a live connection is currently held
    fn is_connected(&self) -> bool;
}

/// Cross-cutting machinery shared by both client types
///
/// Owns the middleware applied around every operation and the bounded
/// retry loop used to (re)establish connections.
pub(crate) struct ClientCore {
    operation: OperationSettings,
    retry: RetryStrategy,
    pub(crate) metrics: ClientMetrics,
}

impl ClientCore {
    pub(crate) fn new(
        operation: OperationSettings,
        retry: &RetrySettings,
        metrics: ClientMetrics,
    ) -> Self {
        Self {
            operation,
            retry: RetryStrategy::from_settings(retry),
            metrics,
        }
    }

    /// Run one operation through the middleware chain: timing, the optional
    /// timeout guard, and a slow-operation warning.
    ///
    /// Reconnect-on-failure sits above this in the clients, since retrying
    /// needs a fresh connection which only they can build.
    pub(crate) async fn invoke<T, Fut>(&self, operation: &'static str, fut: Fut) -> ClientResult<T>
    where
        Fut: Future<Output = ClientResult<T>>,
    {
        let start = Instant::now();

        let result = if self.operation.use_timeout_guard {
            let timeout = Duration::from_secs(self.operation.action_timeout_secs);
            match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result,
                Err(_) => Err(ClientError::Timeout {
                    operation,
                    timeout_secs: self.operation.action_timeout_secs,
                }),
            }
        } else {
            fut.await
        };

        let elapsed = start.elapsed();
        self.metrics.record_operation_time(operation, elapsed);
        if elapsed >= Duration::from_secs(self.operation.action_warning_secs) {
            warn!(
                operation,
                elapsed_ms = elapsed.as_millis() as u64,
                "slow operation"
            );
        }

        result
    }

    /// Open a connection, retrying with backoff up to the configured number
    /// of attempts.
    ///
    /// Returns `ConnectionExhausted` once the bound is hit, so a permanently
    /// unreachable broker fails the caller instead of hanging forever.
    pub(crate) async fn connect_with_retry<T, F, Fut>(
        &self,
        what: &'static str,
        mut open: F,
    ) -> ClientResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let mut attempt: u32 = 0;

        loop {
            match open().await {
                Ok(connection) => {
                    self.metrics.record_reconnect();
                    self.metrics.set_connected(true);
                    return Ok(connection);
                }
                Err(e) => {
                    attempt += 1;
                    if !self.retry.should_retry(attempt) {
                        self.metrics.set_connected(false);
                        return Err(ClientError::ConnectionExhausted {
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }

                    let backoff = self.retry.calculate_backoff(attempt);
                    warn!(
                        what,
                        attempt,
                        max_attempts = self.retry.max_attempts(),
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "connect attempt failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

/// Initialize tracing/logging
///
/// Idempotent: repeated calls after the first are no-ops. `RUST_LOG` takes
/// precedence over the passed level.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok(); // Ignore if already initialized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackoffKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_retry(times: u32) -> RetrySettings {
        RetrySettings {
            retry_times: times,
            retry_sleep_ms: 1,
            backoff: BackoffKind::Fixed,
            max_backoff_ms: 1,
        }
    }

    fn core_with(retry: &RetrySettings, operation: OperationSettings) -> ClientCore {
        ClientCore::new(operation, retry, ClientMetrics::new("consumer", "t1"))
    }

    #[tokio::test]
    async fn test_invoke_passes_result_through() {
        let core = core_with(&fast_retry(3), OperationSettings::default());
        let value = core.invoke("op", async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);

        let err = core
            .invoke::<(), _>("op", async { Err(ClientError::broker("boom")) })
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_invoke_timeout_guard() {
        let operation = OperationSettings {
            use_timeout_guard: true,
            action_timeout_secs: 0,
            ..OperationSettings::default()
        };
        let core = core_with(&fast_retry(3), operation);

        let err = core
            .invoke::<(), _>("slow", async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Timeout { operation: "slow", .. }));
    }

    #[tokio::test]
    async fn test_connect_retry_succeeds_after_failures() {
        let core = core_with(&fast_retry(10), OperationSettings::default());
        let attempts = AtomicU32::new(0);

        let value = core
            .connect_with_retry("consumer", || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Err(ClientError::broker("connection refused"))
                    } else {
                        Ok("connected")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "connected");
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_connect_retry_exhausts() {
        let core = core_with(&fast_retry(3), OperationSettings::default());
        let attempts = AtomicU32::new(0);

        let err = core
            .connect_with_retry::<(), _, _>("consumer", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ClientError::broker("connection refused")) }
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ClientError::ConnectionExhausted { attempts: 3, .. }
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
