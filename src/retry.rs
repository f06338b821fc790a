//! Retry strategies and backoff logic for the reconnect loop.

use crate::config::{BackoffKind, RetrySettings};
use std::time::Duration;

/// Configuration for retry behavior
///
/// Internal type - users configure retries via `RetrySettings` in `ClientConfig`.
#[derive(Debug, Clone)]
pub(crate) struct RetryConfig {
    /// Maximum number of attempts before giving up
    max_attempts: u32,
    /// Base backoff duration in milliseconds
    base_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds
    max_backoff_ms: u64,
    /// Backoff multiplier for exponential backoff
    multiplier: f64,
    /// Add jitter to backoff to avoid thundering herd
    jitter: bool,
}

impl RetryConfig {
    /// Create exponential backoff configuration
    pub(crate) fn exponential(max_attempts: u32, base_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            base_backoff_ms,
            max_backoff_ms,
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// Create fixed delay configuration
    pub(crate) fn fixed(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_backoff_ms: delay_ms,
            max_backoff_ms: delay_ms,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// Disable jitter
    #[allow(dead_code)]
    pub(crate) fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::fixed(10, 1000)
    }
}

/// Retry strategy implementation
///
/// Internal type - users configure retries via `RetrySettings` in `ClientConfig`.
#[derive(Debug, Clone)]
pub(crate) struct RetryStrategy {
    config: RetryConfig,
}

impl RetryStrategy {
    /// Create a new retry strategy
    pub(crate) fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Build a strategy from user-facing retry settings
    pub(crate) fn from_settings(settings: &RetrySettings) -> Self {
        let config = match settings.backoff {
            BackoffKind::Fixed => RetryConfig::fixed(settings.retry_times, settings.retry_sleep_ms),
            BackoffKind::Exponential => RetryConfig::exponential(
                settings.retry_times,
                settings.retry_sleep_ms,
                settings.max_backoff_ms,
            ),
        };
        Self::new(config)
    }

    /// Calculate the backoff duration for a given attempt
    ///
    /// # Arguments
    ///
    /// * `attempt` - The current attempt number (1-indexed)
    pub(crate) fn calculate_backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }

        let mut backoff_ms =
            self.config.base_backoff_ms as f64 * self.config.multiplier.powi((attempt - 1) as i32);

        // Cap at max backoff
        backoff_ms = backoff_ms.min(self.config.max_backoff_ms as f64);

        // Add jitter if enabled
        if self.config.jitter {
            use rand::Rng;
            let jitter_factor = rand::rng().random_range(0.5..1.5);
            backoff_ms *= jitter_factor;
            // Ensure we don't exceed max after jitter
            backoff_ms = backoff_ms.min(self.config.max_backoff_ms as f64);
        }

        Duration::from_millis(backoff_ms as u64)
    }

    /// Get the maximum number of attempts
    pub(crate) fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Check if another attempt is allowed after `attempt` failures
    pub(crate) fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.config.max_attempts
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
