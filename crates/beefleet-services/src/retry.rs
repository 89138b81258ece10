//! Retry policy for upstream HTTP calls.
//!
//! The default is a single attempt. When more attempts are configured,
//! only transient failures are retried, with exponential backoff:
//! - Timeouts and connection failures
//! - 5xx server errors, 408 and 429
//!
//! It never retries other 4xx responses (bad requests, 401, 403, 404).

use std::future::Future;
use std::time::Duration;

use beefleet_core::UpstreamConfig;
use reqwest::{Response, StatusCode};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts per call, including the first (1 = no retries)
    pub max_attempts: u32,
    /// Delay before the first retry (doubles each attempt)
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(5000),
        }
    }
}

impl From<&UpstreamConfig> for RetryConfig {
    fn from(config: &UpstreamConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.retry_initial_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (0-based)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry);
        let delay_ms = (self.initial_delay.as_millis() as u64).saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped)
    }
}

/// Error classification for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    NoRetry,
}

/// Check if a reqwest error is retryable
pub fn is_retryable_error(error: &reqwest::Error) -> RetryDecision {
    if error.is_timeout() || error.is_connect() {
        return RetryDecision::Retry;
    }

    match error.status() {
        Some(status) => is_retryable_status(status),
        None => RetryDecision::NoRetry,
    }
}

/// Check if a status code is retryable
pub fn is_retryable_status(status: StatusCode) -> RetryDecision {
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        RetryDecision::Retry
    } else {
        RetryDecision::NoRetry
    }
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out.
///
/// The last response (even a failing one) or error is returned as-is so the
/// caller can relay it.
pub async fn with_retry<F, Fut>(config: &RetryConfig, operation: F) -> Result<Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Response, reqwest::Error>>,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let result = operation().await;

        let decision = match &result {
            Ok(response) => is_retryable_status(response.status()),
            Err(e) => is_retryable_error(e),
        };

        if decision == RetryDecision::NoRetry || attempt >= attempts {
            if attempt > 1 && result.is_ok() {
                tracing::info!("Upstream request finished after {} attempts", attempt);
            }
            return result;
        }

        let delay = config.delay_for_retry(attempt - 1);
        match &result {
            Ok(response) => tracing::warn!(
                "Upstream returned {} on attempt {} of {}, retrying in {:?}",
                response.status(),
                attempt,
                attempts,
                delay
            ),
            Err(e) => tracing::warn!(
                "Upstream request failed on attempt {} of {}: {}, retrying in {:?}",
                attempt,
                attempts,
                e,
                delay
            ),
        }

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
