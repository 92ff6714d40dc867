//! Invoker trait and the retry/rate-limit decorator.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::types::{ChatRequest, LlmResponse};

/// The LLM collaborator the engine consumes.
///
/// Implementations are expected to be retried and rate-limited; when that
/// is not the case, wrap them in [`RetryingInvoker`]. A failed call is
/// reported through `LlmResponse::success`, never by panicking.
#[async_trait]
pub trait LlmInvoker: Send + Sync {
    /// Send one chat request and wait for the full response.
    async fn chat(&self, request: ChatRequest) -> LlmResponse;
}

/// Minimum-interval rate limiter shared across call sites.
///
/// External providers reject bursts; callers `wait()` before each request
/// and the limiter sleeps just long enough to honor the interval.
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Sleep until the minimum interval since the previous request has passed.
    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Retry policy for [`RetryingInvoker`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Per-request read timeout in seconds
    pub timeout_secs: u64,
    /// Attempts beyond the first
    pub max_retries: u32,
    /// Base backoff delay in milliseconds, doubled per retry
    pub backoff_base_ms: u64,
    /// Minimum interval between requests in milliseconds
    pub min_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_retries: 3,
            backoff_base_ms: 500,
            min_interval_ms: 1000,
        }
    }
}

/// Decorator adding timeout, exponential backoff, and per-provider rate
/// control to a bare invoker.
pub struct RetryingInvoker {
    inner: Arc<dyn LlmInvoker>,
    config: RetryConfig,
    limiter: RateLimiter,
}

impl RetryingInvoker {
    pub fn new(inner: Arc<dyn LlmInvoker>) -> Self {
        Self::with_config(inner, RetryConfig::default())
    }

    pub fn with_config(inner: Arc<dyn LlmInvoker>, config: RetryConfig) -> Self {
        let limiter = RateLimiter::new(Duration::from_millis(config.min_interval_ms));
        Self {
            inner,
            config,
            limiter,
        }
    }
}

#[async_trait]
impl LlmInvoker for RetryingInvoker {
    async fn chat(&self, request: ChatRequest) -> LlmResponse {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let mut last_error = String::from("no attempts made");

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff =
                    Duration::from_millis(self.config.backoff_base_ms << (attempt - 1).min(6));
                tracing::debug!(attempt, ?backoff, "retrying LLM request");
                tokio::time::sleep(backoff).await;
            }
            self.limiter.wait().await;

            match tokio::time::timeout(timeout, self.inner.chat(request.clone())).await {
                Ok(response) if response.success => return response,
                Ok(response) => {
                    last_error = response
                        .error
                        .unwrap_or_else(|| "provider returned failure".to_string());
                }
                Err(_) => {
                    last_error = format!("request timed out after {}s", self.config.timeout_secs);
                }
            }
        }

        tracing::warn!(error = %last_error, "LLM request failed after retries");
        LlmResponse::err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyInvoker {
        calls: AtomicU32,
        succeed_on: u32,
    }

    #[async_trait]
    impl LlmInvoker for FlakyInvoker {
        async fn chat(&self, _request: ChatRequest) -> LlmResponse {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.succeed_on {
                LlmResponse::ok("recovered")
            } else {
                LlmResponse::err("transient")
            }
        }
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let inner = Arc::new(FlakyInvoker {
            calls: AtomicU32::new(0),
            succeed_on: 3,
        });
        let invoker = RetryingInvoker::with_config(
            inner.clone(),
            RetryConfig {
                timeout_secs: 5,
                max_retries: 3,
                backoff_base_ms: 1,
                min_interval_ms: 0,
            },
        );

        let response = invoker.chat(ChatRequest::new("hi")).await;
        assert!(response.success);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_last_error() {
        let inner = Arc::new(FlakyInvoker {
            calls: AtomicU32::new(0),
            succeed_on: 100,
        });
        let invoker = RetryingInvoker::with_config(
            inner,
            RetryConfig {
                timeout_secs: 5,
                max_retries: 2,
                backoff_base_ms: 1,
                min_interval_ms: 0,
            },
        );

        let response = invoker.chat(ChatRequest::new("hi")).await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("transient"));
    }

    #[tokio::test]
    async fn test_rate_limiter_spaces_requests() {
        let limiter = RateLimiter::new(Duration::from_millis(30));
        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
