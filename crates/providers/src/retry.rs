//! Retry decorator with exponential backoff.
//!
//! Wraps any `Provider` and retries transient failures (5xx, rate limits,
//! timeouts, network errors) up to a configured number of attempts.
//! Client-side mistakes (4xx, auth failures) surface immediately.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use turnstone_core::error::ProviderError;
use turnstone_core::provider::{Provider, ProviderRequest, ProviderResponse};

/// A provider wrapper that retries transient failures.
pub struct RetryProvider {
    inner: Arc<dyn Provider>,
    max_retries: u32,
    base_delay: Duration,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn Provider>) -> Self {
        Self {
            inner,
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay before attempt `n` (1-based): base * 2^(n-1).
    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

#[async_trait]
impl Provider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = match &e {
                        ProviderError::RateLimited { retry_after_secs } => {
                            Duration::from_secs(*retry_after_secs).max(self.backoff_delay(attempt))
                        }
                        _ => self.backoff_delay(attempt),
                    };
                    warn!(
                        attempt,
                        max = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient provider failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}
