use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::LlmProvider;
use crate::errors::ProviderError;
use crate::model::{CompletionRequest, CompletionResponse};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub burst: u32,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 600,
            burst: 10,
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Token bucket refilled continuously at `rpm / 60` tokens per second.
///
/// `acquire` suspends until a token is free; dropping the future while it
/// sleeps consumes nothing, so cancellation needs no cleanup.
struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_per_sec: f64,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(requests_per_minute: u32, burst: u32) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: burst.max(1) as f64,
                last_refill: Instant::now(),
            }),
            capacity: burst.max(1) as f64,
            refill_per_sec: requests_per_minute as f64 / 60.0,
        }
    }

    async fn acquire(&self) {
        // rpm = 0 disables the gate rather than blocking forever.
        if self.refill_per_sec <= 0.0 {
            return;
        }
        loop {
            let wait = {
                let mut state = self.state.lock().unwrap();
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                state.last_refill = now;
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

/// Rate-limiting, retrying decorator around any [`LlmProvider`].
///
/// Every attempt, retries included, acquires one token before delegating.
/// Retryable inner errors back off with `min(initial * 2^attempt, max)`;
/// non-retryable errors abort immediately.
pub struct RateLimited<P> {
    inner: P,
    bucket: TokenBucket,
    config: RateLimitConfig,
}

impl<P: LlmProvider> RateLimited<P> {
    pub fn new(inner: P, config: RateLimitConfig) -> Self {
        let bucket = TokenBucket::new(config.requests_per_minute, config.burst);
        Self {
            inner,
            bucket,
            config,
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

fn backoff_delay(config: &RateLimitConfig, attempt: u32) -> Duration {
    let exp = config.initial_backoff.as_secs_f64() * 2f64.powi(attempt as i32);
    Duration::from_secs_f64(exp.min(config.max_backoff.as_secs_f64()))
}

#[async_trait]
impl<P: LlmProvider> LlmProvider for RateLimited<P> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn default_model(&self) -> &str {
        self.inner.default_model()
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let mut attempt = 0u32;
        loop {
            self.bucket.acquire().await;
            match self.inner.complete(request).await {
                Ok(resp) => return Ok(resp),
                Err(err) if !err.is_retryable() || attempt >= self.config.max_retries => {
                    return Err(err);
                }
                Err(err) => {
                    let delay = backoff_delay(&self.config, attempt);
                    tracing::warn!(
                        provider = self.inner.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "provider call failed; backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
