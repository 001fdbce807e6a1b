//! Provider invocation with bounded retries, backoff, per-call timeout and
//! cancellation.

use std::time::{Duration, Instant};

use rand::Rng;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::RoadmapError;
use crate::prompt::PromptPayload;
use crate::provider::{ProviderError, RawOutput, RoadmapProvider};

/// Jitter added on top of the exponential delay, as a fraction of it.
const JITTER_FRACTION: f64 = 0.25;

/// Attempt ceiling and backoff shape for retryable provider errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Provider calls per prompt, first call included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// `base_delay * 2^(attempt - 1)`, capped at `max_delay`. `attempt` is
    /// 1-based: the delay after the first failed call is `base_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        2u32.checked_pow(exponent)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Delay before the next call. A server `Retry-After` hint replaces the
    /// computed backoff; both are capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint.min(self.max_delay);
        }
        let base = self.backoff(attempt);
        let jitter = base.mul_f64(rand::rng().random_range(0.0..=JITTER_FRACTION));
        (base + jitter).min(self.max_delay)
    }
}

/// Everything one orchestrator call needs to invoke the provider.
pub(crate) struct CallContext<'a> {
    pub request_id: Uuid,
    pub provider: &'a dyn RoadmapProvider,
    pub timeout: Duration,
    pub policy: &'a RetryPolicy,
    pub cancel: &'a CancellationToken,
}

impl CallContext<'_> {
    /// Call the provider until it answers, a fatal error occurs, the retry
    /// budget runs out or the token is cancelled.
    ///
    /// `attempts` counts every provider call made for the request.
    pub(crate) async fn invoke(
        &self,
        prompt: &PromptPayload,
        attempts: &mut u32,
    ) -> Result<RawOutput, RoadmapError> {
        let provider = self.provider.name();
        let mut attempt = 0u32;
        let mut timeout_retried = false;

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(request_id = %self.request_id, provider, attempt, "request cancelled before provider call");
                return Err(RoadmapError::Cancelled);
            }
            attempt += 1;
            *attempts += 1;
            tracing::info!(
                request_id = %self.request_id,
                provider,
                attempt,
                prompt_kind = ?prompt.kind,
                "invoking provider"
            );

            let started = Instant::now();
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!(request_id = %self.request_id, provider, attempt, "request cancelled during provider call");
                    return Err(RoadmapError::Cancelled);
                }
                result = tokio::time::timeout(self.timeout, self.provider.generate(prompt, self.timeout)) => {
                    result.unwrap_or_else(|_| Err(ProviderError::Timeout {
                        message: format!("no response within {}s", self.timeout.as_secs_f64()),
                    }))
                }
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let err = match result {
                Ok(output) => {
                    tracing::info!(
                        request_id = %self.request_id,
                        provider,
                        attempt,
                        model = %output.model,
                        elapsed_ms,
                        truncated = output.truncated,
                        "provider responded"
                    );
                    tracing::debug!(request_id = %self.request_id, preview = %output.preview(200), "raw provider output");
                    return Ok(output);
                }
                Err(err) => err,
            };

            let within_ceiling = attempt < self.policy.max_attempts;
            let may_retry = match &err {
                ProviderError::Timeout { .. } => !timeout_retried && within_ceiling,
                ProviderError::RateLimited { .. } | ProviderError::Unavailable { .. } => within_ceiling,
                _ => false,
            };
            if !may_retry {
                tracing::error!(
                    request_id = %self.request_id,
                    provider,
                    attempt,
                    elapsed_ms,
                    error = %err,
                    "provider call failed"
                );
                return Err(err.into());
            }
            if matches!(err, ProviderError::Timeout { .. }) {
                timeout_retried = true;
            }

            let retry_after = match &err {
                ProviderError::RateLimited { retry_after } => *retry_after,
                _ => None,
            };
            let delay = self.policy.delay_for(attempt, retry_after);
            tracing::warn!(
                request_id = %self.request_id,
                provider,
                attempt,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "provider call failed, retrying"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!(request_id = %self.request_id, provider, attempt, "request cancelled during backoff");
                    return Err(RoadmapError::Cancelled);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
