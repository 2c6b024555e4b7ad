//! # Retrying Provider
//!
//! Wraps any [`AiProvider`] with a bounded retry loop. Each attempt is capped by a
//! hard timeout; transient failures are retried with exponential backoff and
//! everything else is returned immediately.

use crate::{
    config::RetryConfig,
    errors::AiError,
    providers::ai::{AiProvider, ChatMessage, ChatRequest},
};
use async_trait::async_trait;
use tracing::warn;

#[derive(Clone, Debug)]
pub struct RetryingProvider<P> {
    inner: P,
    policy: RetryConfig,
}

impl<P: AiProvider> RetryingProvider<P> {
    pub fn new(inner: P, policy: RetryConfig) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: AiProvider + Clone + 'static> AiProvider for RetryingProvider<P> {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatMessage, AiError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(self.policy.timeout(), self.inner.chat(request))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(AiError::Timeout(self.policy.timeout_secs)),
            };

            let err = match outcome {
                Ok(message) => return Ok(message),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => e,
            };

            if attempt > self.policy.max_retries {
                return Err(AiError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self.policy.backoff(attempt);
            warn!(attempt, ?delay, error = %err, "Transient AI provider error, retrying");
            tokio::time::sleep(delay).await;
        }
    }
}
