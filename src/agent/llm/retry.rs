//! Retry decorator with exponential backoff.
//!
//! Every provider shares one [`RetryPolicy`]. What differs per provider is
//! how throttling is signalled, so that part sits behind [`RateLimitSignal`].
//!
//! # Example
//!
//! ```rust,ignore
//! let inner = OpenAiClient::from_config(&config)?;
//! let client = RetryingClient::new(inner, RetryPolicy::default());
//! ```

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::Error;
use crate::tools::ToolDefinition;
use crate::Result;

use super::super::message::Message;
use super::{LlmClient, LlmResponse, ReasoningLevel};

/// Provider verdict on a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryHint {
    /// Transient; retry, honouring the server delay if one was given.
    Retry { after: Option<Duration> },
    /// Permanent; surface the error.
    GiveUp,
}

/// Provider-specific classification of errors into retry hints.
pub trait RateLimitSignal: Send + Sync {
    fn classify(&self, err: &Error) -> RetryHint;
}

/// Default signal: HTTP 408/409/429/5xx and transport failures are transient,
/// `Retry-After` is honoured.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusCodeSignal;

impl RateLimitSignal for StatusCodeSignal {
    fn classify(&self, err: &Error) -> RetryHint {
        match err {
            Error::ApiRequest {
                status: Some(status),
                retry_after,
                ..
            } => match status {
                408 | 409 | 429 | 500..=599 => RetryHint::Retry { after: *retry_after },
                _ => RetryHint::GiveUp,
            },
            Error::ApiRequest { status: None, message, .. } if message.starts_with("transport error") => {
                RetryHint::Retry { after: None }
            }
            _ => RetryHint::GiveUp,
        }
    }
}

/// Exponential backoff parameters.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Deterministic part of the delay: `min(base * 2^attempt, max)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        exponential.min(self.max_delay)
    }

    /// Delay before retry number `attempt` (0-indexed).
    ///
    /// A server-requested delay wins over the computed backoff but is still
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, server_hint: Option<Duration>) -> Duration {
        if let Some(after) = server_hint {
            return after.min(self.max_delay);
        }
        let base_ms = self.base_delay.as_millis().max(1) as u64;
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..base_ms));
        (self.backoff(attempt) + jitter).min(self.max_delay)
    }
}

/// Decorator that retries transient failures of the wrapped client.
pub struct RetryingClient<C, S = StatusCodeSignal> {
    inner: C,
    policy: RetryPolicy,
    signal: S,
}

impl<C: LlmClient> RetryingClient<C, StatusCodeSignal> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            signal: StatusCodeSignal,
        }
    }
}

impl<C: LlmClient, S: RateLimitSignal> RetryingClient<C, S> {
    /// Use a provider-specific throttling signal.
    pub fn with_signal<T: RateLimitSignal>(self, signal: T) -> RetryingClient<C, T> {
        RetryingClient {
            inner: self.inner,
            policy: self.policy,
            signal,
        }
    }
}

#[async_trait]
impl<C: LlmClient, S: RateLimitSignal> LlmClient for RetryingClient<C, S> {
    async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        reasoning: Option<ReasoningLevel>,
    ) -> Result<LlmResponse> {
        let mut attempt = 0;
        loop {
            match self.inner.send(messages, tools, reasoning).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    let after = match self.signal.classify(&err) {
                        RetryHint::Retry { after } if attempt < self.policy.max_retries => after,
                        _ => return Err(err),
                    };
                    let delay = self.policy.delay_for(attempt, after);
                    warn!(
                        "Model request failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt + 1,
                        self.policy.max_retries + 1,
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn context_limit(&self) -> usize {
        self.inner.context_limit()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}
