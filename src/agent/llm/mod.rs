//! LLM client abstraction layer.
//!
//! This module provides:
//! - [`LlmClient`] trait for swappable LLM providers
//! - [`RetryingClient`] decorator with one shared backoff policy
//! - Concrete implementation: any OpenAI-compatible chat completions API
//!
//! # Adding a New Provider
//!
//! 1. Create a new file (e.g., `anthropic.rs`)
//! 2. Implement `LlmClient` trait
//! 3. Implement `RateLimitSignal` if the provider signals throttling differently
//! 4. Add a branch in `create_client()`

mod types;

pub mod openai;
pub mod retry;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::tools::ToolDefinition;
use crate::Result;

pub use openai::OpenAiClient;
pub use retry::{RateLimitSignal, RetryHint, RetryPolicy, RetryingClient, StatusCodeSignal};

use super::message::{Message, ToolCall};

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Other(String),
}

impl FinishReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "stop" | "end_turn" | "STOP" => FinishReason::Stop,
            "tool_calls" | "function_call" | "tool_use" => FinishReason::ToolCalls,
            "length" | "max_tokens" | "MAX_TOKENS" => FinishReason::Length,
            other => FinishReason::Other(other.to_string()),
        }
    }
}

/// Requested reasoning effort. Only sent when configured, since
/// non-reasoning models reject the parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningLevel {
    Low,
    Medium,
    High,
}

impl ReasoningLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningLevel::Low => "low",
            ReasoningLevel::Medium => "medium",
            ReasoningLevel::High => "high",
        }
    }
}

impl fmt::Display for ReasoningLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReasoningLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(ReasoningLevel::Low),
            "medium" => Ok(ReasoningLevel::Medium),
            "high" => Ok(ReasoningLevel::High),
            other => Err(Error::Config(format!("Unknown reasoning level: {other}"))),
        }
    }
}

/// One candidate completion.
#[derive(Debug, Clone)]
pub struct Choice {
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
}

impl Choice {
    /// Create a plain text choice that stops.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            reasoning_content: None,
            tool_calls: vec![],
            finish_reason: FinishReason::Stop,
        }
    }

    /// Create a choice requesting tool calls.
    pub fn tools(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            reasoning_content: None,
            tool_calls,
            finish_reason: FinishReason::ToolCalls,
        }
    }

    /// Check if the choice has structured tool calls.
    #[inline]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Response from an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl LlmResponse {
    /// Create a simple text response.
    pub fn text(content: impl Into<String>) -> Self {
        Self::from_choice(Choice::text(content))
    }

    pub fn from_choice(choice: Choice) -> Self {
        Self {
            choices: vec![choice],
            usage: Usage::default(),
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
    pub cached_tokens: usize,
    /// Cost in USD as reported by the provider, or estimated from pricing.
    pub estimated_cost: f64,
}

/// LLM client trait - swappable provider abstraction.
///
/// Implement this trait to add a new LLM provider. Transport failures and
/// non-success replies must surface as [`Error::ApiRequest`].
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the conversation and tool schema, get one response.
    async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        reasoning: Option<ReasoningLevel>,
    ) -> Result<LlmResponse>;

    /// Context window of the active model, in tokens.
    fn context_limit(&self) -> usize;

    /// Model identifier.
    fn model(&self) -> &str;
}

#[async_trait]
impl<C: LlmClient + ?Sized> LlmClient for Box<C> {
    async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        reasoning: Option<ReasoningLevel>,
    ) -> Result<LlmResponse> {
        (**self).send(messages, tools, reasoning).await
    }

    fn context_limit(&self) -> usize {
        (**self).context_limit()
    }

    fn model(&self) -> &str {
        (**self).model()
    }
}

/// Create the configured client, wrapped in the shared retry policy.
///
/// Supported providers:
/// - `"openai"`: any OpenAI-compatible chat completions endpoint
pub fn create_client(config: &Config) -> Result<Box<dyn LlmClient>> {
    match config.provider.as_str() {
        "openai" | "openrouter" | "deepseek" => {
            let client = OpenAiClient::from_config(config)?;
            let policy = RetryPolicy::from(&config.retry);
            Ok(Box::new(RetryingClient::new(client, policy)))
        }
        other => Err(Error::Config(format!("Unknown provider: {other}"))),
    }
}

/// Scripted LLM client for testing.
#[cfg(test)]
pub struct FakeLlmClient {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<LlmResponse>>>,
    repeat: Option<LlmResponse>,
    seen: std::sync::Mutex<Vec<Vec<Message>>>,
    context_limit: usize,
}

#[cfg(test)]
impl FakeLlmClient {
    /// Create with predefined responses, replayed in order.
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into_iter().map(Ok).collect()),
            repeat: None,
            seen: std::sync::Mutex::new(Vec::new()),
            context_limit: 128_000,
        }
    }

    /// Create with predefined text responses.
    pub fn texts(responses: Vec<&str>) -> Self {
        Self::new(responses.into_iter().map(LlmResponse::text).collect())
    }

    /// Create a client that answers every call with the same response.
    pub fn repeating(response: LlmResponse) -> Self {
        Self {
            repeat: Some(response),
            ..Self::new(vec![])
        }
    }

    /// Create a client whose first call fails.
    pub fn failing(err: Error) -> Self {
        let client = Self::new(vec![]);
        client.responses.lock().unwrap().push_back(Err(err));
        client
    }

    /// Queue another response after the scripted ones.
    pub fn push_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn with_context_limit(mut self, limit: usize) -> Self {
        self.context_limit = limit;
        self
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Conversation as sent on the given call.
    pub fn conversation(&self, call: usize) -> Vec<Message> {
        self.seen.lock().unwrap()[call].clone()
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn send(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
        _reasoning: Option<ReasoningLevel>,
    ) -> Result<LlmResponse> {
        self.seen.lock().unwrap().push(messages.to_vec());
        if let Some(next) = self.responses.lock().unwrap().pop_front() {
            return next;
        }
        self.repeat
            .clone()
            .ok_or_else(|| Error::api("No more fake responses"))
    }

    fn context_limit(&self) -> usize {
        self.context_limit
    }

    fn model(&self) -> &str {
        "fake-model"
    }
}
