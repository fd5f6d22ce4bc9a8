//! Wire types for OpenAI-compatible chat completion responses.
//!
//! Only the fields the agent loop depends on are modelled; everything else
//! in the payload is ignored.

use serde::Deserialize;

/// Top-level chat completion response.
#[derive(Debug, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub choices: Vec<WireChoice>,
    pub usage: Option<WireUsage>,
}

/// A single response choice.
#[derive(Debug, Deserialize)]
pub struct WireChoice {
    pub message: WireMessage,
    pub finish_reason: Option<String>,
}

/// Assistant message inside a choice.
#[derive(Debug, Deserialize)]
pub struct WireMessage {
    pub content: Option<String>,
    /// DeepSeek and several OpenRouter models return thinking text here.
    #[serde(alias = "reasoning")]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<WireToolCall>,
}

/// Function call requested by the model.
#[derive(Debug, Deserialize)]
pub struct WireToolCall {
    #[serde(default)]
    pub id: String,
    pub function: WireFunction,
}

#[derive(Debug, Deserialize)]
pub struct WireFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// Token usage metadata.
#[derive(Debug, Deserialize)]
pub struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: usize,
    #[serde(default)]
    pub completion_tokens: usize,
    #[serde(default)]
    pub total_tokens: usize,
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    /// DeepSeek reports cache hits at the top level.
    pub prompt_cache_hit_tokens: Option<usize>,
    /// OpenRouter reports the billed cost directly.
    pub cost: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct PromptTokensDetails {
    #[serde(default)]
    pub cached_tokens: usize,
}

impl WireUsage {
    pub fn cached_tokens(&self) -> usize {
        self.prompt_tokens_details
            .as_ref()
            .map(|d| d.cached_tokens)
            .or(self.prompt_cache_hit_tokens)
            .unwrap_or(0)
    }
}
