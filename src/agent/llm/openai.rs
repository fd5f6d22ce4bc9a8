//! OpenAI-compatible chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{Config, Pricing};
use crate::error::Error;
use crate::tools::ToolDefinition;
use crate::Result;

use super::super::message::{Message, Role, ToolCall};
use super::types::{ChatCompletion, WireUsage};
use super::{Choice, FinishReason, LlmClient, LlmResponse, ReasoningLevel, Usage};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Fallback context window when the model is not in the table.
const DEFAULT_CONTEXT_LIMIT: usize = 128_000;

/// Known context windows by model-name prefix.
const CONTEXT_LIMITS: &[(&str, usize)] = &[
    ("gpt-4.1", 1_047_576),
    ("gpt-4o", 128_000),
    ("gpt-5", 400_000),
    ("o3", 200_000),
    ("o4", 200_000),
    ("deepseek", 64_000),
    ("anthropic/claude", 200_000),
    ("google/gemini", 1_000_000),
    ("qwen", 131_072),
];

/// Look up the context window for a model name.
pub fn context_limit_for(model: &str) -> usize {
    let bare = model.rsplit('/').next().unwrap_or(model);
    CONTEXT_LIMITS
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix) || bare.starts_with(prefix))
        .map(|(_, limit)| *limit)
        .unwrap_or(DEFAULT_CONTEXT_LIMIT)
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    base_url: String,
    model: String,
    context_limit: usize,
    pricing: Pricing,
    client: Client,
}

impl OpenAiClient {
    /// Create a new client with API key.
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.to_string(),
            context_limit: context_limit_for(model),
            pricing: Pricing::default(),
            client: Client::new(),
        }
    }

    /// Create a client from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.resolved_api_key();
        if api_key.is_empty() {
            return Err(Error::Config(
                "No API key configured. Set 'api_key' in ~/.tern/config.json or TERN_API_KEY."
                    .to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config.model.clone(),
            context_limit: config
                .context_limit
                .unwrap_or_else(|| context_limit_for(&config.model)),
            pricing: config.pricing.clone(),
            client,
        })
    }

    /// Request body for one completion. `reasoning_effort` is omitted unless
    /// a level was configured.
    fn build_request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        reasoning: Option<ReasoningLevel>,
    ) -> Value {
        let mut request = json!({
            "model": self.model,
            "messages": self.convert_messages(messages),
        });

        if let Some(level) = reasoning {
            request["reasoning_effort"] = json!(level.as_str());
        }
        if let Some(tool_config) = self.convert_tools(tools) {
            request["tools"] = tool_config;
        }
        request
    }

    fn build_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn convert_messages(&self, messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| {
                if let Some(ref tag) = m.tool_result {
                    return json!({
                        "role": "tool",
                        "tool_call_id": tag.call_id,
                        "name": tag.name,
                        "content": m.content
                    });
                }

                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };

                if m.tool_calls.is_empty() {
                    return json!({ "role": role, "content": m.content });
                }

                let calls: Vec<Value> = m
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": tc.arguments
                            }
                        })
                    })
                    .collect();

                json!({
                    "role": role,
                    "content": m.content,
                    "tool_calls": calls
                })
            })
            .collect()
    }

    fn convert_tools(&self, tools: &[ToolDefinition]) -> Option<Value> {
        if tools.is_empty() {
            return None;
        }

        let functions: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters
                    }
                })
            })
            .collect();

        Some(Value::Array(functions))
    }

    fn estimate_cost(&self, usage: &WireUsage) -> f64 {
        if let Some(cost) = usage.cost {
            return cost;
        }
        let cached = usage.cached_tokens().min(usage.prompt_tokens);
        let fresh = usage.prompt_tokens - cached;
        (fresh as f64 * self.pricing.input_per_million
            + cached as f64 * self.pricing.cached_input_per_million
            + usage.completion_tokens as f64 * self.pricing.output_per_million)
            / 1_000_000.0
    }

    fn parse_response(&self, response: ChatCompletion) -> Result<LlmResponse> {
        if response.choices.is_empty() {
            return Err(Error::api("No choices in response"));
        }

        let usage = response
            .usage
            .as_ref()
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
                cached_tokens: u.cached_tokens(),
                estimated_cost: self.estimate_cost(u),
            })
            .unwrap_or_default();

        let choices = response
            .choices
            .into_iter()
            .map(|c| {
                let tool_calls = c
                    .message
                    .tool_calls
                    .into_iter()
                    .enumerate()
                    .map(|(i, tc)| {
                        let id = if tc.id.is_empty() {
                            format!("call_{}", i)
                        } else {
                            tc.id
                        };
                        ToolCall::new(id, tc.function.name, tc.function.arguments)
                    })
                    .collect();

                Choice {
                    content: c.message.content,
                    reasoning_content: c.message.reasoning_content,
                    tool_calls,
                    finish_reason: c
                        .finish_reason
                        .as_deref()
                        .map(FinishReason::parse)
                        .unwrap_or(FinishReason::Stop),
                }
            })
            .collect();

        Ok(LlmResponse { choices, usage })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        reasoning: Option<ReasoningLevel>,
    ) -> Result<LlmResponse> {
        let request = self.build_request(messages, tools, reasoning);

        debug!("POST {} ({} messages)", self.build_url(), messages.len());

        let response = self
            .client
            .post(self.build_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::api(format!("transport error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::ApiRequest {
                status: Some(status.as_u16()),
                message: error_text,
                retry_after,
            });
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| Error::api(format!("malformed response body: {e}")))?;
        self.parse_response(completion)
    }

    fn context_limit(&self) -> usize {
        self.context_limit
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::ToolResultTag;

    fn client() -> OpenAiClient {
        OpenAiClient::new("sk-test", "gpt-4o-mini")
    }

    #[test]
    fn test_context_limit_lookup() {
        assert_eq!(context_limit_for("gpt-4o-mini"), 128_000);
        assert_eq!(context_limit_for("deepseek-chat"), 64_000);
        assert_eq!(context_limit_for("anthropic/claude-sonnet-4"), 200_000);
        assert_eq!(context_limit_for("some-local-model"), DEFAULT_CONTEXT_LIMIT);
    }

    #[test]
    fn test_convert_tool_messages() {
        let call = ToolCall::new("call_1", "shell", r#"{"command":"ls"}"#);
        let messages = vec![
            Message::system("sys"),
            Message::user("list files"),
            Message::assistant_with_tools("", vec![call]),
            Message::tool_result(ToolResultTag::new("call_1", "shell"), "a.txt"),
        ];

        let wire = client().convert_messages(&messages);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[2]["tool_calls"][0]["function"]["name"], "shell");
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_request_omits_reasoning_effort_by_default() {
        let messages = vec![Message::system("sys"), Message::user("hi")];
        let request = client().build_request(&messages, &[], None);
        assert_eq!(request["model"], "gpt-4o-mini");
        assert!(request.get("reasoning_effort").is_none());
        assert!(request.get("tools").is_none());

        let request = client().build_request(&messages, &[], Some(ReasoningLevel::High));
        assert_eq!(request["reasoning_effort"], "high");
    }

    #[test]
    fn test_parse_response() {
        let body = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "reasoning_content": "thinking",
                    "tool_calls": [{
                        "id": "abc",
                        "type": "function",
                        "function": {"name": "read_file", "arguments": "{\"path\":\"a.rs\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {
                "prompt_tokens": 1000,
                "completion_tokens": 10,
                "total_tokens": 1010,
                "prompt_tokens_details": {"cached_tokens": 400},
                "cost": 0.0042
            }
        });
        let completion: ChatCompletion = serde_json::from_value(body).unwrap();
        let response = client().parse_response(completion).unwrap();

        let choice = &response.choices[0];
        assert_eq!(choice.finish_reason, FinishReason::ToolCalls);
        assert_eq!(choice.tool_calls[0].name, "read_file");
        assert_eq!(choice.reasoning_content.as_deref(), Some("thinking"));
        assert_eq!(response.usage.cached_tokens, 400);
        assert!((response.usage.estimated_cost - 0.0042).abs() < 1e-12);
    }

    #[test]
    fn test_cost_from_pricing() {
        let mut c = client();
        c.pricing = Pricing {
            input_per_million: 2.0,
            output_per_million: 8.0,
            cached_input_per_million: 0.5,
        };
        let usage: WireUsage = serde_json::from_value(json!({
            "prompt_tokens": 1_000_000,
            "completion_tokens": 100_000,
            "total_tokens": 1_100_000,
            "prompt_cache_hit_tokens": 500_000
        }))
        .unwrap();
        // 0.5M fresh * 2 + 0.5M cached * 0.5 + 0.1M out * 8
        assert!((c.estimate_cost(&usage) - 2.05).abs() < 1e-9);
    }

    #[test]
    fn test_empty_choices_is_api_error() {
        let completion: ChatCompletion = serde_json::from_value(json!({"choices": []})).unwrap();
        let err = client().parse_response(completion).unwrap_err();
        assert!(matches!(err, Error::ApiRequest { .. }));
    }
}
