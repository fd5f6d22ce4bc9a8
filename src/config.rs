//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::agent::llm::ReasoningLevel;
use crate::Result;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directory tools operate in
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    /// LLM provider to use ("openai" for any OpenAI-compatible endpoint)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key (falls back to TERN_API_KEY / OPENAI_API_KEY)
    #[serde(default)]
    pub api_key: String,

    /// Override for the provider base URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum model calls per query
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Override for the model's context window, in tokens
    #[serde(default)]
    pub context_limit: Option<usize>,

    /// Reasoning effort requested from the model. Leave unset for models
    /// without reasoning support.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningLevel>,

    /// Timeout for a single shell command
    #[serde(default = "default_shell_timeout")]
    pub shell_timeout_secs: u64,

    /// Timeout for a single model request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub pricing: Pricing,

    /// Where the session state file is written
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

/// Backoff settings for model requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// USD per million tokens, used when the provider does not report cost
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pricing {
    #[serde(default)]
    pub input_per_million: f64,

    #[serde(default)]
    pub output_per_million: f64,

    #[serde(default)]
    pub cached_input_per_million: f64,
}

fn default_workspace() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_iterations() -> usize {
    50
}

fn default_shell_timeout() -> u64 {
    120
}

fn default_request_timeout() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_state_file() -> PathBuf {
    config_dir().join("session.json")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            provider: default_provider(),
            api_key: String::new(),
            base_url: None,
            model: default_model(),
            max_iterations: default_max_iterations(),
            context_limit: None,
            reasoning: None,
            shell_timeout_secs: default_shell_timeout(),
            request_timeout_secs: default_request_timeout(),
            retry: RetryConfig::default(),
            pricing: Pricing::default(),
            state_file: default_state_file(),
        }
    }
}

impl Config {
    /// API key from the config file, else from the environment.
    pub fn resolved_api_key(&self) -> String {
        if !self.api_key.is_empty() {
            return self.api_key.clone();
        }
        ["TERN_API_KEY", "OPENAI_API_KEY"]
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
            .unwrap_or_default()
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tern")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from file, or defaults when none exists
pub fn load() -> Result<Config> {
    let path = config_path();

    if !path.exists() {
        tracing::debug!("No config at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save(config: &Config) -> Result<()> {
    let path = config_path();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    Ok(())
}

/// Write a default config unless one already exists. Returns the path.
pub fn init() -> Result<PathBuf> {
    let path = config_path();
    if !path.exists() {
        save(&Config::default())?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.max_iterations, 50);
        assert!(config.reasoning.is_none());
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"model": "deepseek-chat", "reasoning": "high"}"#).unwrap();
        assert_eq!(config.model, "deepseek-chat");
        assert_eq!(config.reasoning, Some(ReasoningLevel::High));
        assert_eq!(config.shell_timeout_secs, 120);
        assert!(config.context_limit.is_none());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.state_file, config.state_file);
    }

    #[test]
    fn test_explicit_api_key_wins() {
        let config = Config {
            api_key: "sk-file".to_string(),
            ..Config::default()
        };
        assert_eq!(config.resolved_api_key(), "sk-file");
    }
}
