//! Error types for Tern

use std::time::Duration;

use thiserror::Error;

/// Result type alias for Tern operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Tern
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The model named a tool outside the whitelist.
    #[error("{}", unknown_tool_message(.name, .suggestion.as_deref(), .available))]
    ToolValidation {
        name: String,
        suggestion: Option<String>,
        available: Vec<String>,
    },

    /// A required parameter was missing or malformed.
    #[error("Invalid arguments for '{tool}': {message}")]
    ToolArgument { tool: String, message: String },

    /// The collaborator behind a tool failed.
    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// Transport failure or non-success reply from the model endpoint.
    #[error("API request failed{}: {message}", status_suffix(.status))]
    ApiRequest {
        status: Option<u16>,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Iteration limit exceeded ({max_iterations} iterations without a final answer)")]
    IterationLimitExceeded { max_iterations: usize },

    #[error("Session error: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for an `ApiRequest` error without status information.
    pub fn api(message: impl Into<String>) -> Self {
        Error::ApiRequest {
            status: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Whether this error must abort the current query.
    ///
    /// Tool failures are fed back to the model as conversation content;
    /// everything else ends the query.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::ToolValidation { .. } | Error::ToolArgument { .. } | Error::ToolExecution { .. }
        )
    }
}

fn unknown_tool_message(name: &str, suggestion: Option<&str>, available: &[String]) -> String {
    match suggestion {
        Some(guess) => format!(
            "Unknown tool '{}'. Did you mean '{}'? Available tools: {}",
            name,
            guess,
            available.join(", ")
        ),
        None => format!(
            "Unknown tool '{}'. Available tools: {}",
            name,
            available.join(", ")
        ),
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
