//! Message types for agent communication

use serde::{Deserialize, Serialize};

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,

    /// Secondary reasoning text returned by thinking models
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,

    /// Tool calls made by the assistant in this turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Set on user-role messages that carry a tool result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResultTag>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            reasoning_content: None,
            tool_calls: Vec::new(),
            tool_result: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create an assistant message with tool calls
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Assistant, content)
        }
    }

    /// Create a tool result message tagged with the tool that produced it
    pub fn tool_result(tag: ToolResultTag, result: impl Into<String>) -> Self {
        Self {
            tool_result: Some(tag),
            ..Self::new(Role::User, result)
        }
    }

    /// Attach reasoning text
    pub fn with_reasoning(mut self, reasoning: Option<String>) -> Self {
        self.reasoning_content = reasoning.filter(|r| !r.is_empty());
        self
    }

    /// Whether this message carries a tool result
    #[inline]
    pub fn is_tool_result(&self) -> bool {
        self.tool_result.is_some()
    }

    /// Name of the tool whose result this message carries
    pub fn tool_name(&self) -> Option<&str> {
        self.tool_result.as_ref().map(|t| t.name.as_str())
    }
}

/// Identifies which tool call a result message answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResultTag {
    pub call_id: String,
    pub name: String,

    /// Path for file tools, command text for the shell. Only set on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl ToolResultTag {
    pub fn new(call_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            target: None,
        }
    }

    pub fn with_target(mut self, target: Option<String>) -> Self {
        self.target = target;
        self
    }
}

/// A tool call request from the model
///
/// `arguments` is the raw JSON text as the model produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
        assert!(!msg.is_tool_result());
    }

    #[test]
    fn test_tool_result_tag() {
        let tag = ToolResultTag::new("call_1", "shell").with_target(Some("ls".to_string()));
        let msg = Message::tool_result(tag, "a.txt");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.tool_name(), Some("shell"));
    }

    #[test]
    fn test_empty_reasoning_dropped() {
        let msg = Message::assistant("ok").with_reasoning(Some(String::new()));
        assert!(msg.reasoning_content.is_none());
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let json = serde_json::to_string(&Message::system("sys")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"sys"}"#);
    }
}
