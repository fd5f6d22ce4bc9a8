//! Context builder for agent prompts.

use std::path::PathBuf;

use crate::tools::ToolDefinition;

use super::message::Message;

/// Builds the system prompt and seeds each conversation.
pub struct Context {
    workspace: PathBuf,
    tools: Vec<ToolDefinition>,
    previous_summary: Option<String>,
}

impl Context {
    pub fn new(workspace: impl Into<PathBuf>, tools: Vec<ToolDefinition>) -> Self {
        Self {
            workspace: workspace.into(),
            tools,
            previous_summary: None,
        }
    }

    /// Compact summary of an earlier session, shown to the model.
    pub fn set_previous_summary(&mut self, summary: Option<String>) {
        self.previous_summary = summary.filter(|s| !s.trim().is_empty());
    }

    pub fn previous_summary(&self) -> Option<&str> {
        self.previous_summary.as_deref()
    }

    pub fn build_system_prompt(&self) -> String {
        let mut parts = Vec::with_capacity(4);
        parts.push(self.identity());

        let tool_lines: Vec<String> = self
            .tools
            .iter()
            .map(|t| format!("- `{}`: {}", t.name, t.description))
            .collect();
        parts.push(format!(
            "## Tools\n{}\n\nCall tools only through the structured tool-call interface. \
             Never write tool calls as JSON or XML in your reply text; such text is not executed.",
            tool_lines.join("\n")
        ));

        if let Some(summary) = &self.previous_summary {
            parts.push(format!(
                "## Previous session\nThis is a summary of earlier work in this workspace:\n\n{}",
                summary
            ));
        }

        parts.join("\n\n")
    }

    /// A new conversation: exactly one system message, then the query.
    pub fn seed(&self, query: &str) -> Vec<Message> {
        vec![Message::system(self.build_system_prompt()), Message::user(query)]
    }

    fn identity(&self) -> String {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M (%A)");
        format!(
            r#"# tern

You are tern, an autonomous coding agent working in a local repository.

## Current Time
{}

## Workspace
Your workspace is: `{}`
Use paths relative to the workspace. Explore before you change anything, verify changes
by reading files or running commands, and keep the todo list current on multi-step tasks.
When the task is done, reply with a concise report of what you changed and how you checked it."#,
            now,
            self.workspace.display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::Role;
    use serde_json::json;

    fn context() -> Context {
        let tools = vec![ToolDefinition {
            name: "shell".to_string(),
            description: "Execute a shell command".to_string(),
            parameters: json!({"type": "object"}),
        }];
        Context::new("/tmp/project", tools)
    }

    #[test]
    fn test_seed_is_system_then_user() {
        let messages = context().seed("fix bug");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "fix bug");
    }

    #[test]
    fn test_system_prompt_mentions_workspace_and_tools() {
        let prompt = context().build_system_prompt();
        assert!(prompt.contains("/tmp/project"));
        assert!(prompt.contains("`shell`"));
        assert!(prompt.contains("structured tool-call"));
        assert!(!prompt.contains("Previous session"));
    }

    #[test]
    fn test_previous_summary_included() {
        let mut ctx = context();
        ctx.set_previous_summary(Some("# Session s1 summary".to_string()));
        assert!(ctx.build_system_prompt().contains("# Session s1 summary"));

        ctx.set_previous_summary(Some("   ".to_string()));
        assert!(ctx.previous_summary().is_none());
    }
}
