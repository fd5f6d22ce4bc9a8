//! Tools module - agent capabilities
//!
//! The dispatcher validates a model-issued tool call, parses it into a typed
//! [`ToolRequest`] and routes it to one of the collaborators below. The
//! collaborators are plain I/O wrappers; swapping them (for tests or for a
//! sandboxed runtime) does not touch the dispatcher.

mod dispatcher;
mod edit;
mod filesystem;
mod request;
mod shell;
mod todo;

pub use dispatcher::{suggest_tool, Progress, ToolDispatcher, ToolOutcome};
#[cfg(test)]
pub(crate) use dispatcher::testing;
pub use filesystem::LocalFileSystem;
pub use request::{EditFileArgs, ReadFileArgs, ShellArgs, TodoArgs, ToolRequest, WriteFileArgs};
pub use shell::LocalShell;
pub use todo::{TodoItem, TodoList, TodoStatus};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// Shell execution tool name
pub const SHELL: &str = "shell";
/// File read tool name
pub const READ_FILE: &str = "read_file";
/// File write tool name
pub const WRITE_FILE: &str = "write_file";
/// String-replace edit tool name
pub const EDIT_FILE: &str = "edit_file";
/// Todo list tool name
pub const TODO: &str = "todo";

/// Every tool the model may call.
pub const TOOL_NAMES: [&str; 5] = [SHELL, READ_FILE, WRITE_FILE, EDIT_FILE, TODO];

/// Tool definition for LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Runs shell commands on behalf of the agent.
#[async_trait]
pub trait ShellExecutor: Send + Sync {
    /// Run a command, returning its combined output. Non-zero exit is an error.
    async fn run(&self, command: &str) -> Result<String>;
}

/// File access on behalf of the agent.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read(&self, path: &str) -> Result<String>;

    async fn write(&self, path: &str, content: &str) -> Result<String>;

    /// Replace exactly one occurrence of `old_text`. Zero or several matches
    /// are errors.
    async fn replace(&self, path: &str, old_text: &str, new_text: &str) -> Result<String>;

    async fn exists(&self, path: &str) -> bool;
}
