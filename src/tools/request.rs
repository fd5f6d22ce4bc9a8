//! Typed tool requests.
//!
//! Each tool gets its own argument struct. Alternate parameter names that
//! models commonly produce are accepted through `serde` aliases.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::Error;
use crate::Result;

use super::todo::TodoStatus;
use super::{EDIT_FILE, READ_FILE, SHELL, TODO, WRITE_FILE};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShellArgs {
    #[serde(alias = "cmd", deserialize_with = "command_text")]
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReadFileArgs {
    #[serde(alias = "file_path", alias = "filename", alias = "file")]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WriteFileArgs {
    #[serde(alias = "file_path", alias = "filename", alias = "file")]
    pub path: String,
    #[serde(alias = "contents", alias = "text")]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EditFileArgs {
    #[serde(alias = "file_path", alias = "filename", alias = "file")]
    pub path: String,
    #[serde(alias = "old_string", alias = "old", alias = "search")]
    pub old_text: String,
    #[serde(alias = "new_string", alias = "new", alias = "replacement")]
    pub new_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TodoArgs {
    Add {
        #[serde(alias = "title", alias = "task")]
        content: String,
    },
    #[serde(alias = "update_status")]
    Update {
        #[serde(alias = "index", alias = "task_id")]
        id: usize,
        #[serde(alias = "state")]
        status: TodoStatus,
    },
    #[serde(alias = "read")]
    List,
}

/// A validated tool request, one variant per supported tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRequest {
    Shell(ShellArgs),
    ReadFile(ReadFileArgs),
    WriteFile(WriteFileArgs),
    EditFile(EditFileArgs),
    Todo(TodoArgs),
}

impl ToolRequest {
    /// Parse raw JSON arguments for a whitelisted tool name.
    ///
    /// Callers validate the name first; an unknown name here is a bug and
    /// reported as an argument error.
    pub fn parse(name: &str, arguments: &str) -> Result<Self> {
        let value = parse_arguments(name, arguments)?;
        match name {
            SHELL => typed(name, value).map(ToolRequest::Shell),
            READ_FILE => typed(name, value).map(ToolRequest::ReadFile),
            WRITE_FILE => typed(name, value).map(ToolRequest::WriteFile),
            EDIT_FILE => typed(name, value).map(ToolRequest::EditFile),
            TODO => typed(name, value).map(ToolRequest::Todo),
            other => Err(Error::ToolArgument {
                tool: other.to_string(),
                message: "no argument schema for this tool".to_string(),
            }),
        }
    }

    pub fn tool_name(&self) -> &'static str {
        match self {
            ToolRequest::Shell(_) => SHELL,
            ToolRequest::ReadFile(_) => READ_FILE,
            ToolRequest::WriteFile(_) => WRITE_FILE,
            ToolRequest::EditFile(_) => EDIT_FILE,
            ToolRequest::Todo(_) => TODO,
        }
    }

    /// The file path or command this request acts on.
    pub fn target(&self) -> Option<&str> {
        match self {
            ToolRequest::Shell(a) => Some(&a.command),
            ToolRequest::ReadFile(a) => Some(&a.path),
            ToolRequest::WriteFile(a) => Some(&a.path),
            ToolRequest::EditFile(a) => Some(&a.path),
            ToolRequest::Todo(_) => None,
        }
    }
}

fn parse_arguments(tool: &str, arguments: &str) -> Result<Value> {
    let trimmed = arguments.trim();
    if trimmed.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    let value: Value = serde_json::from_str(trimmed).map_err(|e| Error::ToolArgument {
        tool: tool.to_string(),
        message: format!("arguments are not valid JSON: {e}"),
    })?;

    // Some models double-encode the arguments object as a JSON string.
    match value {
        Value::String(inner) => parse_arguments(tool, &inner),
        Value::Object(_) => Ok(value),
        other => Err(Error::ToolArgument {
            tool: tool.to_string(),
            message: format!("expected a JSON object, got {other}"),
        }),
    }
}

fn typed<T: DeserializeOwned>(tool: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::ToolArgument {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// Accept a command either as a string or as an argv array.
///
/// `["bash", "-lc", "ls -la"]` becomes `ls -la`; any other array is joined
/// with spaces.
fn command_text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Command {
        Text(String),
        Argv(Vec<String>),
    }

    match Command::deserialize(deserializer)? {
        Command::Text(text) => Ok(text),
        Command::Argv(argv) => Ok(argv_to_command(&argv)),
    }
}

/// Collapse a shell argv into a command line.
pub(crate) fn argv_to_command(argv: &[String]) -> String {
    const SHELLS: [&str; 4] = ["bash", "sh", "zsh", "/bin/bash"];
    match argv {
        [shell, flag, script, ..]
            if SHELLS.contains(&shell.as_str()) && flag.starts_with('-') && flag.ends_with('c') =>
        {
            script.clone()
        }
        _ => argv.join(" "),
    }
}
