//! Tool dispatcher - validates and routes tool calls to collaborators

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info};

use crate::agent::ToolCall;
use crate::error::Error;
use crate::session::{ActionKind, SessionScope};
use crate::ui;
use crate::Result;

use super::request::{TodoArgs, ToolRequest};
use super::{
    FileSystem, LocalFileSystem, LocalShell, ShellExecutor, ToolDefinition, EDIT_FILE, READ_FILE,
    SHELL, TODO, TOOL_NAMES, WRITE_FILE,
};

/// Common wrong names for whitelisted tools.
const CORRECTIONS: &[(&str, &str)] = &[
    ("bash", SHELL),
    ("sh", SHELL),
    ("exec", SHELL),
    ("execute", SHELL),
    ("run", SHELL),
    ("run_command", SHELL),
    ("execute_command", SHELL),
    ("terminal", SHELL),
    ("command", SHELL),
    ("cmd", SHELL),
    ("cat", READ_FILE),
    ("read", READ_FILE),
    ("open", READ_FILE),
    ("view", READ_FILE),
    ("open_file", READ_FILE),
    ("view_file", READ_FILE),
    ("save", WRITE_FILE),
    ("write", WRITE_FILE),
    ("create", WRITE_FILE),
    ("create_file", WRITE_FILE),
    ("save_file", WRITE_FILE),
    ("replace", EDIT_FILE),
    ("edit", EDIT_FILE),
    ("str_replace", EDIT_FILE),
    ("str_replace_editor", EDIT_FILE),
    ("modify", EDIT_FILE),
    ("patch", EDIT_FILE),
    ("sed", EDIT_FILE),
    ("todos", TODO),
    ("task", TODO),
    ("tasks", TODO),
    ("todo_write", TODO),
    ("todo_list", TODO),
    ("plan", TODO),
];

/// Best guess for an unknown tool name.
///
/// Checks the correction table first (case- and separator-insensitive),
/// then whether a whitelisted name is contained in the unknown one.
pub fn suggest_tool(name: &str) -> Option<&'static str> {
    let normalized = name.trim().to_ascii_lowercase().replace(['-', ' ', '.'], "_");

    if let Some(known) = TOOL_NAMES.iter().find(|t| **t == normalized) {
        return Some(*known);
    }
    if let Some((_, target)) = CORRECTIONS.iter().find(|(alias, _)| *alias == normalized) {
        return Some(*target);
    }
    TOOL_NAMES.iter().copied().find(|t| normalized.contains(t))
}

/// Where the loop is when a tool runs, for the progress line.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub iteration: usize,
    pub tokens_used: usize,
    pub token_limit: usize,
}

/// Successful tool execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub text: String,
    /// File path or command the tool acted on.
    pub target: Option<String>,
}

/// Routes validated tool calls to the shell and file collaborators.
pub struct ToolDispatcher {
    shell: Arc<dyn ShellExecutor>,
    files: Arc<dyn FileSystem>,
}

impl ToolDispatcher {
    pub fn new(shell: Arc<dyn ShellExecutor>, files: Arc<dyn FileSystem>) -> Self {
        Self { shell, files }
    }

    /// Dispatcher backed by the local shell and filesystem.
    pub fn local(workspace: PathBuf, shell_timeout: Duration) -> Self {
        Self::new(
            Arc::new(LocalShell::new(workspace.clone(), shell_timeout)),
            Arc::new(LocalFileSystem::new(workspace)),
        )
    }

    /// Tool schema sent to the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: SHELL.to_string(),
                description: "Execute a shell command in the workspace".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "command": {"type": "string", "description": "Shell command to execute"}
                    },
                    "required": ["command"]
                }),
            },
            ToolDefinition {
                name: READ_FILE.to_string(),
                description: "Read the contents of a file".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Path to the file to read"}
                    },
                    "required": ["path"]
                }),
            },
            ToolDefinition {
                name: WRITE_FILE.to_string(),
                description: "Create or overwrite a file with the given content".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Path to the file to write"},
                        "content": {"type": "string", "description": "Full file content"}
                    },
                    "required": ["path", "content"]
                }),
            },
            ToolDefinition {
                name: EDIT_FILE.to_string(),
                description: "Replace exactly one occurrence of old_text with new_text in a file"
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Path to the file to edit"},
                        "old_text": {"type": "string", "description": "Exact text to replace; must occur once"},
                        "new_text": {"type": "string", "description": "Replacement text"}
                    },
                    "required": ["path", "old_text", "new_text"]
                }),
            },
            ToolDefinition {
                name: TODO.to_string(),
                description: "Track the task plan: add items, update their status, or list them"
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "action": {"type": "string", "enum": ["add", "update", "list"]},
                        "content": {"type": "string", "description": "Item title (add)"},
                        "id": {"type": "integer", "description": "Item id (update)"},
                        "status": {"type": "string", "enum": ["pending", "in_progress", "completed"]}
                    },
                    "required": ["action"]
                }),
            },
        ]
    }

    /// Check a tool name against the whitelist.
    pub fn validate(&self, name: &str) -> Result<()> {
        if TOOL_NAMES.contains(&name) {
            return Ok(());
        }
        Err(Error::ToolValidation {
            name: name.to_string(),
            suggestion: suggest_tool(name).map(str::to_string),
            available: TOOL_NAMES.iter().map(|t| t.to_string()).collect(),
        })
    }

    /// Validate, parse and run one tool call, recording what it did.
    pub async fn execute(
        &self,
        call: &ToolCall,
        scope: &mut SessionScope,
        progress: Progress,
    ) -> Result<ToolOutcome> {
        self.validate(&call.name)?;
        let request = ToolRequest::parse(&call.name, &call.arguments)?;
        let target = request.target().map(str::to_string);

        ui::print_progress(&progress, request.tool_name(), target.as_deref().unwrap_or(""));
        info!(
            "[{}:({}/{})] {} {}",
            progress.iteration,
            progress.tokens_used,
            progress.token_limit,
            request.tool_name(),
            target.as_deref().unwrap_or("")
        );

        let text = self.run(request, scope).await?;
        debug!("Tool {} succeeded: {} chars", call.name, text.len());
        Ok(ToolOutcome { text, target })
    }

    async fn run(&self, request: ToolRequest, scope: &mut SessionScope) -> Result<String> {
        match request {
            ToolRequest::Shell(args) => {
                scope.shell_history.push(args.command.clone());
                let result = self.shell.run(&args.command).await;
                let description = format!("Ran `{}`", args.command);
                log_action(scope, &result, ActionKind::CommandExecuted, description, args.command);
                result
            }
            ToolRequest::ReadFile(args) => {
                let result = self.files.read(&args.path).await;
                let description = match &result {
                    Ok(content) => format!("Read {} ({} lines)", args.path, content.lines().count()),
                    Err(_) => format!("Read {}", args.path),
                };
                log_action(scope, &result, ActionKind::FileRead, description, args.path);
                result
            }
            ToolRequest::WriteFile(args) => {
                let existed = self.files.exists(&args.path).await;
                let result = self.files.write(&args.path, &args.content).await;
                let (kind, verb) = if existed {
                    (ActionKind::FileModified, "Rewrote")
                } else {
                    (ActionKind::FileCreated, "Created")
                };
                let description =
                    format!("{} {} ({} lines)", verb, args.path, args.content.lines().count());
                log_action(scope, &result, kind, description, args.path);
                result
            }
            ToolRequest::EditFile(args) => {
                let result = self
                    .files
                    .replace(&args.path, &args.old_text, &args.new_text)
                    .await;
                let description = format!("Edited {}", args.path);
                log_action(scope, &result, ActionKind::FileModified, description, args.path);
                result
            }
            ToolRequest::Todo(args) => match args {
                TodoArgs::Add { content } => {
                    let id = scope.todos.add(content);
                    Ok(format!("Added todo {id}.\n{}", scope.todos.render()))
                }
                TodoArgs::Update { id, status } => {
                    scope.todos.update_status(id, status)?;
                    Ok(format!("Updated todo {id}.\n{}", scope.todos.render()))
                }
                TodoArgs::List => Ok(scope.todos.render()),
            },
        }
    }
}

/// Append to the audit log whether or not the tool succeeded.
fn log_action(
    scope: &mut SessionScope,
    result: &Result<String>,
    kind: ActionKind,
    description: String,
    details: String,
) {
    match result {
        Ok(_) => scope.record(kind, description, details),
        Err(_) => scope.record_failure(kind, format!("{} (failed)", description), details),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory collaborators for dispatcher and loop tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::tools::edit::replace_once;

    /// Shell that records commands and answers from a script.
    #[derive(Default)]
    pub struct RecordingShell {
        pub commands: Mutex<Vec<String>>,
        pub outputs: HashMap<String, String>,
    }

    impl RecordingShell {
        pub fn with_output(command: &str, output: &str) -> Self {
            let mut outputs = HashMap::new();
            outputs.insert(command.to_string(), output.to_string());
            Self {
                outputs,
                ..Self::default()
            }
        }

        pub fn commands(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ShellExecutor for RecordingShell {
        async fn run(&self, command: &str) -> Result<String> {
            self.commands.lock().unwrap().push(command.to_string());
            self.outputs
                .get(command)
                .cloned()
                .ok_or_else(|| Error::ToolExecution {
                    tool: SHELL.to_string(),
                    message: format!("sh: {command}: command not found"),
                })
        }
    }

    /// Filesystem backed by a map.
    #[derive(Default)]
    pub struct MemoryFileSystem {
        pub files: Mutex<HashMap<String, String>>,
    }

    impl MemoryFileSystem {
        pub fn with_file(path: &str, content: &str) -> Self {
            let fs = Self::default();
            fs.files
                .lock()
                .unwrap()
                .insert(path.to_string(), content.to_string());
            fs
        }
    }

    #[async_trait]
    impl FileSystem for MemoryFileSystem {
        async fn read(&self, path: &str) -> Result<String> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| Error::ToolExecution {
                    tool: READ_FILE.to_string(),
                    message: format!("Failed to read {path}: not found"),
                })
        }

        async fn write(&self, path: &str, content: &str) -> Result<String> {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_string(), content.to_string());
            Ok(format!("Successfully wrote {} bytes to {}", content.len(), path))
        }

        async fn replace(&self, path: &str, old_text: &str, new_text: &str) -> Result<String> {
            let current = self.read(path).await?;
            let updated = replace_once(&current, old_text, new_text)?;
            self.write(path, &updated).await?;
            Ok(format!("Successfully replaced 1 occurrence in {}", path))
        }

        async fn exists(&self, path: &str) -> bool {
            self.files.lock().unwrap().contains_key(path)
        }
    }
}
