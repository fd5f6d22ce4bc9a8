//! Session scope and continuity.
//!
//! [`SessionScope`] carries the mutable state one session owns: the todo
//! list, the shell history and the task action log. It is built per session
//! and handed to the dispatcher by reference.
//!
//! [`SessionState`] is the persisted record. Only its compact summary is read
//! back at the start of the next process; full history is never replayed.

mod summary;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::tokens::UsageTotals;
use crate::agent::Message;
use crate::error::Error;
use crate::tools::TodoList;
use crate::Result;

pub use summary::{build_compact_summary, clip_summary, MAX_SUMMARY_CHARS, TRUNCATION_MARKER};

/// What kind of side effect a tool call had.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    FileCreated,
    FileModified,
    CommandExecuted,
    FileRead,
}

impl ActionKind {
    pub fn touches_file(&self) -> bool {
        !matches!(self, ActionKind::CommandExecuted)
    }

    pub fn modifies_file(&self) -> bool {
        matches!(self, ActionKind::FileCreated | ActionKind::FileModified)
    }
}

/// One entry in the append-only audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub description: String,
    /// File path or command text.
    pub details: String,
    pub timestamp: DateTime<Utc>,
    /// The tool ran but reported an error.
    #[serde(default)]
    pub failed: bool,
}

/// Per-session mutable state shared by the loop and the dispatcher.
#[derive(Debug, Default)]
pub struct SessionScope {
    pub todos: TodoList,
    pub shell_history: Vec<String>,
    actions: Vec<TaskAction>,
}

impl SessionScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything. Called at session start.
    pub fn reset(&mut self) {
        self.todos.clear();
        self.shell_history.clear();
        self.actions.clear();
    }

    pub fn record(&mut self, kind: ActionKind, description: impl Into<String>, details: impl Into<String>) {
        self.push_action(kind, description.into(), details.into(), false);
    }

    /// Log an attempt that failed. Failed attempts stay out of the change
    /// and touched-file sections of the summary.
    pub fn record_failure(
        &mut self,
        kind: ActionKind,
        description: impl Into<String>,
        details: impl Into<String>,
    ) {
        self.push_action(kind, description.into(), details.into(), true);
    }

    fn push_action(&mut self, kind: ActionKind, description: String, details: String, failed: bool) {
        self.actions.push(TaskAction {
            kind,
            description,
            details,
            timestamp: Utc::now(),
            failed,
        });
    }

    pub fn actions(&self) -> &[TaskAction] {
        &self.actions
    }

    /// Replace the log wholesale when importing a persisted state.
    pub(crate) fn restore(&mut self, actions: Vec<TaskAction>, todos: TodoList) {
        self.actions = actions;
        self.todos = todos;
    }
}

/// The full persisted record of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub previous_summary: Option<String>,
    #[serde(default)]
    pub compact_summary: Option<String>,
    #[serde(default)]
    pub task_actions: Vec<TaskAction>,
    #[serde(default)]
    pub todos: TodoList,
    #[serde(default)]
    pub usage: UsageTotals,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Unbounded summary written by older versions. Read, never written.
    #[serde(default, rename = "summary", skip_serializing)]
    pub legacy_summary: Option<String>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            previous_summary: None,
            compact_summary: None,
            task_actions: Vec::new(),
            todos: TodoList::new(),
            usage: UsageTotals::default(),
            created_at: now,
            updated_at: now,
            legacy_summary: None,
        }
    }
}

/// Serialize a session state to JSON bytes.
pub fn export_state(state: &SessionState) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(state)?)
}

/// Deserialize a full session state.
pub fn import_state(bytes: &[u8]) -> Result<SessionState> {
    serde_json::from_slice(bytes).map_err(|e| Error::Session(format!("Invalid session state: {e}")))
}

/// Read only the summary out of a persisted state.
///
/// Falls back to the legacy `summary` field, clipped to the same bound as a
/// compact summary. The message history is skipped, not deserialized.
pub fn load_summary_only(bytes: &[u8]) -> Result<Option<String>> {
    #[derive(Deserialize)]
    struct SummaryOnly {
        #[serde(default)]
        compact_summary: Option<String>,
        #[serde(default)]
        summary: Option<String>,
    }

    let parsed: SummaryOnly = serde_json::from_slice(bytes)
        .map_err(|e| Error::Session(format!("Invalid session state: {e}")))?;

    Ok(parsed
        .compact_summary
        .or(parsed.summary)
        .filter(|s| !s.trim().is_empty())
        .map(|s| clip_summary(&s)))
}

/// Session state file on disk.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write atomically: a temp file next to the target, then rename.
    pub fn save(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("Session state written to {:?} ({} bytes)", self.path, bytes.len());
        Ok(())
    }

    pub fn load(&self) -> Result<Option<Vec<u8>>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Compact summary of the last session, if any.
    pub fn load_summary(&self) -> Result<Option<String>> {
        match self.load()? {
            Some(bytes) => load_summary_only(&bytes),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scope_reset() {
        let mut scope = SessionScope::new();
        scope.todos.add("task");
        scope.shell_history.push("ls".to_string());
        scope.record(ActionKind::CommandExecuted, "Ran ls", "ls");

        scope.reset();
        assert!(scope.actions().is_empty());
        assert!(scope.shell_history.is_empty());
        assert!(scope.todos.items().is_empty());
    }

    #[test]
    fn test_action_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ActionKind::FileCreated).unwrap();
        assert_eq!(json, "\"file_created\"");
    }

    #[test]
    fn test_state_roundtrip_keeps_history() {
        let mut state = SessionState::new("abc");
        state.messages.push(Message::user("fix bug"));
        state.compact_summary = Some("did things".to_string());

        let restored = import_state(&export_state(&state).unwrap()).unwrap();
        assert_eq!(restored.session_id, "abc");
        assert_eq!(restored.messages, state.messages);
    }

    #[test]
    fn test_load_summary_only_prefers_compact() {
        let json = r#"{
            "session_id": "s",
            "messages": [{"role": "user", "content": "huge history"}],
            "compact_summary": "short",
            "summary": "legacy",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        }"#;
        assert_eq!(load_summary_only(json.as_bytes()).unwrap().as_deref(), Some("short"));
    }

    #[test]
    fn test_load_summary_only_legacy_fallback_is_clipped() {
        let legacy = "x".repeat(MAX_SUMMARY_CHARS * 2);
        let json = serde_json::json!({ "summary": legacy }).to_string();
        let summary = load_summary_only(json.as_bytes()).unwrap().unwrap();
        assert!(summary.chars().count() <= MAX_SUMMARY_CHARS);
        assert!(summary.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_legacy_summary_not_written() {
        let mut state = SessionState::new("s");
        state.legacy_summary = Some("old".to_string());
        let json = String::from_utf8(export_state(&state).unwrap()).unwrap();
        assert!(!json.contains("\"summary\""));
    }

    #[test]
    fn test_store_roundtrip_and_missing_file() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path().join("state").join("session.json"));
        assert!(store.load_summary().unwrap().is_none());

        let mut state = SessionState::new("s");
        state.compact_summary = Some("remember me".to_string());
        store.save(&export_state(&state).unwrap()).unwrap();

        assert_eq!(store.load_summary().unwrap().as_deref(), Some("remember me"));
        assert!(!store.path().with_extension("json.tmp").exists());
    }
}
