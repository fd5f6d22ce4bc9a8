//! Conversation optimizer.
//!
//! Rewrites tool-result messages whose content the model has already seen.
//! Two passes:
//!
//! - **Standard** ([`ConversationOptimizer::optimize`]): a file read (or a
//!   shell command) whose output is byte-identical to an earlier, still
//!   present result is replaced by a short `[OPTIMIZED]` stub. The earliest
//!   full copy stays in place and is never stubbed.
//! - **Aggressive** ([`ConversationOptimizer::aggressive_optimize`]): large
//!   tool outputs older than the most recent few are collapsed to a
//!   `[COMPACTED]` stub regardless of redundancy, and long string arguments
//!   of calls issued before them are elided too. Used under budget pressure.
//!
//! Both passes keep message positions stable and never touch the leading
//! system message or the user query. Redundancy is exact-hash only.

use std::collections::HashMap;

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::tools::{READ_FILE, SHELL};

use super::message::Message;

/// Prefix of a redundancy stub.
pub const OPTIMIZED_MARKER: &str = "[OPTIMIZED]";

/// Prefix of an aggressive-compaction stub.
pub const COMPACTED_MARKER: &str = "[COMPACTED]";

/// Tool results the aggressive pass always leaves intact, counted from the end.
const KEEP_RECENT_RESULTS: usize = 6;

/// Tool results at or under this many characters survive the aggressive pass.
const COMPACT_MIN_CHARS: usize = 2_000;

/// Leading messages (system prompt, user query) that are never rewritten.
const PROTECTED_PREFIX: usize = 2;

/// Last full-content read of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReadRecord {
    pub path: String,
    pub content_hash: String,
    pub last_seen_index: usize,
}

/// Last full output of a shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    pub command: String,
    pub content_hash: String,
    pub last_seen_index: usize,
}

/// Which kind of repeated output a stub stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResultKind {
    FileRead,
    Command,
}

/// Stateful optimizer for one query's conversation.
#[derive(Debug, Default)]
pub struct ConversationOptimizer {
    file_reads: HashMap<String, FileReadRecord>,
    commands: HashMap<String, CommandRecord>,
}

impl ConversationOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all records. Called when a new conversation is seeded.
    pub fn reset(&mut self) {
        self.file_reads.clear();
        self.commands.clear();
    }

    pub fn file_record(&self, path: &str) -> Option<&FileReadRecord> {
        self.file_reads.get(path)
    }

    pub fn command_record(&self, command: &str) -> Option<&CommandRecord> {
        self.commands.get(command)
    }

    /// Hash and index of the recorded reference for a key.
    fn reference(&self, kind: ResultKind, key: &str) -> Option<(&str, usize)> {
        match kind {
            ResultKind::FileRead => self
                .file_reads
                .get(key)
                .map(|r| (r.content_hash.as_str(), r.last_seen_index)),
            ResultKind::Command => self
                .commands
                .get(key)
                .map(|r| (r.content_hash.as_str(), r.last_seen_index)),
        }
    }

    fn record(&mut self, kind: ResultKind, key: String, content_hash: String, last_seen_index: usize) {
        match kind {
            ResultKind::FileRead => {
                self.file_reads.insert(
                    key.clone(),
                    FileReadRecord {
                        path: key,
                        content_hash,
                        last_seen_index,
                    },
                );
            }
            ResultKind::Command => {
                self.commands.insert(
                    key.clone(),
                    CommandRecord {
                        command: key,
                        content_hash,
                        last_seen_index,
                    },
                );
            }
        }
    }

    /// Replace repeated, unchanged tool output with stubs.
    pub fn optimize(&mut self, mut messages: Vec<Message>) -> Vec<Message> {
        let mut stubbed = 0;

        for index in PROTECTED_PREFIX..messages.len() {
            let Some((kind, key)) = classify(&messages[index]) else {
                continue;
            };
            if is_stub(&messages[index].content) {
                continue;
            }

            let hash = content_hash(&messages[index].content);
            let reference = self.reference(kind, &key);

            let redundant = reference.is_some_and(|(recorded_hash, seen)| {
                recorded_hash == hash
                    && seen < index
                    && messages
                        .get(seen)
                        .is_some_and(|reference| !is_stub(&reference.content))
            });

            if redundant {
                let stub = redundancy_stub(kind, &key, &messages[index].content);
                messages[index].content = stub;
                stubbed += 1;
                continue;
            }

            // Content changed, first sighting, or the reference was compacted.
            let last_seen_index = reference.map_or(index, |(_, seen)| seen.max(index));
            self.record(kind, key, hash, last_seen_index);
        }

        if stubbed > 0 {
            debug!("Optimizer replaced {} redundant tool results", stubbed);
        }
        messages
    }

    /// Collapse large tool output outside the most recent results.
    ///
    /// Idempotent: stubs are smaller than the size threshold and the set of
    /// recent results is positional.
    pub fn aggressive_optimize(&self, mut messages: Vec<Message>) -> Vec<Message> {
        let result_positions: Vec<usize> = messages
            .iter()
            .enumerate()
            .skip(PROTECTED_PREFIX)
            .filter(|(_, m)| m.is_tool_result())
            .map(|(i, _)| i)
            .collect();

        let older = result_positions.len().saturating_sub(KEEP_RECENT_RESULTS);
        let mut compacted = 0;

        for &index in &result_positions[..older] {
            let message = &mut messages[index];
            if is_stub(&message.content) || message.content.chars().count() <= COMPACT_MIN_CHARS {
                continue;
            }
            message.content = compaction_stub(message);
            compacted += 1;
        }

        // Calls issued before the oldest kept result carry arguments the model
        // no longer needs verbatim, such as whole file bodies.
        if older > 0 {
            let cutoff = result_positions[older];
            for message in &mut messages[PROTECTED_PREFIX..cutoff] {
                for call in &mut message.tool_calls {
                    if let Some(arguments) = compact_arguments(&call.arguments) {
                        call.arguments = arguments;
                        compacted += 1;
                    }
                }
            }
        }

        if compacted > 0 {
            debug!("Aggressive pass compacted {} tool results and arguments", compacted);
        }
        messages
    }
}

/// Identify a successful file-read or shell result and its key.
fn classify(message: &Message) -> Option<(ResultKind, String)> {
    let tag = message.tool_result.as_ref()?;
    let target = tag.target.clone()?;
    match tag.name.as_str() {
        READ_FILE => Some((ResultKind::FileRead, target)),
        SHELL => Some((ResultKind::Command, target)),
        _ => None,
    }
}

fn is_stub(content: &str) -> bool {
    content.starts_with(OPTIMIZED_MARKER) || content.starts_with(COMPACTED_MARKER)
}

fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

fn redundancy_stub(kind: ResultKind, key: &str, content: &str) -> String {
    let lines = content.lines().count();
    let chars = content.chars().count();
    match kind {
        ResultKind::FileRead => format!(
            "{} {} ({} lines, {} chars) unchanged since last read; see the earlier result.",
            OPTIMIZED_MARKER, key, lines, chars
        ),
        ResultKind::Command => format!(
            "{} `{}` output ({} lines, {} chars) unchanged since last run; see the earlier result.",
            OPTIMIZED_MARKER, key, lines, chars
        ),
    }
}

fn compaction_stub(message: &Message) -> String {
    let (name, target) = message
        .tool_result
        .as_ref()
        .map(|t| (t.name.as_str(), t.target.as_deref().unwrap_or("")))
        .unwrap_or(("tool", ""));
    format!(
        "{} {} {} ({} lines, {} chars) elided to save context; rerun the tool if needed.",
        COMPACTED_MARKER,
        name,
        target,
        message.content.lines().count(),
        message.content.chars().count()
    )
}

/// Shrink long string fields of a call's JSON arguments, keeping short ones
/// such as `path` intact. Returns `None` when nothing needs shrinking.
fn compact_arguments(arguments: &str) -> Option<String> {
    if arguments.chars().count() <= COMPACT_MIN_CHARS {
        return None;
    }
    let stub = |chars: usize| format!("{} {} chars elided", COMPACTED_MARKER, chars);

    let Ok(Value::Object(mut fields)) = serde_json::from_str::<Value>(arguments) else {
        return Some(json!({ "arguments": stub(arguments.chars().count()) }).to_string());
    };
    for value in fields.values_mut() {
        if let Value::String(text) = value {
            let chars = text.chars().count();
            if chars > COMPACT_MIN_CHARS {
                *value = Value::String(stub(chars));
            }
        }
    }
    let compacted = Value::Object(fields).to_string();
    (compacted.chars().count() < arguments.chars().count()).then_some(compacted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::{ToolCall, ToolResultTag};
    use crate::tools::WRITE_FILE;

    fn read(path: &str, content: &str) -> Message {
        Message::tool_result(
            ToolResultTag::new("id", READ_FILE).with_target(Some(path.to_string())),
            content,
        )
    }

    fn shell(command: &str, output: &str) -> Message {
        Message::tool_result(
            ToolResultTag::new("id", SHELL).with_target(Some(command.to_string())),
            output,
        )
    }

    fn seed() -> Vec<Message> {
        vec![Message::system("sys"), Message::user("fix bug")]
    }

    #[test]
    fn test_second_identical_read_is_stubbed() {
        let content = "fn main() {\n    println!(\"hi\");\n}\n";
        let mut messages = seed();
        messages.push(read("src/main.rs", content));
        messages.push(Message::assistant("looking again"));
        messages.push(read("src/main.rs", content));

        let mut optimizer = ConversationOptimizer::new();
        let out = optimizer.optimize(messages);

        assert_eq!(out[2].content, content);
        assert!(out[4].content.starts_with(OPTIMIZED_MARKER));
        assert!(out[4].content.contains("src/main.rs"));
        assert!(out[4].content.contains("3 lines"));
        assert!(out[4].content.contains(&format!("{} chars", content.chars().count())));
        assert!(out[4].content.contains("unchanged since last read"));
        assert_eq!(optimizer.file_record("src/main.rs").unwrap().last_seen_index, 2);
    }

    #[test]
    fn test_changed_content_is_not_optimized() {
        let mut messages = seed();
        messages.push(read("a.rs", "version one"));
        messages.push(read("a.rs", "version two"));

        let mut optimizer = ConversationOptimizer::new();
        let out = optimizer.optimize(messages.clone());

        assert_eq!(out, messages);
        assert_eq!(optimizer.file_record("a.rs").unwrap().last_seen_index, 3);
    }

    #[test]
    fn test_optimize_is_idempotent() {
        let mut messages = seed();
        messages.push(read("a.rs", "same"));
        messages.push(shell("ls", "a.rs"));
        messages.push(read("a.rs", "same"));
        messages.push(shell("ls", "a.rs"));

        let mut optimizer = ConversationOptimizer::new();
        let once = optimizer.optimize(messages);
        let twice = optimizer.optimize(once.clone());
        assert_eq!(once, twice);

        let mut fresh = ConversationOptimizer::new();
        assert_eq!(fresh.optimize(once.clone()), once);
    }

    #[test]
    fn test_repeated_shell_output_is_stubbed() {
        let mut messages = seed();
        messages.push(shell("git status", "clean"));
        messages.push(shell("git status", "clean"));
        messages.push(shell("git status", "dirty"));

        let out = ConversationOptimizer::new().optimize(messages);
        assert_eq!(out[2].content, "clean");
        assert!(out[3].content.starts_with(OPTIMIZED_MARKER));
        assert_eq!(out[4].content, "dirty");
    }

    #[test]
    fn test_command_records_are_keyed_by_command() {
        let mut messages = seed();
        messages.push(shell("cargo test", "ok"));
        messages.push(read("cargo test", "ok"));

        let mut optimizer = ConversationOptimizer::new();
        let out = optimizer.optimize(messages.clone());

        // Same key and content, different tools: neither stands in for the other
        assert_eq!(out, messages);
        let record = optimizer.command_record("cargo test").unwrap();
        assert_eq!(record.command, "cargo test");
        assert_eq!(record.last_seen_index, 2);
        assert_eq!(optimizer.file_record("cargo test").unwrap().path, "cargo test");
    }

    #[test]
    fn test_incremental_calls_keep_reference() {
        let mut optimizer = ConversationOptimizer::new();
        let mut messages = seed();
        messages.push(read("a.rs", "body"));
        messages = optimizer.optimize(messages);

        messages.push(read("a.rs", "body"));
        messages = optimizer.optimize(messages);

        assert_eq!(messages[2].content, "body");
        assert!(messages[3].content.starts_with(OPTIMIZED_MARKER));
    }

    #[test]
    fn test_failed_results_and_other_roles_untouched() {
        let mut messages = seed();
        messages.push(Message::tool_result(ToolResultTag::new("id", READ_FILE), "Error: nope"));
        messages.push(Message::tool_result(ToolResultTag::new("id", READ_FILE), "Error: nope"));
        messages.push(Message::user("same"));
        messages.push(Message::user("same"));

        let out = ConversationOptimizer::new().optimize(messages.clone());
        assert_eq!(out, messages);
    }

    #[test]
    fn test_aggressive_collapses_old_large_results() {
        let big = "x\n".repeat(2_000);
        let mut messages = seed();
        for i in 0..10 {
            messages.push(read(&format!("f{i}.rs"), &big));
        }
        messages.push(read("small.rs", "tiny"));

        let optimizer = ConversationOptimizer::new();
        let once = optimizer.aggressive_optimize(messages.clone());

        assert_eq!(once[0], messages[0]);
        assert_eq!(once[1], messages[1]);
        assert_eq!(once.len(), messages.len());

        // 11 results, 6 most recent kept: f0..f4 compacted.
        for message in &once[2..7] {
            assert!(message.content.starts_with(COMPACTED_MARKER));
            assert!(message.content.contains("2000 lines"));
        }
        for (kept, original) in once[7..].iter().zip(&messages[7..]) {
            assert_eq!(kept, original);
        }

        assert_eq!(optimizer.aggressive_optimize(once.clone()), once);
    }

    #[test]
    fn test_aggressive_elides_old_call_arguments() {
        let body = "z".repeat(10_000);
        let write_args = json!({"path": "big.txt", "content": body}).to_string();
        let mut messages = seed();
        messages.push(Message::assistant_with_tools(
            "",
            vec![ToolCall::new("w1", WRITE_FILE, write_args.clone())],
        ));
        messages.push(Message::tool_result(
            ToolResultTag::new("w1", WRITE_FILE).with_target(Some("big.txt".to_string())),
            "Wrote big.txt",
        ));
        for i in 0..KEEP_RECENT_RESULTS {
            messages.push(shell(&format!("echo {i}"), "ok"));
        }
        messages.push(Message::assistant_with_tools(
            "",
            vec![ToolCall::new("w2", WRITE_FILE, write_args.clone())],
        ));

        let optimizer = ConversationOptimizer::new();
        let once = optimizer.aggressive_optimize(messages);

        let old: Value = serde_json::from_str(&once[2].tool_calls[0].arguments).unwrap();
        assert_eq!(old["path"], "big.txt");
        assert_eq!(old["content"], format!("{} 10000 chars elided", COMPACTED_MARKER));
        // Calls after the oldest kept result are left alone
        assert_eq!(once.last().unwrap().tool_calls[0].arguments, write_args);

        assert_eq!(optimizer.aggressive_optimize(once.clone()), once);
    }

    #[test]
    fn test_reference_compacted_then_reread_is_kept() {
        let big = "y".repeat(3_000);
        let mut optimizer = ConversationOptimizer::new();
        let mut messages = seed();
        messages.push(read("big.rs", &big));
        for i in 0..KEEP_RECENT_RESULTS {
            messages.push(shell(&format!("echo {i}"), "ok"));
        }
        messages = optimizer.optimize(messages);
        messages = optimizer.aggressive_optimize(messages);
        assert!(messages[2].content.starts_with(COMPACTED_MARKER));

        messages.push(read("big.rs", &big));
        let last = messages.len() - 1;
        messages = optimizer.optimize(messages);

        assert_eq!(messages[last].content, big);
        assert_eq!(optimizer.file_record("big.rs").unwrap().last_seen_index, last);
    }
}
