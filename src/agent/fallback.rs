//! Fallback extraction of tool calls embedded in plain text.
//!
//! Some models answer with the tool call written out as JSON instead of in
//! the structured field. Two shapes are salvaged:
//!
//! - `{"tool_calls": [{"id": .., "function": {"name": .., "arguments": ..}}]}`
//!   (entries may also be flat `{"name": .., "arguments": ..}`)
//! - legacy `{"cmd": ["bash", "-lc", "ls"]}`, mapped to the shell tool

use serde_json::Value;
use tracing::debug;

use crate::tools::SHELL;

use super::message::ToolCall;

/// Extract tool calls from content, then from reasoning text.
pub fn extract_tool_calls(content: Option<&str>, reasoning: Option<&str>) -> Vec<ToolCall> {
    for text in [content, reasoning].into_iter().flatten() {
        let calls = extract_from_text(text);
        if !calls.is_empty() {
            debug!("Salvaged {} tool calls from plain text", calls.len());
            return calls;
        }
    }
    Vec::new()
}

fn extract_from_text(text: &str) -> Vec<ToolCall> {
    let mut counter = 0;

    for (start, _) in text.match_indices('{') {
        let Some(fragment) = balanced_object(&text[start..]) else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<Value>(fragment) else {
            continue;
        };

        if let Some(entries) = value.get("tool_calls").and_then(Value::as_array) {
            let calls: Vec<ToolCall> = entries
                .iter()
                .filter_map(|entry| entry_to_call(entry, &mut counter))
                .collect();
            if !calls.is_empty() {
                return calls;
            }
        }

        if let Some(argv) = value.get("cmd").and_then(Value::as_array) {
            let argv: Vec<String> = argv
                .iter()
                .filter_map(|a| a.as_str().map(str::to_string))
                .collect();
            if !argv.is_empty() {
                let arguments = serde_json::json!({ "cmd": argv }).to_string();
                return vec![ToolCall::new(next_id(&mut counter), SHELL, arguments)];
            }
        }
    }
    Vec::new()
}

fn entry_to_call(entry: &Value, counter: &mut usize) -> Option<ToolCall> {
    let function = entry.get("function").unwrap_or(entry);
    let name = function.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }

    let arguments = match function.get("arguments") {
        Some(Value::String(raw)) => raw.clone(),
        Some(Value::Null) | None => "{}".to_string(),
        Some(other) => other.to_string(),
    };
    let id = entry
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| next_id(counter));

    Some(ToolCall::new(id, name, arguments))
}

fn next_id(counter: &mut usize) -> String {
    *counter += 1;
    format!("fallback_{}", counter)
}

/// The JSON object starting at `text[0]`, matched by brace depth.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRequest;

    #[test]
    fn test_openai_shaped_fragment() {
        let text = r#"I'll list the files.
{"tool_calls": [{"id": "call_9", "type": "function", "function": {"name": "shell", "arguments": "{\"command\": \"ls\"}"}}]}"#;
        let calls = extract_tool_calls(Some(text), None);
        assert_eq!(calls, vec![ToolCall::new("call_9", "shell", r#"{"command": "ls"}"#)]);
    }

    #[test]
    fn test_flat_entries_with_object_arguments() {
        let text = r#"{"tool_calls": [
            {"name": "read_file", "arguments": {"path": "a.rs"}},
            {"name": "read_file", "arguments": {"path": "b.rs"}}
        ]}"#;
        let calls = extract_tool_calls(Some(text), None);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "fallback_1");
        assert_eq!(calls[1].id, "fallback_2");
        let req = ToolRequest::parse(&calls[1].name, &calls[1].arguments).unwrap();
        assert_eq!(req.target(), Some("b.rs"));
    }

    #[test]
    fn test_legacy_cmd_array() {
        let calls = extract_tool_calls(None, Some(r#"plan: {"cmd": ["bash", "-lc", "cargo test"]}"#));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, SHELL);
        let req = ToolRequest::parse(SHELL, &calls[0].arguments).unwrap();
        assert_eq!(req.target(), Some("cargo test"));
    }

    #[test]
    fn test_braces_inside_strings() {
        let text = r#"{"tool_calls": [{"name": "write_file", "arguments": {"path": "x.rs", "content": "fn f() { }"}}]}"#;
        let calls = extract_tool_calls(Some(text), None);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].arguments.contains("fn f() { }"));
    }

    #[test]
    fn test_nothing_to_salvage() {
        assert!(extract_tool_calls(Some("All done. {not json}"), Some("")).is_empty());
        assert!(extract_tool_calls(None, None).is_empty());
    }
}
