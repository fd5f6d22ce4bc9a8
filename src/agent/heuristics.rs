//! Best-effort classifiers for final-looking model text.
//!
//! These are string-pattern heuristics, not guaranteed-correct classifiers.
//! A wrong verdict costs at most one extra iteration, and the loop caps how
//! often it acts on them.

use std::sync::OnceLock;

use regex::Regex;

/// Below this length, refusal phrasing marks a response incomplete.
const REFUSAL_MAX_CHARS: usize = 200;

/// Below this length, a response without task evidence is incomplete.
const EVIDENCE_MAX_CHARS: usize = 300;

const REFUSAL_PHRASES: &[&str] = &[
    "i cannot",
    "i can't",
    "i can not",
    "unable to",
    "not possible to",
    "i'm not able to",
    "i am not able to",
];

/// Task-evidence words, matched whole so "ready" is not "read".
const EVIDENCE_PATTERN: &str = r"(?ix)\b(?:
    files? | read | wrote | written | created | modified | edited | ran | commands?
    | tests? | directory | directories | functions? | found | changed | updated | fixed
    | implemented | output | explored | checked | build | errors?
)\b";

/// What a stop-without-tool-calls response looks like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseVerdict {
    /// Accept the text as the final answer.
    Complete,
    /// Tool-call syntax leaked into plain text.
    MalformedToolCall,
    /// The model stopped early; the reason is logged.
    Incomplete(&'static str),
}

/// Classify text returned with `finish_reason == stop` and no tool calls.
pub fn classify_final(text: &str) -> ResponseVerdict {
    if looks_like_tool_call(text) {
        return ResponseVerdict::MalformedToolCall;
    }
    match incomplete_reason(text) {
        Some(reason) => ResponseVerdict::Incomplete(reason),
        None => ResponseVerdict::Complete,
    }
}

/// Whether the text contains tool-call-shaped fragments.
pub fn looks_like_tool_call(text: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(
            r#"(?x)
            "tool_calls"
            | </?tool_call>
            | "function"\s*:\s*\{
            | \{\s*"name"\s*:\s*"[^"]+"\s*,\s*"arguments"\s*:
            | \{\s*"cmd"\s*:\s*\[
            "#,
        )
        .expect("tool-call pattern is a valid regex")
    });
    pattern.is_match(text)
}

fn has_task_evidence(text: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(EVIDENCE_PATTERN)
                .expect("evidence pattern is a valid regex")
        })
        .is_match(text)
}

/// Why the text looks like a premature stop, if it does.
pub fn incomplete_reason(text: &str) -> Option<&'static str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some("empty response");
    }

    let chars = trimmed.chars().count();
    let lower = trimmed.to_lowercase();

    if chars < REFUSAL_MAX_CHARS && REFUSAL_PHRASES.iter().any(|p| lower.contains(p)) {
        return Some("short refusal");
    }
    if chars < EVIDENCE_MAX_CHARS && !has_task_evidence(trimmed) {
        return Some("short answer without evidence of tool use");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_incomplete() {
        assert_eq!(classify_final("  \n"), ResponseVerdict::Incomplete("empty response"));
    }

    #[test]
    fn test_short_refusal() {
        assert!(matches!(
            classify_final("I cannot access the repository."),
            ResponseVerdict::Incomplete("short refusal")
        ));
    }

    #[test]
    fn test_long_refusal_is_accepted() {
        let text = format!(
            "I cannot run the integration suite here, but I read the file and fixed the bug. {}",
            "Details follow. ".repeat(20)
        );
        assert_eq!(classify_final(&text), ResponseVerdict::Complete);
    }

    #[test]
    fn test_short_without_evidence() {
        assert!(matches!(classify_final("Sure!"), ResponseVerdict::Incomplete(_)));
        assert_eq!(
            classify_final("I fixed the off-by-one in the parser file."),
            ResponseVerdict::Complete
        );
    }

    #[test]
    fn test_evidence_matches_whole_words() {
        assert!(matches!(
            classify_final("Sure, I'm ready whenever you are."),
            ResponseVerdict::Incomplete(_)
        ));
        assert!(matches!(
            classify_final("Let me know the latest plan."),
            ResponseVerdict::Incomplete(_)
        ));
        assert_eq!(classify_final("Read the config and RAN the tests."), ResponseVerdict::Complete);
        assert_eq!(classify_final("Both files now compile."), ResponseVerdict::Complete);
    }

    #[test]
    fn test_patterns_compile() {
        // Forces both lazily built regexes
        assert!(!looks_like_tool_call(""));
        assert!(!has_task_evidence(""));
    }

    #[test]
    fn test_malformed_tool_call_detection() {
        assert_eq!(
            classify_final(r#"Let me run {"name": "shell", "arguments": {"command": "ls"}}"#),
            ResponseVerdict::MalformedToolCall
        );
        assert_eq!(
            classify_final("<tool_call>read_file</tool_call>"),
            ResponseVerdict::MalformedToolCall
        );
        assert!(looks_like_tool_call(r#"{"cmd": ["bash", "-lc", "ls"]}"#));
        assert!(!looks_like_tool_call("The function returns a tool handle."));
    }

    #[test]
    fn test_long_plain_answer_is_complete() {
        let text = "a".repeat(EVIDENCE_MAX_CHARS + 1);
        assert_eq!(classify_final(&text), ResponseVerdict::Complete);
    }
}
