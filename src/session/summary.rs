//! Compact summary derivation.

use std::collections::HashSet;
use std::fmt::Write;

use crate::agent::tokens::UsageTotals;

use super::{SessionScope, TaskAction};

/// Hard upper bound on a compact summary, in characters.
pub const MAX_SUMMARY_CHARS: usize = 5_000;

/// Appended when a summary had to be clipped.
pub const TRUNCATION_MARKER: &str = "\n[... summary truncated ...]";

const MAX_COMPLETED_TASKS: usize = 15;
const MAX_RECENT_CHANGES: usize = 10;
const MAX_FILES_TOUCHED: usize = 20;
const MAX_LINE_CHARS: usize = 200;

/// Build the compact summary for a session.
///
/// Sections: completed todo titles, the most recent file-modifying actions,
/// touched file paths, and cost/efficiency metrics. Each list is bounded and
/// the whole text is clipped to [`MAX_SUMMARY_CHARS`].
pub fn build_compact_summary(
    session_id: &str,
    scope: &SessionScope,
    usage: &UsageTotals,
    iterations: usize,
) -> String {
    let mut out = String::with_capacity(1024);
    let _ = writeln!(out, "# Session {} summary", session_id);

    let completed: Vec<&str> = scope.todos.completed_titles().take(MAX_COMPLETED_TASKS).collect();
    if !completed.is_empty() {
        out.push_str("\n## Completed tasks\n");
        for title in completed {
            let _ = writeln!(out, "- {}", one_line(title));
        }
    }

    let actions = scope.actions();
    let changes: Vec<&TaskAction> = actions
        .iter()
        .rev()
        .filter(|a| a.kind.modifies_file() && !a.failed)
        .take(MAX_RECENT_CHANGES)
        .collect();
    if !changes.is_empty() {
        out.push_str("\n## Recent changes\n");
        for action in changes {
            let _ = writeln!(out, "- {}", one_line(&action.description));
        }
    }

    let files = touched_files(actions);
    if !files.is_empty() {
        out.push_str("\n## Files touched\n");
        for path in files {
            let _ = writeln!(out, "- {}", one_line(path));
        }
    }

    let commands = actions
        .iter()
        .filter(|a| !a.kind.touches_file())
        .count();
    out.push_str("\n## Metrics\n");
    let _ = writeln!(
        out,
        "- iterations: {}, model calls: {}, tool actions: {} ({} commands)",
        iterations,
        usage.model_calls,
        actions.len(),
        commands
    );
    let _ = writeln!(
        out,
        "- tokens: {} prompt ({:.0}% cached), {} completion",
        usage.prompt_tokens,
        usage.cache_hit_rate() * 100.0,
        usage.completion_tokens
    );
    let per_action = if actions.is_empty() {
        0
    } else {
        usage.total_tokens() / actions.len()
    };
    let _ = writeln!(out, "- cost: ${:.4}, tokens per action: {}", usage.cost, per_action);

    clip_summary(&out)
}

/// Most recently touched paths first, deduplicated and bounded.
fn touched_files(actions: &[TaskAction]) -> Vec<&str> {
    let mut seen = HashSet::new();
    actions
        .iter()
        .rev()
        .filter(|a| a.kind.touches_file() && !a.failed)
        .map(|a| a.details.as_str())
        .filter(|path| seen.insert(*path))
        .take(MAX_FILES_TOUCHED)
        .collect()
}

fn one_line(text: &str) -> String {
    let flat: String = text.lines().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= MAX_LINE_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(MAX_LINE_CHARS).collect();
        format!("{}…", cut)
    }
}

/// Clip text to [`MAX_SUMMARY_CHARS`] characters, marking the cut.
pub fn clip_summary(text: &str) -> String {
    if text.chars().count() <= MAX_SUMMARY_CHARS {
        return text.to_string();
    }
    let keep = MAX_SUMMARY_CHARS - TRUNCATION_MARKER.chars().count();
    let mut clipped: String = text.chars().take(keep).collect();
    clipped.push_str(TRUNCATION_MARKER);
    clipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ActionKind;
    use crate::tools::TodoStatus;

    #[test]
    fn test_summary_sections() {
        let mut scope = SessionScope::new();
        let id = scope.todos.add("Fix the parser");
        scope.todos.update_status(id, TodoStatus::Completed).unwrap();
        scope.todos.add("Still pending");
        scope.record(ActionKind::FileRead, "Read src/parser.rs", "src/parser.rs");
        scope.record(ActionKind::FileModified, "Edited src/parser.rs", "src/parser.rs");
        scope.record(ActionKind::CommandExecuted, "Ran cargo test", "cargo test");

        let usage = UsageTotals {
            model_calls: 3,
            prompt_tokens: 3000,
            completion_tokens: 300,
            cached_tokens: 1500,
            cost: 0.0123,
        };
        let summary = build_compact_summary("s1", &scope, &usage, 3);

        assert!(summary.contains("- Fix the parser"));
        assert!(!summary.contains("Still pending"));
        assert!(summary.contains("- Edited src/parser.rs"));
        assert!(!summary.contains("- Ran cargo test"));
        assert_eq!(summary.matches("- src/parser.rs").count(), 1);
        assert!(summary.contains("50% cached"));
        assert!(summary.contains("$0.0123"));
        assert!(summary.contains("tokens per action: 1100"));
    }

    #[test]
    fn test_failed_writes_are_not_changes() {
        let mut scope = SessionScope::new();
        scope.record_failure(ActionKind::FileCreated, "Created /etc/passwd (1 lines) (failed)", "/etc/passwd");
        scope.record(ActionKind::FileModified, "Edited src/lib.rs", "src/lib.rs");

        let summary = build_compact_summary("s2", &scope, &UsageTotals::default(), 2);
        assert!(!summary.contains("/etc/passwd"));
        assert!(summary.contains("- Edited src/lib.rs"));
        assert!(summary.contains("tool actions: 2"));
    }

    #[test]
    fn test_summary_is_bounded_for_huge_logs() {
        let mut scope = SessionScope::new();
        for i in 0..5_000 {
            let title = format!("task {} {}", i, "padding ".repeat(40));
            let id = scope.todos.add(title);
            scope.todos.update_status(id, TodoStatus::Completed).unwrap();
            let path = format!("src/{}/{}.rs", "deep/".repeat(30), i);
            scope.record(ActionKind::FileCreated, format!("Created {}", path), path);
        }

        let summary = build_compact_summary("big", &scope, &UsageTotals::default(), 500);
        assert!(summary.chars().count() <= MAX_SUMMARY_CHARS);
        assert!(summary.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_clip_respects_multibyte() {
        let text = "é".repeat(MAX_SUMMARY_CHARS + 10);
        let clipped = clip_summary(&text);
        assert_eq!(clipped.chars().count(), MAX_SUMMARY_CHARS);
    }

    #[test]
    fn test_short_text_untouched() {
        assert_eq!(clip_summary("short"), "short");
    }
}
