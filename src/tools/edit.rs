//! Edit helper - exact single-occurrence string replacement

use crate::error::Error;
use crate::Result;

use super::EDIT_FILE;

/// Replace the single occurrence of `target` in `content`.
///
/// Fails when `target` is empty, absent, or appears more than once.
pub fn replace_once(content: &str, target: &str, replacement: &str) -> Result<String> {
    let fail = |message: String| Error::ToolExecution {
        tool: EDIT_FILE.to_string(),
        message,
    };

    if target.is_empty() {
        return Err(fail("Target text must not be empty".to_string()));
    }

    match content.matches(target).count() {
        0 => Err(fail(format!(
            "Target text not found in file. Make sure it matches exactly (including whitespace).\nTarget: '{}'",
            target
        ))),
        1 => Ok(content.replacen(target, replacement, 1)),
        n => Err(fail(format!(
            "Target text appears {} times; include more surrounding context so it matches exactly once",
            n
        ))),
    }
}
