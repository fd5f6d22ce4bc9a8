//! Shell collaborator - execute commands in the workspace

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::Error;
use crate::Result;

use super::{ShellExecutor, SHELL};

/// Runs commands with `sh -c` inside the workspace, bounded by a timeout.
pub struct LocalShell {
    workspace: PathBuf,
    timeout: Duration,
}

impl LocalShell {
    pub fn new(workspace: PathBuf, timeout: Duration) -> Self {
        Self { workspace, timeout }
    }
}

fn failure(message: String) -> Error {
    Error::ToolExecution {
        tool: SHELL.to_string(),
        message,
    }
}

#[async_trait]
impl ShellExecutor for LocalShell {
    async fn run(&self, command: &str) -> Result<String> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workspace)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| failure(format!("Command timed out after {:?}", self.timeout)))?
            .map_err(|e| failure(format!("Failed to execute command: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            if stderr.is_empty() {
                Ok(stdout.to_string())
            } else {
                Ok(format!("{}\n\n[stderr]\n{}", stdout, stderr))
            }
        } else {
            Err(failure(format!(
                "Command failed with exit code {}\nstdout: {}\nstderr: {}",
                output.status.code().unwrap_or(-1),
                stdout,
                stderr
            )))
        }
    }
}
