//! Bash tool: run a shell command in the agent's working directory.
//!
//! The working directory is injected at construction and never read from
//! the process. A `cd` inside the command only affects that one shell.

use std::path::{Path, PathBuf};
use std::time::Duration;

use quill_core::tool::ToolResult;
use tokio::process::Command;
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct BashTool {
    cwd: PathBuf,
    timeout: Duration,
}

impl BashTool {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn current_directory(&self) -> &Path {
        &self.cwd
    }

    pub async fn execute(&self, command: &str) -> ToolResult {
        debug!(command = %command, cwd = %self.cwd.display(), "Executing shell command");

        let child = Command::new("sh")
            .args(["-c", command])
            .current_dir(&self.cwd)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolResult::fail(format!("Command failed: {e}")),
            Err(_) => {
                warn!(command = %command, "Command timed out");
                return ToolResult::fail(format!(
                    "Command timed out after {} seconds",
                    self.timeout.as_secs()
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            let detail = if stderr.is_empty() { stdout } else { stderr };
            return ToolResult::fail(format!("Command failed (exit code {code}): {detail}"));
        }

        let text = match (stdout.is_empty(), stderr.is_empty()) {
            (true, true) => "Command executed successfully (no output)".to_string(),
            (false, true) => stdout,
            (_, false) => format!("{stdout}\nSTDERR: {stderr}"),
        };
        ToolResult::ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn execute_echo() {
        let dir = tempfile::tempdir().unwrap();
        let result = BashTool::new(dir.path()).execute("echo output").await;
        assert!(result.is_success());
        assert_eq!(result.output(), Some("output"));
    }

    #[tokio::test]
    async fn stderr_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let result = BashTool::new(dir.path())
            .execute("echo output; echo warning >&2")
            .await;
        assert_eq!(result.output(), Some("output\nSTDERR: warning"));
    }

    #[tokio::test]
    async fn silent_command_reports_success() {
        let dir = tempfile::tempdir().unwrap();
        let result = BashTool::new(dir.path()).execute("true").await;
        assert_eq!(result.output(), Some("Command executed successfully (no output)"));
    }

    #[tokio::test]
    async fn non_zero_exit_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = BashTool::new(dir.path()).execute("echo nope >&2; exit 3").await;
        assert!(!result.is_success());
        assert_eq!(result.error(), Some("Command failed (exit code 3): nope"));
    }

    #[tokio::test]
    async fn runs_in_injected_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let result = BashTool::new(dir.path()).execute("ls").await;
        assert!(result.output().unwrap().contains("marker.txt"));
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let tool = BashTool::new(dir.path()).with_timeout(Duration::from_millis(100));
        let result = tool.execute("sleep 5").await;
        assert!(!result.is_success());
        assert!(result.error().unwrap().starts_with("Command timed out after"));
    }
}
