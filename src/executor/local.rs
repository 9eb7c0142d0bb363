use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

use super::{CommandExecutor, CommandResult};
use crate::models::error::Result;

/// Executor for local shell commands, run from a fixed working directory
pub struct LocalExecutor {
    workdir: PathBuf,
}

impl LocalExecutor {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Get the shell and shell argument for the current platform
    fn get_shell_command() -> (&'static str, &'static str) {
        if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("/bin/sh", "-c")
        }
    }
}

#[async_trait]
impl CommandExecutor for LocalExecutor {
    async fn execute(&self, command: &str) -> Result<CommandResult> {
        let start = Instant::now();
        let (shell, shell_arg) = Self::get_shell_command();

        let output = Command::new(shell)
            .arg(shell_arg)
            .arg(command)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let execution_time_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        debug!("'{}' exited with {} after {}ms", command, exit_code, execution_time_ms);

        Ok(CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code,
            execution_time_ms,
        })
    }
}
