pub mod local;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::error::Result;

pub use local::LocalExecutor;

/// Exit status shells use for a command that could not be found
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;

/// Result of executing a command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub execution_time_ms: u64,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn is_command_not_found(&self) -> bool {
        self.exit_code == EXIT_COMMAND_NOT_FOUND
    }

    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Runs shell commands on behalf of the agent
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute a command to completion and return the result
    async fn execute(&self, command: &str) -> Result<CommandResult>;
}
