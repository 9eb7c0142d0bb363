use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a failed filesystem operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileErrorKind {
    NotFound,
    IsDirectory,
    PermissionDenied,
    Other,
}

impl FileErrorKind {
    /// Classify an I/O error raised while touching `path`.
    ///
    /// Directory detection goes through the filesystem because the
    /// `EISDIR` kind is not reported uniformly across platforms.
    pub fn classify(err: &io::Error, path: &Path) -> Self {
        if path.is_dir() {
            return FileErrorKind::IsDirectory;
        }
        match err.kind() {
            io::ErrorKind::NotFound => FileErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => FileErrorKind::PermissionDenied,
            _ => FileErrorKind::Other,
        }
    }

    /// Marker placed inside a `<file>` block when reading fails
    pub fn reply_marker(&self, message: &str) -> String {
        match self {
            FileErrorKind::NotFound => "[Error: File not found]".to_string(),
            FileErrorKind::IsDirectory => "[Error: Cannot read directory as a file]".to_string(),
            FileErrorKind::PermissionDenied => "[Error: Permission denied]".to_string(),
            FileErrorKind::Other => format!("[Error: {}]", message),
        }
    }

    /// Reply sent back when writing fails. A missing file on write means a
    /// missing parent directory.
    pub fn write_reply(&self, message: &str) -> String {
        match self {
            FileErrorKind::NotFound => "Error: Directory does not exist.".to_string(),
            FileErrorKind::IsDirectory => {
                "Error: Cannot write to a directory. Please specify a file path.".to_string()
            }
            FileErrorKind::PermissionDenied => {
                "Error: Permission denied to write to the file.".to_string()
            }
            FileErrorKind::Other => format!("Error: {}", message),
        }
    }
}

impl std::fmt::Display for FileErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileErrorKind::NotFound => write!(f, "not found"),
            FileErrorKind::IsDirectory => write!(f, "is a directory"),
            FileErrorKind::PermissionDenied => write!(f, "permission denied"),
            FileErrorKind::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limit exceeded ({status}). Please try again later.")]
    RateLimit { status: u16 },

    #[error("Empty response from {0}")]
    EmptyResponse(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("File operation failed on {path} ({kind}): {message}")]
    FileOperation {
        kind: FileErrorKind,
        path: String,
        message: String,
    },

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Operator input failed: {0}")]
    Operator(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl AgentError {
    /// Build a file operation error from an I/O failure on `path`
    pub fn file_operation(err: &io::Error, path: &Path) -> Self {
        AgentError::FileOperation {
            kind: FileErrorKind::classify(err, path),
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Check if this error can be retried by re-running the session
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::Transport(_) | AgentError::RateLimit { .. })
    }

    /// Get a suggestion for recovering from this error
    pub fn recovery_suggestion(&self) -> &str {
        match self {
            AgentError::Transport(_) => "Check network connectivity and resume the session",
            AgentError::Api { .. } => "Inspect the provider error in the log file",
            AgentError::RateLimit { .. } => "Wait a moment, then resume the session",
            AgentError::EmptyResponse(_) => "Resume the session to retry the turn",
            AgentError::MalformedResponse(_) => "Inspect the raw response in the log file",
            AgentError::SchemaValidation(_) => "Fix the response schema file",
            AgentError::UnknownProvider(_) => "Choose one of the available providers",
            AgentError::FileOperation { .. } => "Check the path and its permissions",
            AgentError::UnknownAction(_) => "The model will be asked to pick a valid action",
            AgentError::Config(_) => "Review your environment configuration",
            AgentError::Operator(_) => "Make sure the terminal input is still attached",
            AgentError::Io(_) => "Check the filesystem and try again",
        }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AgentError::Transport(format!("request timed out: {}", err))
        } else {
            AgentError::Transport(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
