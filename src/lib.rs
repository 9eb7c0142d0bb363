pub mod agent;
pub mod ai;
pub mod config;
pub mod executor;
pub mod models;

pub use config::AppConfig;
pub use models::error::{AgentError, Result};

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "ai_debugger=debug,info";

/// Initialize logging into the session log file.
///
/// Keep the returned guard alive for the whole session; dropping it flushes
/// the writer. When the log file cannot be opened, logs go to stderr.
pub fn init_logging(log_file: &Path) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    let file = match open_log_file(log_file) {
        Ok(file) => file,
        Err(e) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
            tracing::warn!(
                "Cannot use log file {} ({}), logging to stderr",
                log_file.display(),
                e
            );
            return None;
        }
    };

    let (writer, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .init();

    Some(guard)
}

/// Open `log_file` for appending, creating it and its directory as needed
fn open_log_file(log_file: &Path) -> io::Result<File> {
    if let Some(dir) = log_file.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    OpenOptions::new().create(true).append(true).open(log_file)
}
