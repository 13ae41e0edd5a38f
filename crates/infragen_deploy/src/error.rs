//! Error types for the deploy module.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Result type alias for deploy operations.
pub type DeployResult<T> = Result<T, DeployError>;

/// Errors that can occur while deploying a job's workspace.
///
/// Every variant raised after the log file was opened carries its path so
/// callers can surface the partial log.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Workspace directory not found: {0:?}")]
    WorkspaceMissing(PathBuf),

    #[error("Deploy canceled during {phase} phase")]
    Canceled { phase: String, log_path: PathBuf },

    #[error("{phase} phase timed out after {after:?}")]
    TimedOut {
        phase: String,
        after: Duration,
        log_path: PathBuf,
    },

    #[error("{phase} phase failed with exit code {}", exit_code_text(.exit_code))]
    ToolFailed {
        phase: String,
        exit_code: Option<i32>,
        log_path: PathBuf,
    },

    #[error("Failed to start {phase} phase: {source}")]
    Spawn {
        phase: String,
        #[source]
        source: std::io::Error,
        log_path: PathBuf,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_code_text(code: &Option<i32>) -> String {
    code.map_or_else(|| "none (killed by signal)".to_string(), |c| c.to_string())
}

impl DeployError {
    /// Canceled by the caller or stopped by a phase bound, as opposed to the
    /// tool itself reporting failure.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Canceled { .. } | Self::TimedOut { .. })
    }

    /// The partial log, if one was created.
    pub fn log_path(&self) -> Option<&Path> {
        match self {
            Self::Canceled { log_path, .. }
            | Self::TimedOut { log_path, .. }
            | Self::ToolFailed { log_path, .. }
            | Self::Spawn { log_path, .. } => Some(log_path),
            Self::WorkspaceMissing(_) | Self::Io(_) => None,
        }
    }

    /// The phase that failed, if any was running.
    pub fn phase(&self) -> Option<&str> {
        match self {
            Self::Canceled { phase, .. }
            | Self::TimedOut { phase, .. }
            | Self::ToolFailed { phase, .. }
            | Self::Spawn { phase, .. } => Some(phase),
            Self::WorkspaceMissing(_) | Self::Io(_) => None,
        }
    }
}
