//! Error types for the core module.

use std::path::PathBuf;

use thiserror::Error;

use crate::job::{JobId, JobStatus};

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for workspace mirror operations.
pub type WorkspaceResult<T> = Result<T, WorkspaceError>;

/// Errors raised by the job and file stores.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job already exists: {0}")]
    AlreadyExists(JobId),

    #[error("Conflict on job {id}: expected status {expected}, found {actual}")]
    Conflict {
        id: JobId,
        expected: JobStatus,
        actual: JobStatus,
    },

    #[error("Illegal transition: {from} -> {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this error means the conditional update lost against the
    /// job's current state.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::IllegalTransition { .. })
    }
}

/// Errors raised by the workspace mirror.
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Path {0:?} exists but is not a directory")]
    NotADirectory(PathBuf),

    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("Job workspace not found: {0}")]
    NotFound(JobId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
