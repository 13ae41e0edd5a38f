//! Error types for the pipeline module.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use infragen_core::{StoreError, WorkspaceError};
use infragen_deploy::DeployError;

/// Result type alias for generation adapter calls.
pub type GenerateResult<T> = Result<T, GenerateError>;

/// Result type alias for pipeline and service operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failures reported by a generation adapter.
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("Generation adapter not configured: {0}")]
    NotConfigured(String),

    #[error("Generation request failed: {0}")]
    Request(String),

    #[error("Generation API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid generation response: {0}")]
    InvalidResponse(String),

    #[error("Generation produced no files")]
    Empty,
}

impl From<reqwest::Error> for GenerateError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.to_string())
    }
}

/// Errors raised by the job pipeline, the worker and the job service.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {id} is {actual}, expected {expected}")]
    Conflict {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Store error: {0}")]
    Store(#[source] StoreError),

    #[error("Generation failed: {0}")]
    Generate(#[from] GenerateError),

    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("Deploy failed: {0}")]
    Deploy(#[from] DeployError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Conflict {
                id,
                expected,
                actual,
            } => Self::Conflict {
                id,
                expected: expected.to_string(),
                actual: actual.to_string(),
            },
            StoreError::InvalidInput(msg) => Self::InvalidInput(msg),
            other => Self::Store(other),
        }
    }
}

impl From<toml::de::Error> for PipelineError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl PipelineError {
    /// Caller mistakes (4xx) as opposed to internal failures (5xx).
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::InvalidInput(_) | Self::NotFound(_) | Self::Conflict { .. } => true,
            Self::Store(err) => err.is_conflict(),
            Self::Deploy(DeployError::WorkspaceMissing(_)) => true,
            _ => false,
        }
    }

    /// Short machine-readable error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Store(err) if err.is_conflict() => "conflict",
            Self::Store(_) => "store",
            Self::Generate(_) => "generation",
            Self::Workspace(_) => "workspace",
            Self::Deploy(err) if err.is_interrupted() => "deploy_interrupted",
            Self::Deploy(DeployError::WorkspaceMissing(_)) => "workspace_missing",
            Self::Deploy(_) => "deploy",
            Self::Config(_) => "config",
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
            kind: self.kind().to_string(),
        }
    }
}

/// Structured error body returned at the API boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}
