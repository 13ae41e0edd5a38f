//! Error types for the validator module.

use std::path::PathBuf;

use thiserror::Error;

use crate::analyzer::AnalysisResult;
use crate::lexer::Pos;

/// Result type alias for validator engine operations.
pub type ValidatorResult<T> = Result<T, ValidatorError>;

/// A syntax error in one source file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (line {}, column {})", .pos.line, .pos.column)]
pub struct ParseError {
    pub message: String,
    pub pos: Pos,
}

impl ParseError {
    pub fn new(message: impl Into<String>, pos: Pos) -> Self {
        Self {
            message: message.into(),
            pos,
        }
    }
}

/// Engine-level failure, distinct from content diagnostics.
///
/// Carries whatever diagnostics were produced before the failure so callers
/// can still annotate files.
#[derive(Error, Debug)]
pub enum ValidatorError {
    #[error("Failed to write analysis report to {path:?}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
        partial: AnalysisResult,
    },

    #[error("Workspace directory {path:?} does not exist")]
    WorkdirMissing {
        path: PathBuf,
        partial: AnalysisResult,
    },
}

impl ValidatorError {
    /// Diagnostics obtained before the engine failed.
    pub fn partial_result(&self) -> &AnalysisResult {
        match self {
            Self::Report { partial, .. } | Self::WorkdirMissing { partial, .. } => partial,
        }
    }

    pub fn into_partial_result(self) -> AnalysisResult {
        match self {
            Self::Report { partial, .. } | Self::WorkdirMissing { partial, .. } => partial,
        }
    }
}
