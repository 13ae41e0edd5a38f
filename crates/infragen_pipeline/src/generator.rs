//! Generation adapter contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerateResult;
use crate::prompt::Prompt;

/// One named file produced by a generation adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub name: String,
    pub content: String,
}

impl GeneratedFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Ordered files plus the adapter's request id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub files: Vec<GeneratedFile>,
    pub request_id: String,
    /// Model or backend that served the request.
    pub model: String,
}

/// Turns a natural-language description into IaC files.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate files for `description` using the target's instruction
    /// prompt. The adapter concatenates the two.
    async fn generate(&self, description: &str, prompt: &Prompt) -> GenerateResult<Generation>;
}
