//! Generated config files and the diagnostics attached to them.

use serde::{Deserialize, Serialize};

use crate::job::JobId;

/// File type, derived from the file name's extension.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Terraform,
    Kubernetes,
    Ansible,
    Unknown,
}

impl FileType {
    /// Detect the file type from a file name.
    ///
    /// YAML is ambiguous between Kubernetes manifests and Ansible playbooks;
    /// it is reported as Kubernetes.
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.ends_with(".tf") {
            Self::Terraform
        } else if lower.ends_with(".yaml") || lower.ends_with(".yml") {
            Self::Kubernetes
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Terraform => "terraform",
            Self::Kubernetes => "kubernetes",
            Self::Ansible => "ansible",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Fails the validation run.
    Error,
    /// Informational; never fails a run.
    Advisory,
}

/// A structured validation finding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: String,
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn error(file: impl Into<String>, message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            message: message.into(),
            line,
            column,
            severity: Severity::Error,
        }
    }

    pub fn advisory(file: impl Into<String>, message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            message: message.into(),
            line,
            column,
            severity: Severity::Advisory,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "File: {}, Line: {}, Column: {}, Message: {}",
            self.file, self.line, self.column, self.message
        )
    }
}

/// A generated file owned by a job.
///
/// `has_error` is true exactly when `error` is present; use
/// [`ConfigFile::set_error`] and [`ConfigFile::clear_error`] to keep the two
/// in step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigFile {
    pub job_id: JobId,
    pub name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub has_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Diagnostic>,
}

impl ConfigFile {
    /// Create a file with its type derived from `name`.
    pub fn new(job_id: impl Into<JobId>, name: impl Into<String>, content: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            job_id: job_id.into(),
            file_type: FileType::from_name(&name),
            name,
            content: content.into(),
            has_error: false,
            error: None,
        }
    }

    pub fn set_error(&mut self, diagnostic: Diagnostic) {
        self.has_error = true;
        self.error = Some(diagnostic);
    }

    pub fn clear_error(&mut self) {
        self.has_error = false;
        self.error = None;
    }
}

/// Attach diagnostics to the files they name.
///
/// Each file keeps at most one diagnostic: when several name the same file
/// the last one wins. Files with no diagnostic are cleared.
pub fn annotate_files(files: &mut [ConfigFile], diagnostics: &[Diagnostic]) {
    for file in files.iter_mut() {
        file.clear_error();
        if let Some(diag) = diagnostics.iter().rev().find(|d| d.file == file.name) {
            file.set_error(diag.clone());
        }
    }
}
