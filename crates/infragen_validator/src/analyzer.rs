//! Static analysis orchestration.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use infragen_core::{ConfigFile, Diagnostic, FileType};

use crate::error::{ValidatorError, ValidatorResult};
use crate::parser::parse;
use crate::rules::RuleSet;

/// Directory under the workspace that receives the report.
pub const REPORT_DIR: &str = "static_validator";

/// Report file name inside [`REPORT_DIR`].
pub const REPORT_FILE: &str = "analysis_results.txt";

/// Outcome of one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisResult {
    /// False iff at least one hard error was produced.
    pub passed: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl AnalysisResult {
    pub fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            passed: !diagnostics.iter().any(Diagnostic::is_error),
            diagnostics,
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn advisories(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_error())
    }

    pub fn for_file<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.diagnostics.iter().filter(move |d| d.file == name)
    }
}

/// A validation engine over a job's generated files.
pub trait FileValidator: Send + Sync {
    fn name(&self) -> &str;

    /// Validate `files`, using `workdir` for report output. `workdir` must
    /// already exist.
    fn analyze(&self, files: &[ConfigFile], workdir: &Path) -> ValidatorResult<AnalysisResult>;
}

/// Parses Terraform files and applies a [`RuleSet`].
pub struct StaticAnalyzer {
    rules: RuleSet,
}

impl Default for StaticAnalyzer {
    fn default() -> Self {
        Self::new(RuleSet::standard())
    }
}

impl StaticAnalyzer {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    /// Path of the report for a given workspace directory.
    pub fn report_path(workdir: &Path) -> PathBuf {
        workdir.join(REPORT_DIR).join(REPORT_FILE)
    }

    fn applies_to(file: &ConfigFile) -> bool {
        file.file_type == FileType::Terraform && file.name.ends_with(".tf")
    }

    /// Diagnostics for a single file; parse failures stop its rule checks.
    pub fn check_file(&self, name: &str, content: &str) -> Vec<Diagnostic> {
        match parse(content) {
            Ok(body) => self.rules.evaluate(name, &body),
            Err(err) => vec![Diagnostic::error(name, err.message, err.pos.line, err.pos.column)],
        }
    }

    fn write_report(&self, workdir: &Path, result: &AnalysisResult) -> std::io::Result<()> {
        let path = Self::report_path(workdir);
        if result.diagnostics.is_empty() {
            if path.exists() {
                fs::remove_file(&path)?;
            }
            return Ok(());
        }

        let mut report = String::new();
        for diag in &result.diagnostics {
            let _ = writeln!(report, "{diag}");
        }
        let report_dir = workdir.join(REPORT_DIR);
        if !report_dir.is_dir() {
            fs::create_dir(&report_dir)?;
        }
        fs::write(&path, report)
    }
}

impl FileValidator for StaticAnalyzer {
    fn name(&self) -> &str {
        "static"
    }

    fn analyze(&self, files: &[ConfigFile], workdir: &Path) -> ValidatorResult<AnalysisResult> {
        let mut diagnostics = Vec::new();
        for file in files.iter().filter(|f| Self::applies_to(f)) {
            let found = self.check_file(&file.name, &file.content);
            debug!(file = %file.name, count = found.len(), "Analyzed file");
            diagnostics.extend(found);
        }

        let result = AnalysisResult::from_diagnostics(diagnostics);
        info!(
            passed = result.passed,
            errors = result.errors().count(),
            advisories = result.advisories().count(),
            "Static analysis complete"
        );

        // Only the workspace mirror creates job directories.
        if !workdir.is_dir() {
            return Err(ValidatorError::WorkdirMissing {
                path: workdir.to_path_buf(),
                partial: result,
            });
        }

        self.write_report(workdir, &result)
            .map_err(|source| ValidatorError::Report {
                path: Self::report_path(workdir),
                source,
                partial: result.clone(),
            })?;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_non_terraform_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            ConfigFile::new("job", "deploy.yaml", "resource \"x\" {"),
            ConfigFile::new("job", "notes.txt", "{{{"),
        ];
        let result = StaticAnalyzer::default().analyze(&files, dir.path()).unwrap();
        assert!(result.passed);
        assert!(result.diagnostics.is_empty());
        assert!(!StaticAnalyzer::report_path(dir.path()).exists());
    }

    #[test]
    fn test_parse_error_skips_rules_for_that_file_only() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            ConfigFile::new("job", "broken.tf", "resource \"a\" \"b\" {\n"),
            ConfigFile::new("job", "ok.tf", "resource \"a\" \"c\" {\n  tags = {}\n}\n"),
        ];
        let result = StaticAnalyzer::default().analyze(&files, dir.path()).unwrap();

        assert!(!result.passed);
        assert_eq!(result.for_file("broken.tf").count(), 1);
        assert_eq!(result.for_file("ok.tf").count(), 1);
    }

    #[test]
    fn test_stale_report_removed_when_clean() {
        let dir = TempDir::new().unwrap();
        let analyzer = StaticAnalyzer::default();

        let dirty = vec![ConfigFile::new("job", "main.tf", "resource \"a\" \"b\" {}\n")];
        analyzer.analyze(&dirty, dir.path()).unwrap();
        assert!(StaticAnalyzer::report_path(dir.path()).exists());

        let clean = vec![ConfigFile::new("job", "main.tf", "locals {\n  a = 1\n}\n")];
        analyzer.analyze(&clean, dir.path()).unwrap();
        assert!(!StaticAnalyzer::report_path(dir.path()).exists());
    }

    #[test]
    fn test_report_failure_carries_partial_result() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(REPORT_DIR), "").unwrap();

        let files = vec![ConfigFile::new("job", "main.tf", "resource \"a\" \"b\" {}\n")];
        let err = StaticAnalyzer::default().analyze(&files, dir.path()).unwrap_err();
        assert!(matches!(err, ValidatorError::Report { .. }));
        assert_eq!(err.partial_result().diagnostics.len(), 2);
    }

    #[test]
    fn test_workdir_that_is_a_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();

        let files = vec![ConfigFile::new("job", "main.tf", "resource \"a\" \"b\" {}\n")];
        let err = StaticAnalyzer::default().analyze(&files, &blocker).unwrap_err();
        assert!(matches!(err, ValidatorError::WorkdirMissing { .. }));
        assert_eq!(err.partial_result().diagnostics.len(), 2);
    }
}
