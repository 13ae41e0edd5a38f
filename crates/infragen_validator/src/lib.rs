//! # infragen_validator
//!
//! Static validation of generated Terraform.
//!
//! Files are tokenized and parsed into a structural document (blocks,
//! attributes and a coarse expression tree), then checked by a
//! [`RuleSet`]. Parse failures are hard errors; rule findings are
//! advisories and never fail a run.
//!
//! # Example
//!
//! ```rust
//! use infragen_core::ConfigFile;
//! use infragen_validator::{FileValidator, StaticAnalyzer};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let files = vec![ConfigFile::new("job-1", "main.tf", "resource \"aws_s3_bucket\" \"logs\" {\n")];
//! let result = StaticAnalyzer::default().analyze(&files, dir.path()).unwrap();
//! assert!(!result.passed);
//! ```

pub mod analyzer;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod rules;

pub use analyzer::{AnalysisResult, FileValidator, StaticAnalyzer, REPORT_DIR, REPORT_FILE};
pub use error::{ParseError, ValidatorError, ValidatorResult};
pub use lexer::Pos;
pub use parser::{parse, Body};
pub use rules::{HardcodedSecretRule, ProviderVersionRule, ResourceHygieneRule, Rule, RuleSet, SENSITIVE_KEYWORDS};
