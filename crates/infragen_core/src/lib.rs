//! # infragen_core
//!
//! Core data model for infragen.
//!
//! This crate holds the job lifecycle, generated config files, the store
//! contracts the pipeline coordinates through, and the filesystem
//! workspace that mirrors each job's files.
//!
//! # Architecture
//!
//! - **Job**: a generation-and-deployment request with a status graph
//! - **ConfigFile**: a generated file, annotated with at most one diagnostic
//! - **Stores**: `JobStore` (with an atomic conditional status update) and `FileStore`
//! - **Workspace**: `<base>/<job-id>/` directories used by validation and deploy
//! - **Reporter**: injected observability hooks
//!
//! # Example
//!
//! ```rust
//! use infragen_core::{Job, JobStatus, Target};
//!
//! let mut job = Job::new("an S3 bucket with versioning", Target::Terraform);
//! job.transition(JobStatus::Pending, JobStatus::Running).unwrap();
//! assert!(job.transition(JobStatus::Pending, JobStatus::Running).is_err());
//! ```

pub mod error;
pub mod file;
pub mod job;
pub mod reporter;
pub mod store;
pub mod workspace;

pub use error::{StoreError, StoreResult, WorkspaceError, WorkspaceResult};
pub use file::{annotate_files, ConfigFile, Diagnostic, FileType, Severity};
pub use job::{Job, JobId, JobStatus, Target};
pub use reporter::{CounterReporter, NoopReporter, Reporter, ValidationOutcome};
pub use store::{FileStore, JobStore, MemoryStore};
pub use workspace::{Workspace, WorkspaceMetadata};
