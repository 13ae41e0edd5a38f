//! # infragen_pipeline
//!
//! Drives jobs from a description to deployable, validated files.
//!
//! # Architecture
//!
//! - **Generator**: adapter contract turning a description and prompt into files
//! - **JobPipeline**: generate, persist, mirror, validate, annotate, mark ready
//! - **PipelineWorker**: polling loop that claims PENDING jobs through the store
//! - **JobService**: create, inspect, cancel, delete and deploy jobs
//! - **Settings**: TOML file plus `INFRAGEN_*` overrides

pub mod error;
pub mod extract;
pub mod generator;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod service;
pub mod settings;
pub mod worker;

pub use error::{ErrorBody, GenerateError, GenerateResult, PipelineError, PipelineResult};
pub use extract::{extract_files, DEFAULT_FILE_NAME};
pub use generator::{GeneratedFile, Generation, Generator};
pub use llm::ChatCompletionGenerator;
pub use pipeline::JobPipeline;
pub use prompt::Prompt;
pub use service::{JobDetails, JobService, StatusCount, DEFAULT_DEPLOY_TIMEOUT};
pub use settings::{DeploySettings, LlmSettings, Settings, WorkerSettings, WorkspaceSettings};
pub use worker::{JobOutcome, PipelineWorker, TickSummary, WorkerConfig};
