//! Per-job pipeline: generate, persist, mirror, validate, annotate, ready.
//!
//! Steps run strictly in order with no retries. Only generation and the
//! first persist can fail the job; everything after that is logged and
//! tolerated so the job still reaches READY_TO_DEPLOY.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use infragen_core::{
    annotate_files, ConfigFile, FileStore, Job, JobStatus, JobStore, NoopReporter, Reporter,
    ValidationOutcome, Workspace,
};
use infragen_validator::{AnalysisResult, FileValidator, StaticAnalyzer};

use crate::error::{GenerateError, PipelineError, PipelineResult};
use crate::generator::Generator;
use crate::prompt::Prompt;

/// Drives one claimed (RUNNING) job to READY_TO_DEPLOY or FAILED.
pub struct JobPipeline {
    jobs: Arc<dyn JobStore>,
    files: Arc<dyn FileStore>,
    workspace: Arc<Workspace>,
    generator: Arc<dyn Generator>,
    validator: Arc<dyn FileValidator>,
    reporter: Arc<dyn Reporter>,
}

impl JobPipeline {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        files: Arc<dyn FileStore>,
        workspace: Arc<Workspace>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            jobs,
            files,
            workspace,
            generator,
            validator: Arc::new(StaticAnalyzer::default()),
            reporter: Arc::new(NoopReporter),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn FileValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Process a job the caller has already moved to RUNNING.
    ///
    /// Returns the status the job was left in. An `Err` means the job was
    /// failed (or could not be failed) because generation or the first
    /// persist failed.
    pub async fn process(&self, job: &Job) -> PipelineResult<JobStatus> {
        let started = Instant::now();
        let job_id = job.id.as_str();
        info!(job_id, target = %job.target, "Processing job");

        let prompt = Prompt::for_target(job.target);
        let generation = match self.generator.generate(&job.description, &prompt).await {
            Ok(g) if g.files.is_empty() => return self.fail(job_id, GenerateError::Empty.into()).await,
            Ok(g) => g,
            Err(e) => {
                self.reporter.error("generator", "generate");
                return self.fail(job_id, e.into()).await;
            }
        };
        self.reporter.generation_request(&generation.model);
        debug!(job_id, request_id = %generation.request_id, files = generation.files.len(), "Generated files");

        let mut files: Vec<ConfigFile> = generation
            .files
            .into_iter()
            .map(|f| ConfigFile::new(job_id, f.name, f.content))
            .collect();

        if let Err(e) = self.files.save_files(&files).await {
            self.reporter.error("store", "save_files");
            return self.fail(job_id, e.into()).await;
        }

        if let Err(e) = self.workspace.save_files(job_id, &files) {
            warn!(job_id, error = %e, "Failed to mirror files to workspace");
            self.reporter.error("workspace", "save_files");
        }

        let result = self.validate(job_id, &files);
        annotate_files(&mut files, &result.diagnostics);
        if let Err(e) = self.files.save_files(&files).await {
            warn!(job_id, error = %e, "Failed to persist annotated files");
            self.reporter.error("store", "save_annotated_files");
        }

        let status = match self
            .jobs
            .transition(job_id, JobStatus::Running, JobStatus::ReadyToDeploy)
            .await
        {
            Ok(job) => {
                self.reporter.job_transition(JobStatus::Running, JobStatus::ReadyToDeploy);
                job.status
            }
            Err(e) => {
                warn!(job_id, error = %e, "Failed to mark job ready to deploy");
                JobStatus::Running
            }
        };

        self.reporter.job_finished(started.elapsed());
        info!(
            job_id,
            status = %status,
            passed = result.passed,
            diagnostics = result.diagnostics.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Job processed"
        );
        Ok(status)
    }

    fn validate(&self, job_id: &str, files: &[ConfigFile]) -> AnalysisResult {
        let started = Instant::now();
        let outcome = self.validator.analyze(files, &self.workspace.job_dir(job_id));
        let elapsed = started.elapsed();

        match outcome {
            Ok(result) => {
                let kind = if result.passed {
                    ValidationOutcome::Pass
                } else {
                    ValidationOutcome::Fail
                };
                self.reporter.validation_run(kind, elapsed);
                result
            }
            Err(e) => {
                warn!(job_id, validator = self.validator.name(), error = %e, "Validator engine error");
                self.reporter.validation_run(ValidationOutcome::Error, elapsed);
                e.into_partial_result()
            }
        }
    }

    async fn fail(&self, job_id: &str, cause: PipelineError) -> PipelineResult<JobStatus> {
        error!(job_id, error = %cause, "Job failed");
        match self
            .jobs
            .transition(job_id, JobStatus::Running, JobStatus::Failed)
            .await
        {
            Ok(_) => self.reporter.job_transition(JobStatus::Running, JobStatus::Failed),
            Err(e) => warn!(job_id, error = %e, "Failed to mark job failed"),
        }
        Err(cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{GeneratedFile, Generation, MockGenerator};
    use infragen_core::{CounterReporter, MemoryStore, Target};
    use tempfile::TempDir;

    struct Fixture {
        store: MemoryStore,
        workspace: Arc<Workspace>,
        reporter: Arc<CounterReporter>,
        _dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            Self {
                store: MemoryStore::new(),
                workspace: Arc::new(Workspace::open(dir.path()).unwrap()),
                reporter: Arc::new(CounterReporter::new()),
                _dir: dir,
            }
        }

        fn pipeline(&self, generator: MockGenerator) -> JobPipeline {
            JobPipeline::new(
                Arc::new(self.store.clone()),
                Arc::new(self.store.clone()),
                self.workspace.clone(),
                Arc::new(generator),
            )
            .with_reporter(self.reporter.clone())
        }

        async fn running_job(&self) -> Job {
            let job = Job::new("an S3 bucket", Target::Terraform);
            self.store.create(&job).await.unwrap();
            self.store
                .transition(&job.id, JobStatus::Pending, JobStatus::Running)
                .await
                .unwrap()
        }
    }

    fn generating(files: Vec<GeneratedFile>) -> MockGenerator {
        let mut generator = MockGenerator::new();
        generator.expect_generate().times(1).returning(move |_, _| {
            Ok(Generation {
                files: files.clone(),
                request_id: "req-1".to_string(),
                model: "test".to_string(),
            })
        });
        generator
    }

    #[tokio::test]
    async fn test_success_reaches_ready_with_annotations() {
        let fx = Fixture::new();
        let job = fx.running_job().await;
        let pipeline = fx.pipeline(generating(vec![
            GeneratedFile::new("main.tf", "resource \"aws_s3_bucket\" \"b\" {\n  bucket = \"b\"\n}\n"),
            GeneratedFile::new("outputs.tf", "output \"id\" {\n  value = aws_s3_bucket.b.id\n}\n"),
        ]));

        let status = pipeline.process(&job).await.unwrap();

        assert_eq!(status, JobStatus::ReadyToDeploy);
        assert_eq!(fx.store.get(&job.id).await.unwrap().unwrap().status, JobStatus::ReadyToDeploy);

        let files = fx.store.files_for_job(&job.id).await.unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.job_id == job.id));
        let main = files.iter().find(|f| f.name == "main.tf").unwrap();
        assert!(main.has_error);
        assert!(main.error.as_ref().unwrap().message.contains("missing tags"));
        assert!(!files.iter().find(|f| f.name == "outputs.tf").unwrap().has_error);

        assert!(fx.workspace.job_dir(&job.id).join("main.tf").is_file());
        assert!(fx.workspace.job_dir(&job.id).join("static_validator/analysis_results.txt").is_file());
        assert_eq!(fx.reporter.generation_requests(), 1);
        assert_eq!(fx.reporter.validations(ValidationOutcome::Pass), 1);
    }

    #[tokio::test]
    async fn test_hard_validation_error_does_not_block_readiness() {
        let fx = Fixture::new();
        let job = fx.running_job().await;
        let pipeline = fx.pipeline(generating(vec![GeneratedFile::new("main.tf", "resource \"a\" \"b\" {\n")]));

        assert_eq!(pipeline.process(&job).await.unwrap(), JobStatus::ReadyToDeploy);
        assert_eq!(fx.reporter.validations(ValidationOutcome::Fail), 1);
        let files = fx.store.files_for_job(&job.id).await.unwrap();
        assert!(files[0].error.as_ref().unwrap().is_error());
    }

    #[tokio::test]
    async fn test_generation_failure_fails_job() {
        let fx = Fixture::new();
        let job = fx.running_job().await;
        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .times(1)
            .returning(|_, _| Err(GenerateError::Request("connection refused".to_string())));

        let err = fx.pipeline(generator).process(&job).await.unwrap_err();

        assert!(matches!(err, PipelineError::Generate(_)));
        assert_eq!(fx.store.get(&job.id).await.unwrap().unwrap().status, JobStatus::Failed);
        assert!(fx.store.files_for_job(&job.id).await.unwrap().is_empty());
        assert!(!fx.workspace.job_dir(&job.id).exists());
    }

    #[tokio::test]
    async fn test_empty_generation_fails_job() {
        let fx = Fixture::new();
        let job = fx.running_job().await;

        let err = fx.pipeline(generating(Vec::new())).process(&job).await.unwrap_err();

        assert!(matches!(err, PipelineError::Generate(GenerateError::Empty)));
        assert_eq!(fx.store.get(&job.id).await.unwrap().unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_mirror_failure_is_not_fatal() {
        let fx = Fixture::new();
        let job = fx.running_job().await;
        let pipeline = fx.pipeline(generating(vec![GeneratedFile::new("../escape.tf", "locals {}\n")]));

        assert_eq!(pipeline.process(&job).await.unwrap(), JobStatus::ReadyToDeploy);
        assert!(!fx.workspace.job_dir(&job.id).join("metadata.json").exists());
    }

    #[tokio::test]
    async fn test_prompt_matches_target() {
        let fx = Fixture::new();
        let job = Job::new("a deployment", Target::Kubernetes);
        fx.store.create(&job).await.unwrap();
        let job = fx
            .store
            .transition(&job.id, JobStatus::Pending, JobStatus::Running)
            .await
            .unwrap();

        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .times(1)
            .returning(|description, prompt| {
                assert_eq!(description, "a deployment");
                assert_eq!(prompt.id, "kubernetes");
                Ok(Generation {
                    files: vec![GeneratedFile::new("deploy.yaml", "kind: Deployment\n")],
                    request_id: "req".to_string(),
                    model: "test".to_string(),
                })
            });

        assert_eq!(fx.pipeline(generator).process(&job).await.unwrap(), JobStatus::ReadyToDeploy);
    }
}
