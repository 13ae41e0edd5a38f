//! Synchronous job operations behind the API surface.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use infragen_core::{
    ConfigFile, FileStore, Job, JobStatus, JobStore, NoopReporter, Reporter, Target, Workspace,
    WorkspaceError,
};
use infragen_deploy::{DeployError, DeployExecutor, DeployReport};

use crate::error::{PipelineError, PipelineResult};

/// Caller deadline for a deploy request.
pub const DEFAULT_DEPLOY_TIMEOUT: Duration = Duration::from_secs(120);

/// A job together with its files.
#[derive(Debug, Clone, Serialize)]
pub struct JobDetails {
    #[serde(flatten)]
    pub job: Job,
    pub files: Vec<ConfigFile>,
}

/// Job counts per status.
#[derive(Debug, Clone, Serialize)]
pub struct StatusCount {
    pub status: JobStatus,
    pub count: usize,
}

pub struct JobService {
    jobs: Arc<dyn JobStore>,
    files: Arc<dyn FileStore>,
    workspace: Arc<Workspace>,
    executor: DeployExecutor,
    reporter: Arc<dyn Reporter>,
    deploy_timeout: Duration,
}

impl JobService {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        files: Arc<dyn FileStore>,
        workspace: Arc<Workspace>,
        executor: DeployExecutor,
    ) -> Self {
        Self {
            jobs,
            files,
            workspace,
            executor,
            reporter: Arc::new(NoopReporter),
            deploy_timeout: DEFAULT_DEPLOY_TIMEOUT,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_deploy_timeout(mut self, timeout: Duration) -> Self {
        self.deploy_timeout = timeout;
        self
    }

    /// Create a PENDING job. Input is validated before anything is stored.
    pub async fn create(&self, description: &str, target: &str) -> PipelineResult<Job> {
        let description = description.trim();
        if description.is_empty() {
            return Err(PipelineError::InvalidInput("description is required".to_string()));
        }
        let target = Target::parse(target)
            .ok_or_else(|| PipelineError::InvalidInput(format!("unknown target: {target:?}")))?;

        let job = Job::new(description, target);
        self.jobs.create(&job).await?;
        self.reporter.job_created();
        info!(job_id = %job.id, target = %target, "Job created");
        Ok(job)
    }

    /// Register a job whose files are already mirrored under the workspace,
    /// as READY_TO_DEPLOY. Lets a fresh process deploy a workspace produced
    /// by an earlier run.
    pub async fn restore(&self, id: &str, target: &str) -> PipelineResult<JobDetails> {
        let target = Target::parse(target)
            .ok_or_else(|| PipelineError::InvalidInput(format!("unknown target: {target:?}")))?;
        let files = match self.workspace.load_files(id) {
            Ok(files) => files,
            Err(WorkspaceError::NotFound(id)) => return Err(PipelineError::NotFound(id)),
            Err(WorkspaceError::InvalidFileName(name)) => {
                return Err(PipelineError::InvalidInput(format!("invalid job id: {name:?}")))
            }
            Err(e) => return Err(e.into()),
        };

        let job = Job {
            id: id.to_string(),
            status: JobStatus::ReadyToDeploy,
            ..Job::new("restored from workspace", target)
        };
        self.jobs.create(&job).await?;
        self.files.save_files(&files).await?;
        info!(job_id = id, files = files.len(), "Job restored from workspace");
        Ok(JobDetails { job, files })
    }

    pub async fn get(&self, id: &str) -> PipelineResult<JobDetails> {
        let job = self.require(id).await?;
        let files = self.files.files_for_job(id).await?;
        Ok(JobDetails { job, files })
    }

    pub async fn list(&self) -> PipelineResult<Vec<Job>> {
        Ok(self.jobs.list().await?)
    }

    pub async fn list_files(&self, id: &str) -> PipelineResult<Vec<ConfigFile>> {
        self.require(id).await?;
        Ok(self.files.files_for_job(id).await?)
    }

    pub async fn status_counts(&self) -> PipelineResult<Vec<StatusCount>> {
        let mut counts = Vec::with_capacity(JobStatus::ALL.len());
        for status in JobStatus::ALL {
            counts.push(StatusCount {
                status,
                count: self.jobs.count_by_status(status).await?,
            });
        }
        Ok(counts)
    }

    /// Delete a job, its files and its workspace directory.
    pub async fn delete(&self, id: &str) -> PipelineResult<()> {
        self.require(id).await?;
        self.files.delete_for_job(id).await?;
        self.workspace.delete(id)?;
        self.jobs.delete(id).await?;
        info!(job_id = id, "Job deleted");
        Ok(())
    }

    /// PENDING -> CANCELED. Any other status is a conflict.
    pub async fn cancel(&self, id: &str) -> PipelineResult<Job> {
        let job = self
            .jobs
            .transition(id, JobStatus::Pending, JobStatus::Canceled)
            .await?;
        self.reporter.job_transition(JobStatus::Pending, JobStatus::Canceled);
        info!(job_id = id, "Job canceled");
        Ok(job)
    }

    /// Deploy a READY_TO_DEPLOY job under the caller deadline.
    ///
    /// DEPLOYING is held only while the executor runs, which keeps two
    /// deploys of the same job from sharing its log. Success ends in
    /// DEPLOYED. A missing workspace, a tool failure, a timeout or a cancel
    /// all leave the job READY_TO_DEPLOY so the deploy can be retried.
    pub async fn deploy(&self, id: &str, cancel: &CancellationToken) -> PipelineResult<DeployReport> {
        let job = self.require(id).await?;
        if job.status != JobStatus::ReadyToDeploy {
            return Err(PipelineError::Conflict {
                id: id.to_string(),
                expected: JobStatus::ReadyToDeploy.to_string(),
                actual: job.status.to_string(),
            });
        }

        let dir = self.executor.workspace_dir(id);
        if !dir.is_dir() {
            return Err(DeployError::WorkspaceMissing(dir).into());
        }

        self.jobs
            .transition(id, JobStatus::ReadyToDeploy, JobStatus::Deploying)
            .await?;
        self.reporter.job_transition(JobStatus::ReadyToDeploy, JobStatus::Deploying);
        self.reporter.deploy_started();

        let deadline = Instant::now() + self.deploy_timeout;
        let outcome = self.executor.deploy(id, cancel, Some(deadline)).await;
        let next = if outcome.is_ok() {
            JobStatus::Deployed
        } else {
            JobStatus::ReadyToDeploy
        };

        match self.jobs.transition(id, JobStatus::Deploying, next).await {
            Ok(_) => self.reporter.job_transition(JobStatus::Deploying, next),
            Err(e) => warn!(job_id = id, error = %e, "Failed to record deploy outcome"),
        }
        self.reporter.deploy_finished(outcome.is_ok());

        match outcome {
            Ok(report) => {
                info!(job_id = id, log = %report.log_path.display(), "Job deployed");
                Ok(report)
            }
            Err(e) => {
                warn!(job_id = id, error = %e, interrupted = e.is_interrupted(), "Deploy failed");
                Err(e.into())
            }
        }
    }

    async fn require(&self, id: &str) -> PipelineResult<Job> {
        self.jobs
            .get(id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))
    }
}
