//! Background polling loop that claims PENDING jobs and runs the pipeline.
//!
//! Claiming is a conditional PENDING -> RUNNING transition at the store, so
//! several workers can share one store without processing a job twice.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use infragen_core::{Job, JobStatus, JobStore, NoopReporter, Reporter, StoreError};

use crate::error::PipelineResult;
use crate::pipeline::JobPipeline;

/// Worker tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    /// Deadline shared by every step of one job.
    pub job_timeout: Duration,
    /// Maximum number of PENDING jobs fetched per tick.
    pub batch_limit: usize,
    /// Jobs processed at once within a tick.
    pub max_concurrency: usize,
    pub stale_sweep: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            job_timeout: Duration::from_secs(30 * 60),
            batch_limit: 100,
            max_concurrency: 1,
            stale_sweep: false,
        }
    }
}

impl WorkerConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    pub fn with_stale_sweep(mut self, enabled: bool) -> Self {
        self.stale_sweep = enabled;
        self
    }
}

/// What happened to one job in a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Another worker claimed it first, or it vanished.
    Skipped,
    Finished(JobStatus),
    Failed,
    TimedOut,
}

/// Per-tick counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub fetched: usize,
    pub skipped: usize,
    pub finished: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub swept: usize,
}

impl TickSummary {
    fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Skipped => self.skipped += 1,
            JobOutcome::Finished(_) => self.finished += 1,
            JobOutcome::Failed => self.failed += 1,
            JobOutcome::TimedOut => self.timed_out += 1,
        }
    }

    /// Jobs this worker won the claim for.
    pub fn claimed(&self) -> usize {
        self.finished + self.failed + self.timed_out
    }
}

pub struct PipelineWorker {
    jobs: Arc<dyn JobStore>,
    pipeline: Arc<JobPipeline>,
    config: WorkerConfig,
    reporter: Arc<dyn Reporter>,
}

impl PipelineWorker {
    pub fn new(jobs: Arc<dyn JobStore>, pipeline: Arc<JobPipeline>, config: WorkerConfig) -> Self {
        Self {
            jobs,
            pipeline,
            config,
            reporter: Arc::new(NoopReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Poll until `shutdown` fires.
    ///
    /// The first tick runs immediately. A tick always runs to completion;
    /// the stop signal is only observed between ticks.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(interval = ?self.config.poll_interval, "Pipeline worker started");
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.tick().await {
                Ok(summary) if summary.fetched > 0 || summary.swept > 0 => {
                    info!(?summary, "Worker tick complete")
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Worker tick failed"),
            }
        }
        info!("Pipeline worker stopped");
    }

    /// One polling pass: optional stale sweep, then the PENDING snapshot.
    pub async fn tick(&self) -> PipelineResult<TickSummary> {
        let swept = if self.config.stale_sweep {
            self.sweep_stale().await?
        } else {
            0
        };

        let pending = self
            .jobs
            .list_by_status(JobStatus::Pending, self.config.batch_limit)
            .await?;
        debug!(count = pending.len(), "Fetched pending jobs");

        let mut summary = self.process_snapshot(pending).await;
        summary.swept = swept;
        Ok(summary)
    }

    /// Claim and process each job of a snapshot with bounded parallelism.
    pub async fn process_snapshot(&self, snapshot: Vec<Job>) -> TickSummary {
        let mut summary = TickSummary {
            fetched: snapshot.len(),
            ..TickSummary::default()
        };

        let outcomes: Vec<JobOutcome> = stream::iter(snapshot)
            .map(|job| self.claim_and_process(job))
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            summary.record(outcome);
        }
        summary
    }

    async fn claim_and_process(&self, job: Job) -> JobOutcome {
        let claimed = match self
            .jobs
            .transition(&job.id, JobStatus::Pending, JobStatus::Running)
            .await
        {
            Ok(claimed) => claimed,
            Err(e) if e.is_conflict() => {
                debug!(job_id = %job.id, "Job already claimed; skipping");
                return JobOutcome::Skipped;
            }
            Err(StoreError::NotFound(_)) => {
                debug!(job_id = %job.id, "Job deleted before claim; skipping");
                return JobOutcome::Skipped;
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Failed to claim job; skipping");
                self.reporter.error("worker", "claim");
                return JobOutcome::Skipped;
            }
        };
        self.reporter.job_transition(JobStatus::Pending, JobStatus::Running);

        match tokio::time::timeout(self.config.job_timeout, self.pipeline.process(&claimed)).await {
            Ok(Ok(status)) => JobOutcome::Finished(status),
            Ok(Err(e)) => {
                error!(job_id = %claimed.id, error = %e, "Job processing failed");
                JobOutcome::Failed
            }
            Err(_) => {
                warn!(
                    job_id = %claimed.id,
                    timeout = ?self.config.job_timeout,
                    "Job exceeded its deadline; left RUNNING"
                );
                self.reporter.error("worker", "job_timeout");
                JobOutcome::TimedOut
            }
        }
    }

    /// Move RUNNING jobs untouched for longer than the job deadline to
    /// FAILED.
    async fn sweep_stale(&self) -> PipelineResult<usize> {
        let Ok(timeout) = chrono::Duration::from_std(self.config.job_timeout) else {
            return Ok(0);
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(timeout) else {
            return Ok(0);
        };

        let running = self
            .jobs
            .list_by_status(JobStatus::Running, self.config.batch_limit)
            .await?;

        let mut swept = 0;
        for job in running.into_iter().filter(|j| j.updated_at < cutoff) {
            match self
                .jobs
                .transition(&job.id, JobStatus::Running, JobStatus::Failed)
                .await
            {
                Ok(_) => {
                    warn!(job_id = %job.id, updated_at = %job.updated_at, "Failed stale RUNNING job");
                    self.reporter.job_transition(JobStatus::Running, JobStatus::Failed);
                    swept += 1;
                }
                Err(e) => debug!(job_id = %job.id, error = %e, "Stale job changed before sweep"),
            }
        }
        Ok(swept)
    }
}
