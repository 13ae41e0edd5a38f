//! Job and file store contracts, plus an in-memory implementation.
//!
//! The conditional status update ([`JobStore::transition`]) is the only
//! coordination primitive the pipeline relies on. Implementations must make
//! the compare-and-set atomic so that several workers can poll the same
//! store without processing a job twice.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::file::ConfigFile;
use crate::job::{Job, JobId, JobStatus};

/// Persistent job store.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job.
    async fn create(&self, job: &Job) -> StoreResult<()>;

    /// Fetch a job by id, `None` if absent.
    async fn get(&self, id: &str) -> StoreResult<Option<Job>>;

    /// List every job, oldest first.
    async fn list(&self) -> StoreResult<Vec<Job>>;

    /// List at most `limit` jobs in `status`, oldest first.
    async fn list_by_status(&self, status: JobStatus, limit: usize) -> StoreResult<Vec<Job>>;

    /// Count jobs in `status`.
    async fn count_by_status(&self, status: JobStatus) -> StoreResult<usize>;

    /// Atomically move a job from `expected` to `next`.
    ///
    /// Fails with [`StoreError::Conflict`] if the job is not currently in
    /// `expected`, and with [`StoreError::IllegalTransition`] if the edge is
    /// not part of the status graph. In both cases the job is unmodified.
    async fn transition(&self, id: &str, expected: JobStatus, next: JobStatus) -> StoreResult<Job>;

    /// Remove a job.
    async fn delete(&self, id: &str) -> StoreResult<()>;
}

/// Persistent store for generated files.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Upsert files, keyed by `(job_id, name)`. Insertion order per job is kept.
    async fn save_files(&self, files: &[ConfigFile]) -> StoreResult<()>;

    /// Fetch every file owned by a job, in insertion order.
    async fn files_for_job(&self, job_id: &str) -> StoreResult<Vec<ConfigFile>>;

    /// Remove every file owned by a job.
    async fn delete_for_job(&self, job_id: &str) -> StoreResult<()>;
}

#[derive(Default)]
struct MemoryState {
    jobs: HashMap<JobId, Job>,
    files: HashMap<JobId, Vec<ConfigFile>>,
}

/// In-memory job and file store.
///
/// Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_jobs<'a>(jobs: impl Iterator<Item = &'a Job>) -> Vec<Job> {
    let mut out: Vec<Job> = jobs.cloned().collect();
    out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    out
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create(&self, job: &Job) -> StoreResult<()> {
        let mut state = self.state.write();
        if state.jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id.clone()));
        }
        state.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Job>> {
        Ok(self.state.read().jobs.get(id).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<Job>> {
        Ok(sorted_jobs(self.state.read().jobs.values()))
    }

    async fn list_by_status(&self, status: JobStatus, limit: usize) -> StoreResult<Vec<Job>> {
        let state = self.state.read();
        let mut jobs = sorted_jobs(state.jobs.values().filter(|j| j.status == status));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn count_by_status(&self, status: JobStatus) -> StoreResult<usize> {
        Ok(self
            .state
            .read()
            .jobs
            .values()
            .filter(|j| j.status == status)
            .count())
    }

    async fn transition(&self, id: &str, expected: JobStatus, next: JobStatus) -> StoreResult<Job> {
        let mut state = self.state.write();
        let job = state
            .jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        job.transition(expected, next)?;
        debug!(job_id = id, from = %expected, to = %next, "job transitioned");
        Ok(job.clone())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.state
            .write()
            .jobs
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn save_files(&self, files: &[ConfigFile]) -> StoreResult<()> {
        if let Some(file) = files.iter().find(|f| f.job_id.is_empty()) {
            return Err(StoreError::InvalidInput(format!(
                "file {} has no owning job id",
                file.name
            )));
        }

        let mut state = self.state.write();
        for file in files {
            let owned = state.files.entry(file.job_id.clone()).or_default();
            match owned.iter_mut().find(|f| f.name == file.name) {
                Some(existing) => *existing = file.clone(),
                None => owned.push(file.clone()),
            }
        }
        Ok(())
    }

    async fn files_for_job(&self, job_id: &str) -> StoreResult<Vec<ConfigFile>> {
        Ok(self
            .state
            .read()
            .files
            .get(job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_for_job(&self, job_id: &str) -> StoreResult<()> {
        self.state.write().files.remove(job_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::Diagnostic;
    use crate::job::Target;

    #[tokio::test]
    async fn test_conditional_transition() {
        let store = MemoryStore::new();
        let job = Job::new("bucket", Target::Terraform);
        store.create(&job).await.unwrap();

        let running = store
            .transition(&job.id, JobStatus::Pending, JobStatus::Running)
            .await
            .unwrap();
        assert_eq!(running.status, JobStatus::Running);

        let err = store
            .transition(&job.id, JobStatus::Pending, JobStatus::Running)
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let stored = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored, running);
    }

    #[tokio::test]
    async fn test_transition_unknown_job() {
        let store = MemoryStore::new();
        let err = store
            .transition("missing", JobStatus::Pending, JobStatus::Running)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_by_status_is_bounded() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .create(&Job::new(format!("job {i}"), Target::Terraform))
                .await
                .unwrap();
        }

        let pending = store.list_by_status(JobStatus::Pending, 3).await.unwrap();
        assert_eq!(pending.len(), 3);
        assert_eq!(store.count_by_status(JobStatus::Pending).await.unwrap(), 5);
        assert_eq!(store.count_by_status(JobStatus::Running).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_save_and_fetch_files() {
        let store = MemoryStore::new();
        let mut files = vec![
            ConfigFile::new("job-1", "main.tf", "a = 1"),
            ConfigFile::new("job-1", "outputs.tf", "b = 2"),
        ];
        store.save_files(&files).await.unwrap();

        files[0].set_error(Diagnostic::advisory("main.tf", "missing tags", 1, 1));
        store.save_files(&files).await.unwrap();

        let fetched = store.files_for_job("job-1").await.unwrap();
        assert_eq!(fetched, files);
        assert!(fetched[0].has_error);

        store.delete_for_job("job-1").await.unwrap();
        assert!(store.files_for_job("job-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_files_requires_owner() {
        let store = MemoryStore::new();
        let err = store
            .save_files(&[ConfigFile::new("", "main.tf", "")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }
}
