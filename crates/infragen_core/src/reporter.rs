//! Observability hooks.
//!
//! Components take an `Arc<dyn Reporter>` instead of touching global
//! counters. [`CounterReporter`] keeps lock-free totals and emits them as a
//! single `tracing::info!` event on [`CounterReporter::flush`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::job::JobStatus;

/// Outcome of one static validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Pass,
    Fail,
    Error,
}

/// Fixed set of observability events.
pub trait Reporter: Send + Sync {
    fn job_created(&self) {}
    fn job_transition(&self, _from: JobStatus, _to: JobStatus) {}
    fn job_finished(&self, _duration: Duration) {}
    fn validation_run(&self, _outcome: ValidationOutcome, _duration: Duration) {}
    fn generation_request(&self, _model: &str) {}
    fn deploy_started(&self) {}
    fn deploy_finished(&self, _success: bool) {}
    fn error(&self, _component: &str, _kind: &str) {}
}

/// Reporter that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl Reporter for NoopReporter {}

/// Atomic counters for every reporter event.
#[derive(Debug, Default)]
pub struct CounterReporter {
    jobs_created: AtomicU64,
    transitions: AtomicU64,
    jobs_finished: AtomicU64,
    validations_passed: AtomicU64,
    validations_failed: AtomicU64,
    validation_errors: AtomicU64,
    generation_requests: AtomicU64,
    deploys_started: AtomicU64,
    deploys_succeeded: AtomicU64,
    deploys_failed: AtomicU64,
    errors: AtomicU64,
}

impl CounterReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs_created(&self) -> u64 {
        self.jobs_created.load(Ordering::Relaxed)
    }

    pub fn transitions(&self) -> u64 {
        self.transitions.load(Ordering::Relaxed)
    }

    pub fn jobs_finished(&self) -> u64 {
        self.jobs_finished.load(Ordering::Relaxed)
    }

    pub fn validations(&self, outcome: ValidationOutcome) -> u64 {
        match outcome {
            ValidationOutcome::Pass => self.validations_passed.load(Ordering::Relaxed),
            ValidationOutcome::Fail => self.validations_failed.load(Ordering::Relaxed),
            ValidationOutcome::Error => self.validation_errors.load(Ordering::Relaxed),
        }
    }

    pub fn generation_requests(&self) -> u64 {
        self.generation_requests.load(Ordering::Relaxed)
    }

    pub fn deploys_started(&self) -> u64 {
        self.deploys_started.load(Ordering::Relaxed)
    }

    pub fn deploys_succeeded(&self) -> u64 {
        self.deploys_succeeded.load(Ordering::Relaxed)
    }

    pub fn deploys_failed(&self) -> u64 {
        self.deploys_failed.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            jobs_created = self.jobs_created(),
            transitions = self.transitions(),
            jobs_finished = self.jobs_finished(),
            validations_passed = self.validations(ValidationOutcome::Pass),
            validations_failed = self.validations(ValidationOutcome::Fail),
            validation_errors = self.validations(ValidationOutcome::Error),
            generation_requests = self.generation_requests(),
            deploys_started = self.deploys_started(),
            deploys_succeeded = self.deploys_succeeded(),
            deploys_failed = self.deploys_failed(),
            errors = self.errors(),
        );
    }
}

impl Reporter for CounterReporter {
    fn job_created(&self) {
        self.jobs_created.fetch_add(1, Ordering::Relaxed);
    }

    fn job_transition(&self, from: JobStatus, to: JobStatus) {
        self.transitions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "job_transition", %from, %to, "counter incremented");
    }

    fn job_finished(&self, _duration: Duration) {
        self.jobs_finished.fetch_add(1, Ordering::Relaxed);
    }

    fn validation_run(&self, outcome: ValidationOutcome, _duration: Duration) {
        let counter = match outcome {
            ValidationOutcome::Pass => &self.validations_passed,
            ValidationOutcome::Fail => &self.validations_failed,
            ValidationOutcome::Error => &self.validation_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn generation_request(&self, model: &str) {
        self.generation_requests.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "generation_request", model, "counter incremented");
    }

    fn deploy_started(&self) {
        self.deploys_started.fetch_add(1, Ordering::Relaxed);
    }

    fn deploy_finished(&self, success: bool) {
        if success {
            self.deploys_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.deploys_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn error(&self, component: &str, kind: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "error", component, kind, "counter incremented");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let r = CounterReporter::new();
        r.job_created();
        r.job_transition(JobStatus::Pending, JobStatus::Running);
        r.validation_run(ValidationOutcome::Fail, Duration::from_millis(3));
        r.deploy_finished(false);
        r.deploy_finished(true);

        assert_eq!(r.jobs_created(), 1);
        assert_eq!(r.transitions(), 1);
        assert_eq!(r.validations(ValidationOutcome::Fail), 1);
        assert_eq!(r.validations(ValidationOutcome::Pass), 0);
        assert_eq!(r.deploys_failed(), 1);
        assert_eq!(r.deploys_succeeded(), 1);
        r.flush();
    }
}
