//! Job entity and the status graph it moves through.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

/// Opaque job identifier.
pub type JobId = String;

/// IaC dialect a job asks for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Terraform,
    Kubernetes,
    Ansible,
}

impl Target {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "terraform" | "tf" => Some(Self::Terraform),
            "kubernetes" | "k8s" => Some(Self::Kubernetes),
            "ansible" => Some(Self::Ansible),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Terraform => "terraform",
            Self::Kubernetes => "kubernetes",
            Self::Ansible => "ansible",
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Failed,
    ReadyToDeploy,
    Deploying,
    Deployed,
    Canceled,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        Self::Pending,
        Self::Running,
        Self::Failed,
        Self::ReadyToDeploy,
        Self::Deploying,
        Self::Deployed,
        Self::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::ReadyToDeploy => "ready_to_deploy",
            Self::Deploying => "deploying",
            Self::Deployed => "deployed",
            Self::Canceled => "canceled",
        }
    }

    /// Whether `self -> next` is an edge of the status graph.
    ///
    /// `Canceled` is only entered from `Pending`, by an explicit cancel
    /// request. `Deploying -> ReadyToDeploy` releases the deploy claim after
    /// a failed attempt so the deploy can be retried; no other edge leads
    /// back.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Canceled)
                | (Running, Failed)
                | (Running, ReadyToDeploy)
                | (ReadyToDeploy, Deploying)
                | (Deploying, Deployed)
                | (Deploying, ReadyToDeploy)
                | (Deploying, Failed)
        )
    }

    /// Check if no further transition leaves this status.
    pub fn is_terminal(&self) -> bool {
        Self::ALL.iter().all(|next| !self.can_transition_to(*next))
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of work tracking one generation-and-deployment request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub description: String,
    pub target: Target,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(description: impl Into<String>, target: Target) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            target,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move the job along one edge of the status graph.
    ///
    /// `expected` is the status the caller believes the job is in; a
    /// mismatch is a conflict and the job is left untouched. `updated_at`
    /// strictly increases on every successful transition.
    pub fn transition(&mut self, expected: JobStatus, next: JobStatus) -> StoreResult<()> {
        if !expected.can_transition_to(next) {
            return Err(StoreError::IllegalTransition {
                from: expected,
                to: next,
            });
        }
        if self.status != expected {
            return Err(StoreError::Conflict {
                id: self.id.clone(),
                expected,
                actual: self.status,
            });
        }

        let now = Utc::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::microseconds(1)
        };
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new("an s3 bucket", Target::Terraform);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.created_at, job.updated_at);
        assert!(!job.id.is_empty());
    }

    #[test]
    fn test_graph_edges() {
        use JobStatus::*;
        let legal = [
            (Pending, Running),
            (Pending, Canceled),
            (Running, Failed),
            (Running, ReadyToDeploy),
            (ReadyToDeploy, Deploying),
            (Deploying, Deployed),
            (Deploying, ReadyToDeploy),
            (Deploying, Failed),
        ];

        for from in JobStatus::ALL {
            for to in JobStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Deployed.is_terminal());
        assert!(JobStatus::Canceled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Deploying.is_terminal());
    }

    #[test]
    fn test_transition_conflict_leaves_job_unchanged() {
        let mut job = Job::new("vpc", Target::Terraform);
        job.transition(JobStatus::Pending, JobStatus::Running).unwrap();
        let snapshot = job.clone();

        let err = job
            .transition(JobStatus::Pending, JobStatus::Running)
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(job, snapshot);
    }

    #[test]
    fn test_illegal_edge_rejected() {
        let mut job = Job::new("vpc", Target::Terraform);
        let err = job
            .transition(JobStatus::Pending, JobStatus::Deployed)
            .unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn test_updated_at_strictly_increases() {
        let mut job = Job::new("vpc", Target::Terraform);
        job.updated_at = Utc::now() + Duration::hours(1);
        let before = job.updated_at;

        job.transition(JobStatus::Pending, JobStatus::Running).unwrap();
        assert!(job.updated_at > before);
    }

    #[test]
    fn test_target_parse() {
        assert_eq!(Target::parse("Terraform"), Some(Target::Terraform));
        assert_eq!(Target::parse("k8s"), Some(Target::Kubernetes));
        assert_eq!(Target::parse("pulumi"), None);
        assert_eq!(
            serde_json::to_string(&JobStatus::ReadyToDeploy).unwrap(),
            "\"ready_to_deploy\""
        );
    }
}
