//! Integration tests for the worker, pipeline and job service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::{tempdir, TempDir};

use infragen_core::{CounterReporter, FileStore, JobStatus, JobStore, MemoryStore, Workspace};
use infragen_deploy::{CancellationToken, DeployError, DeployExecutor, DeployPhase};
use infragen_pipeline::{
    extract_files, GenerateResult, Generation, Generator, JobPipeline, JobService, PipelineError,
    PipelineWorker, Prompt, WorkerConfig,
};

const RESPONSE: &str = r#"```main.tf
resource "aws_s3_bucket" "logs" {
  bucket   = "logs"
  password = "hunter2"
}
```
```variables.tf
variable "region" {
  default = "eu-west-1"
}
```"#;

/// Files nested below the job directory cannot be mirrored.
const NESTED_RESPONSE: &str = r#"```main.tf
resource "aws_s3_bucket" "logs" {
  bucket = "logs"
}
```
```modules/vpc/main.tf
variable "cidr" {}
```"#;

/// Counts calls and yields once so concurrent callers interleave.
struct CountingGenerator {
    calls: AtomicUsize,
    response: &'static str,
}

impl CountingGenerator {
    fn new(response: &'static str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            response,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for CountingGenerator {
    async fn generate(&self, _description: &str, _prompt: &Prompt) -> GenerateResult<Generation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(Generation {
            files: extract_files(self.response),
            request_id: "req-1".to_string(),
            model: "counting".to_string(),
        })
    }
}

struct Harness {
    store: MemoryStore,
    workspace: Arc<Workspace>,
    generator: Arc<CountingGenerator>,
    dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        Self::with_response(RESPONSE)
    }

    fn with_response(response: &'static str) -> Self {
        let dir = tempdir().unwrap();
        Self {
            store: MemoryStore::new(),
            workspace: Arc::new(Workspace::open(dir.path()).unwrap()),
            generator: CountingGenerator::new(response),
            dir,
        }
    }

    fn worker(&self) -> PipelineWorker {
        let pipeline = JobPipeline::new(
            Arc::new(self.store.clone()),
            Arc::new(self.store.clone()),
            self.workspace.clone(),
            self.generator.clone(),
        );
        PipelineWorker::new(
            Arc::new(self.store.clone()),
            Arc::new(pipeline),
            WorkerConfig::default(),
        )
    }

    fn service(&self, phases: Vec<DeployPhase>) -> JobService {
        JobService::new(
            Arc::new(self.store.clone()),
            Arc::new(self.store.clone()),
            self.workspace.clone(),
            DeployExecutor::new(self.dir.path()).with_phases(phases),
        )
    }
}

#[tokio::test]
async fn test_two_workers_claim_a_job_once() {
    let h = Harness::new();
    let svc = h.service(Vec::new());
    let job = svc.create("a logs bucket", "terraform").await.unwrap();

    let snapshot = h.store.list_by_status(JobStatus::Pending, 100).await.unwrap();
    assert_eq!(snapshot.len(), 1);

    let (a, b) = (h.worker(), h.worker());
    let (first, second) = tokio::join!(
        a.process_snapshot(snapshot.clone()),
        b.process_snapshot(snapshot)
    );

    assert_eq!(first.claimed() + second.claimed(), 1);
    assert_eq!(first.skipped + second.skipped, 1);
    assert_eq!(h.generator.calls(), 1);
    assert_eq!(
        h.store.get(&job.id).await.unwrap().unwrap().status,
        JobStatus::ReadyToDeploy
    );
}

#[tokio::test]
async fn test_canceled_job_is_never_claimed() {
    let h = Harness::new();
    let svc = h.service(Vec::new());
    let job = svc.create("a logs bucket", "terraform").await.unwrap();
    let snapshot = h.store.list_by_status(JobStatus::Pending, 100).await.unwrap();

    svc.cancel(&job.id).await.unwrap();
    let summary = h.worker().process_snapshot(snapshot).await;

    assert_eq!(summary.skipped, 1);
    assert_eq!(h.generator.calls(), 0);
}

#[tokio::test]
async fn test_job_flows_to_ready_with_persisted_annotations() {
    let h = Harness::new();
    let svc = h.service(Vec::new());
    let job = svc.create("a logs bucket", "terraform").await.unwrap();

    let summary = h.worker().tick().await.unwrap();
    assert_eq!(summary.finished, 1);

    let details = svc.get(&job.id).await.unwrap();
    assert_eq!(details.job.status, JobStatus::ReadyToDeploy);
    let names: Vec<_> = details.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["main.tf", "variables.tf"]);

    let main = &details.files[0];
    assert!(main.has_error);
    assert!(main
        .error
        .as_ref()
        .unwrap()
        .message
        .contains("Possible hardcoded secret in attribute password"));
    assert!(!details.files[1].has_error);

    let mirrored = h.workspace.load_files(&job.id).unwrap();
    assert_eq!(mirrored.len(), 2);
    assert_eq!(mirrored[0].content, details.files[0].content);

    let json = serde_json::to_value(&details).unwrap();
    assert_eq!(json["status"], "ready_to_deploy");
    assert_eq!(json["files"][0]["type"], "terraform");
}

#[tokio::test]
async fn test_delete_cascades() {
    let h = Harness::new();
    let svc = h.service(Vec::new());
    let job = svc.create("a logs bucket", "terraform").await.unwrap();
    h.worker().tick().await.unwrap();
    assert!(h.workspace.job_dir(&job.id).is_dir());

    svc.delete(&job.id).await.unwrap();

    assert!(h.store.get(&job.id).await.unwrap().is_none());
    assert!(h.store.files_for_job(&job.id).await.unwrap().is_empty());
    assert!(!h.workspace.job_dir(&job.id).exists());
    assert!(matches!(svc.delete(&job.id).await, Err(PipelineError::NotFound(_))));
}

#[tokio::test]
async fn test_deploy_without_workspace_leaves_status() {
    let h = Harness::new();
    let svc = h.service(vec![DeployPhase::new("apply", "true", Vec::<String>::new())]);
    let job = svc.create("a logs bucket", "terraform").await.unwrap();
    h.worker().tick().await.unwrap();
    h.workspace.delete(&job.id).unwrap();

    let err = svc.deploy(&job.id, &CancellationToken::new()).await.unwrap_err();

    assert!(err.is_client_error());
    assert_eq!(
        h.store.get(&job.id).await.unwrap().unwrap().status,
        JobStatus::ReadyToDeploy
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_deploy_success_marks_deployed() {
    let h = Harness::new();
    let reporter = Arc::new(CounterReporter::new());
    let svc = h
        .service(vec![
            DeployPhase::new("init", "sh", ["-c", "test -f main.tf && echo ok"]),
            DeployPhase::new("apply", "sh", ["-c", "echo applied"]),
        ])
        .with_reporter(reporter.clone());
    let job = svc.create("a logs bucket", "terraform").await.unwrap();
    h.worker().tick().await.unwrap();

    let report = svc.deploy(&job.id, &CancellationToken::new()).await.unwrap();

    assert!(report.log_path.ends_with(format!("deploy-logs/{}.log", job.id)));
    assert_eq!(
        h.store.get(&job.id).await.unwrap().unwrap().status,
        JobStatus::Deployed
    );
    assert_eq!(reporter.deploys_started(), 1);

    let again = svc.deploy(&job.id, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(again, PipelineError::Conflict { .. }));
}

#[tokio::test]
async fn test_unmirrored_job_is_refused_for_deploy() {
    let h = Harness::with_response(NESTED_RESPONSE);
    let svc = h.service(vec![DeployPhase::new("apply", "true", Vec::<String>::new())]);
    let job = svc.create("a vpc", "terraform").await.unwrap();

    let summary = h.worker().tick().await.unwrap();
    assert_eq!(summary.finished, 1);

    let details = svc.get(&job.id).await.unwrap();
    assert_eq!(details.job.status, JobStatus::ReadyToDeploy);
    assert_eq!(details.files.len(), 2);
    assert!(!h.workspace.job_dir(&job.id).exists());

    let err = svc.deploy(&job.id, &CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Deploy(DeployError::WorkspaceMissing(_))));
    assert!(err.is_client_error());
    assert!(!h.workspace.job_dir(&job.id).exists());
    assert_eq!(
        h.store.get(&job.id).await.unwrap().unwrap().status,
        JobStatus::ReadyToDeploy
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_deploy_timeout_leaves_job_retryable() {
    let h = Harness::new();
    let svc = h
        .service(vec![DeployPhase::new("init", "sleep", ["10"])])
        .with_deploy_timeout(Duration::from_millis(200));
    let job = svc.create("a logs bucket", "terraform").await.unwrap();
    h.worker().tick().await.unwrap();

    let err = svc.deploy(&job.id, &CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.kind(), "deploy_interrupted");
    assert!(!err.is_client_error());
    assert_eq!(
        h.store.get(&job.id).await.unwrap().unwrap().status,
        JobStatus::ReadyToDeploy
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_tool_failure_then_retry_deploys() {
    let h = Harness::new();
    let reporter = Arc::new(CounterReporter::new());
    let failing = h
        .service(vec![DeployPhase::new("apply", "sh", ["-c", "echo broken; exit 1"])])
        .with_reporter(reporter.clone());
    let job = failing.create("a logs bucket", "terraform").await.unwrap();
    h.worker().tick().await.unwrap();

    let err = failing.deploy(&job.id, &CancellationToken::new()).await.unwrap_err();

    match &err {
        PipelineError::Deploy(DeployError::ToolFailed { phase, exit_code, .. }) => {
            assert_eq!(phase, "apply");
            assert_eq!(*exit_code, Some(1));
        }
        other => panic!("expected tool failure, got {other:?}"),
    }
    assert_eq!(
        h.store.get(&job.id).await.unwrap().unwrap().status,
        JobStatus::ReadyToDeploy
    );

    let fixed = h.service(vec![DeployPhase::new("apply", "sh", ["-c", "echo applied"])]);
    let report = fixed.deploy(&job.id, &CancellationToken::new()).await.unwrap();

    assert_eq!(
        h.store.get(&job.id).await.unwrap().unwrap().status,
        JobStatus::Deployed
    );
    let log = std::fs::read_to_string(&report.log_path).unwrap();
    let failed = log.find("--- FAILED").unwrap();
    let success = log.find("--- SUCCESS ---").unwrap();
    assert!(log.contains("broken"));
    assert!(failed < success);
    assert_eq!(reporter.deploys_started(), 1);
}
