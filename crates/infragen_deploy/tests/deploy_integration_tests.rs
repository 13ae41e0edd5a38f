//! Integration tests for the deploy executor.
#![cfg(unix)]

use std::fs;
use std::time::Duration;

use infragen_deploy::{CancellationToken, DeployError, DeployExecutor, DeployPhase};
use tempfile::{tempdir, TempDir};
use tokio::time::Instant;

fn workspace(job_id: &str) -> TempDir {
    let base = tempdir().unwrap();
    fs::create_dir_all(base.path().join(job_id)).unwrap();
    base
}

fn sh(name: &str, script: &str) -> DeployPhase {
    DeployPhase::new(name, "sh", ["-c", script]).with_timeout(Duration::from_secs(10))
}

#[tokio::test]
async fn test_missing_workspace_starts_nothing() {
    let base = tempdir().unwrap();
    let marker = base.path().join("ran");
    let exec = DeployExecutor::new(base.path())
        .with_phases(vec![sh("init", &format!("touch {}", marker.display()))]);

    let err = exec
        .deploy("no-such-job", &CancellationToken::new(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::WorkspaceMissing(_)));
    assert!(err.log_path().is_none());
    assert!(!marker.exists());
    assert!(!exec.log_path("no-such-job").exists());
    assert!(!base.path().join("no-such-job").exists());
}

#[tokio::test]
async fn test_workspace_that_is_a_file_is_missing() {
    let base = tempdir().unwrap();
    fs::write(base.path().join("job"), "").unwrap();
    let exec = DeployExecutor::new(base.path()).with_phases(vec![sh("init", "true")]);

    let err = exec.deploy("job", &CancellationToken::new(), None).await.unwrap_err();
    assert!(matches!(err, DeployError::WorkspaceMissing(_)));
}

#[tokio::test]
async fn test_phase_timeout_kills_and_skips_apply() {
    let base = workspace("job");
    let exec = DeployExecutor::new(base.path()).with_phases(vec![
        DeployPhase::new("init", "sleep", ["10"]).with_timeout(Duration::from_millis(200)),
        sh("apply", "echo applied"),
    ]);

    let started = Instant::now();
    let err = exec.deploy("job", &CancellationToken::new(), None).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(err.is_interrupted());
    assert!(matches!(err, DeployError::TimedOut { ref phase, .. } if phase == "init"));

    let log = fs::read_to_string(err.log_path().unwrap()).unwrap();
    assert!(log.contains("--- sleep init ---"));
    assert!(!log.contains("apply ---"));
    assert!(!log.contains("applied"));
}

#[tokio::test]
async fn test_caller_deadline_cancels_phase() {
    let base = workspace("job");
    let exec = DeployExecutor::new(base.path()).with_phases(vec![sh("init", "sleep 10")]);

    let deadline = Instant::now() + Duration::from_millis(200);
    let started = Instant::now();
    let err = exec
        .deploy("job", &CancellationToken::new(), Some(deadline))
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(matches!(err, DeployError::Canceled { .. }));
}

#[tokio::test]
async fn test_cancel_token_stops_phase() {
    let base = workspace("job");
    let exec = DeployExecutor::new(base.path()).with_phases(vec![sh("init", "sleep 10")]);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = exec.deploy("job", &cancel, None).await.unwrap_err();
    assert!(matches!(err, DeployError::Canceled { ref phase, .. } if phase == "init"));
}

#[tokio::test]
async fn test_non_zero_exit_is_tool_failure() {
    let base = workspace("job");
    let exec = DeployExecutor::new(base.path())
        .with_phases(vec![sh("init", "echo broken >&2; exit 3"), sh("apply", "echo applied")]);

    let err = exec.deploy("job", &CancellationToken::new(), None).await.unwrap_err();

    assert!(!err.is_interrupted());
    assert!(matches!(err, DeployError::ToolFailed { exit_code: Some(3), .. }));
    let log = fs::read_to_string(err.log_path().unwrap()).unwrap();
    assert!(log.contains("broken"));
    assert!(!log.contains("applied"));
}

#[tokio::test]
async fn test_success_writes_header_banners_and_footer() {
    let base = workspace("job");
    let exec = DeployExecutor::new(base.path()).with_phases(vec![
        sh("init", "echo initialized"),
        sh("apply", "echo applied; echo warning >&2"),
    ]);

    let report = exec.deploy("job", &CancellationToken::new(), None).await.unwrap();

    assert_eq!(report.log_path, exec.log_path("job"));
    let log = fs::read_to_string(&report.log_path).unwrap();
    assert!(log.starts_with("job_id: job\nstarted_at: "));
    assert!(log.contains("--- COMMAND OUTPUT ---"));

    let init = log.find("--- sh init ---").unwrap();
    let initialized = log.find("initialized").unwrap();
    let apply = log.find("--- sh apply ---").unwrap();
    let applied = log.find("applied").unwrap();
    assert!(init < initialized && initialized < apply && apply < applied);
    assert!(log.contains("warning"));
    assert!(log.contains("--- SUCCESS ---\nended_at: "));
}

#[tokio::test]
async fn test_repeated_deploys_append_to_log() {
    let base = workspace("job");
    let exec = DeployExecutor::new(base.path()).with_phases(vec![sh("apply", "echo run")]);

    exec.deploy("job", &CancellationToken::new(), None).await.unwrap();
    exec.deploy("job", &CancellationToken::new(), None).await.unwrap();

    let log = fs::read_to_string(exec.log_path("job")).unwrap();
    assert_eq!(log.matches("--- SUCCESS ---").count(), 2);
}

#[tokio::test]
async fn test_missing_program_is_spawn_error() {
    let base = workspace("job");
    let exec = DeployExecutor::new(base.path())
        .with_phases(vec![DeployPhase::new("init", "definitely-not-a-real-tool-42", Vec::<String>::new())]);

    let err = exec.deploy("job", &CancellationToken::new(), None).await.unwrap_err();
    assert!(matches!(err, DeployError::Spawn { .. }));
    assert!(err.log_path().unwrap().exists());
}

#[cfg(target_os = "linux")]
fn process_alive(pid: &str) -> bool {
    match fs::read_to_string(format!("/proc/{pid}/stat")) {
        // The state field follows the parenthesised command name.
        Ok(stat) => stat.rsplit(')').next().map(|rest| !rest.trim_start().starts_with('Z')).unwrap_or(false),
        Err(_) => false,
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_timeout_kills_forked_grandchildren() {
    let base = workspace("job");
    let exec = DeployExecutor::new(base.path()).with_phases(vec![DeployPhase::new(
        "apply",
        "sh",
        ["-c", "sleep 30 & echo $! > bg.pid; wait"],
    )
    .with_timeout(Duration::from_millis(300))]);

    let err = exec.deploy("job", &CancellationToken::new(), None).await.unwrap_err();
    assert!(matches!(err, DeployError::TimedOut { .. }));

    let pid = fs::read_to_string(base.path().join("job").join("bg.pid")).unwrap();
    let pid = pid.trim();
    let until = Instant::now() + Duration::from_secs(2);
    while process_alive(pid) && Instant::now() < until {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!process_alive(pid), "background sleep {pid} outlived the phase");
}
