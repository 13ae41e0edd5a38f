//! Supervised execution of the deployment tool against a job workspace.
//!
//! Phases run sequentially as child processes with the workspace as their
//! working directory. Stdout and stderr of every phase go to one append-only
//! log per job. Each phase is raced against its own bound, the caller's
//! deadline and an explicit cancel signal; whichever fires first kills the
//! child and waits for it to exit before returning.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{DeployError, DeployResult};

/// Directory under the job workspace holding deploy logs.
pub const LOG_DIR: &str = "deploy-logs";

pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_APPLY_TIMEOUT: Duration = Duration::from_secs(300);

/// One external command run against the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployPhase {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl DeployPhase {
    pub fn new<I, S>(name: impl Into<String>, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout: DEFAULT_APPLY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn banner(&self) -> String {
        format!("\n--- {} {} ---\n", self.program, self.name)
    }
}

/// Successful deployment.
#[derive(Debug, Clone)]
pub struct DeployReport {
    pub log_path: PathBuf,
    pub duration: Duration,
}

/// Runs deploy phases against `<workspace_base>/<job-id>/`.
#[derive(Debug, Clone)]
pub struct DeployExecutor {
    workspace_base: PathBuf,
    phases: Vec<DeployPhase>,
}

impl DeployExecutor {
    /// Executor with no phases configured.
    pub fn new(workspace_base: impl Into<PathBuf>) -> Self {
        Self {
            workspace_base: workspace_base.into(),
            phases: Vec::new(),
        }
    }

    /// `terraform init` followed by `terraform apply`, with default bounds.
    pub fn terraform(workspace_base: impl Into<PathBuf>) -> Self {
        Self::new(workspace_base).with_tool("terraform", DEFAULT_INIT_TIMEOUT, DEFAULT_APPLY_TIMEOUT)
    }

    /// Replace the phases with init/apply of a Terraform-compatible binary
    /// (`terraform`, `tofu`).
    pub fn with_tool(mut self, tool: &str, init_timeout: Duration, apply_timeout: Duration) -> Self {
        self.phases = vec![
            DeployPhase::new("init", tool, ["init", "-input=false"]).with_timeout(init_timeout),
            DeployPhase::new("apply", tool, ["apply", "-auto-approve", "-input=false"])
                .with_timeout(apply_timeout),
        ];
        self
    }

    pub fn with_phases(mut self, phases: Vec<DeployPhase>) -> Self {
        self.phases = phases;
        self
    }

    pub fn phases(&self) -> &[DeployPhase] {
        &self.phases
    }

    pub fn workspace_dir(&self, job_id: &str) -> PathBuf {
        self.workspace_base.join(job_id)
    }

    pub fn log_path(&self, job_id: &str) -> PathBuf {
        self.workspace_dir(job_id).join(LOG_DIR).join(format!("{job_id}.log"))
    }

    /// Deploy one job's workspace.
    ///
    /// Fails with [`DeployError::WorkspaceMissing`] before touching the
    /// filesystem when the workspace is absent. A phase failure stops the
    /// remaining phases; the error carries the partial log path.
    pub async fn deploy(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> DeployResult<DeployReport> {
        let dir = self.workspace_dir(job_id);
        if !fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(DeployError::WorkspaceMissing(dir));
        }

        let started = Instant::now();
        let log_path = self.log_path(job_id);
        fs::create_dir_all(dir.join(LOG_DIR)).await?;
        let mut log = OpenOptions::new().create(true).append(true).open(&log_path).await?;
        let header = format!(
            "job_id: {}\nstarted_at: {}\ndir: {}\n\n--- COMMAND OUTPUT ---\n\n",
            job_id,
            Utc::now().to_rfc3339(),
            dir.display()
        );
        log.write_all(header.as_bytes()).await?;

        info!(job_id, log = %log_path.display(), phases = self.phases.len(), "Starting deploy");

        for phase in &self.phases {
            if let Err(err) = self.run_phase(phase, &dir, &mut log, &log_path, cancel, deadline).await {
                warn!(job_id, phase = %phase.name, error = %err, "Deploy phase failed");
                let footer = format!("\n--- FAILED: {} ---\nended_at: {}\n", err, Utc::now().to_rfc3339());
                if let Err(write_err) = write_and_flush(&mut log, &footer).await {
                    warn!(job_id, error = %write_err, "Failed to write deploy log footer");
                }
                return Err(err);
            }
        }

        write_and_flush(&mut log, &format!("\n--- SUCCESS ---\nended_at: {}\n", Utc::now().to_rfc3339())).await?;
        let duration = started.elapsed();
        info!(job_id, duration_ms = duration.as_millis() as u64, "Deploy succeeded");

        Ok(DeployReport { log_path, duration })
    }

    async fn run_phase(
        &self,
        phase: &DeployPhase,
        dir: &Path,
        log: &mut File,
        log_path: &Path,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> DeployResult<()> {
        write_and_flush(log, &phase.banner()).await?;

        let spawn_err = |source| DeployError::Spawn {
            phase: phase.name.clone(),
            source,
            log_path: log_path.to_path_buf(),
        };
        let stdout = log.try_clone().await.map_err(spawn_err)?.into_std().await;
        let stderr = log.try_clone().await.map_err(spawn_err)?.into_std().await;

        debug!(phase = %phase.name, program = %phase.program, args = ?phase.args, "Spawning phase");
        let mut command = Command::new(&phase.program);
        command
            .args(&phase.args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);
        // Own process group, so plugins the tool forks can be killed with it.
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command.spawn().map_err(spawn_err)?;

        let caller_deadline = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        let interrupted = tokio::select! {
            status = child.wait() => {
                let status = status?;
                if status.success() {
                    return Ok(());
                }
                return Err(DeployError::ToolFailed {
                    phase: phase.name.clone(),
                    exit_code: status.code(),
                    log_path: log_path.to_path_buf(),
                });
            }
            _ = tokio::time::sleep(phase.timeout) => DeployError::TimedOut {
                phase: phase.name.clone(),
                after: phase.timeout,
                log_path: log_path.to_path_buf(),
            },
            _ = cancel.cancelled() => DeployError::Canceled {
                phase: phase.name.clone(),
                log_path: log_path.to_path_buf(),
            },
            _ = caller_deadline => DeployError::Canceled {
                phase: phase.name.clone(),
                log_path: log_path.to_path_buf(),
            },
        };

        terminate(&mut child, &phase.name).await;
        Err(interrupted)
    }
}

async fn write_and_flush(log: &mut File, text: &str) -> std::io::Result<()> {
    log.write_all(text.as_bytes()).await?;
    log.flush().await
}

/// Kill the phase's whole process group, then reap the child so nothing
/// outlives the call or writes to the log after we return.
async fn terminate(child: &mut Child, phase: &str) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: killpg only sends a signal; the child leads its own group.
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if rc != 0 {
            warn!(phase, error = %std::io::Error::last_os_error(), "Failed to kill phase process group");
        }
    }
    if let Err(err) = child.kill().await {
        warn!(phase, error = %err, "Failed to kill phase process");
    }
}
