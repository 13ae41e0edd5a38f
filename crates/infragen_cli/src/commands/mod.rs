//! CLI command definitions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use infragen_core::{CounterReporter, MemoryStore, Workspace};
use infragen_deploy::DeployExecutor;
use infragen_pipeline::{ChatCompletionGenerator, JobPipeline, JobService, PipelineWorker, Settings};

pub mod deploy;
pub mod run;
pub mod validate;
pub mod worker;

/// infragen - IaC generation with static guardrails
#[derive(Parser)]
#[command(name = "infragen")]
#[command(version, about = "infragen - generate, validate and deploy infrastructure-as-code")]
#[command(long_about = r#"
infragen turns natural-language descriptions into infrastructure-as-code,
checks the result statically and deploys it with the configured tool.

COMMANDS:
  run       → Generate and validate one job, then print its files
  worker    → Poll for pending jobs until Ctrl-C
  validate  → Statically validate the Terraform files under a directory
  deploy    → Run init/apply against a job workspace

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments or job state
  3 - Validation failure
  4 - Generation error
  5 - Deploy error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file (TOML)
    #[arg(short, long, global = true, env = "INFRAGEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate and validate a single job
    Run(run::RunArgs),

    /// Run the pipeline worker until interrupted
    Worker(worker::WorkerArgs),

    /// Validate Terraform files in a directory
    Validate(validate::ValidateArgs),

    /// Deploy a job workspace
    Deploy(deploy::DeployArgs),
}

/// Failures that carry their own exit code.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Validation failed with {errors} error(s)")]
    ValidationFailed { errors: usize },

    #[error("Job {id} ended in status {status}")]
    JobFailed { id: String, status: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Everything a command needs, wired over one in-memory store.
pub struct Runtime {
    pub reporter: Arc<CounterReporter>,
    pub service: JobService,
    pub worker: PipelineWorker,
}

impl Runtime {
    pub fn build(settings: &Settings) -> Result<Self> {
        let store = MemoryStore::new();
        let workspace = open_workspace(settings)?;
        let reporter = Arc::new(CounterReporter::new());
        let generator = Arc::new(ChatCompletionGenerator::from_settings(&settings.llm)?);

        let pipeline = JobPipeline::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            workspace.clone(),
            generator,
        )
        .with_reporter(reporter.clone());
        let worker = PipelineWorker::new(
            Arc::new(store.clone()),
            Arc::new(pipeline),
            settings.worker.to_config(),
        )
        .with_reporter(reporter.clone());

        Ok(Self {
            service: job_service(settings, &store, workspace, reporter.clone()),
            reporter,
            worker,
        })
    }
}

/// A job service without a generator, for commands that only deploy.
pub fn job_service(
    settings: &Settings,
    store: &MemoryStore,
    workspace: Arc<Workspace>,
    reporter: Arc<CounterReporter>,
) -> JobService {
    let executor = DeployExecutor::new(workspace.base_path()).with_tool(
        &settings.deploy.tool,
        Duration::from_secs(settings.deploy.init_timeout_secs),
        Duration::from_secs(settings.deploy.apply_timeout_secs),
    );
    JobService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        workspace,
        executor,
    )
    .with_reporter(reporter)
    .with_deploy_timeout(settings.deploy_request_timeout())
}

pub fn open_workspace(settings: &Settings) -> Result<Arc<Workspace>> {
    let base = &settings.workspace.base_dir;
    let workspace = Workspace::open(base).with_context(|| format!("opening workspace {}", base.display()))?;
    Ok(Arc::new(workspace))
}

/// Cancel `token` on Ctrl-C.
pub fn cancel_on_ctrl_c(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            token.cancel();
        }
    });
}
