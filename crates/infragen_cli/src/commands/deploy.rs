//! Deploy command - Run init/apply against a mirrored job workspace.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use infragen_core::{CounterReporter, MemoryStore};
use infragen_pipeline::{PipelineError, Settings};

use super::{cancel_on_ctrl_c, job_service, open_workspace};

#[derive(Args)]
pub struct DeployArgs {
    /// Job id whose workspace directory should be deployed
    #[arg(short, long)]
    job: String,

    /// Target the workspace was generated for
    #[arg(short, long, default_value = "terraform")]
    target: String,

    /// Overall deadline in seconds (defaults to the configured request timeout)
    #[arg(long)]
    timeout: Option<u64>,
}

pub async fn execute(args: DeployArgs, settings: &Settings) -> Result<()> {
    let store = MemoryStore::new();
    let reporter = Arc::new(CounterReporter::new());
    let mut service = job_service(settings, &store, open_workspace(settings)?, reporter.clone());
    if let Some(secs) = args.timeout {
        service = service.with_deploy_timeout(Duration::from_secs(secs));
    }

    let restored = service.restore(&args.job, &args.target).await?;
    info!(job_id = %restored.job.id, files = restored.files.len(), tool = %settings.deploy.tool, "Deploying workspace");

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);

    let result = service.deploy(&args.job, &cancel).await;
    reporter.flush();
    match result {
        Ok(report) => {
            println!("🚀 Deployed {} in {:.1}s", args.job, report.duration.as_secs_f64());
            println!("📄 Log: {}", report.log_path.display());
            Ok(())
        }
        Err(e) => {
            if let PipelineError::Deploy(err) = &e {
                if let Some(path) = err.log_path() {
                    println!("📄 Log: {}", path.display());
                }
            }
            Err(e.into())
        }
    }
}
