//! Run command - Generate and validate a single job.

use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use infragen_core::JobStatus;
use infragen_pipeline::{JobDetails, PipelineError, Settings};

use super::{cancel_on_ctrl_c, CliError, Runtime};

#[derive(Args)]
pub struct RunArgs {
    /// What to build, in plain language
    #[arg(short, long)]
    description: String,

    /// Target: terraform, kubernetes or ansible
    #[arg(short, long, default_value = "terraform")]
    target: String,

    /// Deploy the job once it is ready
    #[arg(long)]
    deploy: bool,

    /// Print the job as JSON instead of a summary
    #[arg(long)]
    output_json: bool,
}

pub async fn execute(args: RunArgs, settings: &Settings) -> Result<()> {
    let runtime = Runtime::build(settings)?;
    let job = runtime.service.create(&args.description, &args.target).await?;
    info!(job_id = %job.id, "Running job");

    runtime.worker.tick().await?;

    if args.deploy {
        let details = runtime.service.get(&job.id).await?;
        if details.job.status == JobStatus::ReadyToDeploy {
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(&cancel);
            let result = runtime.service.deploy(&job.id, &cancel).await;
            if let Err(PipelineError::Deploy(e)) = &result {
                if let Some(path) = e.log_path() {
                    println!("📄 Deploy log: {}", path.display());
                }
            }
            let report = result?;
            println!("📄 Deploy log: {}", report.log_path.display());
        }
    }

    let details = runtime.service.get(&job.id).await?;
    runtime.reporter.flush();

    if args.output_json {
        println!("{}", serde_json::to_string_pretty(&details)?);
    } else {
        print_summary(&details);
    }

    if details.job.status == JobStatus::Failed {
        return Err(CliError::JobFailed {
            id: details.job.id,
            status: details.job.status.to_string(),
        }
        .into());
    }
    Ok(())
}

fn print_summary(details: &JobDetails) {
    println!("🧾 Job {} [{}] {}", details.job.id, details.job.target, details.job.status);
    for file in &details.files {
        match &file.error {
            Some(diagnostic) if diagnostic.is_error() => println!("   ❌ {}: {}", file.name, diagnostic),
            Some(diagnostic) => println!("   ⚠️  {}: {}", file.name, diagnostic),
            None => println!("   ✅ {}", file.name),
        }
    }
}
