//! Worker command - Poll for pending jobs until interrupted.

use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;

use infragen_pipeline::Settings;

use super::{cancel_on_ctrl_c, CliError, Runtime};

#[derive(Args)]
pub struct WorkerArgs {
    /// Seed a job before polling, as TARGET=DESCRIPTION (repeatable)
    #[arg(long = "job", value_name = "TARGET=DESCRIPTION")]
    jobs: Vec<String>,
}

pub async fn execute(args: WorkerArgs, settings: &Settings) -> Result<()> {
    let seeds = args
        .jobs
        .iter()
        .map(|raw| parse_seed(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let runtime = Runtime::build(settings)?;
    for (target, description) in seeds {
        let job = runtime.service.create(description, target).await?;
        println!("➕ Queued job {} [{}]", job.id, job.target);
    }

    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(&shutdown);

    runtime.worker.run(shutdown).await;

    for count in runtime.service.status_counts().await? {
        if count.count > 0 {
            println!("   {}: {}", count.status, count.count);
        }
    }
    runtime.reporter.flush();
    Ok(())
}

fn parse_seed(raw: &str) -> Result<(&str, &str), CliError> {
    match raw.split_once('=') {
        Some((target, description)) if !target.trim().is_empty() && !description.trim().is_empty() => {
            Ok((target.trim(), description.trim()))
        }
        _ => Err(CliError::InvalidArgument(format!(
            "expected TARGET=DESCRIPTION, got {raw:?}"
        ))),
    }
}
