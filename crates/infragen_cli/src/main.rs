//! infragen CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments or job state
//! - 3: Validation failure
//! - 4: Generation error
//! - 5: Deploy error

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use infragen_deploy::DeployError;
use infragen_pipeline::{PipelineError, Settings};

mod commands;

use commands::{Cli, CliError, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const VALIDATION_FAILURE: u8 = 3;
    pub const GENERATION_ERROR: u8 = 4;
    pub const DEPLOY_ERROR: u8 = 5;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.json, cli.verbose);

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(ExitCodes::INVALID_ARGS);
        }
    };

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args, &settings).await,
        Commands::Worker(args) => commands::worker::execute(args, &settings).await,
        Commands::Validate(args) => commands::validate::execute(args).await,
        Commands::Deploy(args) => commands::deploy::execute(args, &settings).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(categorize_error(&e))
        }
    }
}

fn init_logging(json: bool, verbose: bool) {
    let default = if verbose { "infragen=debug,warn" } else { "infragen=info,warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    if result.is_err() {
        // Logging already initialized, continue
    }
}

/// Map an error to its exit code.
fn categorize_error(e: &anyhow::Error) -> u8 {
    if let Some(err) = e.downcast_ref::<CliError>() {
        return match err {
            CliError::ValidationFailed { .. } => ExitCodes::VALIDATION_FAILURE,
            CliError::JobFailed { .. } => ExitCodes::GENERATION_ERROR,
            CliError::InvalidArgument(_) => ExitCodes::INVALID_ARGS,
        };
    }
    if let Some(err) = e.downcast_ref::<PipelineError>() {
        return match err {
            PipelineError::Generate(_) => ExitCodes::GENERATION_ERROR,
            PipelineError::Deploy(DeployError::WorkspaceMissing(_)) => ExitCodes::INVALID_ARGS,
            PipelineError::Deploy(_) => ExitCodes::DEPLOY_ERROR,
            err if err.is_client_error() => ExitCodes::INVALID_ARGS,
            _ => ExitCodes::GENERAL_ERROR,
        };
    }
    if let Some(err) = e.downcast_ref::<DeployError>() {
        return match err {
            DeployError::WorkspaceMissing(_) => ExitCodes::INVALID_ARGS,
            _ => ExitCodes::DEPLOY_ERROR,
        };
    }
    ExitCodes::GENERAL_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_exit_codes() {
        let validation = anyhow::Error::new(CliError::ValidationFailed { errors: 2 });
        assert_eq!(categorize_error(&validation), ExitCodes::VALIDATION_FAILURE);

        let missing = anyhow::Error::new(DeployError::WorkspaceMissing(PathBuf::from("/x")));
        assert_eq!(categorize_error(&missing), ExitCodes::INVALID_ARGS);

        let not_found = anyhow::Error::new(PipelineError::NotFound("j".into()));
        assert_eq!(categorize_error(&not_found), ExitCodes::INVALID_ARGS);

        let other = anyhow::anyhow!("boom");
        assert_eq!(categorize_error(&other), ExitCodes::GENERAL_ERROR);
    }

    #[test]
    fn test_context_keeps_exit_code() {
        let err = anyhow::Error::new(CliError::ValidationFailed { errors: 1 }).context("validating ./infra");
        assert_eq!(categorize_error(&err), ExitCodes::VALIDATION_FAILURE);
    }
}
