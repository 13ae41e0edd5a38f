//! # infragen_deploy
//!
//! Runs the deployment tool against a job's workspace as a chain of bounded,
//! cancellable subprocess phases.
//!
//! The executor never changes job status; callers decide what a
//! [`DeployReport`] or [`DeployError`] means for the job.

pub mod error;
pub mod executor;

pub use error::{DeployError, DeployResult};
pub use executor::{
    DeployExecutor, DeployPhase, DeployReport, DEFAULT_APPLY_TIMEOUT, DEFAULT_INIT_TIMEOUT, LOG_DIR,
};
pub use tokio_util::sync::CancellationToken;
