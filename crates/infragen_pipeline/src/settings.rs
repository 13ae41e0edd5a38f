//! Runtime settings.
//!
//! Loaded from an optional TOML file, then overridden by `INFRAGEN_*`
//! environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PipelineError, PipelineResult};
use crate::worker::WorkerConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub worker: WorkerSettings,
    pub deploy: DeploySettings,
    pub workspace: WorkspaceSettings,
    pub llm: LlmSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub poll_interval_secs: u64,
    pub job_timeout_secs: u64,
    pub batch_limit: usize,
    pub max_concurrency: usize,
    /// Move RUNNING jobs older than the job timeout to FAILED.
    pub stale_running_sweep: bool,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            job_timeout_secs: 30 * 60,
            batch_limit: 100,
            max_concurrency: 1,
            stale_running_sweep: false,
        }
    }
}

impl WorkerSettings {
    pub fn to_config(&self) -> WorkerConfig {
        WorkerConfig::default()
            .with_poll_interval(Duration::from_secs(self.poll_interval_secs))
            .with_job_timeout(Duration::from_secs(self.job_timeout_secs))
            .with_batch_limit(self.batch_limit)
            .with_max_concurrency(self.max_concurrency)
            .with_stale_sweep(self.stale_running_sweep)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySettings {
    pub tool: String,
    pub init_timeout_secs: u64,
    pub apply_timeout_secs: u64,
    /// Caller deadline for a synchronous deploy request.
    pub request_timeout_secs: u64,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            tool: "terraform".to_string(),
            init_timeout_secs: 120,
            apply_timeout_secs: 300,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceSettings {
    pub base_dir: PathBuf,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./deployments"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    /// Never read from the file; only from `INFRAGEN_LLM_API_KEY`.
    #[serde(skip)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-5".to_string(),
            api_key: None,
            timeout_secs: 120,
            max_tokens: 4000,
        }
    }
}

impl Settings {
    /// Load settings from `path` (when given) and the process environment.
    pub fn load(path: Option<&Path>) -> PipelineResult<Self> {
        let mut settings = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| PipelineError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_toml(content: &str) -> PipelineResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `INFRAGEN_*` overrides read through `lookup`.
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(key: &str, value: Option<String>, slot: &mut T) {
            if let Some(raw) = value {
                match raw.parse() {
                    Ok(v) => *slot = v,
                    Err(_) => warn!(key, value = %raw, "Ignoring invalid setting override"),
                }
            }
        }

        let w = &mut self.worker;
        parsed("INFRAGEN_POLL_INTERVAL_SECS", lookup("INFRAGEN_POLL_INTERVAL_SECS"), &mut w.poll_interval_secs);
        parsed("INFRAGEN_JOB_TIMEOUT_SECS", lookup("INFRAGEN_JOB_TIMEOUT_SECS"), &mut w.job_timeout_secs);
        parsed("INFRAGEN_BATCH_LIMIT", lookup("INFRAGEN_BATCH_LIMIT"), &mut w.batch_limit);
        parsed("INFRAGEN_MAX_CONCURRENCY", lookup("INFRAGEN_MAX_CONCURRENCY"), &mut w.max_concurrency);
        parsed("INFRAGEN_STALE_RUNNING_SWEEP", lookup("INFRAGEN_STALE_RUNNING_SWEEP"), &mut w.stale_running_sweep);

        let d = &mut self.deploy;
        if let Some(tool) = lookup("INFRAGEN_DEPLOY_TOOL") {
            d.tool = tool;
        }
        parsed("INFRAGEN_INIT_TIMEOUT_SECS", lookup("INFRAGEN_INIT_TIMEOUT_SECS"), &mut d.init_timeout_secs);
        parsed("INFRAGEN_APPLY_TIMEOUT_SECS", lookup("INFRAGEN_APPLY_TIMEOUT_SECS"), &mut d.apply_timeout_secs);
        parsed("INFRAGEN_DEPLOY_TIMEOUT_SECS", lookup("INFRAGEN_DEPLOY_TIMEOUT_SECS"), &mut d.request_timeout_secs);

        if let Some(dir) = lookup("INFRAGEN_WORKSPACE_DIR") {
            self.workspace.base_dir = PathBuf::from(dir);
        }

        let l = &mut self.llm;
        if let Some(url) = lookup("INFRAGEN_LLM_BASE_URL") {
            l.base_url = url;
        }
        if let Some(model) = lookup("INFRAGEN_LLM_MODEL") {
            l.model = model;
        }
        if let Some(key) = lookup("INFRAGEN_LLM_API_KEY") {
            l.api_key = Some(key);
        }
        parsed("INFRAGEN_LLM_TIMEOUT_SECS", lookup("INFRAGEN_LLM_TIMEOUT_SECS"), &mut l.timeout_secs);
        parsed("INFRAGEN_LLM_MAX_TOKENS", lookup("INFRAGEN_LLM_MAX_TOKENS"), &mut l.max_tokens);
    }

    pub fn deploy_request_timeout(&self) -> Duration {
        Duration::from_secs(self.deploy.request_timeout_secs)
    }
}
