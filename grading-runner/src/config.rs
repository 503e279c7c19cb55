//! Runner configuration
//!
//! Defines all configurable parameters for the runner including the grading
//! queue connection, result publication, sandbox location and script limits.

use std::path::PathBuf;
use std::time::Duration;

/// Runner configuration
///
/// All timeouts and intervals are configurable to allow tuning
/// for different deployment scenarios (dev vs prod, slow graders).
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier for this runner instance
    pub runner_id: String,

    /// Grading queue base URL (e.g., "http://localhost:8090")
    pub queue_url: String,

    /// Where job output is POSTed; when unset the output is logged instead
    pub results_url: Option<String>,

    /// Parent directory of every job sandbox
    pub workspace_base: PathBuf,

    /// How often to poll the queue when idle
    pub poll_interval: Duration,

    /// Step timeout used when neither the command nor the job sets one
    pub default_timeout: Duration,

    /// Maximum number of steps one script may execute
    pub max_steps: usize,

    /// Max jobs graded concurrently
    pub max_parallel_jobs: usize,

    /// Shell used to run commands (`<shell> -c <command>`)
    pub shell: String,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(runner_id: String, queue_url: String) -> Self {
        Self {
            runner_id,
            queue_url,
            results_url: None,
            workspace_base: std::env::temp_dir().join("grading"),
            poll_interval: Duration::from_secs(5),
            default_timeout: Duration::from_secs(60),
            max_steps: 1000,
            max_parallel_jobs: 2,
            shell: "bash".to_string(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - RUNNER_ID (optional, default: random UUID)
    /// - QUEUE_URL (required)
    /// - RESULTS_URL (optional, default: log results)
    /// - WORKSPACE_BASE (optional, default: $TMPDIR/grading)
    /// - POLL_INTERVAL (optional, seconds, default: 5)
    /// - DEFAULT_TIMEOUT (optional, seconds, default: 60)
    /// - MAX_STEPS (optional, default: 1000)
    /// - MAX_PARALLEL_JOBS (optional, default: 2)
    /// - GRADING_SHELL (optional, default: bash)
    pub fn from_env() -> anyhow::Result<Self> {
        let queue_url = std::env::var("QUEUE_URL")
            .map_err(|_| anyhow::anyhow!("QUEUE_URL environment variable not set"))?;

        let runner_id =
            std::env::var("RUNNER_ID").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());

        let mut config = Self::new(runner_id, queue_url);

        config.results_url = std::env::var("RESULTS_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        if let Ok(base) = std::env::var("WORKSPACE_BASE") {
            config.workspace_base = PathBuf::from(base);
        }

        if let Some(secs) = env_parse::<u64>("POLL_INTERVAL") {
            config.poll_interval = Duration::from_secs(secs);
        }

        if let Some(secs) = env_parse::<u64>("DEFAULT_TIMEOUT") {
            config.default_timeout = Duration::from_secs(secs);
        }

        if let Some(max_steps) = env_parse::<usize>("MAX_STEPS") {
            config.max_steps = max_steps;
        }

        if let Some(max_parallel_jobs) = env_parse::<usize>("MAX_PARALLEL_JOBS") {
            config.max_parallel_jobs = max_parallel_jobs;
        }

        if let Ok(shell) = std::env::var("GRADING_SHELL") {
            config.shell = shell;
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.runner_id.is_empty() {
            anyhow::bail!("runner_id cannot be empty");
        }

        validate_url("queue_url", &self.queue_url)?;
        if let Some(results_url) = &self.results_url {
            validate_url("results_url", results_url)?;
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.default_timeout.is_zero() {
            anyhow::bail!("default_timeout must be greater than 0");
        }

        if self.max_steps == 0 {
            anyhow::bail!("max_steps must be greater than 0");
        }

        if self.max_parallel_jobs == 0 {
            anyhow::bail!("max_parallel_jobs must be greater than 0");
        }

        if self.shell.trim().is_empty() {
            anyhow::bail!("shell cannot be empty");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            "http://localhost:8090".to_string(),
        )
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse::<T>().ok())
}

fn validate_url(name: &str, url: &str) -> anyhow::Result<()> {
    if url.is_empty() {
        anyhow::bail!("{} cannot be empty", name);
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }

    Ok(())
}
