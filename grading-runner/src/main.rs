//! Grading Runner
//!
//! A worker that takes grading jobs off a queue and runs their scripts in
//! private sandbox directories.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Repositories: HTTP communication with the queue, artifact hosting and
//!   the results endpoint
//! - Services: Execution secrets and sandbox directories
//! - Script: Preprocessing job descriptions into command graphs and executing them
//! - Scheduler: Job polling and lifecycle management
//!
//! Every job taken off the queue produces exactly one published output, and
//! its sandbox is removed whatever happened to the job.

mod config;
mod repository;
mod scheduler;
mod script;
mod service;

#[cfg(test)]
mod test_support;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::repository::{
    CodeFileRepository, HttpCodeFileRepository, HttpJobQueue, HttpResultPublisher, JobQueue,
    LogResultPublisher, ResultPublisher,
};
use crate::scheduler::{JobDriver, JobPoller};
use crate::script::{GradingScriptPreprocessor, ScriptExecutor};
use crate::service::{LocalSandboxProvisioner, SandboxProvisioner, UuidSecretFactory};
use grading_client::GradingClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "grading_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Grading Runner");

    // Load configuration
    let config = load_config()?;
    info!(
        "Loaded configuration: runner_id={}, queue_url={}, workspace_base={}",
        config.runner_id,
        config.queue_url,
        config.workspace_base.display()
    );

    // Initialize client
    let client = Arc::new(GradingClient::new(config.queue_url.clone()));

    // Initialize repositories
    let queue: Arc<dyn JobQueue> = Arc::new(HttpJobQueue::new(Arc::clone(&client)));
    let code_files: Arc<dyn CodeFileRepository> =
        Arc::new(HttpCodeFileRepository::new(Arc::clone(&client)));
    let publisher: Arc<dyn ResultPublisher> = match &config.results_url {
        Some(url) => {
            info!("Publishing results to {}", url);
            Arc::new(HttpResultPublisher::new(Arc::clone(&client), url.clone()))
        }
        None => {
            info!("RESULTS_URL not set, results will be logged");
            Arc::new(LogResultPublisher)
        }
    };

    // Initialize services
    let sandbox: Arc<dyn SandboxProvisioner> =
        Arc::new(LocalSandboxProvisioner::new(config.workspace_base.clone()));
    let preprocessor = Arc::new(GradingScriptPreprocessor::new(
        code_files,
        config.default_timeout,
    ));
    let executor = Arc::new(ScriptExecutor::new(config.shell.clone(), config.max_steps));

    let driver = Arc::new(JobDriver::new(
        queue,
        publisher,
        sandbox,
        Arc::new(UuidSecretFactory),
        preprocessor,
        executor,
    ));

    info!("Runner initialized successfully");
    info!(
        "Default step timeout: {:?}, max steps: {}, shell: {}",
        config.default_timeout, config.max_steps, config.shell
    );

    let poller = JobPoller::new(config, driver);

    tokio::select! {
        _ = poller.run() => {}
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Shutdown requested"),
                Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
            }
        }
    }

    poller.drain().await;
    info!("Grading Runner stopped");

    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(e) => {
            info!("Failed to load config from environment ({}), using defaults", e);
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}
