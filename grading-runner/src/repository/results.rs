//! Results repository
//!
//! Hands a finished job's output to whoever reports grades upstream.
//! Delivery is attempted once; failures are reported to the caller, which
//! logs them and moves on.

use anyhow::{Context, Result};
use async_trait::async_trait;
use grading_client::GradingClient;
use grading_core::domain::output::GradingJobOutput;
use std::sync::Arc;
use tracing::info;

/// Repository trait for result publication
#[async_trait]
pub trait ResultPublisher: Send + Sync {
    /// Publishes the output of one job
    async fn publish(&self, output: &GradingJobOutput) -> Result<()>;
}

/// Publishes results by POSTing them to a fixed URL
pub struct HttpResultPublisher {
    client: Arc<GradingClient>,
    url: String,
}

impl HttpResultPublisher {
    pub fn new(client: Arc<GradingClient>, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl ResultPublisher for HttpResultPublisher {
    async fn publish(&self, output: &GradingJobOutput) -> Result<()> {
        self.client
            .publish_results(&self.url, output)
            .await
            .with_context(|| format!("Failed to publish results to {}", self.url))
    }
}

/// Writes results to the log when no results endpoint is configured
#[derive(Debug, Default)]
pub struct LogResultPublisher;

#[async_trait]
impl ResultPublisher for LogResultPublisher {
    async fn publish(&self, output: &GradingJobOutput) -> Result<()> {
        let json = serde_json::to_string(output).context("Failed to serialize job output")?;
        info!(output = %json, "Grading job output");
        Ok(())
    }
}
