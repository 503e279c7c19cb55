//! Job queue repository
//!
//! Pulls raw job payloads off the grading queue.

use anyhow::{Context, Result};
use async_trait::async_trait;
use grading_client::GradingClient;
use std::sync::Arc;

/// Repository trait for the grading queue
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Takes the next job payload off the queue
    ///
    /// Returns `None` when there is nothing to grade.
    async fn next_job(&self) -> Result<Option<String>>;
}

/// HTTP implementation of JobQueue
pub struct HttpJobQueue {
    client: Arc<GradingClient>,
}

impl HttpJobQueue {
    /// Creates a new HTTP job queue
    pub fn new(client: Arc<GradingClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobQueue for HttpJobQueue {
    async fn next_job(&self) -> Result<Option<String>> {
        self.client
            .next_job()
            .await
            .with_context(|| format!("Failed to fetch next job from {}", self.client.base_url()))
    }
}
