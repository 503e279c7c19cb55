//! Grading queue endpoints

use reqwest::StatusCode;
use tracing::debug;

use crate::GradingClient;
use crate::error::{ClientError, Result};

impl GradingClient {
    // =============================================================================
    // Job Retrieval
    // =============================================================================

    /// Take the next grading job off the queue
    ///
    /// # Returns
    /// The raw job payload, or `None` when the queue is empty (`204` or `404`)
    pub async fn next_job(&self) -> Result<Option<String>> {
        let url = format!("{}/grading_queue/next", self.base_url);
        let response = self.client.get(&url).send().await?;

        if matches!(
            response.status(),
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND
        ) {
            debug!("Grading queue is empty");
            return Ok(None);
        }

        let response = self.ensure_success(response).await?;
        let payload = response
            .text()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to read job payload: {}", e)))?;

        if payload.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(payload))
    }
}
