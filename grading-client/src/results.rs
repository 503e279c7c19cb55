//! Result publication

use grading_core::domain::output::GradingJobOutput;

use crate::GradingClient;
use crate::error::Result;

impl GradingClient {
    /// Post a job's output as JSON to `url`
    ///
    /// Delivery is attempted once; the caller decides what a failure means.
    pub async fn publish_results(&self, url: &str, output: &GradingJobOutput) -> Result<()> {
        let response = self.client.post(url).json(output).send().await?;
        self.ensure_success(response).await?;

        Ok(())
    }
}
