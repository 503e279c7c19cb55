//! Code artifact downloads

use crate::GradingClient;
use crate::error::{ClientError, Result};

impl GradingClient {
    /// Download a code artifact
    ///
    /// `url` is absolute; artifacts are usually hosted outside the queue
    /// service.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        let response = self.ensure_success(response).await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to read artifact body: {}", e)))?;

        Ok(bytes.to_vec())
    }
}
