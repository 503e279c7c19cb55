//! Grading HTTP Client
//!
//! A small, typed HTTP client for the services a grading runner talks to:
//! the grading queue (next job payload), file hosting (code artifacts) and the
//! results endpoint (published job output).
//!
//! # Example
//!
//! ```no_run
//! use grading_client::GradingClient;
//!
//! #[tokio::main]
//! async fn main() -> grading_client::Result<()> {
//!     let client = GradingClient::new("http://localhost:8090");
//!
//!     if let Some(payload) = client.next_job().await? {
//!         println!("Got job: {}", payload);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod files;
mod jobs;
mod results;

pub use error::{ClientError, Result};

use reqwest::Client;

/// HTTP client for the grading queue and its companion endpoints
#[derive(Debug, Clone)]
pub struct GradingClient {
    /// Base URL of the grading queue service (e.g., "http://localhost:8090")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl GradingClient {
    /// Create a new client for the queue service at `base_url`
    ///
    /// # Example
    /// ```
    /// use grading_client::GradingClient;
    ///
    /// let client = GradingClient::new("http://localhost:8090/");
    /// assert_eq!(client.base_url(), "http://localhost:8090");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a client with a custom reqwest client (timeouts, proxies, TLS)
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the queue service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fail with an API error unless the response is a success
    async fn ensure_success(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(response)
    }
}
