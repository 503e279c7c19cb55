//! Job driver
//!
//! Runs one grading job end to end: provision a sandbox, take a job off the
//! queue, preprocess and execute its script, publish the aggregated output
//! and release the sandbox.
//!
//! Once a sandbox is provisioned, every path through `run_next` releases it
//! exactly once, and every job taken off the queue (or a failed attempt to
//! take one) produces exactly one published output.

use anyhow::{Context, Result};
use grading_core::domain::output::{GradingJobOutput, JobError};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::repository::{JobQueue, ResultPublisher};
use crate::script::{GradingScriptPreprocessor, ResponseTrace, ScriptExecutor, Terminal};
use crate::service::{ExecutionSecret, SandboxGuard, SandboxProvisioner, SecretFactory};

/// Drives single jobs through their lifecycle
pub struct JobDriver {
    queue: Arc<dyn JobQueue>,
    publisher: Arc<dyn ResultPublisher>,
    sandbox: Arc<dyn SandboxProvisioner>,
    secrets: Arc<dyn SecretFactory>,
    preprocessor: Arc<GradingScriptPreprocessor>,
    executor: Arc<ScriptExecutor>,
}

impl JobDriver {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        publisher: Arc<dyn ResultPublisher>,
        sandbox: Arc<dyn SandboxProvisioner>,
        secrets: Arc<dyn SecretFactory>,
        preprocessor: Arc<GradingScriptPreprocessor>,
        executor: Arc<ScriptExecutor>,
    ) -> Self {
        Self {
            queue,
            publisher,
            sandbox,
            secrets,
            preprocessor,
            executor,
        }
    }

    /// Grades the next job on the queue
    ///
    /// Returns `Ok(None)` when the queue is empty, and the published output
    /// otherwise. Only a failure to provision a sandbox is an `Err`; in that
    /// case nothing was taken off the queue.
    pub async fn run_next(&self) -> Result<Option<GradingJobOutput>> {
        let secret = self.secrets.generate();
        // Only a prefix of the secret goes into the logs
        let span = info_span!("job", id = %secret.short_id());

        let dir = self
            .sandbox
            .provision(&secret)
            .instrument(span.clone())
            .await
            .context("Failed to provision sandbox")?;
        let guard = SandboxGuard::new(Arc::clone(&self.sandbox), dir);
        let output = match self.queue.next_job().instrument(span.clone()).await {
            Ok(Some(payload)) => {
                self.grade(&secret, guard.path().to_path_buf(), payload)
                    .instrument(span.clone())
                    .await
            }
            Ok(None) => {
                debug!("Grading queue is empty");
                guard.release().await;
                return Ok(None);
            }
            Err(e) => {
                error!(parent: &span, "Failed to retrieve job: {:#}", e);
                GradingJobOutput::failed(Vec::new(), JobError::Retrieval(format!("{:#}", e)))
            }
        };

        async {
            if let Err(e) = self.publisher.publish(&output).await {
                error!("Failed to publish results: {:#}", e);
            }
            guard.release().await;
        }
        .instrument(span)
        .await;

        Ok(Some(output))
    }

    /// Preprocesses and executes one payload
    ///
    /// The work runs in its own task so that a panic inside it still yields
    /// an output carrying the steps recorded before the panic.
    async fn grade(
        &self,
        secret: &ExecutionSecret,
        sandbox_dir: PathBuf,
        payload: String,
    ) -> GradingJobOutput {
        let trace = ResponseTrace::new();

        let task = {
            let preprocessor = Arc::clone(&self.preprocessor);
            let executor = Arc::clone(&self.executor);
            let secret = secret.clone();
            let trace = trace.clone();

            tokio::spawn(
                async move {
                    let job = GradingScriptPreprocessor::parse(&payload)
                        .map_err(|e| JobError::Preprocessing(e.to_string()))?;
                    info!(
                        submission_id = ?job.submission_id,
                        user_id = ?job.user_id,
                        team_id = ?job.team_id,
                        "Grading job with {} command(s)",
                        job.script.len()
                    );

                    let graph = preprocessor
                        .preprocess(&secret, &sandbox_dir, &job)
                        .await
                        .map_err(|e| JobError::Preprocessing(e.to_string()))?;

                    executor
                        .execute(&graph, &trace)
                        .await
                        .map_err(|e| JobError::Unexpected(e.to_string()))
                }
                .in_current_span(),
            )
        };

        let result = match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                Err(JobError::Unexpected("grading task panicked".to_string()))
            }
            Err(e) => Err(JobError::Unexpected(format!("grading task failed: {}", e))),
        };

        let responses = trace.snapshot();
        match result {
            Ok(terminal) => {
                match terminal {
                    Terminal::Output => info!("Job finished with {} response(s)", responses.len()),
                    Terminal::Abort => info!("Job aborted after {} response(s)", responses.len()),
                }
                GradingJobOutput::completed(responses)
            }
            Err(error) => {
                warn!("Job failed: {}", error);
                GradingJobOutput::failed(responses, error)
            }
        }
    }
}
