//! Job output domain types

use serde::Serialize;
use thiserror::Error;

use crate::domain::response::GradingScriptCommandResponse;
use crate::domain::script::Next;

/// Job-level failure categories
///
/// Per-step failures (non-zero exit, timeout, spawn failure) are never job
/// errors; they are ordinary responses in the trace.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum JobError {
    /// The queue could not deliver a job payload
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// The job description failed structural or referential validation
    #[error("preprocessing error: {0}")]
    Preprocessing(String),

    /// Anything else
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl JobError {
    pub fn message(&self) -> &str {
        match self {
            JobError::Retrieval(message)
            | JobError::Preprocessing(message)
            | JobError::Unexpected(message) => message,
        }
    }
}

/// Aggregated result of one grading job
///
/// Exactly one is produced per job whichever path the job took.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GradingJobOutput {
    pub responses: Vec<GradingScriptCommandResponse>,
    pub errors: Vec<JobError>,
}

impl GradingJobOutput {
    pub fn new(responses: Vec<GradingScriptCommandResponse>, errors: Vec<JobError>) -> Self {
        Self { responses, errors }
    }

    /// Output of a script that reached a terminal marker
    pub fn completed(responses: Vec<GradingScriptCommandResponse>) -> Self {
        Self::new(responses, Vec::new())
    }

    /// Output of a job that failed with a job-level error
    pub fn failed(responses: Vec<GradingScriptCommandResponse>, error: JobError) -> Self {
        Self::new(responses, vec![error])
    }

    /// Terminal marker reached by the script, if it reached one
    pub fn terminal(&self) -> Option<Next> {
        self.responses
            .last()
            .map(GradingScriptCommandResponse::next)
            .filter(Next::is_terminal)
    }

    /// True when the script reached `output` without job-level errors
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.terminal() == Some(Next::Output)
    }
}
