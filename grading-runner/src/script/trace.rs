//! Response trace
//!
//! Append-only, ordered record of the steps a job has executed. The trace is
//! shared between the job driver and the task running the script, so
//! whatever was recorded survives even if that task fails.

use grading_core::domain::response::GradingScriptCommandResponse;
use std::sync::{Arc, Mutex};

/// Thread-safe, append-only list of step responses
#[derive(Clone, Default)]
pub struct ResponseTrace {
    responses: Arc<Mutex<Vec<GradingScriptCommandResponse>>>,
}

impl ResponseTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the record of one executed step
    pub fn push(&self, response: GradingScriptCommandResponse) {
        let mut responses = self
            .responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        responses.push(response);
    }

    pub fn len(&self) -> usize {
        self.responses
            .lock()
            .map(|responses| responses.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }

    /// Copies the responses recorded so far, in execution order
    pub fn snapshot(&self) -> Vec<GradingScriptCommandResponse> {
        self.responses
            .lock()
            .map(|responses| responses.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grading_core::domain::script::{BranchRule, GradingScriptCommand, Next};
    use std::path::PathBuf;
    use std::time::Duration;

    fn response(cmd: &str) -> GradingScriptCommandResponse {
        let command = GradingScriptCommand {
            resolved_command: cmd.to_string(),
            working_directory: PathBuf::from("/tmp"),
            timeout: Duration::from_secs(1),
            branch: BranchRule::new(Next::Output, Next::Abort),
        };
        GradingScriptCommandResponse::from_outcome(&command, String::new(), 0, false)
    }

    #[test]
    fn test_trace_keeps_insertion_order() {
        let trace = ResponseTrace::new();
        let shared = trace.clone();

        trace.push(response("first"));
        shared.push(response("second"));

        let snapshot = trace.snapshot();
        assert_eq!(trace.len(), 2);
        assert_eq!(snapshot[0].original_command(), "first");
        assert_eq!(snapshot[1].original_command(), "second");
    }

    #[tokio::test]
    async fn test_trace_survives_panicking_writer() {
        let trace = ResponseTrace::new();
        let shared = trace.clone();

        let result: Result<(), _> = tokio::spawn(async move {
            shared.push(response("first"));
            panic!("writer crashed");
        })
        .await;

        assert!(result.unwrap_err().is_panic());
        assert_eq!(trace.snapshot().len(), 1);
        assert_eq!(trace.snapshot()[0].original_command(), "first");
    }
}
