//! Script executor
//!
//! Walks a command graph from its first command, running each step under its
//! own timeout and following the branch selected by the step's outcome until
//! a terminal target is reached.

use grading_core::domain::response::GradingScriptCommandResponse;
use grading_core::domain::script::{CommandGraph, Next};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::process::run_command;
use super::trace::ResponseTrace;

/// How a script run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Output,
    Abort,
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminal::Output => f.write_str("output"),
            Terminal::Abort => f.write_str("abort"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("script did not terminate within {max_steps} steps")]
    StepLimitExceeded { max_steps: usize },

    #[error("branch to missing command {0}")]
    MissingStep(usize),
}

/// Runs command graphs through a shell
pub struct ScriptExecutor {
    shell: String,
    max_steps: usize,
}

impl ScriptExecutor {
    pub fn new(shell: impl Into<String>, max_steps: usize) -> Self {
        Self {
            shell: shell.into(),
            max_steps,
        }
    }

    /// Executes `graph`, appending one response per executed step to `trace`
    ///
    /// Loops are allowed; a run that has not reached `output` or `abort`
    /// after `max_steps` steps is stopped. The trace keeps everything that ran.
    pub async fn execute(
        &self,
        graph: &CommandGraph,
        trace: &ResponseTrace,
    ) -> Result<Terminal, ExecutionError> {
        let mut position = 0;

        for step in 1..=self.max_steps {
            let command = graph
                .get(position)
                .ok_or(ExecutionError::MissingStep(position))?;

            debug!("Step {}: running command {}", step, position);
            let outcome = run_command(
                &self.shell,
                &command.resolved_command,
                &command.working_directory,
                command.timeout,
            )
            .await;

            let response = GradingScriptCommandResponse::from_outcome(
                command,
                outcome.output,
                outcome.status_code,
                outcome.timed_out,
            );
            let next = response.next();

            if response.timed_out() {
                warn!(
                    "Command {} timed out after {:?}, continuing at {}",
                    position, command.timeout, next
                );
            } else {
                debug!(
                    "Command {} exited with status {}, continuing at {}",
                    position,
                    response.status_code(),
                    next
                );
            }
            trace.push(response);

            match next {
                Next::Output => return Ok(self.finish(Terminal::Output, step)),
                Next::Abort => return Ok(self.finish(Terminal::Abort, step)),
                Next::Step(index) => position = index,
            }
        }

        warn!("Script exceeded {} steps, stopping", self.max_steps);
        Err(ExecutionError::StepLimitExceeded {
            max_steps: self.max_steps,
        })
    }

    fn finish(&self, terminal: Terminal, steps: usize) -> Terminal {
        info!("Script reached {} after {} step(s)", terminal, steps);
        terminal
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use grading_core::domain::script::{BranchRule, GradingScriptCommand};
    use std::path::Path;
    use std::time::Duration;

    fn command(dir: &Path, cmd: &str, on_success: Next, on_error: Next) -> GradingScriptCommand {
        GradingScriptCommand {
            resolved_command: cmd.to_string(),
            working_directory: dir.to_path_buf(),
            timeout: Duration::from_secs(5),
            branch: BranchRule::new(on_success, on_error),
        }
    }

    fn executor() -> ScriptExecutor {
        ScriptExecutor::new("sh", 20)
    }

    #[tokio::test]
    async fn test_single_successful_step() {
        let dir = tempfile::tempdir().unwrap();
        let graph = CommandGraph::new(vec![command(
            dir.path(),
            "echo hi",
            Next::Output,
            Next::Abort,
        )])
        .unwrap();
        let trace = ResponseTrace::new();

        let terminal = executor().execute(&graph, &trace).await.unwrap();

        assert_eq!(terminal, Terminal::Output);
        let responses = trace.snapshot();
        assert_eq!(responses.len(), 1);
        assert!(!responses[0].is_error());
        assert_eq!(responses[0].output(), "hi\n");
        assert_eq!(responses[0].next(), Next::Output);
    }

    #[tokio::test]
    async fn test_failure_follows_error_branch() {
        let dir = tempfile::tempdir().unwrap();
        let graph = CommandGraph::new(vec![
            command(dir.path(), "exit 2", Next::Output, Next::Step(1)),
            command(dir.path(), "echo recovered", Next::Output, Next::Abort),
        ])
        .unwrap();
        let trace = ResponseTrace::new();

        let terminal = executor().execute(&graph, &trace).await.unwrap();

        assert_eq!(terminal, Terminal::Output);
        let responses = trace.snapshot();
        assert_eq!(responses.len(), 2);
        assert!(responses[0].is_error());
        assert_eq!(responses[0].status_code(), 2);
        assert_eq!(responses[0].next(), Next::Step(1));
        assert_eq!(responses[1].original_command(), "echo recovered");
    }

    #[tokio::test]
    async fn test_failure_can_abort() {
        let dir = tempfile::tempdir().unwrap();
        let graph = CommandGraph::new(vec![
            command(dir.path(), "false", Next::Step(1), Next::Abort),
            command(dir.path(), "echo unreachable", Next::Output, Next::Abort),
        ])
        .unwrap();
        let trace = ResponseTrace::new();

        let terminal = executor().execute(&graph, &trace).await.unwrap();

        assert_eq!(terminal, Terminal::Abort);
        assert_eq!(trace.len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_an_error_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let mut slow = command(dir.path(), "sleep 30", Next::Output, Next::Step(1));
        slow.timeout = Duration::from_millis(200);
        let graph = CommandGraph::new(vec![
            slow,
            command(dir.path(), "echo cleanup", Next::Output, Next::Abort),
        ])
        .unwrap();
        let trace = ResponseTrace::new();

        let terminal = executor().execute(&graph, &trace).await.unwrap();

        assert_eq!(terminal, Terminal::Output);
        let responses = trace.snapshot();
        assert!(responses[0].timed_out());
        assert!(responses[0].is_error());
        assert_eq!(responses[0].next(), Next::Step(1));
        assert_eq!(responses[1].output(), "cleanup\n");
    }

    #[tokio::test]
    async fn test_loop_hits_step_limit_and_keeps_trace() {
        let dir = tempfile::tempdir().unwrap();
        let graph = CommandGraph::new(vec![command(
            dir.path(),
            "true",
            Next::Step(0),
            Next::Abort,
        )])
        .unwrap();
        let trace = ResponseTrace::new();

        let err = ScriptExecutor::new("sh", 3)
            .execute(&graph, &trace)
            .await
            .unwrap_err();

        assert_eq!(err, ExecutionError::StepLimitExceeded { max_steps: 3 });
        assert_eq!(trace.len(), 3);
    }

    #[tokio::test]
    async fn test_responses_agree_with_branch_rules() {
        let dir = tempfile::tempdir().unwrap();
        let graph = CommandGraph::new(vec![
            command(dir.path(), "true", Next::Step(1), Next::Abort),
            command(dir.path(), "exit 1", Next::Output, Next::Step(2)),
            command(dir.path(), "echo done", Next::Output, Next::Abort),
        ])
        .unwrap();
        let trace = ResponseTrace::new();

        executor().execute(&graph, &trace).await.unwrap();

        let responses = trace.snapshot();
        let mut position = 0;
        for response in &responses {
            let rule = graph.get(position).unwrap().branch;
            assert_eq!(response.next(), rule.target(response.is_error()));
            if let Next::Step(index) = response.next() {
                position = index;
            }
        }
        assert_eq!(responses.last().unwrap().next(), Next::Output);
    }
}
