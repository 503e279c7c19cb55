//! Step response domain types

use serde::Serialize;

use crate::domain::script::{GradingScriptCommand, Next};

/// Record of one executed step
///
/// Built only from a command and its outcome, so `next` always comes from the
/// command's branch rule:
/// - `is_error == true` implies `next` is `abort` or an index
/// - `is_error == false` implies `next` is `output` or an index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingScriptCommandResponse {
    is_error: bool,
    output: String,
    next: Next,
    original_command: String,
    status_code: i32,
    timed_out: bool,
}

impl GradingScriptCommandResponse {
    /// Classifies an outcome of `command` and resolves the next step
    ///
    /// A step is an error when it exited non-zero or ran out of time.
    pub fn from_outcome(
        command: &GradingScriptCommand,
        output: String,
        status_code: i32,
        timed_out: bool,
    ) -> Self {
        let is_error = status_code != 0 || timed_out;
        Self {
            is_error,
            output,
            next: command.branch.target(is_error),
            original_command: command.resolved_command.clone(),
            status_code,
            timed_out,
        }
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn next(&self) -> Next {
        self.next
    }

    pub fn original_command(&self) -> &str {
        &self.original_command
    }

    pub fn status_code(&self) -> i32 {
        self.status_code
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }
}
