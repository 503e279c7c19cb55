//! Grading script domain types
//!
//! A grading script is a small directed graph: each node is a resolved shell
//! command plus a branch rule naming where to go after it succeeds or fails.
//! Branch targets are validated once when the graph is built, so walking the
//! graph never has to re-check them.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Where execution continues after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Next {
    /// Successful completion of the script
    Output,
    /// Script-declared failure; the trace is still reported
    Abort,
    /// Continue with the command at this index
    Step(usize),
}

impl Next {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Next::Step(_))
    }
}

impl fmt::Display for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Next::Output => f.write_str("output"),
            Next::Abort => f.write_str("abort"),
            Next::Step(index) => write!(f, "{}", index),
        }
    }
}

impl FromStr for Next {
    type Err = InvalidTarget;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "output" => Ok(Next::Output),
            "abort" => Ok(Next::Abort),
            other => other
                .parse::<usize>()
                .map(Next::Step)
                .map_err(|_| InvalidTarget(s.to_string())),
        }
    }
}

impl Serialize for Next {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Next::Output => serializer.serialize_str("output"),
            Next::Abort => serializer.serialize_str("abort"),
            Next::Step(index) => serializer.serialize_u64(*index as u64),
        }
    }
}

impl<'de> Deserialize<'de> for Next {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Index(usize),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Index(index) => Ok(Next::Step(index)),
            Repr::Text(text) => text.parse().map_err(de::Error::custom),
        }
    }
}

/// A branch target string that is neither a sentinel nor an index
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid branch target '{0}': expected \"output\", \"abort\" or a command index")]
pub struct InvalidTarget(pub String);

/// Branch targets of one command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRule {
    pub on_success: Next,
    pub on_error: Next,
}

impl BranchRule {
    pub fn new(on_success: Next, on_error: Next) -> Self {
        Self {
            on_success,
            on_error,
        }
    }

    /// Picks the target for a step outcome
    pub fn target(&self, is_error: bool) -> Next {
        if is_error {
            self.on_error
        } else {
            self.on_success
        }
    }

    /// Checks the rule of the command at `position` in a graph of `len` commands
    pub fn check(&self, position: usize, len: usize) -> Result<(), GraphError> {
        if self.on_success == Next::Abort {
            return Err(GraphError::AbortOnSuccess { position });
        }
        if self.on_error == Next::Output {
            return Err(GraphError::OutputOnError { position });
        }
        for target in [self.on_success, self.on_error] {
            match target {
                Next::Step(index) if index >= len => {
                    return Err(GraphError::TargetOutOfRange {
                        position,
                        target: index,
                        len,
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// One resolved node of the command graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradingScriptCommand {
    /// Shell text with every placeholder substituted
    pub resolved_command: String,
    pub working_directory: PathBuf,
    pub timeout: Duration,
    pub branch: BranchRule,
}

/// Ordered, branch-validated sequence of commands. Execution starts at index 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandGraph {
    commands: Vec<GradingScriptCommand>,
}

impl CommandGraph {
    /// Builds a graph, rejecting empty scripts and dangling or misplaced targets
    pub fn new(commands: Vec<GradingScriptCommand>) -> Result<Self, GraphError> {
        if commands.is_empty() {
            return Err(GraphError::Empty);
        }

        let len = commands.len();
        for (position, command) in commands.iter().enumerate() {
            command.branch.check(position, len)?;
        }

        Ok(Self { commands })
    }

    pub fn get(&self, index: usize) -> Option<&GradingScriptCommand> {
        self.commands.get(index)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Always false for a constructed graph
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GradingScriptCommand> {
        self.commands.iter()
    }
}

/// Structural problems with a command graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("grading script has no commands")]
    Empty,

    #[error("command {position} branches to {target}, but the script has only {len} command(s)")]
    TargetOutOfRange {
        position: usize,
        target: usize,
        len: usize,
    },

    #[error("command {position} uses \"abort\" as its success target")]
    AbortOnSuccess { position: usize },

    #[error("command {position} uses \"output\" as its failure target")]
    OutputOnError { position: usize },
}
