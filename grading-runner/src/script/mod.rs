//! Grading script pipeline
//!
//! A job's script goes through two stages: the preprocessor validates the raw
//! description and resolves it into a command graph, then the executor walks
//! that graph one shell command at a time.

pub mod executor;
pub mod preprocess;
pub mod process;
pub mod trace;

pub use executor::{ScriptExecutor, Terminal};
pub use preprocess::GradingScriptPreprocessor;
pub use trace::ResponseTrace;
