//! Repository layer
//!
//! Repositories abstract communication with the services around the runner:
//! the grading queue, artifact hosting and the results endpoint. They carry
//! no grading logic.
//!
//! All repositories are trait-based to enable testing and mocking.

mod code_files;
mod queue;
mod results;

// Re-export traits
pub use code_files::CodeFileRepository;
pub use queue::JobQueue;
pub use results::ResultPublisher;

// Re-export implementations
pub use code_files::HttpCodeFileRepository;
pub use queue::HttpJobQueue;
pub use results::{HttpResultPublisher, LogResultPublisher};
